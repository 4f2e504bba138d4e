use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;

use super::{FetchBody, FetchInit, FetchResponse, Transport};
use anyhow::Result;

/// HTTP implementation of [`Transport`] backed by a shared client.
///
/// Only the connection is put under a timeout: the body is read for as
/// long as the download takes, since a whole-request deadline would cut
/// off large files mid-stream.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with its own connection pool.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str, init: &FetchInit) -> Result<FetchResponse> {
        let mut request = self.client.get(url);
        for (name, value) in &init.headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();

        Ok(FetchResponse {
            status,
            body: Box::new(HttpBody { response }),
        })
    }
}

struct HttpBody {
    response: reqwest::Response,
}

#[async_trait]
impl FetchBody for HttpBody {
    async fn chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.response.chunk().await?)
    }
}
