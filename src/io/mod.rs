mod http;

pub use http::HttpTransport;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Request options forwarded to the transport for one fetch.
///
/// The job-level init merges with a file's own init via [`merge`]
/// (per-file values win) just before each download starts, so
/// short-lived credentials are computed at the moment of use.
///
/// [`merge`]: FetchInit::merge
#[derive(Debug, Clone, Default)]
pub struct FetchInit {
    /// Header name/value pairs sent with the request.
    pub headers: Vec<(String, String)>,
}

impl FetchInit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, replacing any existing one with the same name
    /// (compared case-insensitively).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some((_, v)) => *v = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Look up a header value, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Overlay `source` onto this init.
    ///
    /// Header names match case-insensitively; a matched header keeps its
    /// original casing and takes the overlay's value, unmatched overlay
    /// headers are appended as-is.
    pub fn merge(&self, source: Option<&FetchInit>) -> FetchInit {
        let Some(source) = source else {
            return self.clone();
        };

        let mut merged = self.clone();
        for (name, value) in &source.headers {
            match merged
                .headers
                .iter_mut()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
            {
                Some((_, v)) => *v = value.clone(),
                None => merged.headers.push((name.clone(), value.clone())),
            }
        }
        merged
    }
}

/// A fetched response: a status code and a pull-based body.
pub struct FetchResponse {
    pub status: u16,
    pub body: Box<dyn FetchBody>,
}

impl FetchResponse {
    /// Whether the status is in the success range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for fetching a remote file as a chunked byte stream
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request for `url` with the given init options.
    ///
    /// A returned `Ok` only means the request produced a response; the
    /// status may still indicate failure. `Err` means the transport
    /// itself failed (connect error, protocol error).
    async fn fetch(&self, url: &str, init: &FetchInit) -> Result<FetchResponse>;
}

/// Pull-based readable body of a fetched response
#[async_trait]
pub trait FetchBody: Send {
    /// Read the next chunk, or `None` at end of stream.
    ///
    /// Chunk sizes are whatever the transport delivers; callers must not
    /// assume any particular chunking.
    async fn chunk(&mut self) -> Result<Option<Bytes>>;
}
