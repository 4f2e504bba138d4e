//! # streamzip
//!
//! Assemble a single ZIP archive on the fly from multiple remote
//! downloads, streaming the archive to the requester as each file
//! arrives.
//!
//! Neither the complete archive nor any single source file is ever held
//! in memory: the builder emits archive bytes incrementally while data
//! arrives in arbitrarily-sized chunks, switching to the ZIP64 format
//! when the estimated total calls for it. Two tasks cooperate over
//! channels with no shared memory: a [`ZipClient`] that starts jobs and
//! observes progress, and a [`ZipResponder`] that answers intercepted
//! download requests and drives the downloads into the archive.
//!
//! ## Features
//!
//! - Incremental, constant-memory ZIP encoding (STORED entries with
//!   trailing data descriptors)
//! - Automatic ZIP64 switch for large totals, large files, or many
//!   entries
//! - Lazy per-file fetch-init negotiation for short-lived credentials
//! - Progress and error events per job, with a guaranteed terminal event
//!
//! ## Example
//!
//! ```no_run
//! use streamzip::{FileDescriptor, HttpTransport, JobOptions, ZipClient, ZipResponder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let responder = ZipResponder::spawn(HttpTransport::new()?);
//!
//!     let mut client = ZipClient::new();
//!     client.register(responder.clone());
//!
//!     let files = vec![
//!         FileDescriptor::new("report.pdf", "https://example.com/report.pdf", 123_456),
//!         FileDescriptor::new("data.csv", "https://example.com/data.csv", 654_321),
//!     ];
//!     let locator = client
//!         .downzip("job-1", "bundle", files, JobOptions::new())
//!         .await?;
//!
//!     // Issue the intercepted request; the archive streams from here.
//!     let mut response = responder.intercept(&locator).await?.expect("job initialized");
//!     while let Some(chunk) = response.body.recv().await {
//!         // forward chunk to the requester
//!         let _ = chunk;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod io;
pub mod job;
pub mod message;
pub mod responder;
pub mod zip;

pub use client::{FetchInitSource, JobOptions, ZipClient, SCOPE};
pub use error::Error;
pub use io::{FetchBody, FetchInit, FetchResponse, HttpTransport, Transport};
pub use job::FileDescriptor;
pub use message::{ErrorEvent, ProgressEvent};
pub use responder::{ResponderHandle, StreamingResponse, ZipResponder};
pub use zip::{estimated_size, needs_zip64, ZipBuilder, ZipOutput};
