//! The internal protocol between the client and the responder.
//!
//! The two sides share no memory; everything below travels over channels.
//! Each conversation gets its own channel: one command stream into the
//! responder, and per job an acknowledgment, a fetch-init negotiation
//! lane, a progress lane, and an error lane.

use tokio::sync::{mpsc, oneshot};

use crate::error::Error;
use crate::io::FetchInit;
use crate::job::FileDescriptor;
use crate::responder::StreamingResponse;

/// Commands accepted by the responder's message loop.
pub enum Command {
    /// Register a new job and acknowledge over `ack`.
    Initialize {
        id: String,
        name: String,
        files: Vec<FileDescriptor>,
        channels: JobChannels,
        ack: oneshot::Sender<Result<(), Error>>,
    },
    /// Keep-alive heartbeat; carries nothing.
    Tick,
    /// A request intercepted by the host reached the responder's scope.
    ///
    /// Answered with a streaming response when the path's final segment
    /// is `download-<id>` for a registered job, `None` otherwise.
    Intercept {
        path: String,
        reply: oneshot::Sender<Option<StreamingResponse>>,
    },
}

/// Per-job channel endpoints handed over at INITIALIZE.
pub struct JobChannels {
    /// Responder → client: asks for the fetch init before each file.
    pub fetch_init: mpsc::Sender<FetchInitRequest>,
    /// Responder → client: progress stream.
    pub progress: mpsc::Sender<ProgressEvent>,
    /// Responder → client: error stream.
    pub error: mpsc::Sender<ErrorEvent>,
}

/// One round of fetch-init negotiation.
///
/// Sent by the responder right before it fetches a file; the client
/// evaluates its init source at that moment and replies, so credentials
/// are as fresh as they can be.
pub struct FetchInitRequest {
    pub reply: oneshot::Sender<FetchInit>,
}

/// Progress of a running job.
///
/// Emitted for every chunk appended to the archive, once when streaming
/// begins, and exactly once with `done` set when the job exits, whether
/// it completed, failed, or was canceled.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Job id.
    pub id: String,
    /// Name of the file being downloaded when the event fired.
    pub file: String,
    /// Bytes streamed of the current file.
    pub file_bytes: u64,
    /// Bytes streamed across all files of the job so far.
    pub fileset_bytes: u64,
    /// Estimated total (sum of declared sizes).
    pub total_bytes: u128,
    /// Set on the final event of the job.
    pub done: bool,
}

/// A failure scoped to one file of a job.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// Job id.
    pub id: String,
    /// Name of the file the error belongs to.
    pub file: String,
    /// Human-readable description.
    pub error: String,
}
