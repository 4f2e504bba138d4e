use thiserror::Error;

/// Errors surfaced to callers of the client API and the archive builder.
///
/// Transport failures are not represented here: they travel to the caller
/// as [`ErrorEvent`](crate::ErrorEvent) messages instead, since a file's
/// download failing is a per-job event rather than an API error.
#[derive(Debug, Error)]
pub enum Error {
    /// No responder has been registered with the client
    #[error("no responder registered")]
    NoResponder,

    /// The responder did not acknowledge a new job within the handshake bound
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// A job with the same id is already initialized
    #[error("job already initialized: {0}")]
    DuplicateJob(String),

    /// A job was started with no files to download
    #[error("file list is empty")]
    EmptyFileList,

    /// An entry is still open in the archive builder
    #[error("an entry is already open")]
    EntryAlreadyOpen,

    /// No entry is open in the archive builder
    #[error("no entry is open")]
    NoOpenEntry,

    /// The archive has already been finished
    #[error("archive already finished")]
    AlreadyFinished,

    /// The archive was canceled; its output ends without a terminal record
    #[error("archive canceled")]
    Canceled,

    /// The other side of a protocol channel went away
    #[error("channel closed")]
    ChannelClosed,

    /// Record encoding failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
