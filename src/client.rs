//! Caller-facing API: register a responder, start jobs, observe events.

use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::io::FetchInit;
use crate::job::FileDescriptor;
use crate::message::{Command, ErrorEvent, FetchInitRequest, JobChannels, ProgressEvent};
use crate::responder::ResponderHandle;

/// Path scope under which the responder intercepts download requests.
pub const SCOPE: &str = "streamzip";

/// How long to wait for the responder to acknowledge a new job.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Interval between keep-alive ticks.
const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(5000);

/// Progress/error events buffered per job.
const EVENT_BUFFER: usize = 64;

/// Where a job's fetch init comes from.
///
/// `Lazy` defers computing the init until the responder asks for it,
/// once per file, so short-lived credentials are evaluated at the moment
/// of use rather than when the job starts.
pub enum FetchInitSource {
    Value(FetchInit),
    Lazy(Box<dyn Fn() -> BoxFuture<'static, FetchInit> + Send + Sync>),
}

impl FetchInitSource {
    async fn evaluate(&self) -> FetchInit {
        match self {
            FetchInitSource::Value(init) => init.clone(),
            FetchInitSource::Lazy(producer) => producer().await,
        }
    }
}

pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(ErrorEvent) + Send + Sync>;

/// Per-job options: fetch init source and event callbacks.
#[derive(Default)]
pub struct JobOptions {
    pub fetch_init: Option<FetchInitSource>,
    pub on_progress: Option<ProgressCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed fetch init for every file of the job.
    pub fn fetch_init(mut self, init: FetchInit) -> Self {
        self.fetch_init = Some(FetchInitSource::Value(init));
        self
    }

    /// Compute the fetch init on demand, once per file.
    pub fn fetch_init_with<F, Fut>(mut self, producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchInit> + Send + 'static,
    {
        self.fetch_init = Some(FetchInitSource::Lazy(Box::new(move || {
            Box::pin(producer())
        })));
        self
    }

    /// Observe progress events for this job.
    pub fn on_progress(
        mut self,
        callback: impl Fn(ProgressEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Observe error events for this job.
    pub fn on_error(mut self, callback: impl Fn(ErrorEvent) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }
}

/// The initiating half of the protocol.
///
/// Holds the responder handle, keeps it alive with a heartbeat, starts
/// jobs, and relays each job's events to its callbacks.
pub struct ZipClient {
    responder: Option<ResponderHandle>,
    keepalive: Option<JoinHandle<()>>,
}

impl ZipClient {
    pub fn new() -> Self {
        Self {
            responder: None,
            keepalive: None,
        }
    }

    /// Install the responder and start the keep-alive heartbeat.
    ///
    /// The heartbeat ticks for the registration's lifetime so an idle
    /// responder context is not reclaimed during a long transfer.
    /// Re-registering replaces both the handle and the heartbeat.
    pub fn register(&mut self, responder: ResponderHandle) {
        if let Some(heartbeat) = self.keepalive.take() {
            heartbeat.abort();
        }

        let handle = responder.clone();
        self.keepalive = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
            ticker.tick().await; // the first tick completes immediately
            loop {
                ticker.tick().await;
                if handle.send(Command::Tick).await.is_err() {
                    break;
                }
            }
        }));
        self.responder = Some(responder);
    }

    /// Start a job and return its download locator.
    ///
    /// Sends INITIALIZE with the job metadata and channel endpoints, then
    /// waits up to the handshake bound for the acknowledgment. On success
    /// the returned locator (`<scope>/download-<id>`) is the path to
    /// request for the archive to start streaming.
    ///
    /// The timeout covers only this acknowledgment wait; it does not stop
    /// a job the responder already initialized.
    pub async fn downzip(
        &self,
        id: &str,
        name: &str,
        files: Vec<FileDescriptor>,
        options: JobOptions,
    ) -> Result<String, Error> {
        let responder = self.responder.as_ref().ok_or(Error::NoResponder)?;

        let (ack, acked) = oneshot::channel();
        let (fetch_init_tx, mut fetch_init_rx) = mpsc::channel::<FetchInitRequest>(1);
        let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressEvent>(EVENT_BUFFER);
        let (error_tx, mut error_rx) = mpsc::channel::<ErrorEvent>(EVENT_BUFFER);

        // Relay tasks live until the responder drops its job-side senders.
        // Events are filtered by job id so concurrent jobs never
        // cross-deliver, and drained even with no callback installed.
        let source = options.fetch_init;
        tokio::spawn(async move {
            while let Some(request) = fetch_init_rx.recv().await {
                let init = match &source {
                    Some(source) => source.evaluate().await,
                    None => FetchInit::default(),
                };
                let _ = request.reply.send(init);
            }
        });

        let job_id = id.to_owned();
        let on_progress = options.on_progress;
        tokio::spawn(async move {
            while let Some(event) = progress_rx.recv().await {
                if event.id == job_id {
                    if let Some(callback) = &on_progress {
                        callback(event);
                    }
                }
            }
        });

        let job_id = id.to_owned();
        let on_error = options.on_error;
        tokio::spawn(async move {
            while let Some(event) = error_rx.recv().await {
                if event.id == job_id {
                    if let Some(callback) = &on_error {
                        callback(event);
                    }
                }
            }
        });

        responder
            .send(Command::Initialize {
                id: id.to_owned(),
                name: name.to_owned(),
                files,
                channels: JobChannels {
                    fetch_init: fetch_init_tx,
                    progress: progress_tx,
                    error: error_tx,
                },
                ack,
            })
            .await?;

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, acked).await {
            Ok(Ok(result)) => result.map(|()| format!("{SCOPE}/download-{id}")),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => Err(Error::HandshakeTimeout),
        }
    }
}

impl Default for ZipClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ZipClient {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.keepalive.take() {
            heartbeat.abort();
        }
    }
}
