//! The responder: the background half of the protocol.
//!
//! A responder is a spawned task owning the job registry. It consumes
//! [`Command`]s from its handle, answers intercepted `download-<id>`
//! requests with a streaming response, and drives each job's downloads
//! into its archive builder sequentially.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use crate::error::Error;
use crate::io::{FetchInit, Transport};
use crate::job::{FileDescriptor, Job, JobRegistry};
use crate::message::{Command, ErrorEvent, FetchInitRequest, JobChannels, ProgressEvent};
use crate::zip::{estimated_size, needs_zip64, ZipBuilder, ZipOutput};

/// Commands buffered toward the responder task.
const COMMAND_BUFFER: usize = 32;

/// Final path segment prefix marking an intercepted download request.
const DOWNLOAD_PREFIX: &str = "download-";

const CONTENT_TYPE: &str = "application/octet-stream; charset=utf-8";

/// Cloneable handle to a spawned responder.
#[derive(Clone)]
pub struct ResponderHandle {
    commands: mpsc::Sender<Command>,
}

impl ResponderHandle {
    pub(crate) fn from_sender(commands: mpsc::Sender<Command>) -> Self {
        Self { commands }
    }

    pub(crate) async fn send(&self, command: Command) -> Result<(), Error> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Offer an intercepted request to the responder.
    ///
    /// Returns a streaming response when the path's final segment is
    /// `download-<id>` for an initialized job; `None` for unknown ids and
    /// non-download paths. Replying starts the job's download loop.
    pub async fn intercept(&self, path: &str) -> Result<Option<StreamingResponse>, Error> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Intercept {
            path: path.to_owned(),
            reply,
        })
        .await?;
        response.await.map_err(|_| Error::ChannelClosed)
    }
}

/// Reply to an intercepted download request.
///
/// Produced before any fetch starts; the body then fills with archive
/// bytes as the downloads arrive.
pub struct StreamingResponse {
    /// `Content-Type` header value.
    pub content_type: String,
    /// `Content-Disposition` header value naming the archive.
    pub content_disposition: String,
    /// Declared length. Always `None`: the size estimate undershoots the
    /// real archive (headers, descriptors, directory), and a short
    /// declared length makes strict consumers truncate the tail, so the
    /// transfer stays open-ended.
    pub content_length: Option<u128>,
    /// The archive bytes, produced as the downloads arrive.
    pub body: ZipOutput,
}

/// Background task answering commands and driving archive jobs.
pub struct ZipResponder<T: Transport> {
    transport: Arc<T>,
    commands: mpsc::Receiver<Command>,
    registry: JobRegistry,
}

impl<T: Transport + 'static> ZipResponder<T> {
    /// Spawn a responder over the given transport and return its handle.
    pub fn spawn(transport: T) -> ResponderHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let responder = Self {
            transport: Arc::new(transport),
            commands: rx,
            registry: JobRegistry::default(),
        };
        tokio::spawn(responder.run());
        ResponderHandle::from_sender(tx)
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Initialize {
                    id,
                    name,
                    files,
                    channels,
                    ack,
                } => {
                    debug!(%id, files = files.len(), "initialize called");
                    let result = self.initialize(id, name, files, channels);
                    let _ = ack.send(result);
                }
                Command::Tick => trace!("tock"),
                Command::Intercept { path, reply } => self.intercept(&path, reply),
            }
        }
    }

    fn initialize(
        &mut self,
        id: String,
        name: String,
        files: Vec<FileDescriptor>,
        channels: JobChannels,
    ) -> Result<(), Error> {
        if files.is_empty() {
            return Err(Error::EmptyFileList);
        }

        let size_estimate = estimated_size(&files);
        let zip64 = needs_zip64(&files);
        debug!(%id, size_estimate = %size_estimate, zip64, "total estimated file size");

        let (builder, output) = ZipBuilder::new(zip64);
        self.registry.create(Job {
            id,
            name,
            files,
            builder,
            output,
            size_estimate,
            channels,
        })
    }

    fn intercept(&mut self, path: &str, reply: oneshot::Sender<Option<StreamingResponse>>) {
        let last_segment = path.rsplit('/').next().unwrap_or(path);
        let Some(id) = last_segment.strip_prefix(DOWNLOAD_PREFIX) else {
            debug!(%path, "intercept for a non-download path, doing nothing");
            let _ = reply.send(None);
            return;
        };
        debug!(%id, "intercept called for download id");

        let Some(job) = self.registry.take(id) else {
            error!(%id, "no archive initialized for id");
            let _ = reply.send(None);
            return;
        };
        let Job {
            id,
            name,
            files,
            builder,
            output,
            size_estimate,
            channels,
        } = job;

        let response = StreamingResponse {
            content_type: CONTENT_TYPE.to_owned(),
            content_disposition: format!("attachment; filename=\"{name}.zip\""),
            content_length: None,
            body: output,
        };
        if reply.send(Some(response)).is_err() {
            // Requester went away before streaming began; the job is
            // consumed either way.
            debug!(%id, "intercept reply dropped, discarding job");
            return;
        }

        let mut drive = Drive {
            transport: Arc::clone(&self.transport),
            id,
            files,
            builder,
            channels,
            total_bytes: size_estimate,
            current_file: String::new(),
            file_bytes: 0,
            fileset_bytes: 0,
        };
        tokio::spawn(async move { drive.run().await });
    }
}

/// Per-job download loop, running in its own task once streaming starts.
struct Drive<T: Transport> {
    transport: Arc<T>,
    id: String,
    files: Vec<FileDescriptor>,
    builder: ZipBuilder,
    channels: JobChannels,
    total_bytes: u128,
    current_file: String,
    file_bytes: u64,
    fileset_bytes: u64,
}

impl<T: Transport> Drive<T> {
    async fn run(&mut self) {
        self.current_file = self
            .files
            .first()
            .map(|f| f.name.clone())
            .unwrap_or_default();
        self.report_progress(false).await;

        if let Err(err) = self.stream_files().await {
            // The consumer dropping the output cancels the builder from
            // inside append; only failures it has not seen are reported.
            let already_canceled = self.builder.is_canceled();
            self.builder.cancel();
            if !already_canceled {
                self.report_error(err.to_string()).await;
            }
            error!(id = %self.id, %err, "error while piping data into the archive");
        }

        // Every exit path ends with a terminal progress event.
        self.report_progress(true).await;
        debug!(id = %self.id, "done with this archive");
    }

    /// Fetch and append each file in list order, then finalize.
    ///
    /// A failure *status* on a file is reported and leaves that entry
    /// empty, and the loop moves on: the remaining files still produce a
    /// valid archive. A transport or builder failure aborts the job; the
    /// in-flight body is dropped with the loop.
    async fn stream_files(&mut self) -> anyhow::Result<()> {
        for index in 0..self.files.len() {
            let file = self.files[index].clone();
            self.current_file = file.name.clone();
            self.file_bytes = 0;

            self.builder.start_entry(&file.name).await?;

            let init = self.negotiate_fetch_init(&file).await?;
            let response = self.transport.fetch(&file.download_url, &init).await?;

            if response.ok() {
                let mut body = response.body;
                while let Some(chunk) = body.chunk().await? {
                    self.file_bytes += chunk.len() as u64;
                    self.fileset_bytes += chunk.len() as u64;
                    self.builder.append(chunk).await?;
                    self.report_progress(false).await;
                }
            } else {
                self.report_error(format!(
                    "HTTP status {} for {}",
                    response.status, file.download_url
                ))
                .await;
            }

            self.builder.end_entry().await?;
        }

        self.builder.finish().await?;
        Ok(())
    }

    /// Ask the client for the fetch init to use right now, then overlay
    /// the file's own init on top.
    async fn negotiate_fetch_init(&self, file: &FileDescriptor) -> Result<FetchInit, Error> {
        let (reply, response) = oneshot::channel();
        self.channels
            .fetch_init
            .send(FetchInitRequest { reply })
            .await
            .map_err(|_| Error::ChannelClosed)?;
        let base = response.await.map_err(|_| Error::ChannelClosed)?;
        Ok(base.merge(file.fetch_init.as_ref()))
    }

    async fn report_progress(&self, done: bool) {
        let _ = self
            .channels
            .progress
            .send(ProgressEvent {
                id: self.id.clone(),
                file: self.current_file.clone(),
                file_bytes: self.file_bytes,
                fileset_bytes: self.fileset_bytes,
                total_bytes: self.total_bytes,
                done,
            })
            .await;
    }

    async fn report_error(&self, error: String) {
        let _ = self
            .channels
            .error
            .send(ErrorEvent {
                id: self.id.clone(),
                file: self.current_file.clone(),
                error,
            })
            .await;
    }
}
