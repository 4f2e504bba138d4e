//! Job state: what to download, and the archive being built from it.

use std::collections::HashMap;

use crate::error::Error;
use crate::io::FetchInit;
use crate::message::JobChannels;
use crate::zip::{ZipBuilder, ZipOutput};

/// One file to be fetched into the archive.
///
/// `size` is the declared size in bytes. It is advisory: it feeds the
/// size estimate and progress totals, but the archive records the byte
/// counts actually streamed.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    /// Entry name inside the archive.
    pub name: String,
    /// Where to fetch the file from.
    pub download_url: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Per-file fetch options, overlaid on the job-level init.
    pub fetch_init: Option<FetchInit>,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, download_url: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
            size,
            fetch_init: None,
        }
    }

    /// Attach fetch options for this file only.
    pub fn with_fetch_init(mut self, init: FetchInit) -> Self {
        self.fetch_init = Some(init);
        self
    }
}

/// A registered download job, owned by the responder until its archive
/// starts streaming.
pub(crate) struct Job {
    pub id: String,
    pub name: String,
    pub files: Vec<FileDescriptor>,
    pub builder: ZipBuilder,
    pub output: ZipOutput,
    pub size_estimate: u128,
    pub channels: JobChannels,
}

/// The responder's job map.
///
/// Owned by the responder task alone, so plain map operations suffice:
/// a job enters on INITIALIZE and leaves when its download begins, which
/// means each archive streams at most once.
#[derive(Default)]
pub(crate) struct JobRegistry {
    jobs: HashMap<String, Job>,
}

impl JobRegistry {
    pub fn contains(&self, id: &str) -> bool {
        self.jobs.contains_key(id)
    }

    pub fn create(&mut self, job: Job) -> Result<(), Error> {
        if self.jobs.contains_key(&job.id) {
            return Err(Error::DuplicateJob(job.id));
        }
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    pub fn take(&mut self, id: &str) -> Option<Job> {
        self.jobs.remove(id)
    }
}
