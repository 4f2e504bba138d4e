//! Incremental ZIP encoder.
//!
//! [`ZipBuilder`] produces a STORED (uncompressed) archive one record at
//! a time, while the data for each entry arrives in arbitrarily-sized
//! chunks. Sizes and checksums are unknown when an entry's header goes
//! out, so every entry is written in streaming form: a local file header
//! announcing a trailing descriptor, the data verbatim, then the
//! descriptor with the real CRC and sizes. The central directory and
//! terminal records follow at [`finish`](ZipBuilder::finish).
//!
//! Output leaves through a bounded channel as it is produced; the builder
//! holds no history, so its memory use is independent of archive size.

use bytes::Bytes;
use flate2::Crc;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::sync::mpsc;

use crate::error::Error;

use super::structures::*;

/// Chunks buffered between the builder and a slow consumer.
const OUTPUT_BUFFER_CHUNKS: usize = 16;

/// The entry currently receiving data.
struct OpenEntry {
    name: String,
    crc: Crc,
    bytes: u64,
    header_offset: u64,
}

/// Streaming ZIP writer.
///
/// The format variant (base or ZIP64) is fixed at construction and every
/// record written afterwards matches it. Exactly one entry can be open at
/// a time; the offset of every record is tracked so the central directory
/// can point back at each header.
pub struct ZipBuilder {
    zip64: bool,
    output: Option<mpsc::Sender<Bytes>>,
    offset: u64,
    entries: Vec<CentralDirectoryEntry>,
    open: Option<OpenEntry>,
    finished: bool,
    canceled: bool,
    mod_time: u16,
    mod_date: u16,
}

impl ZipBuilder {
    /// Create a builder and the single consumer of its output.
    ///
    /// `zip64` selects the format variant; see
    /// [`needs_zip64`](super::needs_zip64). Entry timestamps are captured
    /// once, here.
    pub fn new(zip64: bool) -> (Self, ZipOutput) {
        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER_CHUNKS);
        let (mod_date, mod_time) = dos_date_time(SystemTime::now());

        let builder = Self {
            zip64,
            output: Some(tx),
            offset: 0,
            entries: Vec::new(),
            open: None,
            finished: false,
            canceled: false,
            mod_time,
            mod_date,
        };
        (builder, ZipOutput { rx })
    }

    /// Whether this archive is being written with ZIP64 structures.
    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    /// Whether the archive was canceled before completion.
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Open a new entry and emit its local file header.
    pub async fn start_entry(&mut self, name: &str) -> Result<(), Error> {
        if self.canceled {
            return Err(Error::Canceled);
        }
        if self.finished {
            return Err(Error::AlreadyFinished);
        }
        if self.open.is_some() {
            return Err(Error::EntryAlreadyOpen);
        }

        let header_offset = self.offset;
        let mut buf = Vec::new();
        LocalFileHeader {
            name,
            mod_time: self.mod_time,
            mod_date: self.mod_date,
            zip64: self.zip64,
        }
        .write_to(&mut buf)?;
        self.send(buf).await?;

        self.open = Some(OpenEntry {
            name: name.to_owned(),
            crc: Crc::new(),
            bytes: 0,
            header_offset,
        });
        Ok(())
    }

    /// Feed a chunk of the open entry's data through to the output.
    ///
    /// The chunk is forwarded verbatim (entries are STORED); only the
    /// running CRC and byte count are updated. Empty chunks are a no-op.
    /// Suspends while the output buffer is full.
    pub async fn append(&mut self, chunk: Bytes) -> Result<(), Error> {
        if self.canceled {
            return Err(Error::Canceled);
        }
        let Some(entry) = self.open.as_mut() else {
            return Err(Error::NoOpenEntry);
        };
        if chunk.is_empty() {
            return Ok(());
        }

        entry.crc.update(&chunk);
        entry.bytes += chunk.len() as u64;
        self.send_chunk(chunk).await
    }

    /// Close the open entry: emit its data descriptor and record it for
    /// the central directory.
    pub async fn end_entry(&mut self) -> Result<(), Error> {
        if self.canceled {
            return Err(Error::Canceled);
        }
        let Some(entry) = self.open.take() else {
            return Err(Error::NoOpenEntry);
        };

        let mut buf = Vec::new();
        DataDescriptor {
            crc32: entry.crc.sum(),
            compressed_size: entry.bytes,
            uncompressed_size: entry.bytes,
            zip64: self.zip64,
        }
        .write_to(&mut buf)?;
        self.send(buf).await?;

        self.entries.push(CentralDirectoryEntry {
            name: entry.name,
            crc32: entry.crc.sum(),
            compressed_size: entry.bytes,
            uncompressed_size: entry.bytes,
            header_offset: entry.header_offset,
            mod_time: self.mod_time,
            mod_date: self.mod_date,
        });
        Ok(())
    }

    /// Write the central directory and terminal records, then close the
    /// output stream.
    ///
    /// Callable once, and only with no entry open. In ZIP64 mode the
    /// ZIP64 EOCD and its locator precede the EOCD.
    pub async fn finish(&mut self) -> Result<(), Error> {
        if self.canceled {
            return Err(Error::Canceled);
        }
        if self.open.is_some() {
            return Err(Error::EntryAlreadyOpen);
        }
        if self.finished {
            return Err(Error::AlreadyFinished);
        }

        let cd_offset = self.offset;
        let mut buf = Vec::new();
        for entry in &self.entries {
            entry.write_to(&mut buf, self.zip64)?;
        }
        let cd_size = buf.len() as u64;
        let total_entries = self.entries.len() as u64;

        if self.zip64 {
            Zip64EOCD {
                total_entries,
                cd_size,
                cd_offset,
            }
            .write_to(&mut buf)?;
            Zip64EOCDLocator {
                eocd64_offset: cd_offset + cd_size,
            }
            .write_to(&mut buf)?;
        }
        EndOfCentralDirectory {
            total_entries,
            cd_size,
            cd_offset,
            zip64: self.zip64,
        }
        .write_to(&mut buf)?;
        self.send(buf).await?;

        self.finished = true;
        self.output = None;
        Ok(())
    }

    /// Abort output production.
    ///
    /// Idempotent: the flag is set once and further calls do nothing.
    /// The consumer observes end-of-stream without a terminal record,
    /// which is the signal that the archive is incomplete.
    pub fn cancel(&mut self) {
        if self.canceled {
            return;
        }
        self.canceled = true;
        self.output = None;
    }

    async fn send(&mut self, buf: Vec<u8>) -> Result<(), Error> {
        if buf.is_empty() {
            return Ok(());
        }
        self.send_chunk(Bytes::from(buf)).await
    }

    async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), Error> {
        let len = chunk.len() as u64;
        let Some(tx) = &self.output else {
            return Err(Error::Canceled);
        };
        if tx.send(chunk).await.is_err() {
            // Consumer dropped the output: the archive can never complete.
            self.cancel();
            return Err(Error::Canceled);
        }
        self.offset += len;
        Ok(())
    }
}

/// The builder's output: a forward-only sequence of archive bytes.
///
/// There is exactly one per builder. Dropping it aborts the archive; the
/// next append observes the cancellation.
pub struct ZipOutput {
    rx: mpsc::Receiver<Bytes>,
}

impl ZipOutput {
    /// Receive the next chunk of archive bytes, or `None` at end of
    /// stream.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl futures::Stream for ZipOutput {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}
