//! Shared test support: a minimal ZIP reader for round-trip checks and
//! an in-memory transport for protocol tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};

use streamzip::{FetchBody, FetchInit, FetchResponse, Transport, ZipOutput};

pub struct ParsedEntry {
    pub name: String,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub data: Vec<u8>,
}

pub struct ParsedArchive {
    pub zip64: bool,
    pub entries: Vec<ParsedEntry>,
}

/// Parse a complete archive produced by the builder.
///
/// Walks the structures the way an extractor would: EOCD from the end,
/// the ZIP64 chain when its sentinels are present, then every central
/// directory entry back to its local header and data. Errors on any
/// missing or malformed record, so a canceled (truncated) archive fails
/// here by design.
pub fn parse_archive(data: &[u8]) -> Result<ParsedArchive> {
    // The builder writes no archive comment, so the EOCD is the tail.
    if data.len() < 22 {
        bail!("too short for an end of central directory record");
    }
    let eocd_offset = data.len() - 22;
    if &data[eocd_offset..eocd_offset + 4] != b"PK\x05\x06" {
        bail!("missing end of central directory record");
    }

    let mut cursor = Cursor::new(&data[eocd_offset + 4..]);
    let _disk_number = cursor.read_u16::<LittleEndian>()?;
    let _disk_with_cd = cursor.read_u16::<LittleEndian>()?;
    let _disk_entries = cursor.read_u16::<LittleEndian>()?;
    let total_entries = cursor.read_u16::<LittleEndian>()?;
    let cd_size = cursor.read_u32::<LittleEndian>()?;
    let cd_offset = cursor.read_u32::<LittleEndian>()?;

    let zip64 =
        total_entries == 0xFFFF || cd_size == 0xFFFF_FFFF || cd_offset == 0xFFFF_FFFF;

    let (total_entries, cd_offset) = if zip64 {
        read_zip64_chain(data, eocd_offset)?
    } else {
        (total_entries as u64, cd_offset as u64)
    };

    let mut entries = Vec::with_capacity(total_entries as usize);
    let mut cursor = Cursor::new(&data[cd_offset as usize..]);
    for _ in 0..total_entries {
        entries.push(parse_cdfh(data, &mut cursor)?);
    }

    Ok(ParsedArchive { zip64, entries })
}

/// Follow the ZIP64 EOCD locator to the ZIP64 EOCD and read the real
/// entry count and central directory offset.
fn read_zip64_chain(data: &[u8], eocd_offset: usize) -> Result<(u64, u64)> {
    let Some(locator_offset) = eocd_offset.checked_sub(20) else {
        bail!("no room for a ZIP64 EOCD locator");
    };
    if &data[locator_offset..locator_offset + 4] != b"PK\x06\x07" {
        bail!("missing ZIP64 EOCD locator");
    }
    let mut cursor = Cursor::new(&data[locator_offset + 4..]);
    let _disk_with_eocd64 = cursor.read_u32::<LittleEndian>()?;
    let eocd64_offset = cursor.read_u64::<LittleEndian>()? as usize;

    if &data[eocd64_offset..eocd64_offset + 4] != b"PK\x06\x06" {
        bail!("missing ZIP64 EOCD");
    }
    // Skip record size, versions, and disk fields.
    let mut cursor = Cursor::new(&data[eocd64_offset + 24..]);
    let _disk_entries = cursor.read_u64::<LittleEndian>()?;
    let total_entries = cursor.read_u64::<LittleEndian>()?;
    let _cd_size = cursor.read_u64::<LittleEndian>()?;
    let cd_offset = cursor.read_u64::<LittleEndian>()?;
    Ok((total_entries, cd_offset))
}

fn parse_cdfh(archive: &[u8], cursor: &mut Cursor<&[u8]>) -> Result<ParsedEntry> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != *b"PK\x01\x02" {
        bail!("invalid central directory file header");
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let method = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let name_len = cursor.read_u16::<LittleEndian>()?;
    let extra_len = cursor.read_u16::<LittleEndian>()?;
    let comment_len = cursor.read_u16::<LittleEndian>()?;
    let _disk_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    if method != 0 {
        bail!("expected a STORED entry, found method {method}");
    }
    if flags & (1 << 3) == 0 {
        bail!("expected the data descriptor flag to be set");
    }

    let mut name_bytes = vec![0u8; name_len as usize];
    cursor.read_exact(&mut name_bytes)?;
    let name = String::from_utf8(name_bytes)?;

    // ZIP64 extended information overrides the 32-bit sentinels.
    let extra_end = cursor.position() + extra_len as u64;
    while cursor.position() + 4 <= extra_end {
        let header_id = cursor.read_u16::<LittleEndian>()?;
        let field_size = cursor.read_u16::<LittleEndian>()?;
        if header_id == 0x0001 {
            if uncompressed_size == 0xFFFF_FFFF {
                uncompressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFF_FFFF {
                compressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if lfh_offset == 0xFFFF_FFFF {
                lfh_offset = cursor.read_u64::<LittleEndian>()?;
            }
            let remaining = extra_end.saturating_sub(cursor.position());
            cursor.set_position(cursor.position() + remaining);
        } else {
            cursor.set_position(cursor.position() + field_size as u64);
        }
    }
    cursor.set_position(extra_end + comment_len as u64);

    // Resolve the entry's data through its local file header.
    let lfh_offset = lfh_offset as usize;
    if &archive[lfh_offset..lfh_offset + 4] != b"PK\x03\x04" {
        bail!("invalid local file header for {name}");
    }
    let lfh_name_len =
        u16::from_le_bytes([archive[lfh_offset + 26], archive[lfh_offset + 27]]) as usize;
    let lfh_extra_len =
        u16::from_le_bytes([archive[lfh_offset + 28], archive[lfh_offset + 29]]) as usize;

    let data_start = lfh_offset + 30 + lfh_name_len + lfh_extra_len;
    let data_end = data_start + compressed_size as usize;
    if data_end + 4 > archive.len() || &archive[data_end..data_end + 4] != b"PK\x07\x08" {
        bail!("missing data descriptor after {name}");
    }

    Ok(ParsedEntry {
        name,
        crc32,
        compressed_size,
        uncompressed_size,
        data: archive[data_start..data_end].to_vec(),
    })
}

/// Drain a builder's output into one buffer.
pub async fn collect_output(mut output: ZipOutput) -> Vec<u8> {
    let mut buf = Vec::new();
    while let Some(chunk) = output.recv().await {
        buf.extend_from_slice(&chunk);
    }
    buf
}

/// Scripted response for one URL.
pub enum MockFile {
    /// 200 with the body delivered in exactly these chunks.
    Data(Vec<Vec<u8>>),
    /// A response with this status and an empty body.
    Status(u16),
    /// A transport-level failure before any response exists.
    Error(&'static str),
}

/// In-memory [`Transport`] serving scripted files and recording the
/// fetch init used for every request.
pub struct MockTransport {
    files: HashMap<String, MockFile>,
    seen_inits: Arc<Mutex<Vec<FetchInit>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            seen_inits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_file(mut self, url: &str, file: MockFile) -> Self {
        self.files.insert(url.to_owned(), file);
        self
    }

    /// Handle onto the recorded inits, usable after the transport moves
    /// into a responder.
    pub fn seen_inits(&self) -> Arc<Mutex<Vec<FetchInit>>> {
        Arc::clone(&self.seen_inits)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, url: &str, init: &FetchInit) -> Result<FetchResponse> {
        self.seen_inits.lock().unwrap().push(init.clone());
        match self.files.get(url) {
            Some(MockFile::Data(chunks)) => Ok(FetchResponse {
                status: 200,
                body: Box::new(MockBody {
                    chunks: chunks.iter().map(|c| Bytes::from(c.clone())).collect(),
                }),
            }),
            Some(MockFile::Status(status)) => Ok(FetchResponse {
                status: *status,
                body: Box::new(MockBody {
                    chunks: VecDeque::new(),
                }),
            }),
            Some(MockFile::Error(message)) => bail!("{message}"),
            None => bail!("no mock registered for {url}"),
        }
    }
}

struct MockBody {
    chunks: VecDeque<Bytes>,
}

#[async_trait]
impl FetchBody for MockBody {
    async fn chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.chunks.pop_front())
    }
}
