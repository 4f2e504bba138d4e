//! Incremental ZIP archive construction.
//!
//! This module builds STORED (uncompressed) ZIP archives as a forward-only
//! byte stream, for use while the contents are still being downloaded.
//!
//! ## Architecture
//!
//! The module is organized into three main components:
//!
//! - [`structures`]: Data structures representing ZIP format elements (local headers, EOCD, etc.)
//! - [`estimate`]: Size estimation and the base-vs-ZIP64 variant decision
//! - [`builder`]: The incremental encoder driving those structures
//!
//! ## Streaming Strategy
//!
//! A ZIP file is normally written with sizes known up front. Here nothing
//! is known until the bytes have streamed through, so every entry uses the
//! format's streaming mode:
//! 1. A local file header flagged "sizes follow" precedes the data
//! 2. The data is forwarded verbatim as it arrives, in any chunking
//! 3. A data descriptor carrying the real CRC and sizes trails the data
//! 4. The central directory and terminal records close out the archive
//!
//! The variant (base or ZIP64) must be fixed before the first header is
//! written, which is why it is chosen from declared sizes alone.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for archives ≥ 4GB or > 65535 entries
//! - STORED (no compression) method, UTF-8 file names
//!
//! ## Limitations
//!
//! - No compression, encryption, or multi-disk archives
//! - No reading or editing of existing archives

mod builder;
mod estimate;
mod structures;

pub use builder::{ZipBuilder, ZipOutput};
pub use estimate::{estimated_size, needs_zip64, MAX_BASE_ENTRIES, ZIP64_THRESHOLD};
pub use structures::*;
