use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// ZIP version needed for a streamed entry (2.0: data descriptors).
pub const VERSION_DEFAULT: u16 = 20;
/// ZIP version needed when ZIP64 structures are in play (4.5).
pub const VERSION_ZIP64: u16 = 45;

/// General purpose flag bit 3: sizes and CRC follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General purpose flag bit 11: the file name is UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

/// Compression method: STORED (no compression).
pub const METHOD_STORED: u16 = 0;

/// Sentinel marking a 16-bit field continued in ZIP64 structures.
pub const ZIP64_SENTINEL_U16: u16 = 0xFFFF;
/// Sentinel marking a 32-bit field continued in ZIP64 structures.
pub const ZIP64_SENTINEL_U32: u32 = 0xFFFF_FFFF;

/// Extra field id for the ZIP64 extended information block.
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Local File Header (LFH) - 30 bytes plus name and extra field
///
/// Written before an entry's data, when its sizes and CRC are still
/// unknown: the CRC and size fields are zeroed (or set to the ZIP64
/// sentinel) and the real values follow in a [`DataDescriptor`].
pub struct LocalFileHeader<'a> {
    pub name: &'a str,
    pub mod_time: u16,
    pub mod_date: u16,
    pub zip64: bool,
}

impl LocalFileHeader<'_> {
    pub const SIGNATURE: &'static [u8] = b"PK\x03\x04";

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let version = if self.zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT };
        let size_sentinel = if self.zip64 { ZIP64_SENTINEL_U32 } else { 0 };

        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(version)?;
        w.write_u16::<LittleEndian>(FLAG_DATA_DESCRIPTOR | FLAG_UTF8)?;
        w.write_u16::<LittleEndian>(METHOD_STORED)?;
        w.write_u16::<LittleEndian>(self.mod_time)?;
        w.write_u16::<LittleEndian>(self.mod_date)?;
        w.write_u32::<LittleEndian>(0)?; // crc32, in the descriptor
        w.write_u32::<LittleEndian>(size_sentinel)?;
        w.write_u32::<LittleEndian>(size_sentinel)?;
        w.write_u16::<LittleEndian>(self.name.len() as u16)?;
        w.write_u16::<LittleEndian>(if self.zip64 { 20 } else { 0 })?;
        w.write_all(self.name.as_bytes())?;

        if self.zip64 {
            // Placeholder ZIP64 extra field; real sizes land in the
            // descriptor and the central directory.
            w.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
            w.write_u16::<LittleEndian>(16)?;
            w.write_u64::<LittleEndian>(0)?;
            w.write_u64::<LittleEndian>(0)?;
        }

        Ok(())
    }
}

/// Data descriptor - trails an entry's data with its CRC and sizes
///
/// Size fields are 32-bit in the base format and 64-bit in ZIP64 mode.
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub zip64: bool,
}

impl DataDescriptor {
    pub const SIGNATURE: &'static [u8] = b"PK\x07\x08";

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u32::<LittleEndian>(self.crc32)?;

        if self.zip64 {
            w.write_u64::<LittleEndian>(self.compressed_size)?;
            w.write_u64::<LittleEndian>(self.uncompressed_size)?;
        } else {
            w.write_u32::<LittleEndian>(self.compressed_size as u32)?;
            w.write_u32::<LittleEndian>(self.uncompressed_size as u32)?;
        }

        Ok(())
    }
}

/// Central Directory File Header (CDFH) - 46 bytes plus name and extra field
///
/// One is recorded per closed entry and written out at finish time. In
/// ZIP64 mode the 32-bit size and offset fields carry sentinels and the
/// real values go into the ZIP64 extra field.
#[derive(Debug, Clone)]
pub struct CentralDirectoryEntry {
    pub name: String,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub header_offset: u64,
    pub mod_time: u16,
    pub mod_date: u16,
}

impl CentralDirectoryEntry {
    pub const SIGNATURE: &'static [u8] = b"PK\x01\x02";

    pub fn write_to<W: Write>(&self, w: &mut W, zip64: bool) -> io::Result<()> {
        let version = if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT };

        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(version)?; // version made by
        w.write_u16::<LittleEndian>(version)?; // version needed
        w.write_u16::<LittleEndian>(FLAG_DATA_DESCRIPTOR | FLAG_UTF8)?;
        w.write_u16::<LittleEndian>(METHOD_STORED)?;
        w.write_u16::<LittleEndian>(self.mod_time)?;
        w.write_u16::<LittleEndian>(self.mod_date)?;
        w.write_u32::<LittleEndian>(self.crc32)?;

        if zip64 {
            w.write_u32::<LittleEndian>(ZIP64_SENTINEL_U32)?;
            w.write_u32::<LittleEndian>(ZIP64_SENTINEL_U32)?;
        } else {
            w.write_u32::<LittleEndian>(self.compressed_size as u32)?;
            w.write_u32::<LittleEndian>(self.uncompressed_size as u32)?;
        }

        w.write_u16::<LittleEndian>(self.name.len() as u16)?;
        w.write_u16::<LittleEndian>(if zip64 { 28 } else { 0 })?; // extra field length
        w.write_u16::<LittleEndian>(0)?; // file comment length
        w.write_u16::<LittleEndian>(0)?; // disk number start
        w.write_u16::<LittleEndian>(0)?; // internal attributes
        w.write_u32::<LittleEndian>(0)?; // external attributes

        if zip64 {
            w.write_u32::<LittleEndian>(ZIP64_SENTINEL_U32)?;
        } else {
            w.write_u32::<LittleEndian>(self.header_offset as u32)?;
        }

        w.write_all(self.name.as_bytes())?;

        if zip64 {
            // ZIP64 extended information: uncompressed, compressed, offset
            w.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
            w.write_u16::<LittleEndian>(24)?;
            w.write_u64::<LittleEndian>(self.uncompressed_size)?;
            w.write_u64::<LittleEndian>(self.compressed_size)?;
            w.write_u64::<LittleEndian>(self.header_offset)?;
        }

        Ok(())
    }
}

/// ZIP64 End of Central Directory - 56 bytes
pub struct Zip64EOCD {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u64::<LittleEndian>(44)?; // record size, excluding signature and this field
        w.write_u16::<LittleEndian>(VERSION_ZIP64)?;
        w.write_u16::<LittleEndian>(VERSION_ZIP64)?;
        w.write_u32::<LittleEndian>(0)?; // disk number
        w.write_u32::<LittleEndian>(0)?; // disk with central directory
        w.write_u64::<LittleEndian>(self.total_entries)?;
        w.write_u64::<LittleEndian>(self.total_entries)?;
        w.write_u64::<LittleEndian>(self.cd_size)?;
        w.write_u64::<LittleEndian>(self.cd_offset)?;
        Ok(())
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub eocd64_offset: u64,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u32::<LittleEndian>(0)?; // disk with the ZIP64 EOCD
        w.write_u64::<LittleEndian>(self.eocd64_offset)?;
        w.write_u32::<LittleEndian>(1)?; // total disks
        Ok(())
    }
}

/// End of Central Directory (EOCD) - 22 bytes
///
/// The terminal record of every archive. In ZIP64 mode its narrow fields
/// carry sentinels pointing readers at the ZIP64 EOCD instead.
pub struct EndOfCentralDirectory {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    pub zip64: bool,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(0)?; // disk number
        w.write_u16::<LittleEndian>(0)?; // disk with central directory

        if self.zip64 {
            w.write_u16::<LittleEndian>(ZIP64_SENTINEL_U16)?;
            w.write_u16::<LittleEndian>(ZIP64_SENTINEL_U16)?;
            w.write_u32::<LittleEndian>(ZIP64_SENTINEL_U32)?;
            w.write_u32::<LittleEndian>(ZIP64_SENTINEL_U32)?;
        } else {
            w.write_u16::<LittleEndian>(self.total_entries as u16)?;
            w.write_u16::<LittleEndian>(self.total_entries as u16)?;
            w.write_u32::<LittleEndian>(self.cd_size as u32)?;
            w.write_u32::<LittleEndian>(self.cd_offset as u32)?;
        }

        w.write_u16::<LittleEndian>(0)?; // comment length
        Ok(())
    }
}

/// Encode a timestamp as DOS (date, time) fields.
///
/// DOS dates start at 1980 and run out in 2107; out-of-range timestamps
/// clamp to the nearest representable year. Seconds have 2s granularity.
pub fn dos_date_time(t: SystemTime) -> (u16, u16) {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    let year = year.clamp(1980, 2107);

    let second_of_day = secs % 86_400;
    let hour = second_of_day / 3600;
    let minute = (second_of_day % 3600) / 60;
    let second = second_of_day % 60;

    let date = (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16;
    let time = ((hour as u16) << 11) | ((minute as u16) << 5) | (second as u16 / 2);
    (date, time)
}

/// Convert days since the Unix epoch to a (year, month, day) civil date.
fn civil_from_days(z: i64) -> (i64, u8, u8) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn dos_fields_for_known_instant() {
        // 2024-03-15 12:34:56 UTC
        let (date, time) = dos_date_time(at(1_710_506_096));
        assert_eq!(date >> 9, 2024 - 1980);
        assert_eq!((date >> 5) & 0x0F, 3);
        assert_eq!(date & 0x1F, 15);
        assert_eq!(time >> 11, 12);
        assert_eq!((time >> 5) & 0x3F, 34);
        assert_eq!((time & 0x1F) * 2, 56);
    }

    #[test]
    fn pre_dos_epoch_clamps_to_1980() {
        let (date, _) = dos_date_time(UNIX_EPOCH);
        assert_eq!(date >> 9, 0);
    }

    #[test]
    fn record_sizes_match_the_format() {
        let mut buf = Vec::new();
        LocalFileHeader {
            name: "a.txt",
            mod_time: 0,
            mod_date: 0,
            zip64: false,
        }
        .write_to(&mut buf)
        .unwrap();
        assert_eq!(buf.len(), 30 + 5);
        assert_eq!(&buf[0..4], LocalFileHeader::SIGNATURE);

        buf.clear();
        EndOfCentralDirectory {
            total_entries: 1,
            cd_size: 46,
            cd_offset: 100,
            zip64: false,
        }
        .write_to(&mut buf)
        .unwrap();
        assert_eq!(buf.len(), 22);

        buf.clear();
        Zip64EOCD {
            total_entries: 1,
            cd_size: 46,
            cd_offset: 100,
        }
        .write_to(&mut buf)
        .unwrap();
        assert_eq!(buf.len(), 56);

        buf.clear();
        Zip64EOCDLocator { eocd64_offset: 0 }.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 20);
    }
}
