//! Size estimation for archive jobs.
//!
//! Declared file sizes decide the format variant before any byte is
//! downloaded: once streaming starts the variant cannot change, so the
//! decision has to be made from the estimate alone.

use crate::job::FileDescriptor;

/// Any total, entry size, or offset at or beyond this needs ZIP64 fields.
pub const ZIP64_THRESHOLD: u128 = 0xFFFF_FFFF;

/// The base format's 16-bit entry count tops out here.
pub const MAX_BASE_ENTRIES: usize = 0xFFFF;

/// Sum of the declared file sizes.
///
/// Declared sizes are advisory (the streamed byte counts are what end up
/// in the archive), but the sum picks the format variant and feeds the
/// progress totals. Order-independent, cannot overflow.
pub fn estimated_size(files: &[FileDescriptor]) -> u128 {
    files.iter().map(|f| f.size as u128).sum()
}

/// Whether the job must be encoded with ZIP64 structures.
///
/// True when the estimated total reaches 4 GiB - 1, when any single
/// declared size does, or when the entry count exceeds what the base
/// format's 16-bit fields can hold.
pub fn needs_zip64(files: &[FileDescriptor]) -> bool {
    files.len() > MAX_BASE_ENTRIES
        || files.iter().any(|f| f.size as u128 >= ZIP64_THRESHOLD)
        || estimated_size(files) >= ZIP64_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(size: u64) -> FileDescriptor {
        FileDescriptor::new("f", "https://example.com/f", size)
    }

    #[test]
    fn sum_is_order_independent() {
        let a = vec![file(10), file(300), file(7)];
        let b = vec![file(7), file(10), file(300)];
        assert_eq!(estimated_size(&a), estimated_size(&b));
        assert_eq!(estimated_size(&a), 317);
    }

    #[test]
    fn variant_flips_exactly_at_the_threshold() {
        let below = vec![file(0xFFFF_FFFE)];
        let at = vec![file(0xFFFF_FFFF)];
        assert!(!needs_zip64(&below));
        assert!(needs_zip64(&at));
    }

    #[test]
    fn total_across_files_forces_zip64() {
        // 3 GiB + 2 GiB: each file fits, the sum does not
        let files = vec![file(3 << 30), file(2 << 30)];
        assert!(needs_zip64(&files));
    }

    #[test]
    fn entry_count_forces_zip64() {
        let files: Vec<_> = (0..MAX_BASE_ENTRIES + 1).map(|_| file(1)).collect();
        assert!(needs_zip64(&files));
        assert!(!needs_zip64(&files[..MAX_BASE_ENTRIES]));
    }

    #[test]
    fn empty_list_estimates_zero() {
        assert_eq!(estimated_size(&[]), 0);
        assert!(!needs_zip64(&[]));
    }
}
