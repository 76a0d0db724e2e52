//! Bounds applied while reading untrusted uploads.

use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    /// Compressed upload size.
    pub max_archive_bytes: u64,
    /// Total decompressed size.
    pub max_decode_bytes: u64,
    /// Declared size of any single entry.
    pub max_entry_bytes: u64,
    pub max_entries: usize,
    pub max_path_len: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_archive_bytes: 50 * 1024 * 1024, // 50 MB compressed
            max_decode_bytes: 512 * 1024 * 1024, // 512 MB uncompressed
            max_entry_bytes: 64 * 1024 * 1024,
            max_entries: 20_000,
            max_path_len: 256,
        }
    }
}

/// Fails the read once more than `limit` bytes have passed through.
pub(crate) struct LimitReader<R> {
    inner: R,
    limit: u64,
    read: u64,
    tag: &'static str,
}

impl<R: Read> LimitReader<R> {
    pub(crate) fn new(inner: R, limit: u64, tag: &'static str) -> Self {
        Self {
            inner,
            limit,
            read: 0,
            tag,
        }
    }
}

impl<R: Read> Read for LimitReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.read >= self.limit {
            // an input of exactly `limit` bytes still passes
            let mut extra = [0u8; 1];
            return match self.inner.read(&mut extra)? {
                0 => Ok(0),
                _ => Err(std::io::Error::other(format!(
                    "{}: exceeded limit of {} bytes",
                    self.tag, self.limit
                ))),
            };
        }
        let max = (self.limit - self.read).min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max])?;
        self.read += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_limit_passes_one_more_byte_fails() {
        let mut out = Vec::new();
        LimitReader::new(&b"abcd"[..], 4, "T")
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"abcd");

        let err = LimitReader::new(&b"abcde"[..], 4, "LimitTest")
            .read_to_end(&mut Vec::new())
            .unwrap_err();
        assert!(err.to_string().contains("LimitTest"));
    }
}
