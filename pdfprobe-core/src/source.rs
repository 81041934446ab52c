//! Byte sources
//!
//! Every reader in the crate is generic over [`ByteSource`], so a file on disk
//! and a decompressed object-stream buffer are consumed the same way.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PdfError, Result};

/// Seekable byte provider
pub trait ByteSource: Read + Seek {}

impl<T: Read + Seek> ByteSource for T {}

/// Granularity at which [`fetch`] polls its abort flag
pub const FETCH_CHUNK: usize = 64 * 1024;

/// Cancellation flag shared with the thread that may abort a fetch
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Load a non-seekable reader into memory, polling `abort` between chunks.
///
/// Once the bytes are in memory the parse itself runs to completion; this is
/// the only cancellable step.
pub fn fetch<R: Read>(mut reader: R, abort: &AbortFlag) -> Result<Cursor<Vec<u8>>> {
    let mut data = Vec::new();
    let mut chunk = vec![0u8; FETCH_CHUNK];

    loop {
        if abort.is_aborted() {
            tracing::debug!(bytes = data.len(), "fetch aborted");
            return Err(PdfError::OperationCancelled);
        }
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        data.extend_from_slice(&chunk[..read]);
    }

    Ok(Cursor::new(data))
}

/// Total length of a source; leaves the cursor at the end.
pub fn source_len<R: Seek>(source: &mut R) -> std::io::Result<u64> {
    source.seek(SeekFrom::End(0))
}

/// Last occurrence of `needle` in `haystack`
pub(crate) fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// First occurrence of `needle` in `haystack`
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct SlowReader {
        remaining: usize,
        abort_after: Option<(usize, AbortFlag)>,
        reads: usize,
    }

    impl Read for SlowReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            if let Some((after, flag)) = &self.abort_after {
                if self.reads >= *after {
                    flag.abort();
                }
            }
            let n = buf.len().min(self.remaining).min(1000);
            buf[..n].fill(b'x');
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_fetch_reads_everything() {
        let abort = AbortFlag::new();
        let reader = SlowReader {
            remaining: 5000,
            abort_after: None,
            reads: 0,
        };
        let cursor = fetch(reader, &abort).unwrap();
        assert_eq!(cursor.get_ref().len(), 5000);
    }

    #[test]
    fn test_fetch_honours_abort() {
        let abort = AbortFlag::new();
        let reader = SlowReader {
            remaining: 100_000,
            abort_after: Some((3, abort.clone())),
            reads: 0,
        };
        let result = fetch(reader, &abort);
        assert!(matches!(result, Err(PdfError::OperationCancelled)));
    }

    #[test]
    fn test_fetch_already_aborted() {
        let abort = AbortFlag::new();
        abort.abort();
        let result = fetch(&b"%PDF-1.4"[..], &abort);
        assert!(matches!(result, Err(PdfError::OperationCancelled)));
    }

    #[test]
    fn test_find_and_rfind() {
        let data = b"%%EOF\nabc\n%%EOF\n";
        assert_eq!(find(data, b"%%EOF"), Some(0));
        assert_eq!(rfind(data, b"%%EOF"), Some(10));
        assert_eq!(rfind(data, b"startxref"), None);
        assert_eq!(rfind(b"ab", b"abc"), None);
    }

    #[test]
    fn test_source_len() {
        let mut cursor = Cursor::new(vec![0u8; 17]);
        assert_eq!(source_len(&mut cursor).unwrap(), 17);
    }
}
