//! PDF Header Parser
//!
//! Locates the `%PDF-x.y` header according to ISO 32000-1 Section 7.5.2

use std::fmt;

use super::{ParseError, ParseResult};
use crate::source::find;

/// Bytes from the start of the file in which the header must appear
pub const HEADER_WINDOW: usize = 1024;

/// PDF Version information
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Versions 1.0 through 1.7 and 2.0
    pub fn is_supported(&self) -> bool {
        matches!((self.major, self.minor), (1, 0..=7) | (2, 0))
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// PDF Header information
#[derive(Debug, Clone, PartialEq)]
pub struct PdfHeader {
    pub version: PdfVersion,
    /// Offset of the `%` that starts the header
    pub offset: u64,
    /// Second line is a comment with at least four bytes >= 128
    pub has_binary_marker: bool,
    /// Header taken from a `%!PS-Adobe-N.n PDF-M.m` wrapper line
    pub postscript_wrapper: bool,
}

fn parse_version(bytes: &[u8]) -> Option<PdfVersion> {
    match bytes {
        [b'1', b'.', minor @ b'0'..=b'9', ..] => Some(PdfVersion::new(1, minor - b'0')),
        [b'2', b'.', b'0', ..] => Some(PdfVersion::new(2, 0)),
        _ => None,
    }
}

fn line_end(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(bytes.len())
}

impl PdfHeader {
    /// Parse the header from the first bytes of a file
    pub fn parse(window: &[u8]) -> ParseResult<Self> {
        let window = &window[..window.len().min(HEADER_WINDOW)];

        if let Some(at) = find(window, b"%PDF-") {
            let version = parse_version(&window[at + 5..]).ok_or(ParseError::InvalidHeader)?;
            let rest = &window[at..];
            let has_binary_marker = Self::binary_marker(&rest[line_end(rest)..]);
            return Ok(Self {
                version,
                offset: at as u64,
                has_binary_marker,
                postscript_wrapper: false,
            });
        }

        // PostScript wrapper: "%!PS-Adobe-3.0 PDF-1.4"
        let at = find(window, b"%!PS-Adobe-").ok_or(ParseError::InvalidHeader)?;
        let line = &window[at..at + line_end(&window[at..])];
        let marker = find(line, b" PDF-").ok_or(ParseError::InvalidHeader)?;
        let version = parse_version(&line[marker + 5..]).ok_or(ParseError::InvalidHeader)?;
        let rest = &window[at + line.len()..];

        Ok(Self {
            version,
            offset: at as u64,
            has_binary_marker: Self::binary_marker(rest),
            postscript_wrapper: true,
        })
    }

    fn binary_marker(after_header_line: &[u8]) -> bool {
        let start = after_header_line
            .iter()
            .position(|&b| b != b'\r' && b != b'\n')
            .unwrap_or(after_header_line.len());
        let line = &after_header_line[start..];
        let line = &line[..line_end(line)];
        line.first() == Some(&b'%') && line[1..].iter().take(4).filter(|&&b| b >= 128).count() == 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_versions() {
        let header = PdfHeader::parse(b"%PDF-1.4\n1 0 obj").unwrap();
        assert_eq!(header.version, PdfVersion::new(1, 4));
        assert_eq!(header.offset, 0);
        assert!(!header.has_binary_marker);
        assert!(!header.postscript_wrapper);

        let header = PdfHeader::parse(b"%PDF-2.0\r\n").unwrap();
        assert_eq!(header.version.to_string(), "2.0");
    }

    #[test]
    fn test_binary_marker() {
        let header = PdfHeader::parse(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n").unwrap();
        assert!(header.has_binary_marker);

        let header = PdfHeader::parse(b"%PDF-1.7\n%abcd\n").unwrap();
        assert!(!header.has_binary_marker);
    }

    #[test]
    fn test_header_after_junk() {
        let mut data = vec![b' '; 500];
        data.extend_from_slice(b"%PDF-1.3\n");
        let header = PdfHeader::parse(&data).unwrap();
        assert_eq!(header.offset, 500);
    }

    #[test]
    fn test_header_beyond_window() {
        let mut data = vec![b' '; 1100];
        data.extend_from_slice(b"%PDF-1.3\n");
        assert!(matches!(
            PdfHeader::parse(&data),
            Err(ParseError::InvalidHeader)
        ));
    }

    #[test]
    fn test_postscript_wrapper() {
        let header = PdfHeader::parse(b"%!PS-Adobe-3.0 PDF-1.2\n%\x80\x81\x82\x83\n").unwrap();
        assert!(header.postscript_wrapper);
        assert_eq!(header.version, PdfVersion::new(1, 2));
        assert!(header.has_binary_marker);
    }

    #[test]
    fn test_wrapper_then_real_header() {
        let header = PdfHeader::parse(b"%!PS-Adobe-3.0\n%PDF-1.5\n").unwrap();
        assert!(!header.postscript_wrapper);
        assert_eq!(header.version, PdfVersion::new(1, 5));
        assert_eq!(header.offset, 15);
    }

    #[test]
    fn test_invalid_headers() {
        assert!(PdfHeader::parse(b"").is_err());
        assert!(PdfHeader::parse(b"%PDF-x.y\n").is_err());
        assert!(PdfHeader::parse(b"%PDF-3.0\n").is_err());
        assert!(PdfHeader::parse(b"%!PS-Adobe-3.0\n").is_err());
    }

    #[test]
    fn test_supported_versions() {
        assert!(PdfVersion::new(1, 0).is_supported());
        assert!(PdfVersion::new(1, 7).is_supported());
        assert!(PdfVersion::new(2, 0).is_supported());
        assert!(!PdfVersion::new(1, 9).is_supported());
    }
}
