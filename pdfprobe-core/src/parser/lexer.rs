//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2

use std::collections::BTreeSet;
use std::fmt;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use bitflags::bitflags;

use super::{ParseError, ParseResult};
use crate::source::{source_len, ByteSource};

bitflags! {
    /// Profile-risk notes raised while reading. None of them is an error.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Quirks: u32 {
        /// Backslash followed by a character outside the escape set
        const BAD_ESCAPE = 1 << 0;
        /// `stream` keyword not followed by an end-of-line
        const NO_STREAM_EOL = 1 << 1;
        /// `stream` keyword followed by a bare carriage return
        const CR_STREAM_EOL = 1 << 2;
        /// Hex string with an odd number of digits
        const ODD_HEX = 1 << 3;
        /// Token cut short by a byte bound
        const TRUNCATED = 1 << 4;
        /// Name longer than 127 bytes
        const LONG_NAME = 1 << 5;
        /// String longer than 32767 bytes
        const LONG_STRING = 1 << 6;
        /// Real outside +/-32767
        const REAL_RANGE = 1 << 7;
        /// Integer outside the 32-bit range
        const INT_RANGE = 1 << 8;
        /// Dictionary with more than 4095 entries
        const LARGE_DICT = 1 << 9;
        /// Array with more than 8191 elements
        const LARGE_ARRAY = 1 << 10;
        /// More than 28 levels of nesting
        const DEEP_NESTING = 1 << 11;
        /// Indirect object accepted without `endobj`
        const MISSING_ENDOBJ = 1 << 12;
    }
}

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// Name object with `#XX` escapes decoded (e.g., /Type)
    Name(String),

    /// Literal string `( ... )`
    LiteralString(Vec<u8>),

    /// Hexadecimal string `< ... >`
    HexString(Vec<u8>),

    /// Any run of regular characters that is not a number:
    /// `true`, `null`, `R`, `obj`, `xref`, ...
    Keyword(String),

    /// Comment (usually ignored)
    Comment(Vec<u8>),

    /// Left square bracket [
    ArrayStart,

    /// Right square bracket ]
    ArrayEnd,

    /// Dictionary start <<
    DictStart,

    /// Dictionary end >>
    DictEnd,

    /// Raw stream data between `stream` and `endstream`, both consumed
    StreamBody { data_offset: u64, length: u64 },

    /// End of file
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Integer(i) => write!(f, "integer {i}"),
            TokenKind::Real(r) => write!(f, "real {r}"),
            TokenKind::Name(n) => write!(f, "name /{n}"),
            TokenKind::LiteralString(_) => write!(f, "literal string"),
            TokenKind::HexString(_) => write!(f, "hex string"),
            TokenKind::Keyword(k) => write!(f, "keyword '{k}'"),
            TokenKind::Comment(_) => write!(f, "comment"),
            TokenKind::ArrayStart => write!(f, "'['"),
            TokenKind::ArrayEnd => write!(f, "']'"),
            TokenKind::DictStart => write!(f, "'<<'"),
            TokenKind::DictEnd => write!(f, "'>>'"),
            TokenKind::StreamBody { .. } => write!(f, "stream body"),
            TokenKind::Eof => write!(f, "end of file"),
        }
    }
}

/// A token with the offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: u64,
    pub quirks: Quirks,
}

impl Token {
    pub fn new(kind: TokenKind, offset: u64) -> Self {
        Self {
            kind,
            offset,
            quirks: Quirks::empty(),
        }
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Keyword(k) if k == word)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.kind {
            TokenKind::Integer(i) => Some(i),
            _ => None,
        }
    }
}

const END_STREAM: &[u8] = b"endstream";

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b'\0' | b'\t' | b'\n' | 0x0C | b'\r' | b' ')
}

fn is_delimiter(ch: u8) -> bool {
    matches!(
        ch,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(ch: u8) -> bool {
    !is_whitespace(ch) && !is_delimiter(ch)
}

fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

fn shift_in(tail: &mut [u8; 2], byte: u8) {
    tail[0] = tail[1];
    tail[1] = byte;
}

/// PDF Lexer for tokenizing PDF content
pub struct Lexer<R> {
    reader: BufReader<R>,
    position: u64,
    limit: Option<usize>,
    languages: BTreeSet<String>,
}

impl<R: ByteSource> Lexer<R> {
    /// Create a new lexer from a reader positioned at offset 0
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            position: 0,
            limit: None,
            languages: BTreeSet::new(),
        }
    }

    /// Current byte offset
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn seek(&mut self, offset: u64) -> ParseResult<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    /// Step back over the byte just consumed
    pub fn backup_one_char(&mut self) -> ParseResult<()> {
        if self.position == 0 {
            return Ok(());
        }
        self.reader.seek_relative(-1)?;
        self.position -= 1;
        Ok(())
    }

    /// Total length of the underlying source
    pub fn len(&mut self) -> ParseResult<u64> {
        let end = source_len(&mut self.reader)?;
        self.reader.seek(SeekFrom::Start(self.position))?;
        Ok(end)
    }

    /// Read up to `len` bytes at `offset`, leaving the lexer after them
    pub fn read_range(&mut self, offset: u64, len: u64) -> ParseResult<Vec<u8>> {
        self.seek(offset)?;
        let mut buf = Vec::new();
        (&mut self.reader).take(len).read_to_end(&mut buf)?;
        self.position += buf.len() as u64;
        Ok(buf)
    }

    /// Read up to `n` raw bytes at the current position
    pub fn read_raw(&mut self, n: usize) -> ParseResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(n);
        (&mut self.reader).take(n as u64).read_to_end(&mut buf)?;
        self.position += buf.len() as u64;
        Ok(buf)
    }

    /// Language tags found in UTF-16 strings so far (`en`, `en-US`)
    pub fn languages(&self) -> &BTreeSet<String> {
        &self.languages
    }

    /// Get the next token
    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.next_bounded(None)
    }

    /// Get the next token, cutting runaway tokens at `max_bytes`
    pub fn next_bounded(&mut self, max_bytes: Option<usize>) -> ParseResult<Token> {
        self.limit = max_bytes;
        let token = self.read_token();
        self.limit = None;
        token
    }

    fn read_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace()?;

        let offset = self.position;
        let ch = match self.peek_char()? {
            Some(ch) => ch,
            None => return Ok(Token::new(TokenKind::Eof, offset)),
        };

        let (kind, quirks) = match ch {
            b'%' => self.read_comment()?,
            b'/' => self.read_name()?,
            b'(' => self.read_literal_string(offset)?,
            b'<' => {
                self.consume_char();
                if self.peek_char()? == Some(b'<') {
                    self.consume_char();
                    (TokenKind::DictStart, Quirks::empty())
                } else {
                    self.read_hex_string(offset)?
                }
            }
            b'>' => {
                self.consume_char();
                if self.peek_char()? == Some(b'>') {
                    self.consume_char();
                    (TokenKind::DictEnd, Quirks::empty())
                } else {
                    return Err(ParseError::SyntaxError {
                        position: offset,
                        message: "Expected '>' after '>'".to_string(),
                    });
                }
            }
            b'[' => {
                self.consume_char();
                (TokenKind::ArrayStart, Quirks::empty())
            }
            b']' => {
                self.consume_char();
                (TokenKind::ArrayEnd, Quirks::empty())
            }
            b'{' | b'}' => {
                self.consume_char();
                (TokenKind::Keyword((ch as char).to_string()), Quirks::empty())
            }
            b')' => {
                self.consume_char();
                return Err(ParseError::SyntaxError {
                    position: offset,
                    message: "Unbalanced ')'".to_string(),
                });
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number()?,
            _ => self.read_keyword(offset)?,
        };

        Ok(Token {
            kind,
            offset,
            quirks,
        })
    }

    fn peek_char(&mut self) -> ParseResult<Option<u8>> {
        Ok(self.reader.fill_buf()?.first().copied())
    }

    /// Consume one byte; only valid after `peek_char` returned `Some`
    fn consume_char(&mut self) {
        self.reader.consume(1);
        self.position += 1;
    }

    fn next_char(&mut self) -> ParseResult<Option<u8>> {
        let ch = self.peek_char()?;
        if ch.is_some() {
            self.consume_char();
        }
        Ok(ch)
    }

    fn over_limit(&self, len: usize) -> bool {
        self.limit.is_some_and(|max| len >= max.max(1))
    }

    pub fn skip_whitespace(&mut self) -> ParseResult<()> {
        while let Some(ch) = self.peek_char()? {
            if !is_whitespace(ch) {
                break;
            }
            self.consume_char();
        }
        Ok(())
    }

    fn read_comment(&mut self) -> ParseResult<(TokenKind, Quirks)> {
        self.consume_char(); // '%'
        let mut quirks = Quirks::empty();
        let mut bytes = Vec::new();

        while let Some(ch) = self.peek_char()? {
            if ch == b'\r' || ch == b'\n' {
                break;
            }
            if self.over_limit(bytes.len()) {
                quirks |= Quirks::TRUNCATED;
                break;
            }
            self.consume_char();
            bytes.push(ch);
        }

        Ok((TokenKind::Comment(bytes), quirks))
    }

    fn read_name(&mut self) -> ParseResult<(TokenKind, Quirks)> {
        self.consume_char(); // '/'
        let mut quirks = Quirks::empty();
        let mut bytes = Vec::new();

        while let Some(ch) = self.peek_char()? {
            if !is_regular(ch) {
                break;
            }
            if self.over_limit(bytes.len()) {
                quirks |= Quirks::TRUNCATED;
                break;
            }
            self.consume_char();

            if ch == b'#' {
                let escape_at = self.position - 1;
                let high = self.next_char()?.and_then(hex_value);
                let low = self.next_char()?.and_then(hex_value);
                match (high, low) {
                    (Some(h), Some(l)) => bytes.push(h << 4 | l),
                    _ => {
                        return Err(ParseError::SyntaxError {
                            position: escape_at,
                            message: "Invalid #XX escape in name".to_string(),
                        })
                    }
                }
            } else {
                bytes.push(ch);
            }
        }

        if bytes.len() > 127 {
            quirks |= Quirks::LONG_NAME;
        }

        Ok((
            TokenKind::Name(String::from_utf8_lossy(&bytes).into_owned()),
            quirks,
        ))
    }

    fn read_literal_string(&mut self, offset: u64) -> ParseResult<(TokenKind, Quirks)> {
        self.consume_char(); // '('
        let mut quirks = Quirks::empty();
        let mut bytes = Vec::new();
        let mut depth = 1usize;

        loop {
            if self.over_limit(bytes.len()) {
                quirks |= Quirks::TRUNCATED;
                break;
            }
            let ch = match self.next_char()? {
                Some(ch) => ch,
                None => {
                    return Err(ParseError::SyntaxError {
                        position: offset,
                        message: "Unterminated literal string".to_string(),
                    })
                }
            };

            match ch {
                b'(' => {
                    depth += 1;
                    bytes.push(ch);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    bytes.push(ch);
                }
                b'\\' => self.read_escape(&mut bytes, &mut quirks)?,
                b'\r' => {
                    // An unescaped end-of-line reads as a single LF
                    if self.peek_char()? == Some(b'\n') {
                        self.consume_char();
                    }
                    bytes.push(b'\n');
                }
                _ => bytes.push(ch),
            }
        }

        if bytes.len() > 32767 {
            quirks |= Quirks::LONG_STRING;
        }
        self.collect_languages(&bytes);

        Ok((TokenKind::LiteralString(bytes), quirks))
    }

    fn read_escape(&mut self, bytes: &mut Vec<u8>, quirks: &mut Quirks) -> ParseResult<()> {
        let ch = match self.next_char()? {
            Some(ch) => ch,
            None => return Ok(()),
        };

        match ch {
            b'n' => bytes.push(b'\n'),
            b'r' => bytes.push(b'\r'),
            b't' => bytes.push(b'\t'),
            b'b' => bytes.push(0x08),
            b'f' => bytes.push(0x0C),
            b'(' | b')' | b'\\' => bytes.push(ch),
            b'\r' => {
                // Line continuation; CR LF counts as one end-of-line
                if self.peek_char()? == Some(b'\n') {
                    self.consume_char();
                }
            }
            b'\n' => {}
            b'0'..=b'7' => {
                let mut value = u32::from(ch - b'0');
                for _ in 0..2 {
                    match self.peek_char()? {
                        Some(digit @ b'0'..=b'7') => {
                            self.consume_char();
                            value = value * 8 + u32::from(digit - b'0');
                        }
                        _ => break,
                    }
                }
                bytes.push((value & 0xFF) as u8);
            }
            other => {
                *quirks |= Quirks::BAD_ESCAPE;
                bytes.push(other);
            }
        }
        Ok(())
    }

    fn read_hex_string(&mut self, offset: u64) -> ParseResult<(TokenKind, Quirks)> {
        let mut quirks = Quirks::empty();
        let mut bytes = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            if self.over_limit(bytes.len()) {
                quirks |= Quirks::TRUNCATED;
                break;
            }
            let ch = match self.next_char()? {
                Some(ch) => ch,
                None => {
                    return Err(ParseError::SyntaxError {
                        position: offset,
                        message: "Unterminated hex string".to_string(),
                    })
                }
            };

            if ch == b'>' {
                break;
            }
            if is_whitespace(ch) {
                continue;
            }
            let nibble = hex_value(ch).ok_or_else(|| ParseError::SyntaxError {
                position: self.position - 1,
                message: format!("Invalid character {:?} in hex string", ch as char),
            })?;
            match pending.take() {
                Some(high) => bytes.push(high << 4 | nibble),
                None => pending = Some(nibble),
            }
        }

        if let Some(high) = pending {
            bytes.push(high << 4);
            quirks |= Quirks::ODD_HEX;
        }
        self.collect_languages(&bytes);

        Ok((TokenKind::HexString(bytes), quirks))
    }

    fn read_number(&mut self) -> ParseResult<(TokenKind, Quirks)> {
        let mut quirks = Quirks::empty();
        let mut text = String::new();
        let mut seen_dot = false;
        let mut seen_digit = false;

        if let Some(sign @ (b'+' | b'-')) = self.peek_char()? {
            self.consume_char();
            text.push(sign as char);
        }

        // A second sign or a second '.' ends the number
        while let Some(ch) = self.peek_char()? {
            if self.over_limit(text.len()) {
                quirks |= Quirks::TRUNCATED;
                break;
            }
            match ch {
                b'0'..=b'9' => seen_digit = true,
                b'.' if !seen_dot => seen_dot = true,
                _ => break,
            }
            self.consume_char();
            text.push(ch as char);
        }

        if !seen_digit {
            // A lone sign or dot reads as zero
            return Ok((TokenKind::Integer(0), quirks));
        }

        if seen_dot {
            let value = text.parse::<f64>().unwrap_or(0.0);
            if value.abs() > 32767.0 {
                quirks |= Quirks::REAL_RANGE;
            }
            return Ok((TokenKind::Real(value), quirks));
        }

        let value = match text.parse::<i64>() {
            Ok(value) => value,
            Err(_) if text.starts_with('-') => i64::MIN,
            Err(_) => i64::MAX,
        };
        if value < i64::from(i32::MIN) || value > i64::from(i32::MAX) {
            quirks |= Quirks::INT_RANGE;
        }
        Ok((TokenKind::Integer(value), quirks))
    }

    fn read_keyword(&mut self, offset: u64) -> ParseResult<(TokenKind, Quirks)> {
        let mut quirks = Quirks::empty();
        let mut bytes = Vec::new();

        while let Some(ch) = self.peek_char()? {
            if !is_regular(ch) {
                break;
            }
            if self.over_limit(bytes.len()) {
                quirks |= Quirks::TRUNCATED;
                break;
            }
            self.consume_char();
            bytes.push(ch);
        }

        if bytes == b"stream" && quirks.is_empty() {
            return self.read_stream_body(offset);
        }

        Ok((
            TokenKind::Keyword(String::from_utf8_lossy(&bytes).into_owned()),
            quirks,
        ))
    }

    /// Scan raw stream data up to and including `endstream`
    fn read_stream_body(&mut self, keyword_offset: u64) -> ParseResult<(TokenKind, Quirks)> {
        let mut quirks = Quirks::empty();
        match self.peek_char()? {
            Some(b'\r') => {
                self.consume_char();
                if self.peek_char()? == Some(b'\n') {
                    self.consume_char();
                } else {
                    quirks |= Quirks::CR_STREAM_EOL;
                }
            }
            Some(b'\n') => self.consume_char(),
            _ => quirks |= Quirks::NO_STREAM_EOL,
        }

        let data_offset = self.position;
        let mut matched = 0usize;
        let mut tail = [0u8; 2];

        loop {
            let ch = match self.next_char()? {
                Some(ch) => ch,
                None => {
                    return Err(ParseError::TruncatedStream {
                        position: keyword_offset,
                    })
                }
            };

            if ch == END_STREAM[matched] {
                matched += 1;
                if matched == END_STREAM.len() {
                    break;
                }
                continue;
            }

            for &byte in &END_STREAM[..matched] {
                shift_in(&mut tail, byte);
            }
            if ch == END_STREAM[0] {
                matched = 1;
            } else {
                matched = 0;
                shift_in(&mut tail, ch);
            }
        }

        let raw_len = self.position - data_offset - END_STREAM.len() as u64;
        let eol = if raw_len >= 2 && tail == *b"\r\n" {
            2
        } else if raw_len >= 1 && (tail[1] == b'\n' || tail[1] == b'\r') {
            1
        } else {
            0
        };
        tracing::trace!(data_offset, length = raw_len - eol, "stream body");

        Ok((
            TokenKind::StreamBody {
                data_offset,
                length: raw_len - eol,
            },
            quirks,
        ))
    }

    /// Record language escapes from UTF-16BE text: U+001B, one unit holding
    /// the two-letter language code, an optional unit holding the country
    /// code, then U+001B.
    fn collect_languages(&mut self, bytes: &[u8]) {
        if bytes.len() < 2 || bytes[..2] != [0xFE, 0xFF] {
            return;
        }
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        let mut i = 0;
        while i < units.len() {
            if units[i] != 0x1B {
                i += 1;
                continue;
            }
            let Some(close) = units[i + 1..].iter().position(|&u| u == 0x1B) else {
                break;
            };
            let tag: Option<Vec<String>> = units[i + 1..i + 1 + close]
                .iter()
                .map(|&unit| letter_pair(unit))
                .collect();
            match tag.as_deref() {
                Some([language]) => {
                    self.languages.insert(language.to_ascii_lowercase());
                }
                Some([language, country]) => {
                    self.languages.insert(format!(
                        "{}-{}",
                        language.to_ascii_lowercase(),
                        country.to_ascii_uppercase()
                    ));
                }
                _ => {}
            }
            i += close + 2;
        }
    }
}

/// Two ASCII letters packed in one UTF-16 unit (0x656E is "en")
fn letter_pair(unit: u16) -> Option<String> {
    let [high, low] = unit.to_be_bytes();
    (high.is_ascii_alphabetic() && low.is_ascii_alphabetic())
        .then(|| String::from_utf8_lossy(&[high, low]).into_owned())
}
