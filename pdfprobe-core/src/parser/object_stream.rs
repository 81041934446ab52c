//! PDF Object Stream Parser
//!
//! Handles compressed objects stored in object streams (PDF 1.5+,
//! ISO 32000-1 Section 7.5.7). The decoded payload starts with `N` pairs of
//! object number and offset relative to `/First`; each object is parsed on
//! demand.

use std::collections::BTreeSet;
use std::io::Cursor;

use super::lexer::{Quirks, TokenKind};
use super::object_parser::{Note, Parser};
use super::objects::{ObjectId, PdfDictionary, PdfObject};
use super::{ParseError, ParseOptions, ParseResult};

/// Decoded object stream with its header read
pub struct ObjectStream {
    container: u32,
    parser: Parser<Cursor<Vec<u8>>>,
    first: u64,
    offsets: Vec<(u32, u64)>,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("container", &self.container)
            .field("first", &self.first)
            .field("offsets", &self.offsets)
            .finish()
    }
}

fn required_count(dict: &PdfDictionary, key: &str, container: u32) -> ParseResult<u64> {
    match dict.get(key) {
        Some(PdfObject::Integer(value)) if *value >= 0 => Ok(*value as u64),
        Some(other) => Err(ParseError::InvalidObjectStream {
            container,
            message: format!("/{key} is {} instead of a count", other.type_name()),
        }),
        None => Err(ParseError::InvalidObjectStream {
            container,
            message: format!("missing /{key}"),
        }),
    }
}

impl ObjectStream {
    /// Read the header of an already decoded object stream
    pub fn parse(
        container: u32,
        dict: &PdfDictionary,
        data: Vec<u8>,
        options: &ParseOptions,
    ) -> ParseResult<Self> {
        let invalid = |message: String| ParseError::InvalidObjectStream { container, message };

        let n = required_count(dict, "N", container)?;
        let first = required_count(dict, "First", container)?;
        let len = data.len() as u64;
        if first > len {
            return Err(invalid(format!("/First {first} is beyond the data ({len} bytes)")));
        }
        if dict.get_type() != Some("ObjStm") {
            tracing::debug!(container, "object stream without /Type /ObjStm");
        }

        let mut parser = Parser::new(Cursor::new(data), options);
        let mut offsets = Vec::new();
        for _ in 0..n {
            let number = Self::header_integer(&mut parser, container)?;
            let offset = Self::header_integer(&mut parser, container)?;
            let number = u32::try_from(number)
                .map_err(|_| invalid(format!("object number {number} out of range")))?;
            if first + offset >= len {
                return Err(invalid(format!(
                    "object {number} starts beyond the data at {}",
                    first + offset
                )));
            }
            offsets.push((number, offset));
        }

        tracing::debug!(container, objects = offsets.len(), "object stream header read");
        Ok(Self {
            container,
            parser,
            first,
            offsets,
        })
    }

    fn header_integer(parser: &mut Parser<Cursor<Vec<u8>>>, container: u32) -> ParseResult<u64> {
        let token = parser.next_token().map_err(|err| ParseError::InvalidObjectStream {
            container,
            message: err.to_string(),
        })?;
        match token.kind {
            TokenKind::Integer(value) if value >= 0 => Ok(value as u64),
            other => Err(ParseError::InvalidObjectStream {
                container,
                message: format!("expected header integer, found {other}"),
            }),
        }
    }

    /// Object number of the container itself
    pub fn container(&self) -> u32 {
        self.container
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Parse the object at `index`, which the header must list as `expected`
    pub fn get(&mut self, index: u32, expected: u32) -> ParseResult<PdfObject> {
        let (number, offset) = *self.offsets.get(index as usize).ok_or_else(|| {
            ParseError::InvalidObjectStream {
                container: self.container,
                message: format!("index {index} beyond /N {}", self.offsets.len()),
            }
        })?;
        let start = self.first + offset;
        if number != expected {
            return Err(ParseError::ObjectMismatch {
                position: start,
                expected: ObjectId::new(expected, 0),
                found: ObjectId::new(number, 0),
            });
        }

        let end = self
            .offsets
            .get(index as usize + 1)
            .map(|(_, next)| self.first + next)
            .filter(|&end| end > start);

        self.parser.seek(start)?;
        self.parser.read_value_until(end)
    }

    pub fn quirks(&self) -> Quirks {
        self.parser.quirks()
    }

    pub fn languages(&self) -> &BTreeSet<String> {
        self.parser.lexer().languages()
    }

    pub fn take_notes(&mut self) -> Vec<Note> {
        self.parser.take_notes()
    }
}
