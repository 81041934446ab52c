//! PDF Cross-Reference Resolution
//!
//! Locates the newest trailer and walks the `/Prev` chain, merging classic
//! tables (ISO 32000-1 Section 7.5.4) and cross-reference streams (Section
//! 7.5.8) so that the newest entry for every object number wins.

use std::collections::{HashMap, HashSet};

use super::lexer::{Token, TokenKind};
use super::object_parser::{Parsed, Parser};
use super::objects::PdfObject;
use super::trailer::{SectionKind, Trailer, TrailerChain};
use super::xref_stream::XRefStream;
use super::{filters, ParseError, ParseOptions, ParseResult, SubsectionPolicy};
use crate::diagnostics::{DiagnosticId, Diagnostics};
use crate::source::{rfind, ByteSource};

/// Bytes at the end of the file searched for `%%EOF`
pub const EOF_WINDOW: u64 = 1024;
/// Bytes before `%%EOF` searched for `startxref`
pub const STARTXREF_WINDOW: usize = 128;
/// Width of a classic record including its two-byte end of line
pub const RECORD_WIDTH: usize = 20;

/// Cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    Free { next: u32, generation: u16 },
    /// In-use object at a byte offset
    Offset { offset: u64, generation: u16 },
    /// In-use object stored in an object stream
    Compressed { container: u32, index: u32 },
}

impl XRefEntry {
    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }

    /// Generation the entry expects; compressed objects always have 0
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::Offset { generation, .. } => {
                *generation
            }
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

/// Merged cross-reference table
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: HashMap<u32, XRefEntry>,
    size: u32,
    free_count: usize,
}

impl XRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an xref entry by object number
    pub fn get(&self, number: u32) -> Option<&XRefEntry> {
        self.entries.get(&number)
    }

    /// `/Size` declared by the newest section
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that point at an object
    pub fn in_use_count(&self) -> usize {
        self.entries.len() - self.free_count
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> {
        self.entries.iter().map(|(number, entry)| (*number, entry))
    }

    /// Record the size of the newest section; older sections never change it
    fn declare_size(&mut self, size: u32) {
        if self.size == 0 {
            self.size = size;
        }
    }

    /// Populate `number` unless a newer section already did. Returns whether
    /// the entry landed.
    pub fn merge_entry(&mut self, number: u32, entry: XRefEntry) -> bool {
        if self.entries.contains_key(&number) {
            return false;
        }
        if entry.is_free() {
            self.free_count += 1;
        }
        self.entries.insert(number, entry);
        true
    }
}

/// One cross-reference section with its trailer
#[derive(Debug, Clone)]
pub struct XRefSection {
    pub offset: u64,
    pub kind: SectionKind,
    pub entries: Vec<(u32, XRefEntry)>,
    pub trailer: Trailer,
}

/// Parse a record in the exact `nnnnnnnnnn ggggg n<eol>` layout
fn parse_record(raw: &[u8]) -> Option<XRefEntry> {
    if raw.len() != RECORD_WIDTH {
        return None;
    }
    let digits = |bytes: &[u8]| -> Option<u64> {
        if !bytes.iter().all(u8::is_ascii_digit) {
            return None;
        }
        std::str::from_utf8(bytes).ok()?.parse().ok()
    };

    if raw[10] != b' ' || raw[16] != b' ' {
        return None;
    }
    if !matches!(&raw[18..20], b" \r" | b" \n" | b"\r\n") {
        return None;
    }
    let offset = digits(&raw[0..10])?;
    let generation = u16::try_from(digits(&raw[11..16])?).ok()?;

    match raw[17] {
        b'n' => Some(XRefEntry::Offset { offset, generation }),
        b'f' => Some(XRefEntry::Free {
            next: u32::try_from(offset).ok()?,
            generation,
        }),
        _ => None,
    }
}

/// Builds the merged table and the trailer chain for one document
pub struct XRefResolver<'a, R> {
    parser: &'a mut Parser<R>,
    diagnostics: &'a mut Diagnostics,
    policy: SubsectionPolicy,
    max_token_bytes: usize,
    table: XRefTable,
    chain: TrailerChain,
    visited: HashSet<u64>,
    free_head_reported: bool,
}

impl<'a, R: ByteSource> XRefResolver<'a, R> {
    pub fn new(
        parser: &'a mut Parser<R>,
        diagnostics: &'a mut Diagnostics,
        options: &ParseOptions,
    ) -> Self {
        Self {
            parser,
            diagnostics,
            policy: options.corrupt_subsection,
            max_token_bytes: options.max_token_bytes,
            table: XRefTable::new(),
            chain: TrailerChain::new(),
            visited: HashSet::new(),
            free_head_reported: false,
        }
    }

    pub fn into_parts(self) -> (XRefTable, TrailerChain) {
        (self.table, self.chain)
    }

    /// Walk every section from the newest trailer back through `/Prev`
    pub fn resolve(&mut self) -> ParseResult<()> {
        let mut next = Some(self.locate_last_trailer()?);

        while let Some(offset) = next {
            self.visit(offset)?;
            let section = self.parse_trailer_at(offset)?;
            next = section.trailer.prev;
            let hybrid = match section.kind {
                SectionKind::Table => section.trailer.xref_stm,
                SectionKind::Stream => None,
            };
            self.merge_xref_section(section)?;

            if let Some(stm) = hybrid {
                self.visit(stm)?;
                let stream_section = self.parse_trailer_at(stm)?;
                if stream_section.kind != SectionKind::Stream {
                    return Err(ParseError::InvalidXRefStream {
                        position: stm,
                        message: "/XRefStm does not point to a cross-reference stream".to_string(),
                    });
                }
                self.merge_entries(&stream_section)?;
            }
        }

        tracing::debug!(
            entries = self.table.len(),
            trailers = self.chain.len(),
            "cross-reference chain resolved"
        );
        Ok(())
    }

    fn visit(&mut self, offset: u64) -> ParseResult<()> {
        if self.visited.insert(offset) {
            Ok(())
        } else {
            Err(ParseError::TrailerCycle { position: offset })
        }
    }

    /// Offset named by the last `startxref` of the file
    pub fn locate_last_trailer(&mut self) -> ParseResult<u64> {
        let lexer = self.parser.lexer_mut();
        let len = lexer.len()?;
        let start = len.saturating_sub(EOF_WINDOW);
        let tail = lexer.read_range(start, len - start)?;

        let eof_at = rfind(&tail, b"%%EOF").ok_or(ParseError::MissingEof)?;
        let window_start = eof_at.saturating_sub(STARTXREF_WINDOW);
        let keyword_at = rfind(&tail[window_start..eof_at], b"startxref")
            .map(|at| at + window_start)
            .ok_or(ParseError::MissingStartXRef)?;

        let after = &tail[keyword_at + b"startxref".len()..eof_at];
        let digits: Vec<u8> = after
            .iter()
            .skip_while(|b| b.is_ascii_whitespace())
            .take_while(|b| b.is_ascii_digit())
            .copied()
            .collect();
        let position = start + keyword_at as u64;

        std::str::from_utf8(&digits)
            .ok()
            .and_then(|text| text.parse::<u64>().ok())
            .ok_or(ParseError::InvalidStartXRef { position })
    }

    /// Parse the section at `offset`, dispatching on its first token
    pub fn parse_trailer_at(&mut self, offset: u64) -> ParseResult<XRefSection> {
        if offset >= self.parser.lexer_mut().len()? {
            return Err(ParseError::InvalidStartXRef { position: offset });
        }
        self.parser.seek(offset)?;

        let token = match self.parser.next_token() {
            Ok(token) => token,
            Err(ParseError::Io(e)) => return Err(ParseError::Io(e)),
            Err(err) => {
                return Err(ParseError::UnexpectedXRefToken {
                    position: offset,
                    found: err.to_string(),
                })
            }
        };

        match token.kind {
            TokenKind::Keyword(ref word) if word == "xref" => self.parse_table(offset),
            TokenKind::Integer(_) => self.parse_stream_section(offset),
            other => Err(ParseError::UnexpectedXRefToken {
                position: offset,
                found: other.to_string(),
            }),
        }
    }

    /// Merge a section and append its trailer to the chain
    pub fn merge_xref_section(&mut self, section: XRefSection) -> ParseResult<()> {
        self.merge_entries(&section)?;
        tracing::debug!(
            offset = section.offset,
            kind = ?section.kind,
            entries = section.entries.len(),
            "merged cross-reference section"
        );
        self.chain.push(section.trailer);
        Ok(())
    }

    fn merge_entries(&mut self, section: &XRefSection) -> ParseResult<()> {
        let size = match section.trailer.size {
            Some(size) => size,
            None => {
                self.diagnostics.report(
                    DiagnosticId::MissingTrailerKey,
                    Some("Size".to_string()),
                    Some(section.offset),
                );
                section
                    .entries
                    .iter()
                    .map(|(number, _)| number.saturating_add(1))
                    .max()
                    .unwrap_or(0)
            }
        };
        self.table.declare_size(size);

        for (_, entry) in &section.entries {
            if let XRefEntry::Compressed { container, .. } = *entry {
                if container >= size {
                    return Err(ParseError::CompressedIndexOutOfRange {
                        position: section.offset,
                        container,
                        size,
                    });
                }
            }
        }

        let mut beyond = 0usize;
        for &(number, entry) in &section.entries {
            if number >= size {
                beyond += 1;
                continue;
            }
            let landed = self.table.merge_entry(number, entry);
            if landed && number == 0 && !entry.is_free() && !self.free_head_reported {
                self.free_head_reported = true;
                self.diagnostics
                    .report(DiagnosticId::InvalidFreeListHead, None, Some(section.offset));
            }
        }
        if beyond > 0 {
            self.diagnostics.report(
                DiagnosticId::EntryBeyondSize,
                Some(format!("{beyond} entries at or beyond /Size {size}")),
                Some(section.offset),
            );
        }
        Ok(())
    }

    /// Next token inside a classic table; lexical errors make the
    /// subsection corrupt
    fn table_token(&mut self) -> ParseResult<Token> {
        let position = self.parser.position();
        match self.parser.next_token() {
            Ok(token) => Ok(token),
            Err(ParseError::Io(e)) => Err(ParseError::Io(e)),
            Err(err) => Err(ParseError::CorruptSubsection {
                position: err.position().unwrap_or(position),
                message: err.to_string(),
            }),
        }
    }

    fn parse_table(&mut self, offset: u64) -> ParseResult<XRefSection> {
        let mut entries = Vec::new();
        let mut width_reported = false;

        loop {
            let result = match self.table_token() {
                Ok(token) => match token.kind {
                    TokenKind::Keyword(ref word) if word == "trailer" => break,
                    TokenKind::Integer(first) => {
                        self.read_subsection(token.offset, first, &mut entries, &mut width_reported)
                    }
                    TokenKind::Eof => {
                        return Err(ParseError::InvalidTrailer {
                            position: offset,
                            message: "no trailer after cross-reference table".to_string(),
                        })
                    }
                    other => Err(ParseError::CorruptSubsection {
                        position: token.offset,
                        message: format!("unexpected {other} in table"),
                    }),
                },
                Err(err) => Err(err),
            };

            match result {
                Ok(()) => {}
                Err(ParseError::CorruptSubsection { position, message }) => {
                    self.corrupt_subsection(position, message)?;
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let dict_offset = self.parser.position();
        let dict = match self.parser.read_object(false) {
            Ok(Parsed::Object(PdfObject::Dictionary(dict))) => dict,
            Ok(_) => {
                return Err(ParseError::InvalidTrailer {
                    position: dict_offset,
                    message: "trailer is not a dictionary".to_string(),
                })
            }
            Err(ParseError::Io(e)) => return Err(ParseError::Io(e)),
            Err(err) => {
                return Err(ParseError::InvalidTrailer {
                    position: err.position().unwrap_or(dict_offset),
                    message: err.to_string(),
                })
            }
        };

        Ok(XRefSection {
            offset,
            kind: SectionKind::Table,
            entries,
            trailer: Trailer::from_dict(dict, offset, SectionKind::Table)?,
        })
    }

    fn read_subsection(
        &mut self,
        header_offset: u64,
        first: i64,
        entries: &mut Vec<(u32, XRefEntry)>,
        width_reported: &mut bool,
    ) -> ParseResult<()> {
        let corrupt = |message: &str| ParseError::CorruptSubsection {
            position: header_offset,
            message: message.to_string(),
        };

        let first = u32::try_from(first).map_err(|_| corrupt("invalid first object number"))?;
        let count = match self.table_token()?.kind {
            TokenKind::Integer(count) => {
                u32::try_from(count).map_err(|_| corrupt("invalid subsection count"))?
            }
            _ => return Err(corrupt("subsection count is not a number")),
        };

        for i in 0..count {
            let number = first
                .checked_add(i)
                .ok_or_else(|| corrupt("object number overflow"))?;
            let entry = self.read_record(width_reported)?;
            entries.push((number, entry));
        }
        Ok(())
    }

    fn read_record(&mut self, width_reported: &mut bool) -> ParseResult<XRefEntry> {
        self.parser.lexer_mut().skip_whitespace()?;
        let start = self.parser.position();
        let raw = self.parser.lexer_mut().read_raw(RECORD_WIDTH)?;
        if let Some(entry) = parse_record(&raw) {
            return Ok(entry);
        }

        // Not in the fixed layout; read it as tokens
        self.parser.seek(start)?;
        let corrupt = |message: &str| ParseError::CorruptSubsection {
            position: start,
            message: message.to_string(),
        };

        let offset = match self.table_token()?.kind {
            TokenKind::Integer(n) => u64::try_from(n).map_err(|_| corrupt("negative record offset"))?,
            _ => return Err(corrupt("record offset is not a number")),
        };
        let generation = match self.table_token()?.kind {
            TokenKind::Integer(n) => {
                u16::try_from(n).map_err(|_| corrupt("record generation out of range"))?
            }
            _ => return Err(corrupt("record generation is not a number")),
        };
        let marker = self.table_token()?;
        let entry = match marker.kind {
            TokenKind::Keyword(ref word) if word == "n" => XRefEntry::Offset { offset, generation },
            TokenKind::Keyword(ref word) if word == "f" => XRefEntry::Free {
                next: u32::try_from(offset).unwrap_or(u32::MAX),
                generation,
            },
            _ => return Err(corrupt("record type is not n or f")),
        };

        if !*width_reported {
            *width_reported = true;
            let width = marker.offset + 1 - start;
            self.diagnostics.report(
                DiagnosticId::RecordWidth,
                Some(format!("record text is {width} bytes instead of 18")),
                Some(start),
            );
        }
        Ok(entry)
    }

    /// Apply the corrupt-subsection policy. Under `Degrade` the entries read
    /// so far are kept and the lexer is left after the `trailer` keyword.
    fn corrupt_subsection(&mut self, position: u64, message: String) -> ParseResult<()> {
        if self.policy == SubsectionPolicy::Abort {
            return Err(ParseError::CorruptSubsection { position, message });
        }

        tracing::warn!(position, %message, "skipping corrupt cross-reference subsection");
        self.diagnostics
            .report(DiagnosticId::CorruptSubsection, Some(message), Some(position));

        self.parser.seek(position)?;
        loop {
            let before = self.parser.position();
            match self
                .parser
                .lexer_mut()
                .next_bounded(Some(self.max_token_bytes))
            {
                Ok(token) if token.is_keyword("trailer") => return Ok(()),
                Ok(token) if token.kind == TokenKind::Eof => {
                    return Err(ParseError::InvalidTrailer {
                        position,
                        message: "no trailer after corrupt subsection".to_string(),
                    })
                }
                Ok(_) => {}
                Err(ParseError::Io(e)) => return Err(ParseError::Io(e)),
                Err(err) => {
                    tracing::trace!(%err, "resynchronizing");
                    if self.parser.position() == before {
                        self.parser.seek(before + 1)?;
                    }
                }
            }
        }
    }

    fn parse_stream_section(&mut self, offset: u64) -> ParseResult<XRefSection> {
        let invalid = |message: String| ParseError::InvalidXRefStream {
            position: offset,
            message,
        };

        self.parser.seek(offset)?;
        let object = match self.parser.read_indirect_definition() {
            Ok(object) => object,
            Err(ParseError::Io(e)) => return Err(ParseError::Io(e)),
            Err(err) => return Err(invalid(err.to_string())),
        };
        let stream = match object.object {
            PdfObject::Stream(stream) => stream,
            other => {
                return Err(invalid(format!(
                    "expected a stream, found {}",
                    other.type_name()
                )))
            }
        };
        if stream.dict.get_type() != Some("XRef") {
            self.diagnostics.report_as(
                DiagnosticId::InvalidXRefStream,
                crate::diagnostics::Severity::Invalid,
                Some("stream is not /Type /XRef".to_string()),
                Some(offset),
            );
        }

        let layout = XRefStream::from_dict(&stream.dict, offset)?;
        let raw = self
            .parser
            .lexer_mut()
            .read_range(stream.data_offset, stream.length)?;
        let data = filters::decode_stream(
            &raw,
            stream.dict.get("Filter"),
            stream.dict.get("DecodeParms"),
        )
        .map_err(|err| invalid(err.to_string()))?;

        let rows = layout.entries(&data);
        if rows.ignored > 0 {
            tracing::debug!(offset, ignored = rows.ignored, "ignored rows of unknown type");
        }
        if rows.truncated {
            let message = format!(
                "stream data ends after {} of the rows named by /Index",
                rows.entries.len()
            );
            match self.policy {
                SubsectionPolicy::Abort => {
                    return Err(ParseError::CorruptSubsection {
                        position: offset,
                        message,
                    })
                }
                SubsectionPolicy::Degrade => {
                    tracing::warn!(offset, %message, "short cross-reference stream");
                    self.diagnostics.report(
                        DiagnosticId::CorruptSubsection,
                        Some(message),
                        Some(offset),
                    );
                }
            }
        }

        Ok(XRefSection {
            offset,
            kind: SectionKind::Stream,
            entries: rows.entries,
            trailer: Trailer::from_dict(stream.dict, offset, SectionKind::Stream)?,
        })
    }
}
