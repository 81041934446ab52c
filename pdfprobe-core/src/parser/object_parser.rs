//! PDF Object Parser
//!
//! Assembles tokens into objects according to ISO 32000-1 Section 7.3.
//! Indirect references are written postfix (`12 0 R`), so array and
//! dictionary contents are buffered and the `R` triples collapsed by a
//! backward scan once the container is closed.

use super::lexer::{Lexer, Quirks, Token, TokenKind};
use super::objects::{IndirectObject, ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
use super::{ParseError, ParseOptions, ParseResult};
use crate::diagnostics::DiagnosticId;
use crate::source::ByteSource;

/// Entries beyond which a dictionary exceeds archival profile limits
const PROFILE_DICT_ENTRIES: usize = 4095;
/// Elements beyond which an array exceeds archival profile limits
const PROFILE_ARRAY_ELEMENTS: usize = 8191;
/// Nesting beyond which a structure exceeds archival profile limits
const PROFILE_NESTING: usize = 28;

/// One step of [`Parser::read_object`]
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Object(PdfObject),
    /// A bare keyword that is not a value by itself (`R`, `obj`, `endobj`, ...)
    Keyword(String, u64),
    /// Closing delimiter, stream body or end of input
    Terminator(Token),
}

/// An advisory recorded while parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub id: DiagnosticId,
    pub offset: u64,
}

enum Element {
    Object(PdfObject),
    Keyword(String, u64),
}

/// An open array or dictionary on the parse stack
struct Frame {
    closer: TokenKind,
    start: u64,
    elements: Vec<Element>,
}

enum Value {
    Parsed(Parsed),
    Open(TokenKind, u64),
}

enum Pending {
    None,
    Generation(u64),
    Number(u64, u16),
}

/// Collapse every `(num, gen, R)` triple into a reference, scanning backward.
fn collapse_references(elements: Vec<Element>) -> ParseResult<Vec<PdfObject>> {
    let mut out = Vec::with_capacity(elements.len());
    let mut pending = Pending::None;

    for element in elements.into_iter().rev() {
        pending = match (pending, element) {
            (Pending::None, Element::Keyword(word, offset)) if word == "R" => {
                Pending::Generation(offset)
            }
            (Pending::None, Element::Keyword(word, offset)) => {
                return Err(ParseError::UnexpectedToken {
                    position: offset,
                    expected: "object".to_string(),
                    found: format!("keyword '{word}'"),
                })
            }
            (Pending::None, Element::Object(obj)) => {
                out.push(obj);
                Pending::None
            }
            (Pending::Generation(offset), Element::Object(PdfObject::Integer(gen)))
                if (0..=i64::from(u16::MAX)).contains(&gen) =>
            {
                Pending::Number(offset, gen as u16)
            }
            (Pending::Number(_, gen), Element::Object(PdfObject::Integer(num)))
                if (0..=i64::from(u32::MAX)).contains(&num) =>
            {
                out.push(PdfObject::Reference(ObjectId::new(num as u32, gen)));
                Pending::None
            }
            (Pending::Generation(offset) | Pending::Number(offset, _), _) => {
                return Err(ParseError::SyntaxError {
                    position: offset,
                    message: "R without object number and generation".to_string(),
                })
            }
        };
    }

    if let Pending::Generation(offset) | Pending::Number(offset, _) = pending {
        return Err(ParseError::SyntaxError {
            position: offset,
            message: "R without object number and generation".to_string(),
        });
    }

    out.reverse();
    Ok(out)
}

fn single_object(items: Vec<PdfObject>, position: u64) -> ParseResult<Option<PdfObject>> {
    let mut iter = items.into_iter();
    match (iter.next(), iter.next()) {
        (None, _) => Ok(None),
        (Some(obj), None) => Ok(Some(obj)),
        (Some(_), Some(_)) => Err(ParseError::SyntaxError {
            position,
            message: "More than one object where one was expected".to_string(),
        }),
    }
}

/// Object-level parser over a byte source
pub struct Parser<R> {
    lexer: Lexer<R>,
    max_nesting: usize,
    lenient: bool,
    array_depth: usize,
    dict_depth: usize,
    quirks: Quirks,
    notes: Vec<Note>,
}

impl<R: ByteSource> Parser<R> {
    pub fn new(reader: R, options: &ParseOptions) -> Self {
        Self {
            lexer: Lexer::new(reader),
            max_nesting: options.max_nesting,
            lenient: options.lenient,
            array_depth: 0,
            dict_depth: 0,
            quirks: Quirks::empty(),
            notes: Vec::new(),
        }
    }

    pub fn lexer_mut(&mut self) -> &mut Lexer<R> {
        &mut self.lexer
    }

    pub fn lexer(&self) -> &Lexer<R> {
        &self.lexer
    }

    pub fn position(&self) -> u64 {
        self.lexer.position()
    }

    pub fn seek(&mut self, offset: u64) -> ParseResult<()> {
        self.reset_nesting();
        self.lexer.seek(offset)
    }

    /// Next raw token, folding its quirks into the document-wide set
    pub fn next_token(&mut self) -> ParseResult<Token> {
        let token = self.lexer.next_token()?;
        self.quirks |= token.quirks;
        Ok(token)
    }

    /// Every quirk seen so far
    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    /// Advisory profile non-compliance flag
    pub fn non_compliant(&self) -> bool {
        !self.quirks.is_empty()
    }

    pub fn take_notes(&mut self) -> Vec<Note> {
        std::mem::take(&mut self.notes)
    }

    fn reset_nesting(&mut self) {
        self.array_depth = 0;
        self.dict_depth = 0;
    }

    /// Read one value. With `allow_terminators`, closers, bare keywords,
    /// stream bodies and end of input are handed back to the caller instead
    /// of being errors.
    pub fn read_object(&mut self, allow_terminators: bool) -> ParseResult<Parsed> {
        let token = loop {
            let token = self.next_token()?;
            if !matches!(token.kind, TokenKind::Comment(_)) {
                break token;
            }
        };

        let parsed = match token.kind {
            TokenKind::ArrayStart => {
                Parsed::Object(self.read_container(TokenKind::ArrayEnd, token.offset)?)
            }
            TokenKind::DictStart => {
                Parsed::Object(self.read_container(TokenKind::DictEnd, token.offset)?)
            }
            _ => self.scalar(token)?,
        };

        if allow_terminators {
            return Ok(parsed);
        }
        match parsed {
            Parsed::Object(_) => Ok(parsed),
            Parsed::Keyword(word, position) => Err(ParseError::UnexpectedToken {
                position,
                expected: "object".to_string(),
                found: format!("keyword '{word}'"),
            }),
            Parsed::Terminator(token) => match token.kind {
                TokenKind::ArrayEnd | TokenKind::DictEnd => Err(ParseError::UnbalancedNesting {
                    position: token.offset,
                }),
                kind => Err(ParseError::UnexpectedToken {
                    position: token.offset,
                    expected: "object".to_string(),
                    found: kind.to_string(),
                }),
            },
        }
    }

    /// Classify a token that does not open a container
    fn scalar(&self, token: Token) -> ParseResult<Parsed> {
        let offset = token.offset;
        let parsed = match token.kind {
            TokenKind::Integer(i) => Parsed::Object(PdfObject::Integer(i)),
            TokenKind::Real(r) => Parsed::Object(PdfObject::Real(r)),
            TokenKind::Name(name) => Parsed::Object(PdfObject::Name(PdfName(name))),
            TokenKind::LiteralString(bytes) | TokenKind::HexString(bytes) => {
                Parsed::Object(PdfObject::String(PdfString(bytes)))
            }
            TokenKind::Keyword(word) => match word.as_str() {
                "true" => Parsed::Object(PdfObject::Boolean(true)),
                "false" => Parsed::Object(PdfObject::Boolean(false)),
                "null" => Parsed::Object(PdfObject::Null),
                _ => Parsed::Keyword(word, offset),
            },
            TokenKind::ArrayEnd if self.array_depth == 0 => {
                return Err(ParseError::UnbalancedNesting { position: offset })
            }
            TokenKind::DictEnd if self.dict_depth == 0 => {
                return Err(ParseError::UnbalancedNesting { position: offset })
            }
            kind => Parsed::Terminator(Token {
                kind,
                offset,
                quirks: token.quirks,
            }),
        };
        Ok(parsed)
    }

    fn enter(&mut self, position: u64) -> ParseResult<()> {
        let depth = self.array_depth + self.dict_depth + 1;
        if depth > self.max_nesting {
            return Err(ParseError::NestingTooDeep { position, depth });
        }
        if depth > PROFILE_NESTING {
            self.quirks |= Quirks::DEEP_NESTING;
        }
        Ok(())
    }

    fn open(&mut self, frames: &mut Vec<Frame>, closer: TokenKind, start: u64) -> ParseResult<()> {
        self.enter(start)?;
        if closer == TokenKind::ArrayEnd {
            self.array_depth += 1;
        } else {
            self.dict_depth += 1;
        }
        frames.push(Frame {
            closer,
            start,
            elements: Vec::new(),
        });
        Ok(())
    }

    fn close(&mut self, frame: Frame) -> ParseResult<PdfObject> {
        if frame.closer == TokenKind::ArrayEnd {
            self.array_depth -= 1;
            Ok(PdfObject::Array(self.finish_array(frame.elements)?))
        } else {
            self.dict_depth -= 1;
            Ok(PdfObject::Dictionary(
                self.finish_dictionary(frame.start, frame.elements)?,
            ))
        }
    }

    /// Read array contents after `[`
    pub fn read_array(&mut self, start: u64) -> ParseResult<PdfArray> {
        match self.read_container(TokenKind::ArrayEnd, start)? {
            PdfObject::Array(array) => Ok(array),
            other => Err(ParseError::SyntaxError {
                position: start,
                message: format!("Expected array, found {}", other.type_name()),
            }),
        }
    }

    /// Read dictionary contents after `<<`
    pub fn read_dictionary(&mut self, start: u64) -> ParseResult<PdfDictionary> {
        match self.read_container(TokenKind::DictEnd, start)? {
            PdfObject::Dictionary(dict) => Ok(dict),
            other => Err(ParseError::SyntaxError {
                position: start,
                message: format!("Expected dictionary, found {}", other.type_name()),
            }),
        }
    }

    /// Read a container and everything nested in it. Open containers live on
    /// an explicit frame stack, never on the thread stack.
    fn read_container(&mut self, closer: TokenKind, start: u64) -> ParseResult<PdfObject> {
        let depths = (self.array_depth, self.dict_depth);
        let result = self.read_frames(closer, start);
        if result.is_err() {
            (self.array_depth, self.dict_depth) = depths;
        }
        result
    }

    fn read_frames(&mut self, closer: TokenKind, start: u64) -> ParseResult<PdfObject> {
        let mut frames = Vec::new();
        self.open(&mut frames, closer, start)?;

        loop {
            let parsed = match self.next_value()? {
                Value::Open(closer, offset) => {
                    self.open(&mut frames, closer, offset)?;
                    continue;
                }
                Value::Parsed(parsed) => parsed,
            };
            let Some(frame) = frames.last_mut() else {
                return Err(ParseError::UnbalancedNesting { position: start });
            };
            let token = match parsed {
                Parsed::Object(obj) => {
                    frame.elements.push(Element::Object(obj));
                    continue;
                }
                Parsed::Keyword(word, offset) => {
                    frame.elements.push(Element::Keyword(word, offset));
                    continue;
                }
                Parsed::Terminator(token) => token,
            };

            if token.kind == frame.closer {
                let Some(frame) = frames.pop() else {
                    return Err(ParseError::UnbalancedNesting {
                        position: token.offset,
                    });
                };
                let obj = self.close(frame)?;
                match frames.last_mut() {
                    Some(parent) => parent.elements.push(Element::Object(obj)),
                    None => return Ok(obj),
                }
            } else if token.kind == TokenKind::Eof {
                let what = if frame.closer == TokenKind::ArrayEnd {
                    "array"
                } else {
                    "dictionary"
                };
                return Err(ParseError::SyntaxError {
                    position: frame.start,
                    message: format!("Unterminated {what}"),
                });
            } else {
                return Err(ParseError::UnbalancedNesting {
                    position: token.offset,
                });
            }
        }
    }

    /// One step inside a container: a value, or the start of a nested one
    fn next_value(&mut self) -> ParseResult<Value> {
        let token = loop {
            let token = self.next_token()?;
            if !matches!(token.kind, TokenKind::Comment(_)) {
                break token;
            }
        };
        match token.kind {
            TokenKind::ArrayStart => Ok(Value::Open(TokenKind::ArrayEnd, token.offset)),
            TokenKind::DictStart => Ok(Value::Open(TokenKind::DictEnd, token.offset)),
            _ => self.scalar(token).map(Value::Parsed),
        }
    }

    fn finish_array(&mut self, elements: Vec<Element>) -> ParseResult<PdfArray> {
        let items = collapse_references(elements)?;
        if items.len() > PROFILE_ARRAY_ELEMENTS {
            self.quirks |= Quirks::LARGE_ARRAY;
        }
        Ok(PdfArray(items))
    }

    fn finish_dictionary(&mut self, start: u64, elements: Vec<Element>) -> ParseResult<PdfDictionary> {
        let items = collapse_references(elements)?;
        if items.len() % 2 != 0 {
            return Err(ParseError::OddDictionary { position: start });
        }

        let mut dict = PdfDictionary::new();
        let mut iter = items.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            match key {
                PdfObject::Name(name) => dict.insert(name.0, value),
                _ => return Err(ParseError::InvalidDictionaryKey { position: start }),
            }
        }
        if dict.len() > PROFILE_DICT_ENTRIES {
            self.quirks |= Quirks::LARGE_DICT;
        }
        Ok(dict)
    }

    /// Read `N G obj <object> endobj`, fusing a dictionary and the stream
    /// body that follows it into a stream.
    pub fn read_indirect_definition(&mut self) -> ParseResult<IndirectObject> {
        self.reset_nesting();

        let header = self.next_token()?;
        let start = header.offset;
        let number = match header.kind {
            TokenKind::Integer(n) if (0..=i64::from(u32::MAX)).contains(&n) => n as u32,
            kind => {
                return Err(ParseError::UnexpectedToken {
                    position: start,
                    expected: "object number".to_string(),
                    found: kind.to_string(),
                })
            }
        };
        let gen_token = self.next_token()?;
        let generation = match gen_token.kind {
            TokenKind::Integer(g) if (0..=i64::from(u16::MAX)).contains(&g) => g as u16,
            kind => {
                return Err(ParseError::UnexpectedToken {
                    position: gen_token.offset,
                    expected: "generation number".to_string(),
                    found: kind.to_string(),
                })
            }
        };
        let obj_token = self.next_token()?;
        if !obj_token.is_keyword("obj") {
            return Err(ParseError::UnexpectedToken {
                position: obj_token.offset,
                expected: "'obj'".to_string(),
                found: obj_token.kind.to_string(),
            });
        }
        let id = ObjectId::new(number, generation);

        let mut elements = Vec::new();
        let mut stream: Option<PdfObject> = None;
        let mut closed = false;

        loop {
            match self.read_object(true)? {
                Parsed::Object(obj) => elements.push(Element::Object(obj)),
                Parsed::Keyword(word, _) if word == "endobj" => {
                    closed = true;
                    break;
                }
                Parsed::Keyword(word, _) if word == "obj" => {
                    // The next definition started; its number and generation
                    // were read as values of this one
                    elements.truncate(elements.len().saturating_sub(2));
                    break;
                }
                Parsed::Keyword(word, _)
                    if matches!(word.as_str(), "xref" | "trailer" | "startxref") =>
                {
                    break
                }
                Parsed::Keyword(word, offset) => elements.push(Element::Keyword(word, offset)),
                Parsed::Terminator(token) => match token.kind {
                    TokenKind::StreamBody {
                        data_offset,
                        length,
                    } => {
                        if stream.is_some() {
                            return Err(ParseError::UnexpectedToken {
                                position: token.offset,
                                expected: "'endobj'".to_string(),
                                found: "second stream body".to_string(),
                            });
                        }
                        let items = collapse_references(std::mem::take(&mut elements))?;
                        match single_object(items, token.offset)? {
                            Some(PdfObject::Dictionary(dict)) => {
                                stream = Some(PdfObject::Stream(PdfStream::new(
                                    dict,
                                    data_offset,
                                    length,
                                )));
                            }
                            _ => {
                                return Err(ParseError::SyntaxError {
                                    position: token.offset,
                                    message: "Stream body without a dictionary".to_string(),
                                })
                            }
                        }
                    }
                    TokenKind::Eof => break,
                    _ => {
                        return Err(ParseError::UnbalancedNesting {
                            position: token.offset,
                        })
                    }
                },
            }
        }

        if !closed {
            if !self.lenient {
                return Err(ParseError::MissingEndobj { position: start });
            }
            tracing::warn!(object = %id, position = start, "object not closed by endobj");
            self.quirks |= Quirks::MISSING_ENDOBJ;
            self.notes.push(Note {
                id: DiagnosticId::MissingEndobj,
                offset: start,
            });
        }

        let items = collapse_references(elements)?;
        let object = match stream {
            Some(stream) if items.is_empty() => stream,
            Some(_) => {
                return Err(ParseError::SyntaxError {
                    position: start,
                    message: "Data between endstream and endobj".to_string(),
                })
            }
            // An empty definition reads as null
            None => single_object(items, start)?.unwrap_or(PdfObject::Null),
        };

        Ok(IndirectObject::new(id, object))
    }

    /// Read exactly one value that ends at `end` (or end of input), as
    /// stored inside object streams.
    pub fn read_value_until(&mut self, end: Option<u64>) -> ParseResult<PdfObject> {
        self.reset_nesting();
        let start = self.position();
        let mut elements = Vec::new();

        loop {
            if let Some(end) = end {
                self.lexer.skip_whitespace()?;
                if self.lexer.position() >= end {
                    break;
                }
            }
            match self.read_object(true)? {
                Parsed::Object(obj) => elements.push(Element::Object(obj)),
                Parsed::Keyword(word, offset) => elements.push(Element::Keyword(word, offset)),
                Parsed::Terminator(token) if token.kind == TokenKind::Eof => break,
                Parsed::Terminator(token) => {
                    return Err(ParseError::UnexpectedToken {
                        position: token.offset,
                        expected: "object".to_string(),
                        found: token.kind.to_string(),
                    })
                }
            }
        }

        let items = collapse_references(elements)?;
        single_object(items, start)?.ok_or_else(|| ParseError::SyntaxError {
            position: start,
            message: "No object where one was expected".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parser(input: &[u8]) -> Parser<Cursor<Vec<u8>>> {
        Parser::new(Cursor::new(input.to_vec()), &ParseOptions::default())
    }

    fn object(input: &[u8]) -> PdfObject {
        match parser(input).read_object(false).unwrap() {
            Parsed::Object(obj) => obj,
            other => panic!("expected object, got {other:?}"),
        }
    }

    fn reference(num: u32, gen: u16) -> PdfObject {
        PdfObject::Reference(ObjectId::new(num, gen))
    }

    #[test]
    fn test_parse_simple_objects() {
        let mut parser = parser(b"null true false 123 -456 3.14 /Name (Hello) <414243>");
        let mut next = || match parser.read_object(false).unwrap() {
            Parsed::Object(obj) => obj,
            other => panic!("{other:?}"),
        };

        assert_eq!(next(), PdfObject::Null);
        assert_eq!(next(), PdfObject::Boolean(true));
        assert_eq!(next(), PdfObject::Boolean(false));
        assert_eq!(next(), PdfObject::Integer(123));
        assert_eq!(next(), PdfObject::Integer(-456));
        assert_eq!(next(), PdfObject::Real(3.14));
        assert_eq!(next(), PdfObject::Name(PdfName::new("Name")));
        assert_eq!(next(), PdfObject::String(PdfString(b"Hello".to_vec())));
        assert_eq!(next(), PdfObject::String(PdfString(b"ABC".to_vec())));
    }

    #[test]
    fn test_parse_array_with_references() {
        let obj = object(b"[1 2 0 R 3 4 5 R /Name]");
        let array = obj.as_array().unwrap();

        assert_eq!(
            array.0,
            vec![
                PdfObject::Integer(1),
                reference(2, 0),
                PdfObject::Integer(3),
                reference(4, 5),
                PdfObject::Name(PdfName::new("Name")),
            ]
        );
    }

    #[test]
    fn test_nested_containers_collapse_independently() {
        let obj = object(b"[[1 0 R] << /K 2 0 R >> 3 0 R]");
        let array = obj.as_array().unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array.get(0).unwrap().as_array().unwrap().0, vec![reference(1, 0)]);
        assert_eq!(
            array.get(1).unwrap().as_dict().unwrap().get("K"),
            Some(&reference(2, 0))
        );
        assert_eq!(array.get(2), Some(&reference(3, 0)));
    }

    #[test]
    fn test_parse_dictionary() {
        let obj = object(b"<< /Type /Page /Parent 1 0 R /MediaBox [0 0 612 792] >>");
        let dict = obj.as_dict().unwrap();

        assert_eq!(dict.get_type(), Some("Page"));
        assert_eq!(dict.get("Parent").unwrap().as_reference(), Some(ObjectId::new(1, 0)));
        assert_eq!(dict.get("MediaBox").unwrap().as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_dictionary_duplicate_key_later_wins() {
        let obj = object(b"<< /A 1 /A 2 >>");
        assert_eq!(obj.as_dict().unwrap().get("A"), Some(&PdfObject::Integer(2)));
    }

    #[test]
    fn test_comments_are_skipped() {
        let obj = object(b"% leading\n[1 % inside\n 2]");
        assert_eq!(obj.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_odd_dictionary_is_malformed() {
        let err = parser(b"<< /A 1 /B >>").read_object(false).unwrap_err();
        assert!(matches!(err, ParseError::OddDictionary { position: 0 }));
    }

    #[test]
    fn test_non_name_key_is_malformed() {
        let err = parser(b"<< 1 2 >>").read_object(false).unwrap_err();
        assert!(matches!(err, ParseError::InvalidDictionaryKey { .. }));
    }

    #[test]
    fn test_stray_closers() {
        let err = parser(b"]").read_object(true).unwrap_err();
        assert!(matches!(err, ParseError::UnbalancedNesting { position: 0 }));

        let err = parser(b">>").read_object(true).unwrap_err();
        assert!(matches!(err, ParseError::UnbalancedNesting { position: 0 }));

        let err = parser(b"<< /A [1 >> ]").read_object(false).unwrap_err();
        assert!(matches!(err, ParseError::UnbalancedNesting { position: 9 }));
    }

    #[test]
    fn test_unterminated_array() {
        let err = parser(b"[1 2").read_object(false).unwrap_err();
        assert!(matches!(err, ParseError::SyntaxError { position: 0, .. }));
    }

    #[test]
    fn test_dangling_r_is_malformed() {
        let err = parser(b"[/A R]").read_object(false).unwrap_err();
        assert!(matches!(err, ParseError::SyntaxError { .. }));

        let err = parser(b"[R]").read_object(false).unwrap_err();
        assert!(matches!(err, ParseError::SyntaxError { position: 1, .. }));
    }

    #[test]
    fn test_stray_keyword_in_array_is_malformed() {
        let err = parser(b"[1 foo]").read_object(false).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { position: 3, .. }));
    }

    #[test]
    fn test_keyword_at_top_level() {
        let mut p = parser(b"endobj");
        assert_eq!(
            p.read_object(true).unwrap(),
            Parsed::Keyword("endobj".to_string(), 0)
        );
        assert!(parser(b"endobj").read_object(false).is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let mut options = ParseOptions::default();
        options.max_nesting = 3;
        let mut p = Parser::new(Cursor::new(b"[[[[1]]]]".to_vec()), &options);
        let err = p.read_object(false).unwrap_err();
        assert!(matches!(err, ParseError::NestingTooDeep { depth: 4, .. }));
    }

    /// `depth` arrays nested around a dictionary, with a reference inside
    fn nested(depth: usize) -> Vec<u8> {
        let mut input = b"[".repeat(depth - 1);
        input.extend_from_slice(b"<< /Ref 7 0 R >>");
        input.extend(b"]".repeat(depth - 1));
        input
    }

    #[test]
    fn test_nesting_at_default_limit_on_worker_thread() {
        let limit = ParseOptions::default().max_nesting;
        let handle = std::thread::spawn(move || {
            let mut below = parser(&nested(limit - 1));
            let inner = match below.read_object(false) {
                Ok(Parsed::Object(obj)) => obj,
                other => return Err(format!("{other:?}")),
            };

            let mut above = parser(&nested(limit + 1));
            let err = above.read_object(false).map(|_| ()).unwrap_err();
            Ok((inner.as_array().is_some(), err))
        });

        let (is_array, err) = handle.join().expect("worker thread").unwrap();
        assert!(is_array);
        assert!(matches!(
            err,
            ParseError::NestingTooDeep { depth, .. } if depth == limit + 1
        ));
    }

    #[test]
    fn test_nesting_error_restores_depth() {
        let mut options = ParseOptions::default();
        options.max_nesting = 2;
        let mut p = Parser::new(Cursor::new(b"[[[1]]] [2]".to_vec()), &options);
        assert!(p.read_object(false).is_err());
        assert_eq!((p.array_depth, p.dict_depth), (0, 0));
    }

    #[test]
    fn test_unterminated_nested_dictionary() {
        let err = parser(b"[1 << /A [2] ").read_object(false).unwrap_err();
        assert!(matches!(
            err,
            ParseError::SyntaxError { position: 3, ref message } if message == "Unterminated dictionary"
        ));
    }

    #[test]
    fn test_deep_nesting_is_advisory() {
        let mut input = vec![b'['; 30];
        input.extend(vec![b']'; 30]);
        let mut p = parser(&input);
        p.read_object(false).unwrap();
        assert!(p.quirks().contains(Quirks::DEEP_NESTING));
        assert!(p.non_compliant());
    }

    #[test]
    fn test_large_array_is_advisory() {
        let mut input = b"[".to_vec();
        for _ in 0..8192 {
            input.extend_from_slice(b"0 ");
        }
        input.push(b']');
        let mut p = parser(&input);
        p.read_object(false).unwrap();
        assert!(p.quirks().contains(Quirks::LARGE_ARRAY));
    }

    #[test]
    fn test_read_indirect_definition() {
        let mut p = parser(b"7 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        let obj = p.read_indirect_definition().unwrap();
        assert_eq!(obj.id, ObjectId::new(7, 0));
        assert_eq!(obj.as_dict().unwrap().get_type(), Some("Catalog"));
        assert!(p.take_notes().is_empty());
    }

    #[test]
    fn test_indirect_definition_of_a_reference() {
        let mut p = parser(b"3 0 obj 9 0 R endobj");
        let obj = p.read_indirect_definition().unwrap();
        assert_eq!(obj.object, reference(9, 0));
    }

    #[test]
    fn test_empty_definition_is_null() {
        let obj = parser(b"3 0 obj endobj").read_indirect_definition().unwrap();
        assert!(obj.is_null());
    }

    #[test]
    fn test_stream_fusion() {
        let input = b"4 0 obj\n<< /Length 5 /Filter /FlateDecode >>\nstream\r\nHELLO\nendstream\nendobj";
        let obj = parser(input).read_indirect_definition().unwrap();
        let stream = obj.as_stream().unwrap();
        assert_eq!(stream.data_offset, 53);
        assert_eq!(stream.length, 5);
        assert_eq!(stream.filters, vec![PdfName::new("FlateDecode")]);
    }

    #[test]
    fn test_stream_without_dictionary() {
        let err = parser(b"4 0 obj 12 stream\nX\nendstream endobj")
            .read_indirect_definition()
            .unwrap_err();
        assert!(matches!(err, ParseError::SyntaxError { .. }));
    }

    #[test]
    fn test_missing_endobj_lenient() {
        let mut p = parser(b"1 0 obj << /A 1 >>\n2 0 obj << /B 2 >> endobj");
        let obj = p.read_indirect_definition().unwrap();
        assert_eq!(obj.as_dict().unwrap().get("A"), Some(&PdfObject::Integer(1)));
        assert!(p.quirks().contains(Quirks::MISSING_ENDOBJ));
        assert_eq!(
            p.take_notes(),
            vec![Note {
                id: DiagnosticId::MissingEndobj,
                offset: 0
            }]
        );
    }

    #[test]
    fn test_missing_endobj_strict() {
        let mut p = Parser::new(
            Cursor::new(b"1 0 obj << /A 1 >>\nxref".to_vec()),
            &ParseOptions::strict(),
        );
        let err = p.read_indirect_definition().unwrap_err();
        assert!(matches!(err, ParseError::MissingEndobj { position: 0 }));
    }

    #[test]
    fn test_definition_header_errors() {
        let err = parser(b"x 0 obj 1 endobj").read_indirect_definition().unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { position: 0, .. }));

        let err = parser(b"1 0 foo 1 endobj").read_indirect_definition().unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { position: 4, .. }));
    }

    #[test]
    fn test_two_values_in_definition() {
        let err = parser(b"1 0 obj 1 2 endobj").read_indirect_definition().unwrap_err();
        assert!(matches!(err, ParseError::SyntaxError { .. }));
    }

    #[test]
    fn test_read_value_until() {
        let mut p = parser(b"<< /A 1 >> 5 0 R [3]");
        let first = p.read_value_until(Some(11)).unwrap();
        assert!(first.as_dict().is_some());

        let second = p.read_value_until(Some(17)).unwrap();
        assert_eq!(second, reference(5, 0));

        let third = p.read_value_until(None).unwrap();
        assert_eq!(third.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_seek_resets_nesting() {
        let mut p = parser(b"[1 [2 <<");
        assert!(p.read_object(false).is_err());
        p.seek(0).unwrap();
        p.lexer_mut().next_token().unwrap();
        assert_eq!(p.read_object(false).unwrap(), Parsed::Object(PdfObject::Integer(1)));
    }
}
