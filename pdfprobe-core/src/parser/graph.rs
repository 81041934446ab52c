//! Object Graph
//!
//! Lazily resolved, memoized view over the merged cross-reference table.
//! Objects are read on first reference and cached in an arena keyed by
//! object number; every later reference to the same object returns the same
//! `Rc`. Compressed objects are read through one active object stream at a
//! time.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use super::filters;
use super::lexer::Quirks;
use super::object_parser::{Note, Parser};
use super::object_stream::ObjectStream;
use super::objects::{IndirectObject, ObjectId, PdfObject, PdfStream, Resolved};
use super::stack_safe::StackSafeContext;
use super::trailer::{Trailer, TrailerChain};
use super::xref::{XRefEntry, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use crate::diagnostics::{DiagnosticId, Diagnostics, Severity};
use crate::source::ByteSource;

pub struct ObjectGraph<R> {
    parser: Parser<R>,
    xref: XRefTable,
    trailers: TrailerChain,
    arena: HashMap<u32, Rc<IndirectObject>>,
    container: Option<ObjectStream>,
    budget: StackSafeContext,
    options: ParseOptions,
    diagnostics: Diagnostics,
    encrypted: bool,
    languages: BTreeSet<String>,
    quirks: Quirks,
}

impl<R: ByteSource> ObjectGraph<R> {
    pub fn new(
        parser: Parser<R>,
        xref: XRefTable,
        trailers: TrailerChain,
        diagnostics: Diagnostics,
        options: &ParseOptions,
    ) -> Self {
        let encrypted = trailers.iter().any(Trailer::is_encrypted);
        Self {
            parser,
            xref,
            trailers,
            arena: HashMap::new(),
            container: None,
            budget: StackSafeContext::new(options.max_resolve_depth),
            options: options.clone(),
            diagnostics,
            encrypted,
            languages: BTreeSet::new(),
            quirks: Quirks::empty(),
        }
    }

    pub fn table(&self) -> &XRefTable {
        &self.xref
    }

    pub fn trailers(&self) -> &TrailerChain {
        &self.trailers
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    /// Objects resolved so far
    pub fn cached_count(&self) -> usize {
        self.arena.len()
    }

    fn null(id: ObjectId) -> Rc<IndirectObject> {
        Rc::new(IndirectObject::new(id, PdfObject::Null))
    }

    /// Resolve an indirect object by identity. Free entries, unknown numbers
    /// and generation mismatches yield the null object.
    pub fn get_object(&mut self, id: ObjectId) -> ParseResult<Rc<IndirectObject>> {
        if let Some(cached) = self.arena.get(&id.number) {
            if cached.id.generation == id.generation {
                return Ok(Rc::clone(cached));
            }
            tracing::debug!(object = %id, cached = %cached.id, "generation mismatch");
            return Ok(Self::null(id));
        }

        let entry = match self.xref.get(id.number) {
            Some(entry) if id.number < self.xref.size() => *entry,
            _ => {
                tracing::debug!(object = %id, "object not in cross-reference table");
                return Ok(Self::null(id));
            }
        };

        let loaded = match entry {
            XRefEntry::Free { .. } => {
                tracing::debug!(object = %id, "reference to free object");
                None
            }
            _ if entry.generation() != id.generation => {
                tracing::debug!(object = %id, expected = entry.generation(), "generation mismatch");
                None
            }
            XRefEntry::Offset { offset, .. } => {
                self.budget.enter()?;
                let result = self.load_at(id, offset);
                self.budget.exit();
                Some(result?)
            }
            XRefEntry::Compressed { container, index } => {
                self.budget.enter()?;
                let result = self.load_compressed(id, container, index);
                self.budget.exit();
                result?
            }
        };

        let Some(object) = loaded else {
            return Ok(Self::null(id));
        };
        let object = Rc::new(object);
        self.arena.insert(id.number, Rc::clone(&object));
        tracing::debug!(object = %id, kind = object.type_name(), "resolved");

        if let PdfObject::Stream(stream) = &object.object {
            self.check_stream_length(id, stream);
        }
        Ok(object)
    }

    /// Follow references until a non-reference object is reached. Direct
    /// objects are handed back unchanged.
    pub fn resolve<'a>(&mut self, obj: &'a PdfObject) -> ParseResult<Resolved<'a>> {
        let PdfObject::Reference(id) = obj else {
            return Ok(Resolved::Direct(obj));
        };

        let mut current = self.get_object(*id)?;
        let mut hops = 0;
        while let PdfObject::Reference(next) = current.object {
            hops += 1;
            if hops > self.budget.max_depth() {
                return Err(ParseError::RecursionLimit {
                    depth: self.budget.max_depth(),
                });
            }
            current = self.get_object(next)?;
        }
        Ok(Resolved::Indirect(current))
    }

    /// Raw, still encoded bytes of a stream
    pub fn stream_data(&mut self, stream: &PdfStream) -> ParseResult<Vec<u8>> {
        self.parser
            .lexer_mut()
            .read_range(stream.data_offset, stream.length)
    }

    /// Stream bytes with the filter chain applied. Refused for encrypted
    /// documents.
    pub fn decode_stream(&mut self, stream: &PdfStream) -> ParseResult<Vec<u8>> {
        if self.encrypted {
            return Err(ParseError::Encrypted);
        }
        let raw = self.stream_data(stream)?;
        let filter = match stream.dict.get("Filter") {
            Some(obj) => Some(self.resolve(obj)?.into_owned()),
            None => None,
        };
        let parms = match stream.dict.get("DecodeParms") {
            Some(obj) => Some(self.resolve(obj)?.into_owned()),
            None => None,
        };
        filters::decode_stream(&raw, filter.as_ref(), parms.as_ref())
    }

    fn load_at(&mut self, id: ObjectId, offset: u64) -> ParseResult<IndirectObject> {
        self.parser.seek(offset)?;
        let object = self.parser.read_indirect_definition()?;
        let notes = self.parser.take_notes();
        self.record_notes(notes);

        if object.id != id {
            return Err(ParseError::ObjectMismatch {
                position: offset,
                expected: id,
                found: object.id,
            });
        }
        Ok(object)
    }

    fn load_compressed(
        &mut self,
        id: ObjectId,
        container: u32,
        index: u32,
    ) -> ParseResult<Option<IndirectObject>> {
        if self.container.as_ref().map(ObjectStream::container) != Some(container) {
            if self.encrypted {
                tracing::debug!(object = %id, container, "object stream of an encrypted document");
                return Ok(None);
            }

            let holder = self.get_object(ObjectId::new(container, 0))?;
            let stream = holder
                .as_stream()
                .ok_or_else(|| ParseError::InvalidObjectStream {
                    container,
                    message: format!("container is {}", holder.type_name()),
                })?;
            let data = self.decode_stream(stream)?;
            let decoded = ObjectStream::parse(container, &stream.dict, data, &self.options)?;

            self.release_container();
            self.container = Some(decoded);
        }

        let Some(active) = self.container.as_mut() else {
            return Ok(None);
        };
        let object = active.get(index, id.number)?;
        let notes = active.take_notes();
        self.record_notes(notes);
        Ok(Some(IndirectObject::new(id, object)))
    }

    /// Fold the advisory state of the active container into the graph
    fn release_container(&mut self) {
        if let Some(mut previous) = self.container.take() {
            self.quirks |= previous.quirks();
            self.languages.extend(previous.languages().iter().cloned());
            let notes = previous.take_notes();
            self.record_notes(notes);
            tracing::debug!(container = previous.container(), "released object stream");
        }
    }

    fn record_notes(&mut self, notes: Vec<Note>) {
        for note in notes {
            self.diagnostics
                .report_as(note.id, Severity::Info, None, Some(note.offset));
        }
    }

    fn check_stream_length(&mut self, id: ObjectId, stream: &PdfStream) {
        let declared = match stream.dict.get("Length") {
            Some(PdfObject::Integer(length)) => Some(*length),
            Some(obj @ PdfObject::Reference(_)) => match self.resolve(obj) {
                Ok(resolved) => resolved.as_integer(),
                Err(err) => {
                    tracing::debug!(object = %id, %err, "stream /Length unresolved");
                    None
                }
            },
            _ => None,
        };

        match declared {
            Some(length) if length >= 0 && length as u64 == stream.length => {}
            Some(length) => {
                tracing::warn!(object = %id, declared = length, actual = stream.length, "stream length mismatch");
                self.diagnostics.report(
                    DiagnosticId::StreamLengthMismatch,
                    Some(format!(
                        "object {id}: /Length {length}, data is {} bytes",
                        stream.length
                    )),
                    Some(stream.data_offset),
                );
            }
            None => self.diagnostics.report(
                DiagnosticId::StreamLengthMismatch,
                Some(format!("object {id}: /Length is missing or not an integer")),
                Some(stream.data_offset),
            ),
        }
    }

    /// Quirks seen so far, across the file and every object stream
    pub fn quirks(&self) -> Quirks {
        let mut quirks = self.quirks | self.parser.quirks();
        if let Some(active) = &self.container {
            quirks |= active.quirks();
        }
        quirks
    }

    /// Language tags found in UTF-16 strings so far
    pub fn languages(&self) -> BTreeSet<String> {
        let mut languages = self.languages.clone();
        languages.extend(self.parser.lexer().languages().iter().cloned());
        if let Some(active) = &self.container {
            languages.extend(active.languages().iter().cloned());
        }
        languages
    }

    pub fn into_diagnostics(mut self) -> Diagnostics {
        self.release_container();
        self.diagnostics
    }
}
