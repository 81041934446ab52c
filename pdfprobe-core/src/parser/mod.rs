//! PDF Parser Module
//!
//! This module implements the structural layers of a PDF reader according to
//! ISO 32000-1 (PDF 1.7) and ISO 32000-2 (PDF 2.0): tokenizer, object parser,
//! cross-reference resolution, the lazily resolved object graph and the
//! page and outline tree walkers.

pub mod document;
pub mod encryption;
pub mod filters;
pub mod graph;
pub mod header;
pub mod lexer;
pub mod object_parser;
pub mod object_stream;
pub mod objects;
pub mod outline;
pub mod page_tree;
pub mod stack_safe;
pub mod trailer;
pub mod xref;
pub mod xref_stream;

#[cfg(test)]
pub(crate) mod test_helpers;

use crate::diagnostics::DiagnosticId;

pub use self::document::{parse, parse_with_options, ParseReport};
pub use self::graph::ObjectGraph;
pub use self::header::{PdfHeader, PdfVersion};
pub use self::lexer::{Lexer, Quirks, Token, TokenKind};
pub use self::object_parser::{Parsed, Parser};
pub use self::objects::{
    IndirectObject, ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString,
    Resolved,
};
pub use self::outline::{OutlineItem, OutlineWalker};
pub use self::page_tree::{NodeKind, PageNode, PageWalker};
pub use self::trailer::{SectionKind, Trailer, TrailerChain};
pub use self::xref::{XRefEntry, XRefResolver, XRefSection, XRefTable};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: u64, message: String },

    #[error("Unexpected token at position {position}: expected {expected}, found {found}")]
    UnexpectedToken {
        position: u64,
        expected: String,
        found: String,
    },

    #[error("Unbalanced delimiter at position {position}")]
    UnbalancedNesting { position: u64 },

    #[error("Dictionary at position {position} has an odd number of elements")]
    OddDictionary { position: u64 },

    #[error("Dictionary key at position {position} is not a name")]
    InvalidDictionaryKey { position: u64 },

    #[error("Nesting depth {depth} exceeded at position {position}")]
    NestingTooDeep { position: u64, depth: usize },

    #[error("Missing endobj for object defined at position {position}")]
    MissingEndobj { position: u64 },

    #[error("Stream at position {position} is not terminated by endstream")]
    TruncatedStream { position: u64 },

    #[error("No %%EOF marker near the end of the file")]
    MissingEof,

    #[error("No startxref keyword before %%EOF")]
    MissingStartXRef,

    #[error("Cross-reference offset {position} cannot be read")]
    InvalidStartXRef { position: u64 },

    #[error("Unexpected token at cross-reference offset {position}: {found}")]
    UnexpectedXRefToken { position: u64, found: String },

    #[error("Corrupt cross-reference subsection at position {position}: {message}")]
    CorruptSubsection { position: u64, message: String },

    #[error("Invalid cross-reference stream at position {position}: {message}")]
    InvalidXRefStream { position: u64, message: String },

    #[error("Invalid trailer at position {position}: {message}")]
    InvalidTrailer { position: u64, message: String },

    #[error("Trailer chain revisits offset {position}")]
    TrailerCycle { position: u64 },

    #[error("Compressed index out of range: container {container} >= size {size}")]
    CompressedIndexOutOfRange {
        position: u64,
        container: u32,
        size: u32,
    },

    #[error("Expected object {expected}, found {found}")]
    ObjectMismatch {
        position: u64,
        expected: ObjectId,
        found: ObjectId,
    },

    #[error("Recursion limit of {depth} reached")]
    RecursionLimit { depth: usize },

    #[error("Invalid object stream {container}: {message}")]
    InvalidObjectStream { container: u32, message: String },

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Document is encrypted")]
    Encrypted,
}

impl ParseError {
    /// Diagnostic identifier this error is reported under
    pub fn diagnostic_id(&self) -> DiagnosticId {
        match self {
            ParseError::Io(_) => DiagnosticId::IoError,
            ParseError::InvalidHeader => DiagnosticId::MissingHeader,
            ParseError::SyntaxError { .. } => DiagnosticId::Lexical,
            ParseError::UnexpectedToken { .. } => DiagnosticId::UnexpectedToken,
            ParseError::UnbalancedNesting { .. } => DiagnosticId::UnbalancedNesting,
            ParseError::OddDictionary { .. } => DiagnosticId::OddDictionary,
            ParseError::InvalidDictionaryKey { .. } => DiagnosticId::InvalidDictionaryKey,
            ParseError::NestingTooDeep { .. } => DiagnosticId::NestingTooDeep,
            ParseError::MissingEndobj { .. } => DiagnosticId::MissingEndobj,
            ParseError::TruncatedStream { .. } => DiagnosticId::TruncatedStream,
            ParseError::MissingEof => DiagnosticId::MissingEof,
            ParseError::MissingStartXRef => DiagnosticId::MissingStartXRef,
            ParseError::InvalidStartXRef { .. } => DiagnosticId::InvalidStartXRef,
            ParseError::UnexpectedXRefToken { .. } => DiagnosticId::UnexpectedXRefToken,
            ParseError::CorruptSubsection { .. } => DiagnosticId::CorruptSubsection,
            ParseError::InvalidXRefStream { .. } => DiagnosticId::InvalidXRefStream,
            ParseError::InvalidTrailer { .. } => DiagnosticId::InvalidTrailer,
            ParseError::TrailerCycle { .. } => DiagnosticId::TrailerCycle,
            ParseError::CompressedIndexOutOfRange { .. } => {
                DiagnosticId::CompressedIndexOutOfRange
            }
            ParseError::ObjectMismatch { .. } => DiagnosticId::ObjectMismatch,
            ParseError::RecursionLimit { .. } => DiagnosticId::RecursionLimit,
            ParseError::InvalidObjectStream { .. } => DiagnosticId::InvalidObjectStream,
            ParseError::StreamDecodeError(_) => DiagnosticId::StreamDecode,
            ParseError::Encrypted => DiagnosticId::Encrypted,
        }
    }

    /// Byte offset the error refers to, when known
    pub fn position(&self) -> Option<u64> {
        match self {
            ParseError::SyntaxError { position, .. }
            | ParseError::UnexpectedToken { position, .. }
            | ParseError::UnbalancedNesting { position }
            | ParseError::OddDictionary { position }
            | ParseError::InvalidDictionaryKey { position }
            | ParseError::NestingTooDeep { position, .. }
            | ParseError::MissingEndobj { position }
            | ParseError::TruncatedStream { position }
            | ParseError::InvalidStartXRef { position }
            | ParseError::UnexpectedXRefToken { position, .. }
            | ParseError::CorruptSubsection { position, .. }
            | ParseError::InvalidXRefStream { position, .. }
            | ParseError::InvalidTrailer { position, .. }
            | ParseError::TrailerCycle { position }
            | ParseError::CompressedIndexOutOfRange { position, .. }
            | ParseError::ObjectMismatch { position, .. } => Some(*position),
            _ => None,
        }
    }
}

/// What to do when a classic cross-reference subsection cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsectionPolicy {
    /// Keep the entries read so far, mark the document invalid, and resume
    /// at the `trailer` keyword
    #[default]
    Degrade,
    /// Treat the subsection as a grammar violation and stop resolution
    Abort,
}

/// Options controlling limits and recovery behaviour
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Budget for chained resolution (references to references, object
    /// streams stored in object streams)
    pub max_resolve_depth: usize,
    /// Maximum array/dictionary nesting accepted by the parser
    pub max_nesting: usize,
    /// Upper bound on a single token while resynchronizing
    pub max_token_bytes: usize,
    /// Recovery policy for corrupt classic subsections
    pub corrupt_subsection: SubsectionPolicy,
    /// Accept indirect objects that are not closed by `endobj`
    pub lenient: bool,
    /// Walk the page tree
    pub walk_pages: bool,
    /// Walk the outline tree
    pub walk_outlines: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_resolve_depth: 30,
            max_nesting: 512,
            max_token_bytes: 64 * 1024,
            corrupt_subsection: SubsectionPolicy::Degrade,
            lenient: true,
            walk_pages: true,
            walk_outlines: true,
        }
    }
}

impl ParseOptions {
    /// Every recoverable deviation becomes a grammar violation
    pub fn strict() -> Self {
        Self {
            corrupt_subsection: SubsectionPolicy::Abort,
            lenient: false,
            ..Self::default()
        }
    }

    /// Recover wherever the format allows it
    pub fn lenient() -> Self {
        Self::default()
    }

    pub fn with_max_resolve_depth(mut self, depth: usize) -> Self {
        self.max_resolve_depth = depth;
        self
    }

    pub fn with_corrupt_subsection(mut self, policy: SubsectionPolicy) -> Self {
        self.corrupt_subsection = policy;
        self
    }

    pub fn with_page_walk(mut self, enabled: bool) -> Self {
        self.walk_pages = enabled;
        self
    }

    pub fn with_outline_walk(mut self, enabled: bool) -> Self {
        self.walk_outlines = enabled;
        self
    }
}
