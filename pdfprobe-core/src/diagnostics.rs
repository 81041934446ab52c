//! Diagnostics reported while characterizing a document
//!
//! Every finding carries a stable [`DiagnosticId`], a severity and the byte
//! offset it refers to. Messages come from an immutable [`MessageCatalog`]
//! built once per process and shared by reference.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

use crate::parser::ParseError;

/// How a finding affects the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    /// Grammar violation; the document is not well-formed
    Malformed,
    /// Semantically wrong; the document is well-formed but not valid
    Invalid,
    /// Note without effect on either flag
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Malformed => write!(f, "malformed"),
            Severity::Invalid => write!(f, "invalid"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Stable identifiers for every finding the core can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticId {
    MissingHeader,
    UnsupportedVersion,
    Lexical,
    UnexpectedToken,
    UnbalancedNesting,
    OddDictionary,
    InvalidDictionaryKey,
    MissingEndobj,
    TruncatedStream,
    NestingTooDeep,
    MissingEof,
    MissingStartXRef,
    InvalidStartXRef,
    TrailerCycle,
    MissingRoot,
    InvalidTrailer,
    MissingTrailerKey,
    UnexpectedXRefToken,
    CorruptSubsection,
    RecordWidth,
    CompressedIndexOutOfRange,
    EntryBeyondSize,
    InvalidXRefStream,
    InvalidFreeListHead,
    ObjectMismatch,
    RecursionLimit,
    UnresolvableRoot,
    StreamDecode,
    InvalidObjectStream,
    StreamLengthMismatch,
    InvalidCatalog,
    InvalidInfo,
    RecursiveStructure,
    MissingPages,
    InvalidPageNode,
    MissingKids,
    MissingMediaBox,
    InvalidRectangle,
    InvalidRotate,
    PageCountMismatch,
    InvalidOutlineItem,
    Encrypted,
    ProfileNonCompliance,
    IoError,
}

impl DiagnosticId {
    pub const ALL: [DiagnosticId; 44] = [
        DiagnosticId::MissingHeader,
        DiagnosticId::UnsupportedVersion,
        DiagnosticId::Lexical,
        DiagnosticId::UnexpectedToken,
        DiagnosticId::UnbalancedNesting,
        DiagnosticId::OddDictionary,
        DiagnosticId::InvalidDictionaryKey,
        DiagnosticId::MissingEndobj,
        DiagnosticId::TruncatedStream,
        DiagnosticId::NestingTooDeep,
        DiagnosticId::MissingEof,
        DiagnosticId::MissingStartXRef,
        DiagnosticId::InvalidStartXRef,
        DiagnosticId::TrailerCycle,
        DiagnosticId::MissingRoot,
        DiagnosticId::InvalidTrailer,
        DiagnosticId::MissingTrailerKey,
        DiagnosticId::UnexpectedXRefToken,
        DiagnosticId::CorruptSubsection,
        DiagnosticId::RecordWidth,
        DiagnosticId::CompressedIndexOutOfRange,
        DiagnosticId::EntryBeyondSize,
        DiagnosticId::InvalidXRefStream,
        DiagnosticId::InvalidFreeListHead,
        DiagnosticId::ObjectMismatch,
        DiagnosticId::RecursionLimit,
        DiagnosticId::UnresolvableRoot,
        DiagnosticId::StreamDecode,
        DiagnosticId::InvalidObjectStream,
        DiagnosticId::StreamLengthMismatch,
        DiagnosticId::InvalidCatalog,
        DiagnosticId::InvalidInfo,
        DiagnosticId::RecursiveStructure,
        DiagnosticId::MissingPages,
        DiagnosticId::InvalidPageNode,
        DiagnosticId::MissingKids,
        DiagnosticId::MissingMediaBox,
        DiagnosticId::InvalidRectangle,
        DiagnosticId::InvalidRotate,
        DiagnosticId::PageCountMismatch,
        DiagnosticId::InvalidOutlineItem,
        DiagnosticId::Encrypted,
        DiagnosticId::ProfileNonCompliance,
        DiagnosticId::IoError,
    ];

    /// Stable code used in reports and regression tests
    pub fn code(self) -> &'static str {
        MessageCatalog::standard().entry(self).code
    }

    /// Severity the finding carries unless a policy overrides it
    pub fn default_severity(self) -> Severity {
        MessageCatalog::standard().entry(self).severity
    }
}

impl fmt::Display for DiagnosticId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for DiagnosticId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// One catalog row
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub code: &'static str,
    pub severity: Severity,
    pub message: &'static str,
}

/// Immutable message table
#[derive(Debug)]
pub struct MessageCatalog {
    entries: HashMap<DiagnosticId, CatalogEntry>,
}

const UNKNOWN_ENTRY: CatalogEntry = CatalogEntry {
    code: "PDF-UNK-0",
    severity: Severity::Malformed,
    message: "Unclassified problem",
};

lazy_static! {
    static ref STANDARD_CATALOG: MessageCatalog = MessageCatalog::build();
}

impl MessageCatalog {
    /// The process-wide catalog
    pub fn standard() -> &'static MessageCatalog {
        &STANDARD_CATALOG
    }

    fn build() -> Self {
        use DiagnosticId::*;
        use Severity::*;

        let rows: [(DiagnosticId, &'static str, Severity, &'static str); 44] = [
            (MissingHeader, "PDF-HDR-1", Malformed, "No PDF header in the first 1024 bytes"),
            (UnsupportedVersion, "PDF-HDR-2", Invalid, "Unsupported PDF version"),
            (Lexical, "PDF-SYN-1", Malformed, "Lexical error"),
            (UnexpectedToken, "PDF-SYN-2", Malformed, "Unexpected token"),
            (UnbalancedNesting, "PDF-SYN-3", Malformed, "Unbalanced array or dictionary delimiter"),
            (OddDictionary, "PDF-SYN-4", Malformed, "Dictionary has an odd number of elements"),
            (InvalidDictionaryKey, "PDF-SYN-5", Malformed, "Dictionary key is not a name"),
            (MissingEndobj, "PDF-SYN-6", Malformed, "Indirect object is not closed by endobj"),
            (TruncatedStream, "PDF-SYN-7", Malformed, "Stream is not terminated by endstream"),
            (NestingTooDeep, "PDF-SYN-8", Malformed, "Arrays and dictionaries nested too deeply"),
            (MissingEof, "PDF-TRL-1", Malformed, "No %%EOF marker in the final 1024 bytes"),
            (MissingStartXRef, "PDF-TRL-2", Malformed, "No startxref keyword before %%EOF"),
            (InvalidStartXRef, "PDF-TRL-3", Malformed, "Cross-reference offset cannot be read"),
            (TrailerCycle, "PDF-TRL-4", Malformed, "Trailer chain revisits an offset"),
            (MissingRoot, "PDF-TRL-5", Invalid, "Trailer has no /Root entry"),
            (InvalidTrailer, "PDF-TRL-6", Malformed, "Trailer dictionary is malformed"),
            (MissingTrailerKey, "PDF-TRL-7", Invalid, "Trailer is missing a required key"),
            (UnexpectedXRefToken, "PDF-XREF-1", Malformed, "Unexpected token at cross-reference offset"),
            (CorruptSubsection, "PDF-XREF-2", Invalid, "Corrupt cross-reference subsection"),
            (RecordWidth, "PDF-XREF-3", Invalid, "Cross-reference record is not 20 bytes wide"),
            (CompressedIndexOutOfRange, "PDF-XREF-4", Malformed, "Compressed index out of range"),
            (EntryBeyondSize, "PDF-XREF-5", Invalid, "Cross-reference entry beyond declared size"),
            (InvalidXRefStream, "PDF-XREF-6", Malformed, "Cross-reference stream is malformed"),
            (InvalidFreeListHead, "PDF-XREF-7", Invalid, "Object 0 is not the head of the free list"),
            (ObjectMismatch, "PDF-OBJ-1", Malformed, "Object at offset does not match its reference"),
            (RecursionLimit, "PDF-OBJ-2", Malformed, "Recursion limit reached while resolving"),
            (UnresolvableRoot, "PDF-OBJ-3", Malformed, "Document catalog cannot be resolved"),
            (StreamDecode, "PDF-OBJ-4", Invalid, "Stream cannot be decoded"),
            (InvalidObjectStream, "PDF-OBJ-5", Malformed, "Object stream is malformed"),
            (StreamLengthMismatch, "PDF-OBJ-6", Invalid, "Stream /Length does not match its data"),
            (InvalidCatalog, "PDF-DOC-1", Invalid, "Document catalog is not a Catalog dictionary"),
            (InvalidInfo, "PDF-DOC-2", Invalid, "Document information entry is not a dictionary"),
            (RecursiveStructure, "PDF-TREE-1", Info, "Recursive structure"),
            (MissingPages, "PDF-TREE-2", Invalid, "Catalog has no page tree"),
            (InvalidPageNode, "PDF-TREE-3", Invalid, "Page tree node has an invalid type"),
            (MissingKids, "PDF-TREE-4", Invalid, "Pages node has no /Kids array"),
            (MissingMediaBox, "PDF-TREE-5", Invalid, "Page has no effective /MediaBox"),
            (InvalidRectangle, "PDF-TREE-6", Invalid, "Page box is not a rectangle"),
            (InvalidRotate, "PDF-TREE-7", Invalid, "Page /Rotate is not a multiple of 90"),
            (PageCountMismatch, "PDF-TREE-8", Invalid, "Page tree /Count does not match its leaves"),
            (InvalidOutlineItem, "PDF-OUT-1", Invalid, "Outline item is malformed"),
            (Encrypted, "PDF-ENC-1", Info, "Document is encrypted"),
            (ProfileNonCompliance, "PDF-ADV-1", Info, "Document exceeds archival profile limits"),
            (IoError, "PDF-IO-1", Malformed, "Input could not be read"),
        ];

        let entries = rows
            .into_iter()
            .map(|(id, code, severity, message)| {
                (
                    id,
                    CatalogEntry {
                        code,
                        severity,
                        message,
                    },
                )
            })
            .collect();

        Self { entries }
    }

    pub fn entry(&self, id: DiagnosticId) -> &CatalogEntry {
        self.entries.get(&id).unwrap_or(&UNKNOWN_ENTRY)
    }

    pub fn message(&self, id: DiagnosticId) -> &'static str {
        self.entry(id).message
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single finding
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Diagnostic {
    pub id: DiagnosticId,
    pub severity: Severity,
    pub message: String,
    pub sub_message: Option<String>,
    pub offset: Option<u64>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.id, self.severity, self.message)?;
        if let Some(sub) = &self.sub_message {
            write!(f, " ({sub})")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " at offset {offset}")?;
        }
        Ok(())
    }
}

/// Collector owned by one parse session
#[derive(Debug)]
pub struct Diagnostics {
    catalog: &'static MessageCatalog,
    entries: Vec<Diagnostic>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::with_catalog(MessageCatalog::standard())
    }

    pub fn with_catalog(catalog: &'static MessageCatalog) -> Self {
        Self {
            catalog,
            entries: Vec::new(),
        }
    }

    /// Record a finding with the catalog's default severity
    pub fn report(&mut self, id: DiagnosticId, sub_message: Option<String>, offset: Option<u64>) {
        let severity = self.catalog.entry(id).severity;
        self.report_as(id, severity, sub_message, offset);
    }

    pub fn report_as(
        &mut self,
        id: DiagnosticId,
        severity: Severity,
        sub_message: Option<String>,
        offset: Option<u64>,
    ) {
        let message = self.catalog.message(id);
        tracing::debug!(code = id.code(), %severity, ?offset, "{message}");
        self.entries.push(Diagnostic {
            id,
            severity,
            message: message.to_string(),
            sub_message,
            offset,
        });
    }

    /// Record an error that stopped a stage of the parse
    pub fn report_error(&mut self, err: &ParseError) {
        let sub_message = match err {
            ParseError::Io(e) => Some(e.to_string()),
            other => Some(other.to_string()),
        };
        self.report_as(
            err.diagnostic_id(),
            Severity::Malformed,
            sub_message,
            err.position(),
        );
    }

    pub fn has_malformed(&self) -> bool {
        self.entries
            .iter()
            .any(|d| d.severity == Severity::Malformed)
    }

    pub fn has_invalid(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Invalid)
    }

    pub fn count(&self, id: DiagnosticId) -> usize {
        self.entries.iter().filter(|d| d.id == id).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
