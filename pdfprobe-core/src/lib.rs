//! # pdfprobe
//!
//! PDF characterization and validation core.
//!
//! Given the bytes of a document, the crate decides whether it is
//! *well-formed* (follows the file grammar) and *valid* (semantically
//! consistent), and explains why not through stable diagnostics. It is built
//! to survive hostile input: every recursive structure in the format is
//! walked with an explicit budget or a visited set.
//!
//! ## Layers
//!
//! - [`parser::lexer`]: tokenizer over any seekable byte source
//! - [`parser::object_parser`]: objects, with postfix `N G R` references
//! - [`parser::xref`]: trailer chain and merged cross-reference table
//!   (classic tables, cross-reference streams, hybrid files)
//! - [`parser::graph`]: lazily resolved, memoized object graph, including
//!   objects stored in object streams
//! - [`parser::page_tree`] and [`parser::outline`]: cycle-safe tree walks
//! - [`diagnostics`]: identifiers, severities and the message catalog
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfprobe::parse_path;
//!
//! # fn main() -> pdfprobe::Result<()> {
//! let report = parse_path("document.pdf")?;
//! println!("well-formed: {}, valid: {}", report.well_formed, report.valid);
//! for diagnostic in &report.diagnostics {
//!     println!("{diagnostic}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Encrypted documents are characterized but never decrypted; their
//! encryption parameters are reported in [`ParseReport::encryption`].

pub mod diagnostics;
pub mod error;
pub mod parser;
pub mod source;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub use diagnostics::{Diagnostic, DiagnosticId, Diagnostics, MessageCatalog, Severity};
pub use error::{PdfError, Result};
pub use parser::encryption::EncryptionInfo;
pub use parser::{
    parse, parse_with_options, ParseError, ParseOptions, ParseReport, PdfVersion,
    SubsectionPolicy,
};
pub use source::{fetch, AbortFlag, ByteSource};

/// Current version of pdfprobe
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Characterize the file at `path` with default options
pub fn parse_path<P: AsRef<Path>>(path: P) -> Result<ParseReport> {
    parse_path_with_options(path, &ParseOptions::default())
}

/// Characterize the file at `path`. Only opening the file can fail; problems
/// inside the document are reported in the returned report.
pub fn parse_path_with_options<P: AsRef<Path>>(
    path: P,
    options: &ParseOptions,
) -> Result<ParseReport> {
    let path = path.as_ref();
    let file = File::open(path)?;
    tracing::debug!(path = %path.display(), "opened");
    Ok(parse_with_options(BufReader::new(file), options))
}
