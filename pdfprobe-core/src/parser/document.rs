//! PDF Document Session
//!
//! Runs one characterization from raw bytes to a [`ParseReport`]:
//!
//! 1. header check (`%PDF-x.y` within the first 1024 bytes)
//! 2. cross-reference resolution over the whole trailer chain
//! 3. catalog, information dictionary and encryption parameters
//! 4. page tree and outline walks
//!
//! A stage that fails with a grammar violation is reported and ends the
//! session; everything found up to that point stays in the report.
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//!
//! let report = pdfprobe::parse(Cursor::new(b"not a pdf".to_vec()));
//! assert!(!report.well_formed);
//! assert_eq!(report.diagnostics[0].id.code(), "PDF-HDR-1");
//! ```

use std::collections::BTreeSet;
use std::rc::Rc;

use super::encryption::EncryptionInfo;
use super::graph::ObjectGraph;
use super::header::{PdfHeader, PdfVersion, HEADER_WINDOW};
use super::lexer::Quirks;
use super::object_parser::Parser;
use super::objects::{IndirectObject, PdfObject};
use super::outline::OutlineWalker;
use super::page_tree::{NodeKind, PageWalker};
use super::xref::XRefResolver;
use super::{ParseOptions, ParseResult};
use crate::diagnostics::{Diagnostic, DiagnosticId, Diagnostics};
use crate::source::ByteSource;

/// Everything a session found out about one document
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParseReport {
    /// No grammar violation was found
    pub well_formed: bool,
    /// Well-formed and no semantic violation was found
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub version: Option<PdfVersion>,
    /// In-use entries of the merged cross-reference table
    pub object_count: usize,
    pub free_object_count: usize,
    pub incremental_updates: usize,
    /// First half of the trailer `/ID`, in lowercase hex
    pub document_id: Option<String>,
    /// Leaves reached by the page tree walk
    pub page_count: Option<usize>,
    pub outline_items: Option<usize>,
    pub encryption: Option<EncryptionInfo>,
    /// Language tags embedded in UTF-16 strings
    pub languages: BTreeSet<String>,
    /// Advisory: the document exceeds archival profile limits
    pub non_compliant: bool,
}

impl ParseReport {
    /// `(well_formed, valid, diagnostics)`
    pub fn outcome(&self) -> (bool, bool, &[Diagnostic]) {
        (self.well_formed, self.valid, &self.diagnostics)
    }

    pub fn has(&self, id: DiagnosticId) -> bool {
        self.diagnostics.iter().any(|d| d.id == id)
    }

    /// Stable codes of every diagnostic, in report order
    pub fn codes(&self) -> Vec<&'static str> {
        self.diagnostics.iter().map(|d| d.id.code()).collect()
    }

    fn seal(
        mut self,
        mut diagnostics: Diagnostics,
        quirks: Quirks,
        languages: BTreeSet<String>,
    ) -> Self {
        if !quirks.is_empty() {
            diagnostics.report(
                DiagnosticId::ProfileNonCompliance,
                Some(format!("{quirks:?}")),
                None,
            );
            self.non_compliant = true;
        }
        self.languages = languages;
        self.well_formed = !diagnostics.has_malformed();
        self.valid = self.well_formed && !diagnostics.has_invalid();
        self.diagnostics = diagnostics.into_vec();

        tracing::debug!(
            well_formed = self.well_formed,
            valid = self.valid,
            diagnostics = self.diagnostics.len(),
            "session finished"
        );
        self
    }
}

/// Characterize a document with default options
pub fn parse<R: ByteSource>(source: R) -> ParseReport {
    parse_with_options(source, &ParseOptions::default())
}

/// Characterize a document. Never fails: every problem, I/O included, ends
/// up in the report's diagnostics.
pub fn parse_with_options<R: ByteSource>(source: R, options: &ParseOptions) -> ParseReport {
    let span = tracing::debug_span!("parse");
    let _enter = span.enter();

    let mut report = ParseReport::default();
    let mut diagnostics = Diagnostics::new();
    let mut parser = Parser::new(source, options);

    macro_rules! bail {
        ($err:expr) => {{
            diagnostics.report_error(&$err);
            let quirks = parser.quirks();
            let languages = parser.lexer().languages().clone();
            return report.seal(diagnostics, quirks, languages);
        }};
    }

    match read_header(&mut parser) {
        Ok(header) => {
            if !header.version.is_supported() {
                diagnostics.report(
                    DiagnosticId::UnsupportedVersion,
                    Some(header.version.to_string()),
                    Some(header.offset),
                );
            }
            tracing::debug!(version = %header.version, wrapper = header.postscript_wrapper, "header");
            report.version = Some(header.version);
        }
        Err(err) => bail!(err),
    }

    let mut resolver = XRefResolver::new(&mut parser, &mut diagnostics, options);
    let resolved = resolver.resolve();
    let (table, chain) = resolver.into_parts();
    if let Err(err) = resolved {
        bail!(err);
    }

    report.object_count = table.in_use_count();
    report.free_object_count = table.free_count();
    report.incremental_updates = chain.incremental_updates();
    report.document_id = chain
        .id()
        .map(|(first, _)| first.iter().map(|b| format!("{b:02x}")).collect());
    for trailer in chain.iter().filter(|t| t.root.is_none()) {
        tracing::warn!(offset = trailer.offset, "trailer without /Root");
        diagnostics.report(
            DiagnosticId::MissingRoot,
            None,
            Some(trailer.offset),
        );
    }

    let mut graph = ObjectGraph::new(parser, table, chain, diagnostics, options);
    if let Err(err) = inspect(&mut graph, options, &mut report) {
        tracing::warn!(%err, "document structure unreadable");
        graph.diagnostics_mut().report_error(&err);
    }

    let quirks = graph.quirks();
    let languages = graph.languages();
    report.seal(graph.into_diagnostics(), quirks, languages)
}

fn read_header<R: ByteSource>(parser: &mut Parser<R>) -> ParseResult<PdfHeader> {
    let lexer = parser.lexer_mut();
    let len = lexer.len()?;
    let window = lexer.read_range(0, len.min(HEADER_WINDOW as u64))?;
    PdfHeader::parse(&window)
}

/// Catalog-level checks and tree walks
fn inspect<R: ByteSource>(
    graph: &mut ObjectGraph<R>,
    options: &ParseOptions,
    report: &mut ParseReport,
) -> ParseResult<()> {
    if let Some(encrypt) = graph.trailers().encrypt().cloned() {
        graph.diagnostics_mut().report(DiagnosticId::Encrypted, None, None);
        report.encryption = EncryptionInfo::resolve(graph, &encrypt)?;
    }

    if let Some(info_id) = graph.trailers().info() {
        let info = graph.get_object(info_id)?;
        if info.as_dict().is_none() {
            graph.diagnostics_mut().report(
                DiagnosticId::InvalidInfo,
                Some(format!("object {info_id} is {}", info.type_name())),
                None,
            );
        }
    }

    let Some(root_id) = graph.trailers().root() else {
        return Ok(());
    };
    let catalog = graph.get_object(root_id)?;
    if catalog.is_null() {
        graph.diagnostics_mut().report(
            DiagnosticId::UnresolvableRoot,
            Some(format!("object {root_id}")),
            None,
        );
        return Ok(());
    }
    let Some(dict) = catalog.as_dict() else {
        graph.diagnostics_mut().report(
            DiagnosticId::InvalidCatalog,
            Some(format!("object {root_id} is {}", catalog.type_name())),
            None,
        );
        return Ok(());
    };
    if dict.get_type() != Some("Catalog") {
        graph.diagnostics_mut().report(
            DiagnosticId::InvalidCatalog,
            Some(format!("object {root_id} has no /Type /Catalog")),
            None,
        );
    }

    if options.walk_pages {
        report.page_count = walk_pages(graph, &catalog)?;
    }
    if options.walk_outlines {
        report.outline_items = walk_outlines(graph, &catalog)?;
    }
    Ok(())
}

fn walk_pages<R: ByteSource>(
    graph: &mut ObjectGraph<R>,
    catalog: &Rc<IndirectObject>,
) -> ParseResult<Option<usize>> {
    let root = match catalog.as_dict().and_then(|dict| dict.get("Pages")) {
        Some(PdfObject::Reference(id)) => *id,
        Some(other) => {
            graph.diagnostics_mut().report(
                DiagnosticId::MissingPages,
                Some(format!("/Pages is a direct {}", other.type_name())),
                None,
            );
            return Ok(None);
        }
        None => {
            graph
                .diagnostics_mut()
                .report(DiagnosticId::MissingPages, None, None);
            return Ok(None);
        }
    };

    let mut walker = PageWalker::new();
    walker.start_walk(root);
    let mut root_kind = None;
    let mut declared = None;
    while let Some(node) = walker.next_node(graph)? {
        if root_kind.is_some() {
            continue;
        }
        root_kind = Some(node.kind);
        match node.kind {
            NodeKind::Pages => declared = node.count,
            NodeKind::Page => graph.diagnostics_mut().report(
                DiagnosticId::InvalidPageNode,
                Some(format!("page tree root {} is a page", node.id)),
                None,
            ),
        }
    }

    let pages = walker.pages_walked();
    match (root_kind, declared) {
        (Some(NodeKind::Pages), Some(count)) if count == pages as i64 => {}
        (Some(NodeKind::Pages), Some(count)) => graph.diagnostics_mut().report(
            DiagnosticId::PageCountMismatch,
            Some(format!("/Count {count}, {pages} pages walked")),
            None,
        ),
        (Some(NodeKind::Pages), None) => graph.diagnostics_mut().report(
            DiagnosticId::PageCountMismatch,
            Some("root has no /Count".to_string()),
            None,
        ),
        _ => {}
    }
    tracing::debug!(pages, nodes = walker.nodes_walked(), "page tree walked");
    Ok(Some(pages))
}

fn walk_outlines<R: ByteSource>(
    graph: &mut ObjectGraph<R>,
    catalog: &Rc<IndirectObject>,
) -> ParseResult<Option<usize>> {
    let Some(entry) = catalog.as_dict().and_then(|dict| dict.get("Outlines")) else {
        return Ok(None);
    };
    let outlines = graph.resolve(entry)?;
    let Some(dict) = outlines.as_dict() else {
        if !outlines.is_null() {
            graph.diagnostics_mut().report(
                DiagnosticId::InvalidOutlineItem,
                Some(format!("/Outlines is {}", outlines.type_name())),
                None,
            );
        }
        return Ok(None);
    };

    let mut walker = OutlineWalker::new();
    walker.start_walk(dict);
    while walker.next_node(graph)?.is_some() {}
    tracing::debug!(items = walker.items_walked(), "outline walked");
    Ok(Some(walker.items_walked()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::parser::test_helpers::{minimal_pdf, pdf_with_version, DocBuilder};
    use crate::parser::SubsectionPolicy;
    use std::io::Cursor;

    fn run(data: Vec<u8>) -> ParseReport {
        parse(Cursor::new(data))
    }

    #[test]
    fn test_minimal_document() {
        let report = run(minimal_pdf());
        assert!(report.well_formed, "{:?}", report.diagnostics);
        assert!(report.valid, "{:?}", report.diagnostics);
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.version, Some(PdfVersion::new(1, 4)));
        assert_eq!(report.object_count, 3);
        assert_eq!(report.free_object_count, 1);
        assert_eq!(report.incremental_updates, 0);
        assert_eq!(report.page_count, Some(1));
        assert_eq!(report.outline_items, None);
        assert!(!report.non_compliant);
    }

    #[test]
    fn test_missing_header() {
        let report = run(b"garbage\n".to_vec());
        let (well_formed, valid, diagnostics) = report.outcome();
        assert!(!well_formed);
        assert!(!valid);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].id, DiagnosticId::MissingHeader);
        assert_eq!(report.version, None);
    }

    #[test]
    fn test_unsupported_version_is_invalid() {
        let report = run(pdf_with_version("1.9"));
        assert!(report.well_formed);
        assert!(!report.valid);
        assert_eq!(report.codes(), vec!["PDF-HDR-2"]);
    }

    #[test]
    fn test_missing_root_is_invalid() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog >>")
            .xref(2, "")
            .build();
        let report = run(data);
        assert!(report.well_formed);
        assert!(!report.valid);
        assert!(report.has(DiagnosticId::MissingRoot));
        assert_eq!(report.page_count, None);
    }

    #[test]
    fn test_dangling_root_is_malformed() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog >>")
            .xref(2, "/Root 9 0 R")
            .build();
        let report = run(data);
        assert!(!report.well_formed);
        assert!(report.has(DiagnosticId::UnresolvableRoot));
    }

    #[test]
    fn test_catalog_checks() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Pages >>")
            .object(2, "(not a dictionary)")
            .xref(3, "/Root 1 0 R /Info 2 0 R")
            .build();
        let report = run(data);
        assert!(report.well_formed);
        assert!(report.has(DiagnosticId::InvalidCatalog));
        assert!(report.has(DiagnosticId::InvalidInfo));
        assert!(report.has(DiagnosticId::MissingPages));
    }

    #[test]
    fn test_page_count_mismatch() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 4 >>")
            .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] >>")
            .xref(4, "/Root 1 0 R")
            .build();
        let report = run(data);
        assert!(report.well_formed);
        assert!(!report.valid);
        assert_eq!(report.page_count, Some(1));
        assert_eq!(report.codes(), vec!["PDF-TREE-8"]);
    }

    #[test]
    fn test_page_walk_disabled() {
        let report = parse_with_options(
            Cursor::new(minimal_pdf()),
            &ParseOptions::default().with_page_walk(false),
        );
        assert!(report.valid);
        assert_eq!(report.page_count, None);
    }

    #[test]
    fn test_outline_count() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R /Outlines 4 0 R >>")
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
            .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] >>")
            .object(4, "<< /Type /Outlines /First 5 0 R >>")
            .object(5, "<< /Title (One) /Next 6 0 R >>")
            .object(6, "<< /Title (Two) /Next 5 0 R >>")
            .xref(7, "/Root 1 0 R")
            .build();
        let report = run(data);
        assert!(report.valid, "{:?}", report.diagnostics);
        assert_eq!(report.outline_items, Some(2));
        let note = report
            .diagnostics
            .iter()
            .find(|d| d.id == DiagnosticId::RecursiveStructure)
            .unwrap();
        assert_eq!(note.severity, Severity::Info);
    }

    #[test]
    fn test_encryption_reported_not_decrypted() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
            .object(3, "<< /Filter /Standard /V 2 /R 3 /Length 128 /P -3904 /O (o) /U (u) >>")
            .xref(4, "/Root 1 0 R /Encrypt 3 0 R")
            .build();
        let report = run(data);
        assert!(report.valid, "{:?}", report.diagnostics);
        assert!(report.has(DiagnosticId::Encrypted));
        let info = report.encryption.unwrap();
        assert_eq!(info.filter.as_deref(), Some("Standard"));
        assert_eq!(info.revision, Some(3));
        assert_eq!(info.length, Some(128));
    }

    #[test]
    fn test_xref_failure_stops_session() {
        let mut data = minimal_pdf();
        let at = data.windows(9).rposition(|w| w == b"startxref").unwrap();
        data.truncate(at);
        data.extend_from_slice(b"startxref\n999999\n%%EOF\n");
        let report = run(data);
        assert!(!report.well_formed);
        assert_eq!(report.codes(), vec!["PDF-TRL-3"]);
        assert_eq!(report.object_count, 0);
    }

    #[test]
    fn test_corrupt_subsection_policies() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
            .build();
        let mut data = data;
        let at = data.len();
        let catalog = data.windows(7).position(|w| w == b"1 0 obj").unwrap();
        let pages = data.windows(7).position(|w| w == b"2 0 obj").unwrap();
        data.extend_from_slice(
            format!(
                "xref\n0 4\n0000000000 65535 f \n{catalog:010} 00000 n \n{pages:010} 00000 n \nXXXXXXXXXX 00000 n \ntrailer\n<< /Size 4 /Root 1 0 R >>\nstartxref\n{at}\n%%EOF\n"
            )
            .as_bytes(),
        );

        let degraded = run(data.clone());
        assert!(degraded.well_formed);
        assert!(!degraded.valid);
        assert!(degraded.has(DiagnosticId::CorruptSubsection));
        assert_eq!(degraded.page_count, Some(0));

        let aborted = parse_with_options(
            Cursor::new(data),
            &ParseOptions::default().with_corrupt_subsection(SubsectionPolicy::Abort),
        );
        assert!(!aborted.well_formed);
        assert!(aborted.has(DiagnosticId::CorruptSubsection));
        assert_eq!(aborted.page_count, None);
    }

    #[test]
    fn test_document_id_from_trailer() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
            .xref(3, "/Root 1 0 R /ID [<0A1BFF> <0A1BFF>]")
            .build();
        let report = run(data);
        assert!(report.valid, "{:?}", report.diagnostics);
        assert_eq!(report.document_id.as_deref(), Some("0a1bff"));

        assert_eq!(run(minimal_pdf()).document_id, None);
    }

    #[test]
    fn test_languages_and_profile_advisory() {
        let data = DocBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R /Lang <FEFF001B656E001B0041> >>")
            .object(2, "<< /Type /Pages /Kids [] /Count 0 /Note (bad \\q escape) >>")
            .xref(3, "/Root 1 0 R")
            .build();
        let report = run(data);
        assert!(report.valid, "{:?}", report.diagnostics);
        assert!(report.non_compliant);
        assert!(report.has(DiagnosticId::ProfileNonCompliance));
        assert!(report.languages.contains("en"));
    }
}
