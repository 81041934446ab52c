//! Cycles, deep chains and packed objects
//!
//! Every recursive structure of the format must be walked with a budget or
//! a visited set, so these documents terminate with a stable verdict.

use std::io::Cursor;

use pdfprobe::parser::{ObjectGraph, ObjectId, Parser, XRefResolver};
use pdfprobe::{parse, parse_with_options, DiagnosticId, Diagnostics, ParseOptions, Severity};
use pdfprobe_test_suite::generators::invalid_pdfs::{assemble, patch};
use pdfprobe_test_suite::generators::test_pdf_builder::{encode_xref_rows, TestPdfBuilder, XRefStyle};
use pdfprobe_test_suite::TestCorpus;
use pretty_assertions::assert_eq;

fn open(data: Vec<u8>) -> ObjectGraph<Cursor<Vec<u8>>> {
    let options = ParseOptions::default();
    let mut parser = Parser::new(Cursor::new(data), &options);
    let mut diagnostics = Diagnostics::new();
    let mut resolver = XRefResolver::new(&mut parser, &mut diagnostics, &options);
    resolver.resolve().expect("cross-reference resolution");
    let (table, chain) = resolver.into_parts();
    ObjectGraph::new(parser, table, chain, diagnostics, &options)
}

#[test]
fn page_tree_cycle_reported_once() {
    let data = assemble(
        &[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R 2 0 R 4 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
            "<< /Type /Pages /Parent 2 0 R /Kids [2 0 R 4 0 R] /Count 0 >>",
        ],
        "/Root 1 0 R",
    );
    let report = parse(Cursor::new(data));

    assert!(report.well_formed);
    assert!(report.valid, "{:?}", report.diagnostics);
    assert_eq!(report.page_count, Some(1));
    let recursive: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.id == DiagnosticId::RecursiveStructure)
        .collect();
    assert_eq!(recursive.len(), 1);
    assert_eq!(recursive[0].severity, Severity::Info);
}

#[test]
fn outline_cycle_terminates() {
    let corpus = TestCorpus::builtin();
    let report = corpus.get("outline_cycle").unwrap().parse();
    assert!(report.valid);
    assert_eq!(report.outline_items, Some(1));
    assert!(report.has(DiagnosticId::RecursiveStructure));
}

#[test]
fn outline_items_counted() {
    let data = TestPdfBuilder::minimal()
        .with_outline(&["One", "Two", "Three"])
        .build();
    let report = parse(Cursor::new(data));
    assert!(report.valid, "{:?}", report.diagnostics);
    assert_eq!(report.outline_items, Some(3));
}

#[test]
fn object_stream_members_resolve() {
    let mut builder = TestPdfBuilder::new()
        .with_xref_style(XRefStyle::ObjectStreams)
        .with_compression(true);
    builder.add_empty_page(612.0, 792.0).add_empty_page(595.0, 842.0);
    let data = builder.build();

    let report = parse(Cursor::new(data.clone()));
    assert!(report.valid, "{:?}", report.diagnostics);
    assert_eq!(report.page_count, Some(2));

    let mut graph = open(data);
    let catalog = graph.get_object(ObjectId::new(1, 0)).unwrap();
    assert_eq!(catalog.as_dict().unwrap().get_type(), Some("Catalog"));
    let page = graph.get_object(ObjectId::new(4, 0)).unwrap();
    assert_eq!(page.as_dict().unwrap().get_type(), Some("Page"));
}

#[test]
fn object_stream_container_cycle_hits_budget() {
    // Objects 1 and 2 both live in container 2, which is itself compressed
    let mut data = b"%PDF-1.5\n".to_vec();
    let start = data.len();
    let rows = encode_xref_rows(&[(0, 0, 65535), (2, 2, 0), (2, 2, 1), (1, start as u32, 0)]);
    data.extend_from_slice(
        format!(
            "3 0 obj\n<< /Type /XRef /Size 4 /W [1 4 2] /Root 1 0 R /Length {} >>\nstream\n",
            rows.len()
        )
        .as_bytes(),
    );
    data.extend_from_slice(&rows);
    data.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{start}\n%%EOF\n").as_bytes());

    let report = parse(Cursor::new(data));
    assert!(!report.well_formed);
    assert!(report.has(DiagnosticId::RecursionLimit));
}

/// Page tree whose /Count sits at the end of a chain of `hops` references
fn count_behind_references(hops: u32) -> Vec<u8> {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 4 0 R >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>".to_string(),
    ];
    for i in 0..hops {
        objects.push(format!("{} 0 R", 5 + i));
    }
    objects.push("1".to_string());
    let objects: Vec<&str> = objects.iter().map(String::as_str).collect();
    assert_eq!(objects.len() as u32, 4 + hops);
    assemble(&objects, "/Root 1 0 R")
}

#[test]
fn short_reference_chain_resolves() {
    let report = parse(Cursor::new(count_behind_references(5)));
    assert!(report.valid, "{:?}", report.diagnostics);
    assert_eq!(report.page_count, Some(1));
}

#[test]
fn long_reference_chain_hits_budget() {
    let report = parse(Cursor::new(count_behind_references(60)));
    assert!(!report.well_formed);
    assert!(report.has(DiagnosticId::RecursionLimit));
}

#[test]
fn resolve_depth_is_configurable() {
    let data = count_behind_references(5);
    let options = ParseOptions::default().with_max_resolve_depth(3);
    let report = parse_with_options(Cursor::new(data), &options);
    assert!(report.has(DiagnosticId::RecursionLimit));
}

fn without_first_endobj() -> Vec<u8> {
    patch(&TestPdfBuilder::minimal().build(), b"endobj\n", b"      \n")
}

#[test]
fn missing_endobj_tolerated_when_lenient() {
    let report = parse(Cursor::new(without_first_endobj()));
    assert!(report.valid, "{:?}", report.diagnostics);
    assert!(report.non_compliant);
    let note = report
        .diagnostics
        .iter()
        .find(|d| d.id == DiagnosticId::MissingEndobj)
        .unwrap();
    assert_eq!(note.severity, Severity::Info);
}

#[test]
fn missing_endobj_malformed_when_strict() {
    let report = parse_with_options(Cursor::new(without_first_endobj()), &ParseOptions::strict());
    assert!(!report.well_formed);
    assert!(report.has(DiagnosticId::MissingEndobj));
}

#[test]
fn encrypted_document_characterized() {
    let corpus = TestCorpus::builtin();
    let report = corpus.get("encrypted").unwrap().parse();
    assert!(report.valid, "{:?}", report.diagnostics);

    let encryption = report.encryption.expect("encryption parameters");
    assert_eq!(encryption.filter.as_deref(), Some("Standard"));
    assert_eq!(encryption.version, Some(1));
    assert_eq!(encryption.revision, Some(2));
    assert_eq!(encryption.allows_printing(), Some(true));
}

#[test]
fn tagged_title_language_collected() {
    let corpus = TestCorpus::builtin();
    let report = corpus.get("tagged_title").unwrap().parse();
    assert!(report.valid);
    assert!(report.languages.contains("en-US"), "{:?}", report.languages);
}
