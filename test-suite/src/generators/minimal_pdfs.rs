//! Minimal PDF Generators
//!
//! Small well-formed and valid documents covering each way of writing
//! cross-reference information.

use std::path::Path;

use anyhow::Result;

use super::test_pdf_builder::{append_incremental_update, PdfVersion, TestPdfBuilder, XRefStyle};
use crate::corpus::{Expectation, TestCorpus, TestPdf};

/// Generate all minimal test PDFs into `output_dir`
pub fn generate_all<P: AsRef<Path>>(output_dir: P) -> Result<()> {
    let corpus = TestCorpus::from_cases(cases());
    corpus.write_to(output_dir)
}

/// Every minimal case
pub fn cases() -> Vec<TestPdf> {
    let mut cases = vec![minimal_empty(), minimal_text(), minimal_multipage()];
    cases.extend(version_variants());
    cases.extend([
        inherited_media_box(),
        xref_stream(),
        object_streams(false),
        object_streams(true),
        with_outline(),
        tagged_title(),
        incremental_update(),
    ]);
    cases
}

/// The absolute minimal valid PDF with one empty page
fn minimal_empty() -> TestPdf {
    let pdf = TestPdfBuilder::minimal()
        .with_title("Minimal Empty PDF")
        .with_creator("pdfprobe test suite")
        .build();
    TestPdf::new(
        "minimal_empty",
        "Absolute minimal valid PDF with one empty page",
        pdf,
        Expectation::valid().with_pages(1),
    )
}

/// Minimal PDFs with different PDF versions
fn version_variants() -> Vec<TestPdf> {
    PdfVersion::ALL
        .iter()
        .map(|&version| {
            let pdf = TestPdfBuilder::minimal()
                .with_version(version)
                .with_title(&format!("PDF Version {version} Test"))
                .build();
            TestPdf::new(
                &format!("minimal_v{}", version.to_string().replace('.', "_")),
                &format!("Minimal PDF with version {version}"),
                pdf,
                Expectation::valid().with_pages(1),
            )
        })
        .collect()
}

fn minimal_text() -> TestPdf {
    let mut builder = TestPdfBuilder::new().with_title("Minimal Text PDF");
    builder.add_text_page("Hello, World!", 12.0);
    TestPdf::new(
        "minimal_text",
        "Minimal PDF with simple text content",
        builder.build(),
        Expectation::valid().with_pages(1),
    )
}

fn minimal_multipage() -> TestPdf {
    let mut builder = TestPdfBuilder::new().with_title("Minimal Multi-page PDF");
    builder
        .add_empty_page(612.0, 792.0)
        .add_text_page("Page 2", 14.0)
        .add_rotated_page(270);
    TestPdf::new(
        "minimal_multipage",
        "Minimal PDF with three pages, one rotated",
        builder.build(),
        Expectation::valid().with_pages(3),
    )
}

fn inherited_media_box() -> TestPdf {
    let mut builder = TestPdfBuilder::new().with_inherited_media_box(595.0, 842.0);
    builder.add_empty_page(0.0, 0.0).add_empty_page(0.0, 0.0);
    TestPdf::new(
        "inherited_media_box",
        "Pages inherit their media box from the page tree root",
        builder.build(),
        Expectation::valid().with_pages(2),
    )
}

fn xref_stream() -> TestPdf {
    let mut builder = TestPdfBuilder::new()
        .with_xref_style(XRefStyle::Stream)
        .with_compression(true);
    builder.add_text_page("Cross-reference stream", 12.0);
    TestPdf::new(
        "xref_stream",
        "Flate-compressed cross-reference stream",
        builder.build(),
        Expectation::valid().with_pages(1),
    )
}

fn object_streams(compress: bool) -> TestPdf {
    let mut builder = TestPdfBuilder::new()
        .with_xref_style(XRefStyle::ObjectStreams)
        .with_compression(compress)
        .with_title("Packed objects")
        .with_outline(&["One", "Two"]);
    builder.add_text_page("Object streams", 12.0).add_empty_page(612.0, 792.0);

    let (name, description) = if compress {
        (
            "object_streams_flate",
            "Dictionaries packed into a flate-compressed object stream",
        )
    } else {
        (
            "object_streams",
            "Dictionaries packed into an uncompressed object stream",
        )
    };
    TestPdf::new(name, description, builder.build(), Expectation::valid().with_pages(2))
}

fn with_outline() -> TestPdf {
    let pdf = TestPdfBuilder::minimal()
        .with_outline(&["Introduction", "Chapter (1)", "Appendix"])
        .build();
    TestPdf::new(
        "with_outline",
        "Flat document outline with three items",
        pdf,
        Expectation::valid().with_pages(1),
    )
}

fn tagged_title() -> TestPdf {
    let pdf = TestPdfBuilder::minimal()
        .with_tagged_title("enUS", "Tagged title")
        .build();
    TestPdf::new(
        "tagged_title",
        "UTF-16 title with an embedded language escape",
        pdf,
        Expectation::valid().with_pages(1),
    )
}

/// Second revision replaces the only page with a rotated one
fn incremental_update() -> TestPdf {
    let base = TestPdfBuilder::minimal().build();
    let pdf = append_incremental_update(
        &base,
        &[(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Rotate 90 >>")],
        4,
        "/Root 1 0 R",
    );
    TestPdf::new(
        "incremental_update",
        "One incremental update redefining a page",
        pdf,
        Expectation::valid().with_pages(1),
    )
}
