//! Invalid PDF Generators
//!
//! Generates deliberately broken or hostile PDFs for error handling tests.
//! Most cases patch the output of [`TestPdfBuilder`] with same-length
//! replacements so every offset stays correct.

use std::path::Path;

use anyhow::Result;

use super::test_pdf_builder::{encode_xref_rows, last_startxref, TestPdfBuilder};
use crate::corpus::{Expectation, TestCorpus, TestPdf};

/// Generate all invalid test PDFs into `output_dir`
pub fn generate_all<P: AsRef<Path>>(output_dir: P) -> Result<()> {
    let corpus = TestCorpus::from_cases(cases());
    corpus.write_to(output_dir)
}

/// Every broken or hostile case
pub fn cases() -> Vec<TestPdf> {
    vec![
        // Grammar violations
        truncated(),
        no_header(),
        invalid_header(),
        no_eof(),
        trailer_cycle(),
        compressed_index_out_of_range(),
        excessive_nesting(),
        object_mismatch(),
        // Semantic problems
        missing_root(),
        corrupted_xref(),
        unsupported_version(),
        wrong_catalog_type(),
        page_count_mismatch(),
        missing_media_box(),
        invalid_rotate(),
        // Hostile but acceptable
        page_tree_cycle(),
        outline_cycle(),
        encrypted(),
    ]
}

/// Replace the first occurrence of `from` with `to`
pub fn patch(pdf: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    match pdf.windows(from.len()).position(|w| w == from) {
        Some(at) => {
            let mut out = pdf[..at].to_vec();
            out.extend_from_slice(to);
            out.extend_from_slice(&pdf[at + from.len()..]);
            out
        }
        None => pdf.to_vec(),
    }
}

/// Objects numbered from 1 followed by a classic table; `trailer` is
/// spliced into the trailer dictionary
pub fn assemble(objects: &[&str], trailer: &str) -> Vec<u8> {
    let mut pdf = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} {trailer} >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    pdf
}

fn offset_of(pdf: &[u8], needle: &[u8]) -> usize {
    pdf.windows(needle.len())
        .position(|w| w == needle)
        .unwrap_or(0)
}

fn minimal() -> Vec<u8> {
    TestPdfBuilder::minimal().build()
}

/// PDF truncated in the middle of the cross-reference table
fn truncated() -> TestPdf {
    let mut pdf = minimal();
    let xref = last_startxref(&pdf).unwrap_or(0);
    pdf.truncate(xref + 30);
    TestPdf::new(
        "truncated",
        "PDF file truncated in the middle of the xref table",
        pdf,
        Expectation::malformed(&["PDF-TRL-1"]),
    )
}

fn no_header() -> TestPdf {
    TestPdf::new(
        "no_header",
        "PDF without a %PDF- header",
        patch(&minimal(), b"%PDF-1.4", b"%XYZ-1.4"),
        Expectation::malformed(&["PDF-HDR-1"]),
    )
}

fn invalid_header() -> TestPdf {
    TestPdf::new(
        "invalid_header",
        "Header with an unreadable version",
        patch(&minimal(), b"%PDF-1.4", b"%PDF-X.Y"),
        Expectation::malformed(&["PDF-HDR-1"]),
    )
}

fn no_eof() -> TestPdf {
    TestPdf::new(
        "no_eof",
        "PDF without an %%EOF marker",
        patch(&minimal(), b"%%EOF", b"%%END"),
        Expectation::malformed(&["PDF-TRL-1"]),
    )
}

/// Trailer whose /Prev names its own section
fn trailer_cycle() -> TestPdf {
    let pdf = minimal();
    let xref = last_startxref(&pdf).unwrap_or(0);
    let pdf = patch(
        &pdf,
        b"/Root 1 0 R >>",
        format!("/Root 1 0 R /Prev {xref} >>").as_bytes(),
    );
    TestPdf::new(
        "trailer_cycle",
        "Trailer /Prev points back at its own section",
        pdf,
        Expectation::malformed(&["PDF-TRL-4"]),
    )
}

/// Compressed entry whose container number equals the table size
fn compressed_index_out_of_range() -> TestPdf {
    let mut pdf = b"%PDF-1.5\n".to_vec();
    let catalog = pdf.len();
    pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");

    let start = pdf.len();
    let data = encode_xref_rows(&[
        (0, 0, 65535),
        (1, catalog as u32, 0),
        (2, 4, 0),
        (1, start as u32, 0),
    ]);
    pdf.extend_from_slice(
        format!(
            "3 0 obj\n<< /Type /XRef /Size 4 /W [1 4 2] /Root 1 0 R /Length {} >>\nstream\n",
            data.len()
        )
        .as_bytes(),
    );
    pdf.extend_from_slice(&data);
    pdf.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{start}\n%%EOF\n").as_bytes());

    TestPdf::new(
        "compressed_index_out_of_range",
        "Compressed entry names container 4 in a table of size 4",
        pdf,
        Expectation::malformed(&["PDF-XREF-4"]),
    )
}

/// Catalog holding arrays nested 600 deep
fn excessive_nesting() -> TestPdf {
    let nested = format!("{}{}", "[".repeat(600), "]".repeat(600));
    let pdf = TestPdfBuilder::minimal()
        .with_catalog_entry("Deep", &nested)
        .build();
    TestPdf::new(
        "excessive_nesting",
        "Catalog with arrays nested beyond the parser limit",
        pdf,
        Expectation::malformed(&["PDF-SYN-8"]),
    )
}

/// Table entry for the catalog points at the page tree root
fn object_mismatch() -> TestPdf {
    let pdf = minimal();
    let catalog = offset_of(&pdf, b"1 0 obj");
    let pages = offset_of(&pdf, b"2 0 obj");
    let pdf = patch(
        &pdf,
        format!("{catalog:010} 00000 n").as_bytes(),
        format!("{pages:010} 00000 n").as_bytes(),
    );
    TestPdf::new(
        "object_mismatch",
        "Cross-reference offset of object 1 holds object 2",
        pdf,
        Expectation::malformed(&["PDF-OBJ-1"]),
    )
}

fn missing_root() -> TestPdf {
    TestPdf::new(
        "missing_root",
        "Trailer without a /Root entry",
        patch(&minimal(), b"/Root 1 0 R", b"           "),
        Expectation::invalid(&["PDF-TRL-5"]),
    )
}

/// Unreadable record in the only subsection
fn corrupted_xref() -> TestPdf {
    let pdf = minimal();
    let page = offset_of(&pdf, b"3 0 obj");
    let pdf = patch(
        &pdf,
        format!("{page:010} 00000 n").as_bytes(),
        b"XXXXXXXXXX 00000 n",
    );
    TestPdf::new(
        "corrupted_xref",
        "Cross-reference record with a non-numeric offset",
        pdf,
        Expectation::invalid(&["PDF-XREF-2"]),
    )
}

fn unsupported_version() -> TestPdf {
    TestPdf::new(
        "unsupported_version",
        "Header names version 1.9",
        patch(&minimal(), b"%PDF-1.4", b"%PDF-1.9"),
        Expectation::invalid(&["PDF-HDR-2"]).with_pages(1),
    )
}

fn wrong_catalog_type() -> TestPdf {
    TestPdf::new(
        "wrong_catalog_type",
        "Root object is typed /Katalog",
        patch(&minimal(), b"/Type /Catalog", b"/Type /Katalog"),
        Expectation::invalid(&["PDF-DOC-1"]).with_pages(1),
    )
}

fn page_count_mismatch() -> TestPdf {
    TestPdf::new(
        "page_count_mismatch",
        "Page tree root declares 7 pages but has one",
        patch(&minimal(), b"/Count 1", b"/Count 7"),
        Expectation::invalid(&["PDF-TREE-8"]).with_pages(1),
    )
}

fn missing_media_box() -> TestPdf {
    TestPdf::new(
        "missing_media_box",
        "Page without a media box on itself or an ancestor",
        patch(
            &minimal(),
            b"/MediaBox [0 0 612 792]",
            b"                       ",
        ),
        Expectation::invalid(&["PDF-TREE-5"]).with_pages(1),
    )
}

fn invalid_rotate() -> TestPdf {
    let mut builder = TestPdfBuilder::new();
    builder.add_rotated_page(45);
    TestPdf::new(
        "invalid_rotate",
        "Page rotated by 45 degrees",
        builder.build(),
        Expectation::invalid(&["PDF-TREE-7"]).with_pages(1),
    )
}

/// Page tree root lists itself among its kids
fn page_tree_cycle() -> TestPdf {
    let pdf = assemble(
        &[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R 2 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
        ],
        "/Root 1 0 R",
    );
    TestPdf::new(
        "page_tree_cycle",
        "Page tree root lists itself as a kid",
        pdf,
        Expectation::valid()
            .with_diagnostics(&["PDF-TREE-1"])
            .with_pages(1),
    )
}

/// Outline item whose /Next is itself
fn outline_cycle() -> TestPdf {
    let pdf = assemble(
        &[
            "<< /Type /Catalog /Pages 2 0 R /Outlines 4 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
            "<< /Type /Outlines /First 5 0 R /Last 5 0 R /Count 1 >>",
            "<< /Title (Loop) /Parent 4 0 R /Next 5 0 R >>",
        ],
        "/Root 1 0 R",
    );
    TestPdf::new(
        "outline_cycle",
        "Outline item names itself as its successor",
        pdf,
        Expectation::valid()
            .with_diagnostics(&["PDF-TREE-1"])
            .with_pages(1),
    )
}

/// Standard security handler parameters; nothing is decrypted
fn encrypted() -> TestPdf {
    let key = "00".repeat(32);
    let pdf = assemble(
        &[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
            &format!("<< /Filter /Standard /V 1 /R 2 /Length 40 /O <{key}> /U <{key}> /P -4 >>"),
        ],
        "/Root 1 0 R /Encrypt 4 0 R /ID [<0123456789ABCDEF> <0123456789ABCDEF>]",
    );
    TestPdf::new(
        "encrypted",
        "RC4 40-bit standard security handler",
        pdf,
        Expectation::valid()
            .with_diagnostics(&["PDF-ENC-1"])
            .with_pages(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::TestCategory;

    #[test]
    fn test_patch_keeps_length() {
        let pdf = minimal();
        let patched = patch(&pdf, b"/Count 1", b"/Count 7");
        assert_eq!(pdf.len(), patched.len());
        assert_ne!(pdf, patched);
    }

    #[test]
    fn test_patch_without_match() {
        let pdf = minimal();
        assert_eq!(patch(&pdf, b"not present", b"x"), pdf);
    }

    #[test]
    fn test_generate_invalid_pdfs() {
        let temp_dir = tempfile::tempdir().unwrap();
        generate_all(temp_dir.path()).unwrap();
        assert!(temp_dir.path().join("truncated.pdf").exists());
        assert!(temp_dir.path().join("missing_root.json").exists());
    }

    #[test]
    fn test_every_invalid_case_matches() {
        for case in cases() {
            case.check().unwrap();
        }
    }

    #[test]
    fn test_categories() {
        let cases = cases();
        let category = |name: &str| {
            cases
                .iter()
                .find(|c| c.name() == name)
                .map(|c| c.metadata.category)
        };
        assert_eq!(category("no_eof"), Some(TestCategory::Malformed));
        assert_eq!(category("missing_root"), Some(TestCategory::Invalid));
        assert_eq!(category("page_tree_cycle"), Some(TestCategory::Valid));
    }
}
