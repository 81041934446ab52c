//! Generate Test PDFs
//!
//! Writes the synthetic corpus, one `.pdf` and one `.json` per case, into
//! `fixtures/valid` and `fixtures/invalid` (or the directory given as the
//! first argument).

use anyhow::Result;
use pdfprobe_test_suite::generators::{invalid_pdfs, minimal_pdfs};
use std::path::PathBuf;

fn main() -> Result<()> {
    let fixtures_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(pdfprobe_test_suite::utils::fixtures_dir);

    let valid_dir = fixtures_dir.join("valid");
    println!("Generating minimal PDFs in {}...", valid_dir.display());
    minimal_pdfs::generate_all(&valid_dir)?;

    let invalid_dir = fixtures_dir.join("invalid");
    println!("Generating invalid PDFs in {}...", invalid_dir.display());
    invalid_pdfs::generate_all(&invalid_dir)?;

    println!("Test PDF generation complete!");
    Ok(())
}
