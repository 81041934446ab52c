//! Test Corpus Management
//!
//! A corpus is a set of synthetic documents, each paired with the verdict
//! and diagnostics a parse is expected to produce. The corpus can be written
//! to disk (one `.pdf` and one `.json` file per case) and loaded back.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use pdfprobe::{parse_with_options, ParseOptions, ParseReport};
use serde::{Deserialize, Serialize};

use crate::generators::{invalid_pdfs, minimal_pdfs};

/// Categories of test PDFs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestCategory {
    /// Well-formed and valid
    Valid,
    /// Well-formed but semantically wrong
    Invalid,
    /// Violates the file grammar
    Malformed,
}

/// Expected outcome of parsing a test PDF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    pub well_formed: bool,
    pub valid: bool,
    /// Diagnostic codes that must be reported (`PDF-TRL-5`)
    #[serde(default)]
    pub diagnostics: Vec<String>,
    /// Expected page count, when the page tree is reachable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

impl Expectation {
    pub fn valid() -> Self {
        Self {
            well_formed: true,
            valid: true,
            diagnostics: Vec::new(),
            page_count: None,
        }
    }

    pub fn invalid(codes: &[&str]) -> Self {
        Self {
            valid: false,
            diagnostics: codes.iter().map(|c| c.to_string()).collect(),
            ..Self::valid()
        }
    }

    pub fn malformed(codes: &[&str]) -> Self {
        Self {
            well_formed: false,
            ..Self::invalid(codes)
        }
    }

    pub fn with_diagnostics(mut self, codes: &[&str]) -> Self {
        self.diagnostics.extend(codes.iter().map(|c| c.to_string()));
        self
    }

    pub fn with_pages(mut self, pages: usize) -> Self {
        self.page_count = Some(pages);
        self
    }

    pub fn category(&self) -> TestCategory {
        match (self.well_formed, self.valid) {
            (true, true) => TestCategory::Valid,
            (true, false) => TestCategory::Invalid,
            _ => TestCategory::Malformed,
        }
    }

    /// Compare a report against the expectation, listing every mismatch
    pub fn verify(&self, report: &ParseReport) -> Result<()> {
        let mut problems = Vec::new();
        if report.well_formed != self.well_formed {
            problems.push(format!(
                "well_formed is {}, expected {}",
                report.well_formed, self.well_formed
            ));
        }
        if report.valid != self.valid {
            problems.push(format!("valid is {}, expected {}", report.valid, self.valid));
        }
        let codes = report.codes();
        for code in &self.diagnostics {
            if !codes.iter().any(|c| c == code) {
                problems.push(format!("missing diagnostic {code}"));
            }
        }
        if self.page_count.is_some() && report.page_count != self.page_count {
            problems.push(format!(
                "page_count is {:?}, expected {:?}",
                report.page_count, self.page_count
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            bail!("{} (reported: {})", problems.join("; "), codes.join(", "))
        }
    }
}

/// Metadata stored next to each generated PDF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMetadata {
    pub name: String,
    pub description: String,
    pub category: TestCategory,
    pub expected: Expectation,
}

/// A test PDF with its expected outcome
#[derive(Debug, Clone)]
pub struct TestPdf {
    pub metadata: TestMetadata,
    pub data: Vec<u8>,
}

impl TestPdf {
    pub fn new(name: &str, description: &str, data: Vec<u8>, expected: Expectation) -> Self {
        Self {
            metadata: TestMetadata {
                name: name.to_string(),
                description: description.to_string(),
                category: expected.category(),
                expected,
            },
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Parse with default options
    pub fn parse(&self) -> ParseReport {
        self.parse_with(&ParseOptions::default())
    }

    pub fn parse_with(&self, options: &ParseOptions) -> ParseReport {
        parse_with_options(Cursor::new(self.data.as_slice()), options)
    }

    /// Parse and compare with the expectation
    pub fn check(&self) -> Result<()> {
        self.metadata
            .expected
            .verify(&self.parse())
            .with_context(|| format!("test PDF '{}'", self.name()))
    }
}

/// Collection of test PDFs
#[derive(Debug, Default)]
pub struct TestCorpus {
    pdfs: Vec<TestPdf>,
}

impl TestCorpus {
    /// Every generated case, valid ones first
    pub fn builtin() -> Self {
        let mut pdfs = minimal_pdfs::cases();
        pdfs.extend(invalid_pdfs::cases());
        Self { pdfs }
    }

    pub fn from_cases(pdfs: Vec<TestPdf>) -> Self {
        Self { pdfs }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TestPdf> {
        self.pdfs.iter()
    }

    pub fn len(&self) -> usize {
        self.pdfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pdfs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TestPdf> {
        self.pdfs.iter().find(|pdf| pdf.name() == name)
    }

    pub fn by_category(&self, category: TestCategory) -> impl Iterator<Item = &TestPdf> {
        self.pdfs
            .iter()
            .filter(move |pdf| pdf.metadata.category == category)
    }

    /// Write `<name>.pdf` and `<name>.json` for every case
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        for pdf in &self.pdfs {
            let path = dir.join(format!("{}.pdf", pdf.name()));
            fs::write(&path, &pdf.data)?;
            fs::write(
                path.with_extension("json"),
                serde_json::to_string_pretty(&pdf.metadata)?,
            )?;
        }
        Ok(())
    }

    /// Load every `.pdf` in `dir` that has a `.json` file next to it
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut pdfs = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pdf") {
                continue;
            }
            let metadata_path = path.with_extension("json");
            if !metadata_path.exists() {
                continue;
            }
            let metadata: TestMetadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)
                .with_context(|| format!("parsing {}", metadata_path.display()))?;
            pdfs.push(TestPdf {
                metadata,
                data: fs::read(&path)?,
            });
        }
        pdfs.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(Self { pdfs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_unique() {
        let corpus = TestCorpus::builtin();
        let mut names: Vec<&str> = corpus.iter().map(TestPdf::name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_builtin_has_every_category() {
        let corpus = TestCorpus::builtin();
        assert!(corpus.by_category(TestCategory::Valid).count() > 0);
        assert!(corpus.by_category(TestCategory::Invalid).count() > 0);
        assert!(corpus.by_category(TestCategory::Malformed).count() > 0);
    }

    #[test]
    fn test_write_and_load() {
        let corpus = TestCorpus::builtin();
        let dir = tempfile::tempdir().unwrap();
        corpus.write_to(dir.path()).unwrap();

        let loaded = TestCorpus::load(dir.path()).unwrap();
        assert_eq!(loaded.len(), corpus.len());
        let original = corpus.get("missing_root").unwrap();
        let reloaded = loaded.get("missing_root").unwrap();
        assert_eq!(reloaded.metadata, original.metadata);
        assert_eq!(reloaded.data, original.data);
    }

    #[test]
    fn test_verify_lists_mismatches() {
        let expected = Expectation::invalid(&["PDF-TRL-5"]);
        let report = ParseReport {
            well_formed: true,
            valid: true,
            ..Default::default()
        };
        let err = expected.verify(&report).unwrap_err().to_string();
        assert!(err.contains("valid is true"));
        assert!(err.contains("missing diagnostic PDF-TRL-5"));
    }
}
