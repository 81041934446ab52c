//! Test Suite for pdfprobe
//!
//! Synthetic documents with known verdicts, used by the integration tests,
//! the `generate-test-pdfs` binary and the parser benchmarks.

pub mod corpus;
pub mod generators;

pub use corpus::{Expectation, TestCategory, TestCorpus, TestMetadata, TestPdf};

/// Common test utilities
pub mod utils {
    use std::path::{Path, PathBuf};
    use std::fs;

    /// Get the path to the test fixtures directory
    pub fn fixtures_dir() -> PathBuf {
        let manifest_dir = env!("CARGO_MANIFEST_DIR");
        PathBuf::from(manifest_dir).join("fixtures")
    }

    /// Read a test PDF file
    pub fn read_test_pdf<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<u8>> {
        let full_path = fixtures_dir().join(path);
        Ok(fs::read(full_path)?)
    }
}
