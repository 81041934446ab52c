//! Integration tests for the pdfprobe CLI
//!
//! Tests command-line interface functionality including:
//! - Verdicts and exit codes of `check`
//! - Text and JSON output
//! - Standard input and multiple files
//! - Token dumps

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::{tempdir, TempDir};

/// Test helper to get the CLI binary path
fn get_cli_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pdfprobe"))
}

fn setup_temp_dir() -> TempDir {
    tempdir().expect("Failed to create temp directory")
}

fn run_cli_command(args: &[&str]) -> Result<Output> {
    let output = Command::new(get_cli_path())
        .args(args)
        .env_remove("RUST_LOG")
        .output()?;
    Ok(output)
}

/// Document with correct offsets; `trailer_extra` is spliced into the
/// trailer dictionary
fn build_pdf(objects: &[&str], trailer_extra: &str) -> Vec<u8> {
    let mut pdf = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::new();
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
            "trailer\n<< /Size {} {trailer_extra} >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    pdf
}

fn valid_pdf() -> Vec<u8> {
    build_pdf(
        &[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
        ],
        "/Root 1 0 R",
    )
}

fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).expect("Failed to write test file");
    path
}

#[test]
fn test_cli_help_command() {
    let output = run_cli_command(&["--help"]).expect("CLI command should succeed");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("check"));
    assert!(stdout.contains("tokens"));
}

#[test]
fn test_cli_version_command() {
    let output = run_cli_command(&["--version"]).expect("CLI command should succeed");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("pdfprobe"));
}

#[test]
fn test_check_valid_document() {
    let temp_dir = setup_temp_dir();
    let path = write_file(temp_dir.path(), "valid.pdf", &valid_pdf());

    let output = run_cli_command(&["check", path.to_str().unwrap()]).unwrap();
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("well-formed and valid"), "{stdout}");
    assert!(stdout.contains("Version: 1.4"));
    assert!(stdout.contains("Pages: 1"));
}

#[test]
fn test_check_prints_document_id() {
    let temp_dir = setup_temp_dir();
    let pdf = build_pdf(
        &[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [] /Count 0 >>",
        ],
        "/Root 1 0 R /ID [<C0FFEE> <C0FFEE>]",
    );
    let path = write_file(temp_dir.path(), "with_id.pdf", &pdf);

    let output = run_cli_command(&["check", path.to_str().unwrap()]).unwrap();
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ID: c0ffee"), "{stdout}");

    let output = run_cli_command(&["check", "--json", path.to_str().unwrap()]).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let report = &json[0]["report"];
    assert_eq!(report["document_id"], "c0ffee");
}

#[test]
fn test_check_missing_root_is_invalid() {
    let temp_dir = setup_temp_dir();
    let pdf = build_pdf(&["<< /Type /Catalog >>"], "");
    let path = write_file(temp_dir.path(), "no_root.pdf", &pdf);

    let output = run_cli_command(&["check", path.to_str().unwrap()]).unwrap();
    assert_eq!(output.status.code(), Some(1));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("well-formed, not valid"), "{stdout}");
    assert!(stdout.contains("PDF-TRL-5"));
}

#[test]
fn test_check_not_a_pdf() {
    let temp_dir = setup_temp_dir();
    let path = write_file(temp_dir.path(), "plain.txt", b"just some text\n");

    let output = run_cli_command(&["check", path.to_str().unwrap()]).unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("not well-formed"));
    assert!(stdout.contains("PDF-HDR-1"));
}

#[test]
fn test_check_missing_file_exits_2() {
    let temp_dir = setup_temp_dir();
    let path = temp_dir.path().join("missing.pdf");

    let output = run_cli_command(&["check", path.to_str().unwrap()]).unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.pdf"), "{stderr}");
}

#[test]
fn test_check_without_files_fails() {
    let output = run_cli_command(&["check"]).unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_check_json_output() {
    let temp_dir = setup_temp_dir();
    let path = write_file(temp_dir.path(), "valid.pdf", &valid_pdf());

    let output = run_cli_command(&["check", "--json", path.to_str().unwrap()]).unwrap();
    assert_eq!(output.status.code(), Some(0));

    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entry = &entries[0];
    assert_eq!(entry["report"]["well_formed"], serde_json::Value::Bool(true));
    assert_eq!(entry["report"]["valid"], serde_json::Value::Bool(true));
    assert_eq!(entry["report"]["page_count"], serde_json::json!(1));
    assert_eq!(entry["report"]["version"]["major"], serde_json::json!(1));
    assert!(entry["checked_at"].is_string());
}

#[test]
fn test_check_json_diagnostic_codes() {
    let temp_dir = setup_temp_dir();
    let pdf = build_pdf(&["<< /Type /Catalog >>"], "");
    let path = write_file(temp_dir.path(), "no_root.pdf", &pdf);

    let output = run_cli_command(&["check", "--json", path.to_str().unwrap()]).unwrap();
    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let diagnostics = entries[0]["report"]["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics[0]["id"], serde_json::json!("PDF-TRL-5"));
    assert_eq!(diagnostics[0]["severity"], serde_json::json!("invalid"));
}

#[test]
fn test_check_multiple_files_in_order() {
    let temp_dir = setup_temp_dir();
    let mut args = vec!["check".to_string(), "-j".to_string(), "3".to_string()];
    for i in 0..6 {
        let path = write_file(temp_dir.path(), &format!("doc{i}.pdf"), &valid_pdf());
        args.push(path.to_str().unwrap().to_string());
    }
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let output = run_cli_command(&args).unwrap();
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let order: Vec<usize> = (0..6)
        .map(|i| stdout.find(&format!("doc{i}.pdf")).unwrap())
        .collect();
    let mut sorted = order.clone();
    sorted.sort_unstable();
    assert_eq!(order, sorted);
}

#[test]
fn test_check_mixed_results_exit_code() {
    let temp_dir = setup_temp_dir();
    let good = write_file(temp_dir.path(), "good.pdf", &valid_pdf());
    let bad = write_file(temp_dir.path(), "bad.pdf", b"%PDF-1.4\nno structure\n");

    let output =
        run_cli_command(&["check", good.to_str().unwrap(), bad.to_str().unwrap()]).unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_check_reads_stdin() {
    let mut child = Command::new(get_cli_path())
        .args(["check", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(&valid_pdf()).unwrap();
    let output = child.wait_with_output().unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("-: well-formed and valid"));
}

#[test]
fn test_abort_on_corrupt_xref() {
    let temp_dir = setup_temp_dir();
    let mut pdf = b"%PDF-1.4\n".to_vec();
    let catalog = pdf.len();
    pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    let pages = pdf.len();
    pdf.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");
    let xref = pdf.len();
    pdf.extend_from_slice(
        format!(
            "xref\n0 4\n0000000000 65535 f \n{catalog:010} 00000 n \n{pages:010} 00000 n \nXXXXXXXXXX 00000 n \ntrailer\n<< /Size 4 /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n"
        )
        .as_bytes(),
    );
    let path = write_file(temp_dir.path(), "corrupt.pdf", &pdf);
    let path = path.to_str().unwrap();

    let degraded = run_cli_command(&["check", path]).unwrap();
    assert!(String::from_utf8_lossy(&degraded.stdout).contains("well-formed, not valid"));

    let aborted = run_cli_command(&["check", "--abort-on-corrupt-xref", path]).unwrap();
    assert_eq!(aborted.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&aborted.stdout).contains("not well-formed"));
}

#[test]
fn test_no_pages_flag() {
    let temp_dir = setup_temp_dir();
    let path = write_file(temp_dir.path(), "valid.pdf", &valid_pdf());

    let output = run_cli_command(&["check", "--no-pages", path.to_str().unwrap()]).unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("Pages:"));
}

#[test]
fn test_tokens_command() {
    let temp_dir = setup_temp_dir();
    let path = write_file(temp_dir.path(), "valid.pdf", &valid_pdf());

    let output =
        run_cli_command(&["tokens", path.to_str().unwrap(), "--limit", "8"]).unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 8);
    assert!(lines[0].contains("comment"));
    assert!(stdout.contains("keyword 'obj'"));
    assert!(stdout.contains("name /Type"));
}

#[test]
fn test_tokens_at_offset() {
    let temp_dir = setup_temp_dir();
    let path = write_file(temp_dir.path(), "small.pdf", b"%PDF-1.4\n42 /Name");

    let output =
        run_cli_command(&["tokens", path.to_str().unwrap(), "--offset", "9"]).unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        vec![
            "         9  integer 42",
            "        12  name /Name",
            "        17  end of file",
        ]
    );
}
