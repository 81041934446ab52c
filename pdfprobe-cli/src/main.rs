mod pool;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use pdfprobe::parser::{Lexer, TokenKind};
use pdfprobe::{
    fetch, parse_path_with_options, parse_with_options, AbortFlag, ParseOptions, ParseReport,
    Severity, SubsectionPolicy,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "pdfprobe",
    about = "Characterize and validate PDF documents",
    version,
    author
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether documents are well-formed and valid
    Check {
        /// Input files, `-` for standard input
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,

        /// Treat every recoverable deviation as a grammar violation
        #[arg(long)]
        strict: bool,

        /// Stop cross-reference resolution at a corrupt subsection
        #[arg(long)]
        abort_on_corrupt_xref: bool,

        /// Budget for chained object resolution
        #[arg(long)]
        max_depth: Option<usize>,

        /// Skip the page tree walk
        #[arg(long)]
        no_pages: bool,

        /// Worker threads (defaults to the number of CPUs)
        #[arg(short = 'j', long)]
        jobs: Option<usize>,
    },

    /// Dump the tokens of a file
    Tokens {
        /// Input file
        file: PathBuf,

        /// Byte offset to start at
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Maximum number of tokens
        #[arg(long, default_value = "100")]
        limit: usize,
    },
}

/// Exit status of `check`
const EXIT_OK: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_IO: u8 = 2;

#[derive(Serialize)]
struct FileEntry<'a> {
    path: String,
    checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a ParseReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Check {
            files,
            json,
            strict,
            abort_on_corrupt_xref,
            max_depth,
            no_pages,
            jobs,
        } => {
            let mut options = if strict {
                ParseOptions::strict()
            } else {
                ParseOptions::lenient()
            };
            if abort_on_corrupt_xref {
                options = options.with_corrupt_subsection(SubsectionPolicy::Abort);
            }
            if let Some(depth) = max_depth {
                options = options.with_max_resolve_depth(depth);
            }
            if no_pages {
                options = options.with_page_walk(false);
            }
            let workers = jobs.unwrap_or_else(num_cpus::get);
            check(files, options, workers, json)
        }
        Commands::Tokens {
            file,
            offset,
            limit,
        } => dump_tokens(&file, offset, limit).map(|()| EXIT_OK),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(EXIT_IO)
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdfprobe=warn")),
        1 => EnvFilter::new("pdfprobe=debug"),
        _ => EnvFilter::new("pdfprobe=trace"),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn check_one(path: &Path, options: &ParseOptions) -> Result<ParseReport> {
    if path == Path::new("-") {
        let abort = AbortFlag::new();
        let source = fetch(io::stdin().lock(), &abort).context("reading standard input")?;
        return Ok(parse_with_options(source, options));
    }
    parse_path_with_options(path, options).with_context(|| format!("opening {}", path.display()))
}

fn check(files: Vec<PathBuf>, options: ParseOptions, workers: usize, json: bool) -> Result<u8> {
    let results = pool::run(files, workers, move |path| check_one(path, &options))?;

    let mut code = EXIT_OK;
    for result in &results {
        match &result.report {
            Ok(report) if !(report.well_formed && report.valid) => code = code.max(EXIT_FAILED),
            Ok(_) => {}
            Err(_) => code = EXIT_IO,
        }
    }

    if json {
        let checked_at = Utc::now();
        let entries: Vec<FileEntry> = results
            .iter()
            .map(|result| FileEntry {
                path: result.path.display().to_string(),
                checked_at,
                report: result.report.as_ref().ok(),
                error: result.report.as_ref().err().map(|err| format!("{err:#}")),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for result in &results {
            match &result.report {
                Ok(report) => print_report(&result.path, report),
                Err(err) => eprintln!("{}: {err:#}", result.path.display()),
            }
        }
    }
    Ok(code)
}

fn print_report(path: &Path, report: &ParseReport) {
    let verdict = match (report.well_formed, report.valid) {
        (true, true) => "well-formed and valid",
        (true, false) => "well-formed, not valid",
        _ => "not well-formed",
    };
    println!("{}: {verdict}", path.display());

    if let Some(version) = report.version {
        println!("  Version: {version}");
    }
    println!(
        "  Objects: {} in use, {} free, {} incremental update(s)",
        report.object_count, report.free_object_count, report.incremental_updates
    );
    if let Some(id) = &report.document_id {
        println!("  ID: {id}");
    }
    if let Some(pages) = report.page_count {
        println!("  Pages: {pages}");
    }
    if let Some(items) = report.outline_items {
        println!("  Outline items: {items}");
    }
    if let Some(encryption) = &report.encryption {
        println!(
            "  Encrypted: filter {}, V {}, R {}",
            encryption.filter.as_deref().unwrap_or("?"),
            encryption.version.unwrap_or(0),
            encryption.revision.unwrap_or(0)
        );
    }
    if !report.languages.is_empty() {
        let languages: Vec<&str> = report.languages.iter().map(String::as_str).collect();
        println!("  Languages: {}", languages.join(", "));
    }
    if report.non_compliant {
        println!("  Exceeds archival profile limits");
    }

    for diagnostic in &report.diagnostics {
        let marker = match diagnostic.severity {
            Severity::Malformed => "E",
            Severity::Invalid => "W",
            Severity::Info => "I",
        };
        println!("  {marker} {diagnostic}");
    }
}

fn dump_tokens(path: &Path, offset: u64, limit: usize) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut lexer = Lexer::new(BufReader::new(file));
    lexer.seek(offset)?;

    for _ in 0..limit {
        let token = match lexer.next_token() {
            Ok(token) => token,
            Err(err) => {
                println!("{:>10}  error: {err}", lexer.position());
                break;
            }
        };
        let detail = match &token.kind {
            TokenKind::LiteralString(bytes) | TokenKind::HexString(bytes) => {
                format!(" {:?}", String::from_utf8_lossy(bytes))
            }
            TokenKind::StreamBody {
                data_offset,
                length,
            } => format!(" at {data_offset}, {length} bytes"),
            _ => String::new(),
        };
        let quirks = if token.quirks.is_empty() {
            String::new()
        } else {
            format!("  [{:?}]", token.quirks)
        };
        println!("{:>10}  {}{detail}{quirks}", token.offset, token.kind);
        if token.kind == TokenKind::Eof {
            break;
        }
    }
    Ok(())
}
