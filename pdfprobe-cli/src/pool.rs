//! Worker pool for checking several files at once
//!
//! Every worker builds its own parse session; sessions never cross threads.
//! Jobs are handed out through a shared channel and results come back tagged
//! with the index of their job.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use pdfprobe::ParseReport;

/// Stack for each worker; object nesting is bounded separately by the parser
pub const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// One file to check
#[derive(Debug, Clone)]
pub struct Job {
    pub index: usize,
    pub path: PathBuf,
}

/// Outcome of one job
#[derive(Debug)]
pub struct JobResult {
    pub index: usize,
    pub path: PathBuf,
    pub report: Result<ParseReport>,
}

/// Run `check` over every path on `workers` threads. Results are returned in
/// input order. Fails only when no worker thread can be started.
pub fn run<F>(paths: Vec<PathBuf>, workers: usize, check: F) -> Result<Vec<JobResult>>
where
    F: Fn(&PathBuf) -> Result<ParseReport> + Send + Sync + 'static,
{
    let total = paths.len();
    let workers = workers.clamp(1, total.max(1));
    let check = Arc::new(check);
    let cancelled = Arc::new(AtomicBool::new(false));

    let (job_sender, job_receiver) = mpsc::channel::<Job>();
    let job_receiver = Arc::new(Mutex::new(job_receiver));
    let (result_sender, result_receiver) = mpsc::channel::<JobResult>();

    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let receiver = Arc::clone(&job_receiver);
        let sender = result_sender.clone();
        let check = Arc::clone(&check);
        let cancelled = Arc::clone(&cancelled);

        let spawned = thread::Builder::new()
            .name(format!("pdfprobe-worker-{id}"))
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || loop {
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }
                let job = match receiver.lock() {
                    Ok(guard) => guard.recv(),
                    Err(_) => break,
                };
                let Ok(job) = job else {
                    break;
                };

                tracing::debug!(worker = id, path = %job.path.display(), "checking");
                let report = check(&job.path);
                let result = JobResult {
                    index: job.index,
                    path: job.path,
                    report,
                };
                if sender.send(result).is_err() {
                    cancelled.store(true, Ordering::SeqCst);
                    break;
                }
            });
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) if !handles.is_empty() => {
                tracing::warn!(%err, workers = handles.len(), "running with fewer workers");
                break;
            }
            Err(err) => return Err(err).context("starting worker thread"),
        }
    }
    // Workers hold the only remaining result senders
    drop(result_sender);

    for (index, path) in paths.into_iter().enumerate() {
        if job_sender.send(Job { index, path }).is_err() {
            break;
        }
    }
    drop(job_sender);

    let mut results: Vec<JobResult> = result_receiver.iter().collect();
    for handle in handles {
        if handle.join().is_err() {
            tracing::warn!("worker panicked");
        }
    }
    results.sort_by_key(|result| result.index);
    Ok(results)
}
