//! Bounded-concurrency entry extraction
//!
//! Every destination is resolved before the first write, so a hostile key
//! aborts the call with nothing on disk. Selected entries are then grouped by
//! compressed block: a block is decoded once, in stream order, by a single
//! worker on tokio's blocking pool. Blocks run one at a time in archive order,
//! or concurrently behind a semaphore.
//!
//! A failing entry is reported to the observer and skipped. Cancellation stops
//! new entries from starting, lets in-flight ones finish, and fails the call.

use std::any::Any;
use std::collections::HashMap;
use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::archive::ArchiveHandle;
use crate::entry::ArchiveEntry;
use crate::error::{Error, Result};
use crate::fs::{DirectoryAllocator, write_file};
use crate::observer::{ExtractionObserver, ExtractionSummary};
use crate::sanitize::{ExtractionRoot, resolve_destination};

/// How the blocks of one call are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// One block at a time, in enumeration order.
    Sequential,
    /// At most this many blocks in flight. Zero is treated as one.
    Bounded(usize),
}

/// Collaborators shared by the workers of one call.
#[derive(Clone)]
pub(crate) struct Workers {
    pub archive: Arc<dyn ArchiveHandle>,
    pub directories: Arc<dyn DirectoryAllocator>,
    pub observer: Arc<dyn ExtractionObserver>,
}

struct Job {
    entry: ArchiveEntry,
    destination: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Extracted(u64),
    Failed,
    NotStarted,
}

/// Extract `entries` under `root`.
pub(crate) async fn run(
    entries: Vec<ArchiveEntry>,
    root: &ExtractionRoot,
    workers: &Workers,
    concurrency: Concurrency,
    cancel: &CancellationToken,
) -> Result<ExtractionSummary> {
    let jobs = entries
        .into_iter()
        .map(|entry| {
            let destination = resolve_destination(root, &entry.key)?;
            Ok(Job { entry, destination })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut tally = Tally {
        summary: ExtractionSummary {
            selected: jobs.len(),
            ..Default::default()
        },
        cancelled: false,
    };

    let groups = group_by_block(jobs);
    match concurrency {
        Concurrency::Sequential => run_sequential(groups, workers, cancel, &mut tally).await,
        Concurrency::Bounded(limit) => {
            run_bounded(groups, workers, limit.max(1), cancel, &mut tally).await
        },
    }

    if tally.cancelled || cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // entries of a worker that died without reporting count as failed
    let summary = &mut tally.summary;
    summary.failed = summary.selected - summary.extracted;
    Ok(tally.summary)
}

/// Jobs of one block in archive order. Stream-less entries form their own group.
fn group_by_block(jobs: Vec<Job>) -> Vec<Vec<Job>> {
    let mut groups: Vec<Vec<Job>> = Vec::new();
    let mut by_block = HashMap::new();

    for job in jobs {
        match job.entry.block {
            Some(block) => {
                let index = *by_block.entry(block).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[index].push(job);
            },
            None => groups.push(vec![job]),
        }
    }
    groups
}

struct Tally {
    summary: ExtractionSummary,
    cancelled: bool,
}

impl Tally {
    fn record(&mut self, outcomes: Vec<Outcome>) {
        for outcome in outcomes {
            match outcome {
                Outcome::Extracted(bytes) => {
                    self.summary.extracted += 1;
                    self.summary.bytes += bytes;
                },
                Outcome::Failed => self.summary.failed += 1,
                Outcome::NotStarted => self.cancelled = true,
            }
        }
    }
}

async fn run_sequential(
    groups: Vec<Vec<Job>>,
    workers: &Workers,
    cancel: &CancellationToken,
    tally: &mut Tally,
) {
    for group in groups {
        if cancel.is_cancelled() {
            tally.cancelled = true;
            return;
        }

        let (workers, cancel) = (workers.clone(), cancel.clone());
        let joined =
            tokio::task::spawn_blocking(move || extract_group(&workers, &group, &cancel)).await;
        if let Ok(outcomes) = joined {
            tally.record(outcomes);
        }
    }
}

async fn run_bounded(
    groups: Vec<Vec<Job>>,
    workers: &Workers,
    limit: usize,
    cancel: &CancellationToken,
    tally: &mut Tally,
) {
    let gate = Arc::new(Semaphore::new(limit));
    let mut tasks = JoinSet::new();

    for group in groups {
        if cancel.is_cancelled() {
            tally.cancelled = true;
            break;
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tally.cancelled = true;
                break;
            }
            permit = Arc::clone(&gate).acquire_owned() => permit,
        };
        let Ok(permit) = permit else {
            // the gate is never closed while groups remain
            tally.cancelled = true;
            break;
        };

        let (workers, cancel) = (workers.clone(), cancel.clone());
        tasks.spawn_blocking(move || {
            let outcomes = extract_group(&workers, &group, &cancel);
            drop(permit);
            outcomes
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Ok(outcomes) = joined {
            tally.record(outcomes);
        }
    }
}

/// Decode one block and write its jobs. Runs on the blocking pool and never
/// returns a fatal error: one outcome per job, in order.
fn extract_group(workers: &Workers, jobs: &[Job], cancel: &CancellationToken) -> Vec<Outcome> {
    let mut outcomes = vec![Outcome::NotStarted; jobs.len()];
    if cancel.is_cancelled() {
        return outcomes;
    }

    let wanted: Vec<ArchiveEntry> = jobs.iter().map(|job| job.entry.clone()).collect();
    let mut visited = 0;
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        workers.archive.read_block(&wanted, &mut |_, data| {
            let Some(job) = jobs.get(visited) else {
                return false;
            };
            if cancel.is_cancelled() {
                return false;
            }
            outcomes[visited] = write_job(workers, job, data);
            visited += 1;
            true
        })
    }));

    let result = attempt.unwrap_or_else(|payload| Err(io::Error::other(panic_message(payload))));
    if cancel.is_cancelled() {
        return outcomes;
    }

    // everything the pass did not reach fails with the block's error
    let reason = match result {
        Ok(()) => "entry was not reached while decoding its block".to_string(),
        Err(e) => e.to_string(),
    };
    for (job, outcome) in jobs.iter().zip(&mut outcomes).skip(visited) {
        *outcome = fail(workers, job, io::Error::other(reason.clone()));
    }
    outcomes
}

fn write_job(workers: &Workers, job: &Job, data: &mut dyn Read) -> Outcome {
    workers.observer.entry_started(&job.entry);

    let written = job
        .destination
        .parent()
        .map_or(Ok(()), |parent| workers.directories.create_if_not_exists(parent))
        .and_then(|()| write_file(data, &job.destination, job.entry.size));

    match written {
        Ok(bytes) => {
            workers.observer.entry_extracted(&job.entry, bytes);
            Outcome::Extracted(bytes)
        },
        Err(source) => fail(workers, job, source),
    }
}

fn fail(workers: &Workers, job: &Job, source: io::Error) -> Outcome {
    let error = Error::EntryExtraction {
        entry: job.entry.key.clone(),
        source,
    };
    workers.observer.entry_failed(&job.entry, &error);
    Outcome::Failed
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("worker panicked: {message}")
    } else {
        "worker panicked".to_string()
    }
}
