//! The export pipeline.
//!
//! One coordinator thread reads the store cursor and submits one job per
//! record to the [`WorkerPool`]. Finished records go through a channel to the
//! [`StreamingExporter`], which runs on the calling thread. Fork counts are
//! either assigned after every record completed ([`ForkCounting::Deferred`])
//! or stamped by the workers from an index of the input records that have a
//! HEAD reference ([`ForkCounting::Eager`]).
//!
//! `total` counts the records read from the store cursor and submitted, plus
//! the cursor entries that could not be read. Every one of them ends up either
//! processed or failed, a job that panics included.
//!
//! Cancellation is best effort: the exporter returns as soon as the token is
//! tripped, while the coordinator and jobs already submitted keep running in
//! the background and their results are dropped.

use std::any::Any;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use tracing::{debug, error, info};

use crate::error::{ExportError, StorageError};
use crate::export::{prepare_output, StreamingExporter};
use crate::forks::{assign_fork_counts, ForkIndex};
use crate::locker::ResourceLocker;
use crate::model::{ExportRecord, FetchStatus, RepositoryRecord};
use crate::processor::{Analyzers, RepositoryProcessor};
use crate::storage::{RecordCursor, RepositoryQuery, RepositoryStore, Transactioner};
use crate::worker::WorkerPool;

/// When fork counts are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ForkCounting {
    /// Index the roots of the input records first, rows stream as they
    /// finish. Records that fail after indexing still count as forks.
    Eager,
    /// Count over completed records once all of them are done, then write.
    #[default]
    Deferred,
}

/// Shared flag used to stop the export.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub workers: usize,
    pub queue_depth: usize,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub fork_counting: ForkCounting,
    /// How often the exporter checks for cancellation while idle.
    pub poll_interval: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, |n| n.get()),
            queue_depth: 0,
            limit: None,
            offset: None,
            fork_counting: ForkCounting::default(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl ExportConfig {
    fn query(&self) -> RepositoryQuery {
        let mut query = RepositoryQuery::new().find_by_status(FetchStatus::Fetched);
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        query
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
    pub failed: u64,
    pub total: u64,
    pub written: u64,
    pub expected: u64,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    total: AtomicU64,
}

impl Counters {
    fn fail(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Where workers hand their records off.
#[derive(Clone)]
enum Sink {
    Stream(Sender<ExportRecord>),
    Collect(Arc<Mutex<Vec<ExportRecord>>>),
}

impl Sink {
    fn push(&self, record: ExportRecord) {
        match self {
            // The exporter may have stopped listening.
            Sink::Stream(tx) => {
                let _ = tx.send(record);
            }
            Sink::Collect(records) => records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(record),
        }
    }
}

/// Everything a job needs, cloned into each one.
#[derive(Clone)]
struct JobContext {
    txer: Arc<dyn Transactioner>,
    locker: Arc<ResourceLocker>,
    analyzers: Analyzers,
    counters: Arc<Counters>,
    forks: Option<Arc<ForkIndex>>,
    sink: Sink,
}

impl JobContext {
    fn run(&self, record: RepositoryRecord) {
        debug!(repo = %record.id, "starting worker");
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            RepositoryProcessor::new(&record, self.txer.as_ref(), &self.locker, &self.analyzers)
                .process()
        }));
        match result {
            Ok(Ok(mut data)) => {
                if let Some(index) = &self.forks {
                    data.forks = index.fork_count(&data.roots);
                }
                self.counters.processed.fetch_add(1, Ordering::SeqCst);
                self.sink.push(data);
            }
            Ok(Err(err)) => {
                error!(repo = %record.id, err = %err, "unable to process repository");
                self.counters.fail();
            }
            Err(payload) => {
                error!(
                    repo = %record.id,
                    panic = panic_message(payload.as_ref()),
                    "worker panicked while processing repository"
                );
                self.counters.fail();
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

pub struct Pipeline {
    store: Arc<dyn RepositoryStore>,
    txer: Arc<dyn Transactioner>,
    analyzers: Analyzers,
    config: ExportConfig,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        txer: Arc<dyn Transactioner>,
        config: ExportConfig,
    ) -> Self {
        Self {
            store,
            txer,
            analyzers: Analyzers::default(),
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_analyzers(mut self, analyzers: Analyzers) -> Self {
        self.analyzers = analyzers;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Replace the file at `path` with the export.
    pub fn run_to_file(&self, path: &Path) -> Result<RunSummary, ExportError> {
        let file: File = prepare_output(path)?;
        self.run(BufWriter::new(file))
    }

    pub fn run<W: Write>(&self, out: W) -> Result<RunSummary, ExportError> {
        let query = self.config.query();
        let matching = self.store.count(&query).map_err(ExportError::Store)?;
        let expected = expected_rows(matching, &query);
        let cursor = self.store.find(&query).map_err(ExportError::Store)?;

        info!(workers = self.config.workers, expected, "start processing repos");
        let start = Instant::now();

        let counters = Arc::new(Counters::default());
        let (tx, rx) = channel();
        let coordinator = self.spawn_coordinator(cursor, counters.clone(), tx);

        let mut exporter = StreamingExporter::new(out, self.cancel.clone())
            .with_poll_interval(self.config.poll_interval);
        let exported = exporter.export(&rx, expected)?;

        // Once the channel is closed every job has finished. On cancellation
        // the coordinator is left running.
        if !exported.cancelled && coordinator.join().is_err() {
            error!("coordinator thread panicked");
        }

        let summary = RunSummary {
            processed: counters.processed.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            total: counters.total.load(Ordering::SeqCst),
            written: exported.written,
            expected,
            cancelled: exported.cancelled,
        };
        info!(
            processed = summary.processed,
            failed = summary.failed,
            total = summary.total,
            written = summary.written,
            cancelled = summary.cancelled,
            elapsed = ?start.elapsed(),
            "finished processing all repositories"
        );
        Ok(summary)
    }

    fn spawn_coordinator(
        &self,
        cursor: RecordCursor,
        counters: Arc<Counters>,
        tx: Sender<ExportRecord>,
    ) -> thread::JoinHandle<()> {
        let (workers, queue_depth) = (self.config.workers, self.config.queue_depth);
        let mode = self.config.fork_counting;
        let cancel = self.cancel.clone();
        let collected = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = JobContext {
            txer: self.txer.clone(),
            locker: Arc::new(ResourceLocker::new()),
            analyzers: self.analyzers.clone(),
            counters,
            forks: None,
            sink: match mode {
                ForkCounting::Eager => Sink::Stream(tx.clone()),
                ForkCounting::Deferred => Sink::Collect(collected.clone()),
            },
        };

        thread::spawn(move || {
            debug!(?mode, "start processing");
            let pool = WorkerPool::new(workers, queue_depth);
            let records: Box<dyn Iterator<Item = Result<RepositoryRecord, StorageError>>> = match mode {
                ForkCounting::Eager => {
                    let (records, failed) = drain(cursor);
                    ctx.counters.failed.fetch_add(failed, Ordering::SeqCst);
                    ctx.counters.total.fetch_add(failed, Ordering::SeqCst);
                    let index = ForkIndex::from_records(&records);
                    debug!(records = records.len(), roots = index.len(), "indexed roots");
                    ctx.forks = Some(Arc::new(index));
                    Box::new(records.into_iter().map(Ok))
                }
                ForkCounting::Deferred => cursor,
            };

            for record in records {
                if cancel.is_cancelled() {
                    debug!("cancelled, no more repositories are submitted");
                    break;
                }
                ctx.counters.total.fetch_add(1, Ordering::SeqCst);
                let record = match record {
                    Ok(record) => record,
                    Err(err) => {
                        error!(err = %err, "unable to get next repository");
                        ctx.counters.fail();
                        continue;
                    }
                };
                let ctx = ctx.clone();
                pool.submit(move || ctx.run(record));
            }
            pool.join();
            debug!("finished processing");

            if mode == ForkCounting::Deferred {
                let mut records =
                    std::mem::take(&mut *collected.lock().unwrap_or_else(PoisonError::into_inner));
                assign_fork_counts(&mut records);
                for record in records {
                    if tx.send(record).is_err() {
                        break;
                    }
                }
            }
        })
    }
}

/// Read the whole cursor, counting the entries that fail to decode.
fn drain(cursor: RecordCursor) -> (Vec<RepositoryRecord>, u64) {
    let mut records = Vec::new();
    let mut failed = 0;
    for record in cursor {
        match record {
            Ok(record) => records.push(record),
            Err(err) => {
                error!(err = %err, "unable to get next repository");
                failed += 1;
            }
        }
    }
    (records, failed)
}

/// Rows a full run writes: the matching count with pagination applied.
fn expected_rows(matching: u64, query: &RepositoryQuery) -> u64 {
    let remaining = matching.saturating_sub(query.offset.unwrap_or(0) as u64);
    query
        .limit
        .map_or(remaining, |limit| remaining.min(limit as u64))
}
