//! Bulk ingestion: read -> parse -> write.
//!
//! Three stages run concurrently on dedicated named threads and hand records
//! over bounded channels:
//!
//! - one reader pulls raw records from a [`RecordReader`],
//! - `parallelism` parser workers share the reader's channel, each doing a
//!   blocking receive, and decode records with a [`RecordParser`],
//! - one writer drains the parsers' combined output into
//!   [`VectorService::insert`], so the engine only ever sees a single
//!   mutating caller.
//!
//! Stages live outside tokio's blocking pool: they park on each other for the
//! whole run, so a bounded pool could leave the writer unscheduled behind
//! blocked parsers. Bad records are logged and skipped at every stage. Input
//! order is not preserved across records.

use crate::application::service::VectorService;
use crate::config::IngestConfig;
use crate::domain::entities::record::IdVector;
use crate::domain::error::DomainError;
use crate::domain::ports::record_source::{RecordParser, RecordReader};
use crate::domain::values::external_id::display_id;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

const RAW_CHANNEL_CAPACITY: usize = 1024;
const PARSED_CHANNEL_CAPACITY: usize = 256;
/// The reader gives up on an input that fails this many times in a row.
const MAX_CONSECUTIVE_READ_ERRORS: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub read: usize,
    pub parsed: usize,
    pub inserted: usize,
    pub read_errors: usize,
    pub decode_errors: usize,
    pub insert_errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ReadStats {
    read: usize,
    errors: usize,
}

#[derive(Debug, Default)]
struct ParseStats {
    parsed: usize,
    errors: usize,
}

#[derive(Debug, Default)]
struct WriteStats {
    inserted: usize,
    errors: usize,
}

pub struct IngestPipeline {
    service: Arc<VectorService>,
    reader: Box<dyn RecordReader>,
    parser: Arc<dyn RecordParser>,
    parallelism: usize,
    pool_size: usize,
}

impl IngestPipeline {
    pub fn new(
        service: Arc<VectorService>,
        reader: Box<dyn RecordReader>,
        parser: Arc<dyn RecordParser>,
        config: &IngestConfig,
    ) -> Result<Self, DomainError> {
        config.validate()?;
        Ok(Self {
            service,
            reader,
            parser,
            parallelism: config.parallelism,
            pool_size: config.pool_size,
        })
    }

    /// Runs all three stages to completion, then builds and saves the index.
    ///
    /// Fails with `AlreadyRunning` if another ingestion holds the service.
    pub async fn run(self) -> Result<IngestReport, DomainError> {
        let IngestPipeline {
            service,
            reader,
            parser,
            parallelism,
            pool_size,
        } = self;

        let _ingesting = service.begin_ingest()?;
        let started_at = Utc::now();
        info!(parallelism, pool_size, backend = service.store().name(), "ingestion started");

        let (raw_tx, raw_rx) = mpsc::channel::<Vec<u8>>(RAW_CHANNEL_CAPACITY);
        let (parsed_tx, parsed_rx) = mpsc::channel::<IdVector>(PARSED_CHANNEL_CAPACITY);

        let write_task = {
            let service = service.clone();
            spawn_stage("ingest-write".into(), move || write_stage(&service, parsed_rx))?
        };
        let read_task = spawn_stage("ingest-read".into(), move || read_stage(reader, raw_tx))?;

        let raw_rx = Arc::new(Mutex::new(raw_rx));
        let parse_tasks = (0..parallelism)
            .map(|worker| {
                let rx = raw_rx.clone();
                let tx = parsed_tx.clone();
                let parser = parser.clone();
                spawn_stage(format!("ingest-parse-{worker}"), move || {
                    parse_stage(worker, &rx, &tx, parser.as_ref())
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        // Workers hold the only senders now; the writer sees end-of-stream
        // once the last of them exits.
        drop(parsed_tx);

        let read_stats = read_task.await.map_err(stage_failed)?;
        let mut parse_stats = ParseStats::default();
        for task in parse_tasks {
            let stats = task.await.map_err(stage_failed)?;
            parse_stats.parsed += stats.parsed;
            parse_stats.errors += stats.errors;
        }
        let write_stats = write_task.await.map_err(stage_failed)?;

        let build_service = service.clone();
        tokio::task::spawn_blocking(move || {
            build_service.create_index(pool_size)?;
            build_service.save_index()
        })
        .await
        .map_err(|e| DomainError::BackendUnavailable(format!("index build failed: {e}")))??;

        let report = IngestReport {
            read: read_stats.read,
            parsed: parse_stats.parsed,
            inserted: write_stats.inserted,
            read_errors: read_stats.errors,
            decode_errors: parse_stats.errors,
            insert_errors: write_stats.errors,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            read = report.read,
            inserted = report.inserted,
            read_errors = report.read_errors,
            decode_errors = report.decode_errors,
            insert_errors = report.insert_errors,
            "ingestion finished"
        );
        Ok(report)
    }
}

/// Runs `f` on its own named thread; the receiver yields its result, or an
/// error if the thread panicked before producing one.
fn spawn_stage<T, F>(name: String, f: F) -> Result<oneshot::Receiver<T>, DomainError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let _ = tx.send(f());
        })
        .map_err(|e| DomainError::BackendUnavailable(format!("spawning {name}: {e}")))?;
    Ok(rx)
}

fn stage_failed(_: oneshot::error::RecvError) -> DomainError {
    DomainError::BackendUnavailable("ingestion stage exited without a result".into())
}

fn read_stage(mut reader: Box<dyn RecordReader>, tx: Sender<Vec<u8>>) -> ReadStats {
    let mut stats = ReadStats::default();
    let mut consecutive_errors = 0;
    loop {
        match reader.next_record() {
            Ok(Some(raw)) => {
                consecutive_errors = 0;
                stats.read += 1;
                if tx.blocking_send(raw).is_err() {
                    warn!("parsers are gone, reader stopping early");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                stats.errors += 1;
                consecutive_errors += 1;
                warn!(error = %e, "skipping unreadable record");
                if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    error!(consecutive_errors, "input keeps failing, treating it as exhausted");
                    break;
                }
            }
        }
    }
    debug!(read = stats.read, "reader done");
    stats
}

fn parse_stage(
    worker: usize,
    rx: &Mutex<Receiver<Vec<u8>>>,
    tx: &Sender<IdVector>,
    parser: &dyn RecordParser,
) -> ParseStats {
    let mut stats = ParseStats::default();
    loop {
        let next = match rx.lock() {
            Ok(mut rx) => rx.blocking_recv(),
            Err(e) => {
                error!(worker, error = %e, "record channel poisoned");
                None
            }
        };
        let Some(raw) = next else {
            break;
        };
        match parser.parse(&raw) {
            Ok(record) => {
                stats.parsed += 1;
                if tx.blocking_send(record).is_err() {
                    warn!(worker, "writer is gone, parser stopping early");
                    break;
                }
            }
            Err(e) => {
                stats.errors += 1;
                warn!(worker, error = %e, "dropping undecodable record");
            }
        }
    }
    debug!(worker, parsed = stats.parsed, "parser done");
    stats
}

fn write_stage(service: &VectorService, mut rx: Receiver<IdVector>) -> WriteStats {
    let mut stats = WriteStats::default();
    while let Some(record) = rx.blocking_recv() {
        match service.insert(&record.vector, &record.id) {
            Ok(_) => stats.inserted += 1,
            Err(e) => {
                stats.errors += 1;
                warn!(id = %display_id(&record.id), error = %e, "insert failed, record skipped");
            }
        }
    }
    debug!(inserted = stats.inserted, "writer done");
    stats
}
