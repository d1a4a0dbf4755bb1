//! services/api/src/ingest/mod.rs
//!
//! The ingestion pipeline: accepts uploaded résumés, records them as
//! `processing`, and parses them in the background.
//!
//! Jobs go through a bounded FIFO queue. A single dispatcher task drains the
//! queue and runs at most `max_concurrent_jobs` parsing jobs at a time. When
//! the queue is full, `submit` fails fast before any row is written.

mod job;

use bytes::Bytes;
use resume_review_core::ports::{DatabaseService, DocumentParserService, PortError, PortResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::config::IngestSettings;
use crate::notify::{StatusChange, StatusHub};

pub use job::RESUME_DOMAIN;

/// Everything a worker needs to parse one document.
#[derive(Debug)]
pub(crate) struct IngestJob {
    pub document_id: Uuid,
    pub filename: String,
    pub contents: Bytes,
}

/// Shared handles used by every job.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub db: Arc<dyn DatabaseService>,
    pub parser: Arc<dyn DocumentParserService>,
    pub hub: StatusHub,
    pub settings: IngestSettings,
}

/// How much work is waiting and how much is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestBacklog {
    pub queued: usize,
    pub running: usize,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    db: Arc<dyn DatabaseService>,
    hub: StatusHub,
    queue: mpsc::Sender<IngestJob>,
    running: Arc<AtomicUsize>,
}

impl IngestionPipeline {
    /// Creates the pipeline and spawns its dispatcher on the current runtime.
    pub fn start(
        db: Arc<dyn DatabaseService>,
        parser: Arc<dyn DocumentParserService>,
        hub: StatusHub,
        settings: IngestSettings,
    ) -> Self {
        let (queue, receiver) = mpsc::channel(settings.queue_capacity);
        let workers = Arc::new(Semaphore::new(settings.max_concurrent_jobs));

        let ctx = JobContext {
            db: db.clone(),
            parser,
            hub: hub.clone(),
            settings: settings.clone(),
        };
        let running = Arc::new(AtomicUsize::new(0));
        tokio::spawn(dispatch(receiver, workers, running.clone(), ctx));

        info!(
            max_concurrent = settings.max_concurrent_jobs,
            queue_capacity = settings.queue_capacity,
            "Ingestion pipeline started"
        );

        Self {
            db,
            hub,
            queue,
            running,
        }
    }

    /// Records a new `processing` document and queues it for parsing.
    ///
    /// Returns as soon as the job is queued; parsing happens in the background.
    #[instrument(skip(self, contents), fields(size = contents.len()))]
    pub async fn submit(
        &self,
        user_id: Uuid,
        filename: &str,
        contents: Bytes,
    ) -> PortResult<Uuid> {
        let slot = self.queue.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => PortError::Overloaded(
                "Too many résumés are being processed, try again shortly".to_string(),
            ),
            mpsc::error::TrySendError::Closed(()) => {
                PortError::Unexpected("Ingestion pipeline is not running".to_string())
            }
        })?;

        let document = self.db.create_document(user_id, filename).await?;
        slot.send(IngestJob {
            document_id: document.id,
            filename: filename.to_string(),
            contents,
        });

        debug!(
            document_id = %document.id,
            backlog = ?self.backlog(),
            "Résumé queued for parsing"
        );
        Ok(document.id)
    }

    /// Completion channel: every terminal write made by a worker is published here.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.hub.subscribe()
    }

    pub fn backlog(&self) -> IngestBacklog {
        IngestBacklog {
            queued: self.queue.max_capacity() - self.queue.capacity(),
            running: self.running.load(Ordering::SeqCst),
        }
    }
}

/// Counts a job as running until it is dropped, even if the job panicked.
struct RunningGuard(Arc<AtomicUsize>);

impl RunningGuard {
    fn enter(running: &Arc<AtomicUsize>) -> Self {
        running.fetch_add(1, Ordering::SeqCst);
        Self(running.clone())
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Drains the queue in order, starting each job once a worker slot is free.
///
/// The slot is taken before a job leaves the queue, so a job is always
/// either queued or running.
async fn dispatch(
    mut receiver: mpsc::Receiver<IngestJob>,
    workers: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    ctx: JobContext,
) {
    loop {
        let permit = match workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("Worker pool closed; ingestion dispatcher stopping");
                break;
            }
        };
        let Some(job) = receiver.recv().await else {
            break;
        };

        let guard = RunningGuard::enter(&running);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            job::supervise(ctx, job).await;
        });
    }
    info!("Ingestion dispatcher stopped.");
}
