//! services/api/src/ingest/job.rs
//!
//! The background "worker" body that parses one résumé and writes its
//! terminal status.

use resume_review_core::{
    domain::{DocumentStatus, ParseJobStatus},
    ports::PortError,
};
use serde_json::Value;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{IngestJob, JobContext};
use crate::notify::StatusChange;

/// The parser domain used for résumé extraction.
pub const RESUME_DOMAIN: &str = "document.resume";

/// Runs a job in its own task so that a panic is still turned into an
/// `error` status instead of leaving the document stuck in `processing`.
pub(super) async fn supervise(ctx: JobContext, job: IngestJob) {
    let document_id = job.document_id;
    let handle = tokio::spawn(run(ctx.clone(), job));

    if let Err(join_error) = handle.await {
        error!("Parsing task for résumé {} aborted: {}", document_id, join_error);
        record_failure(&ctx, document_id, "Internal error while processing the résumé").await;
    }
}

async fn run(ctx: JobContext, job: IngestJob) {
    let started = Instant::now();
    info!("Parsing résumé {} ({})", job.document_id, job.filename);

    match parse(&ctx, &job).await {
        Ok(parsed) => {
            match ctx.db.complete_document(job.document_id, parsed).await {
                Ok(()) => {
                    info!(
                        "Résumé {} parsed in {:?}",
                        job.document_id,
                        started.elapsed()
                    );
                    ctx.hub.publish(StatusChange {
                        document_id: job.document_id,
                        status: DocumentStatus::Done,
                        error: None,
                    });
                }
                Err(e) => {
                    error!("Failed to store parsed résumé {}: {}", job.document_id, e);
                    record_failure(&ctx, job.document_id, "Failed to store the parsed résumé")
                        .await;
                }
            }
        }
        Err(message) => {
            warn!("Parsing résumé {} failed: {}", job.document_id, message);
            record_failure(&ctx, job.document_id, &message).await;
        }
    }
}

/// Submits the document and polls the parser until it finishes, fails, or
/// the configured timeout elapses.
async fn parse(ctx: &JobContext, job: &IngestJob) -> Result<Value, String> {
    let parse_job_id = ctx
        .parser
        .submit(&job.contents, &job.filename, RESUME_DOMAIN)
        .await
        .map_err(describe)?;

    let timeout = ctx.settings.timeout;
    match tokio::time::timeout(timeout, poll_until_finished(ctx, &parse_job_id)).await {
        Ok(result) => result,
        Err(_) => Err(format!("Document parsing timed out after {:?}", timeout)),
    }
}

async fn poll_until_finished(ctx: &JobContext, parse_job_id: &str) -> Result<Value, String> {
    loop {
        match ctx.parser.get_status(parse_job_id).await.map_err(describe)? {
            ParseJobStatus::Completed(parsed) => return Ok(parsed),
            ParseJobStatus::Failed(reason) => {
                return Err(format!("Document parsing failed: {reason}"))
            }
            ParseJobStatus::Pending => tokio::time::sleep(ctx.settings.poll_interval).await,
        }
    }
}

fn describe(error: PortError) -> String {
    match error {
        PortError::Upstream(msg) => format!("Document parser unavailable: {msg}"),
        other => other.to_string(),
    }
}

async fn record_failure(ctx: &JobContext, document_id: Uuid, message: &str) {
    match ctx.db.fail_document(document_id, message).await {
        Ok(()) => ctx.hub.publish(StatusChange {
            document_id,
            status: DocumentStatus::Error,
            error: Some(message.to_string()),
        }),
        Err(PortError::Conflict(_)) => {
            warn!("Résumé {} already finalized; keeping its status", document_id);
        }
        Err(e) => error!("Failed to mark résumé {} as failed: {}", document_id, e),
    }
}
