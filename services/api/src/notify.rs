//! services/api/src/notify.rs
//!
//! Lets clients observe a résumé's status, either as a one-off snapshot or as
//! a stream of change events.
//!
//! Terminal writes made by the ingestion workers are published on a
//! [`StatusHub`]. A stream re-reads the document whenever the hub reports a
//! change for it, and falls back to a fixed timer so that writes made by
//! another process are still picked up.

use chrono::{DateTime, Utc};
use futures::Stream;
use resume_review_core::{
    domain::{Document, DocumentStatus},
    ports::{DatabaseService, PortResult},
};
use serde::Serialize;
use serde_json::Value;
use std::{pin::Pin, sync::Arc, time::Duration};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

const HUB_CAPACITY: usize = 256;
const DEFAULT_ERROR_MESSAGE: &str = "Processing error";

/// A status change published by the ingestion workers.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub document_id: Uuid,
    pub status: DocumentStatus,
    pub error: Option<String>,
}

/// In-process broadcast of document status changes.
#[derive(Clone)]
pub struct StatusHub {
    sender: broadcast::Sender<StatusChange>,
}

impl StatusHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, change: StatusChange) {
        // No subscribers is fine; streams fall back to polling.
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.sender.subscribe()
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time view of a document's status.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub status: DocumentStatus,
    pub parsed_data: Option<Value>,
    pub error: Option<String>,
}

/// One event on the status stream.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusEvent {
    #[schema(value_type = String, example = "processing")]
    #[serde(serialize_with = "serialize_status")]
    pub status: DocumentStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusEvent {
    fn from_document(document: &Document) -> Self {
        let (resume_id, error) = match document.status {
            DocumentStatus::Done => (Some(document.id), None),
            DocumentStatus::Error => (
                None,
                Some(
                    document
                        .error_message
                        .clone()
                        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
                ),
            ),
            DocumentStatus::Processing => (None, None),
        };
        Self {
            status: document.status,
            timestamp: Utc::now(),
            resume_id,
            error,
        }
    }
}

fn serialize_status<S: serde::Serializer>(
    status: &DocumentStatus,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(status.as_str())
}

pub type StatusStream = Pin<Box<dyn Stream<Item = PortResult<StatusEvent>> + Send>>;

#[derive(Clone)]
pub struct StatusNotifier {
    db: Arc<dyn DatabaseService>,
    hub: StatusHub,
    poll_interval: Duration,
}

impl StatusNotifier {
    pub fn new(db: Arc<dyn DatabaseService>, hub: StatusHub, poll_interval: Duration) -> Self {
        Self {
            db,
            hub,
            poll_interval,
        }
    }

    /// Reads the document once.
    pub async fn poll(&self, document_id: Uuid, user_id: Uuid) -> PortResult<StatusSnapshot> {
        let document = self.db.get_document_for_user(document_id, user_id).await?;
        let parsed_data = match document.status {
            DocumentStatus::Done => document.parsed_data,
            _ => None,
        };
        let error = match document.status {
            DocumentStatus::Error => Some(
                document
                    .error_message
                    .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
            ),
            _ => None,
        };
        Ok(StatusSnapshot {
            status: document.status,
            parsed_data,
            error,
        })
    }

    /// Opens a stream of status changes for a document the user owns.
    ///
    /// One event is emitted per distinct status observed; the stream ends
    /// right after the first terminal event.
    #[instrument(skip(self))]
    pub async fn stream(&self, document_id: Uuid, user_id: Uuid) -> PortResult<StatusStream> {
        // Subscribe before the first read so no change can slip between them.
        let mut changes = self.hub.subscribe();
        self.db.get_document_for_user(document_id, user_id).await?;

        let db = self.db.clone();
        let poll_interval = self.poll_interval;

        let stream = async_stream::stream! {
            let mut last_status: Option<DocumentStatus> = None;
            loop {
                let document = match db.get_document_for_user(document_id, user_id).await {
                    Ok(document) => document,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };

                if last_status != Some(document.status) {
                    last_status = Some(document.status);
                    let terminal = document.status.is_terminal();
                    yield Ok(StatusEvent::from_document(&document));
                    if terminal {
                        debug!(%document_id, status = %document.status, "Status stream finished");
                        break;
                    }
                }

                wait_for_change(&mut changes, document_id, poll_interval).await;
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Returns when the hub reports a change for `document_id` or the fallback
/// timer fires, whichever happens first.
async fn wait_for_change(
    changes: &mut broadcast::Receiver<StatusChange>,
    document_id: Uuid,
    fallback: Duration,
) {
    let timer = tokio::time::sleep(fallback);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            _ = &mut timer => return,
            received = changes.recv() => match received {
                Ok(change) if change.document_id == document_id => return,
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => return,
                Err(RecvError::Closed) => {
                    (&mut timer).await;
                    return;
                }
            },
        }
    }
}
