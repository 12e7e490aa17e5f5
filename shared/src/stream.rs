use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::capabilities::{DocumentSink, ListenerId, RemoteDocument, RemoteLog};
use crate::error::NetworkError;
use crate::model::{Author, LatLon, Message, MessageId, Payload, Snapshot, UserId};

/// Why a remote record could not be turned into a [`Message`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordError {
    #[error("record {0} has no payload")]
    NoPayload(String),

    #[error("record {0} carries more than one payload")]
    MultiplePayloads(String),

    #[error("record {0} has no usable createdAt")]
    BadTimestamp(String),

    #[error("record {id} has an invalid location: {reason}")]
    BadLocation { id: String, reason: String },
}

/// Fallback author color when the record predates colors.
pub const DEFAULT_AUTHOR_COLOR: &str = "#090C08";

impl TryFrom<RemoteDocument> for Message {
    type Error = RecordError;

    fn try_from(doc: RemoteDocument) -> Result<Self, Self::Error> {
        let RemoteDocument { id, data } = doc;

        let created_at = data
            .created_at
            .and_then(|ts| ts.to_unix_ms())
            .ok_or_else(|| RecordError::BadTimestamp(id.clone()))?;

        let text = data.text.filter(|t| !t.is_empty()).map(Payload::Text);
        let image = data.image_ref.filter(|r| !r.is_empty()).map(Payload::Image);
        let location = data
            .location
            .map(|l| {
                LatLon::new(l.latitude, l.longitude)
                    .map(Payload::Location)
                    .map_err(|e| RecordError::BadLocation {
                        id: id.clone(),
                        reason: e.to_string(),
                    })
            })
            .transpose()?;

        let mut payloads = [text, image, location].into_iter().flatten();
        let payload = payloads
            .next()
            .ok_or_else(|| RecordError::NoPayload(id.clone()))?;
        if payloads.next().is_some() {
            return Err(RecordError::MultiplePayloads(id));
        }

        Ok(Message {
            id: MessageId(id),
            payload,
            created_at,
            author: Author {
                id: UserId(data.user.id),
                name: data.user.name,
                color: data
                    .user
                    .color
                    .unwrap_or_else(|| DEFAULT_AUTHOR_COLOR.to_string()),
            },
        })
    }
}

/// Normalizes a delivered result set. Malformed records are skipped so one
/// bad document never hides the rest of the log.
pub fn snapshot_from_documents(documents: Vec<RemoteDocument>) -> Snapshot {
    let total = documents.len();
    let messages: Vec<Message> = documents
        .into_iter()
        .filter_map(|doc| match Message::try_from(doc) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, "skipping malformed record");
                None
            }
        })
        .collect();

    if messages.len() != total {
        debug!(kept = messages.len(), total, "snapshot normalized with skips");
    }
    Snapshot::new(messages)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    seq: u64,
    listener: ListenerId,
}

impl SubscriptionHandle {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Live view over one collection of a [`RemoteLog`]. Holds at most one
/// listener at a time.
pub struct RemoteMessageStream<R: RemoteLog> {
    log: Arc<R>,
    collection: String,
    active: Option<SubscriptionHandle>,
    next_seq: u64,
}

impl<R: RemoteLog> RemoteMessageStream<R> {
    pub fn new(log: Arc<R>, collection: impl Into<String>) -> Self {
        Self {
            log,
            collection: collection.into(),
            active: None,
            next_seq: 0,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&SubscriptionHandle> {
        self.active.as_ref()
    }

    /// Opens a listener, cancelling the previous one first. `handler` gets a
    /// full snapshot on every change, starting right after registration.
    #[instrument(skip(self, handler), fields(collection = %self.collection))]
    pub async fn subscribe<F>(&mut self, handler: F) -> Result<SubscriptionHandle, NetworkError>
    where
        F: Fn(Result<Snapshot, NetworkError>) + Send + Sync + 'static,
    {
        if let Some(previous) = self.active.take() {
            debug!(seq = previous.seq, "replacing active subscription");
            self.log.unlisten(&previous.listener).await;
        }

        let sink: DocumentSink =
            Arc::new(move |result: Result<Vec<RemoteDocument>, NetworkError>| {
                handler(result.map(snapshot_from_documents))
            });
        let listener = self.log.listen(&self.collection, sink).await?;

        self.next_seq += 1;
        let handle = SubscriptionHandle {
            seq: self.next_seq,
            listener,
        };
        self.active = Some(handle.clone());
        Ok(handle)
    }

    /// Cancelling a handle that is no longer active is a no-op.
    pub async fn cancel(&mut self, handle: &SubscriptionHandle) {
        if self.active.as_ref() == Some(handle) {
            self.active = None;
            self.log.unlisten(&handle.listener).await;
            debug!(seq = handle.seq, "subscription cancelled");
        }
    }
}
