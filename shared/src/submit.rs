use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::capabilities::{
    Clock, RemoteLocation, RemoteLog, RemoteRecord, RemoteTimestamp, RemoteUser,
};
use crate::error::{SubmissionError, SubmitError, ValidationError};
use crate::model::{Author, LatLon, MessageId, Payload};

/// A candidate message as the presentation layer hands it over. Capture
/// surfaces fill in `image_ref` or `location` with already-resolved values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub text: Option<String>,
    pub image_ref: Option<String>,
    pub location: Option<(f64, f64)>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn image(image_ref: impl Into<String>) -> Self {
        Self {
            image_ref: Some(image_ref.into()),
            ..Self::default()
        }
    }

    pub fn location(latitude: f64, longitude: f64) -> Self {
        Self {
            location: Some((latitude, longitude)),
            ..Self::default()
        }
    }

    /// Resolves to exactly one payload. Blank text and empty references
    /// count as absent.
    pub fn resolve(self, max_text_len: usize) -> Result<Payload, ValidationError> {
        let text = self.text.filter(|t| !t.trim().is_empty());
        let image_ref = self.image_ref.filter(|r| !r.trim().is_empty());

        let present = usize::from(text.is_some())
            + usize::from(image_ref.is_some())
            + usize::from(self.location.is_some());
        if present == 0 {
            return Err(ValidationError::EmptyDraft);
        }
        if present > 1 {
            return Err(ValidationError::MultiplePayloads);
        }

        if let Some(text) = text {
            let len = text.chars().count();
            if len > max_text_len {
                return Err(ValidationError::TextTooLong {
                    len,
                    max: max_text_len,
                });
            }
            return Ok(Payload::Text(text));
        }

        if let Some(image_ref) = image_ref {
            let image_ref = image_ref.trim().to_string();
            url::Url::parse(&image_ref)
                .map_err(|e| ValidationError::InvalidImageRef(e.to_string()))?;
            return Ok(Payload::Image(image_ref));
        }

        match self.location {
            Some((latitude, longitude)) => Ok(Payload::Location(LatLon::new(latitude, longitude)?)),
            None => Err(ValidationError::EmptyDraft),
        }
    }
}

/// Appends validated drafts to the remote log. Nothing is inserted locally:
/// a sent message shows up with the next snapshot from the stream.
pub struct MessageSubmitter<R: RemoteLog> {
    log: Arc<R>,
    collection: String,
    author: Author,
    clock: Arc<dyn Clock>,
    max_text_len: usize,
}

impl<R: RemoteLog> MessageSubmitter<R> {
    pub fn new(
        log: Arc<R>,
        collection: impl Into<String>,
        author: Author,
        clock: Arc<dyn Clock>,
        max_text_len: usize,
    ) -> Self {
        Self {
            log,
            collection: collection.into(),
            author,
            clock,
            max_text_len,
        }
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    #[instrument(skip(self, draft), fields(author = %self.author.id))]
    pub async fn submit(&self, draft: Draft) -> Result<MessageId, SubmitError> {
        let payload = draft.resolve(self.max_text_len).map_err(|e| {
            warn!(error = %e, "draft rejected");
            e
        })?;
        let kind = payload.kind();
        let record = self.record_for(payload);

        let id = self
            .log
            .append(&self.collection, record)
            .await
            .map_err(|e| {
                warn!(error = %e, "message append failed");
                SubmitError::from(SubmissionError::Transport(e))
            })?;

        info!(message_id = %id, kind, "message appended");
        Ok(MessageId(id))
    }

    fn record_for(&self, payload: Payload) -> RemoteRecord {
        let mut record = RemoteRecord {
            text: None,
            image_ref: None,
            location: None,
            created_at: Some(RemoteTimestamp::from_unix_ms(self.clock.now())),
            user: RemoteUser {
                id: self.author.id.0.clone(),
                name: self.author.name.clone(),
                color: Some(self.author.color.clone()),
            },
        };
        match payload {
            Payload::Text(text) => record.text = Some(text),
            Payload::Image(image_ref) => record.image_ref = Some(image_ref),
            Payload::Location(at) => {
                record.location = Some(RemoteLocation {
                    latitude: at.latitude(),
                    longitude: at.longitude(),
                })
            }
        }
        record
    }
}
