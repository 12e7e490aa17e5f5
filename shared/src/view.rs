//! Immutable projections handed to the presentation layer.
use serde::{Deserialize, Serialize};

use crate::model::{Message, MessageId, Payload, Snapshot, UnixTimeMs, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Messages come from the live subscription.
    Live,
    /// Messages come from the local cache.
    Offline,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Text { text: String },
    Image { url: String },
    Location { latitude: f64, longitude: f64 },
}

impl MessageBody {
    /// One-line summary for previews and accessibility labels.
    pub fn preview(&self) -> String {
        match self {
            MessageBody::Text { text } => text.clone(),
            MessageBody::Image { .. } => "Photo".to_string(),
            MessageBody::Location {
                latitude,
                longitude,
            } => format!("Location ({latitude:.4}, {longitude:.4})"),
        }
    }
}

impl From<&Payload> for MessageBody {
    fn from(payload: &Payload) -> Self {
        match payload {
            Payload::Text(text) => MessageBody::Text { text: text.clone() },
            Payload::Image(url) => MessageBody::Image { url: url.clone() },
            Payload::Location(at) => MessageBody::Location {
                latitude: at.latitude(),
                longitude: at.longitude(),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub author_name: String,
    pub author_color: String,
    pub is_mine: bool,
    pub created_at: UnixTimeMs,
    pub body: MessageBody,
}

impl MessageView {
    fn project(message: &Message, me: &UserId) -> Self {
        Self {
            id: message.id.clone(),
            author_name: message.author.name.clone(),
            author_color: message.author.color.clone(),
            is_mine: &message.author.id == me,
            created_at: message.created_at,
            body: MessageBody::from(&message.payload),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatViewModel {
    /// Oldest first, the order a chat list renders in.
    pub messages: Vec<MessageView>,
    pub online: bool,
    pub mode: SyncMode,
}

impl ChatViewModel {
    pub fn project(snapshot: &Snapshot, me: &UserId, online: bool, mode: SyncMode) -> Self {
        Self {
            messages: snapshot
                .chronological()
                .map(|m| MessageView::project(m, me))
                .collect(),
            online,
            mode,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
