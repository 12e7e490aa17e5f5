use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::NetworkError;
use crate::model::UnixTimeMs;

/// Timestamp as the hosted store represents it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteTimestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl RemoteTimestamp {
    pub fn from_unix_ms(at: UnixTimeMs) -> Self {
        Self {
            seconds: (at.0 / 1000) as i64,
            nanoseconds: ((at.0 % 1000) * 1_000_000) as u32,
        }
    }

    /// `None` for instants before the epoch or a nanosecond field out of range.
    pub fn to_unix_ms(self) -> Option<UnixTimeMs> {
        if self.seconds < 0 || self.nanoseconds >= 1_000_000_000 {
            return None;
        }
        let ms = (self.seconds as u64)
            .checked_mul(1000)?
            .checked_add(u64::from(self.nanoseconds / 1_000_000))?;
        Some(UnixTimeMs(ms))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// One record of the remote log, in the store's own field layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<RemoteLocation>,
    #[serde(default)]
    pub created_at: Option<RemoteTimestamp>,
    pub user: RemoteUser,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    pub data: RemoteRecord,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub String);

/// Receives the complete, ordered result set on every change, or an error
/// once the listener has dropped.
pub type DocumentSink = Arc<dyn Fn(Result<Vec<RemoteDocument>, NetworkError>) + Send + Sync>;

/// Hosted ordered, append-only document store.
#[async_trait]
pub trait RemoteLog: Send + Sync {
    /// Registers `sink` on `collection` ordered by `createdAt` descending.
    /// The sink is called with the current state right away and again after
    /// every change.
    async fn listen(&self, collection: &str, sink: DocumentSink)
        -> Result<ListenerId, NetworkError>;

    /// Unknown or already removed listeners are ignored.
    async fn unlisten(&self, listener: &ListenerId);

    /// Appends a record, returning the id the store assigned.
    async fn append(&self, collection: &str, record: RemoteRecord) -> Result<String, NetworkError>;
}

struct Listener {
    collection: String,
    sink: DocumentSink,
}

struct LogState {
    online: bool,
    collections: HashMap<String, Vec<RemoteDocument>>,
    listeners: HashMap<ListenerId, Listener>,
    appends: usize,
}

/// In-process remote log. Can be switched offline to exercise failure paths.
pub struct MemoryRemoteLog {
    state: RwLock<LogState>,
}

impl Default for MemoryRemoteLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteLog {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LogState {
                online: true,
                collections: HashMap::new(),
                listeners: HashMap::new(),
                appends: 0,
            }),
        }
    }

    /// Taking the log offline drops every listener with
    /// [`NetworkError::Dropped`] and fails new requests until it is back.
    pub async fn set_online(&self, online: bool) {
        let mut state = self.state.write().await;
        state.online = online;
        if !online {
            let dropped: Vec<Listener> = state.listeners.drain().map(|(_, l)| l).collect();
            info!(count = dropped.len(), "remote log offline, dropping listeners");
            for listener in dropped {
                (listener.sink)(Err(NetworkError::Dropped("remote log went offline".into())));
            }
        }
    }

    pub async fn listener_count(&self) -> usize {
        self.state.read().await.listeners.len()
    }

    pub async fn append_count(&self) -> usize {
        self.state.read().await.appends
    }

    pub async fn documents(&self, collection: &str) -> Vec<RemoteDocument> {
        self.state
            .read()
            .await
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteLog for MemoryRemoteLog {
    async fn listen(
        &self,
        collection: &str,
        sink: DocumentSink,
    ) -> Result<ListenerId, NetworkError> {
        let mut state = self.state.write().await;
        if !state.online {
            return Err(NetworkError::Unavailable("remote log is offline".into()));
        }

        let id = ListenerId(Uuid::new_v4().to_string());
        let current = state.collections.get(collection).cloned().unwrap_or_default();
        sink(Ok(current));

        state.listeners.insert(
            id.clone(),
            Listener {
                collection: collection.to_string(),
                sink,
            },
        );
        debug!(listener = %id.0, collection, "listener registered");
        Ok(id)
    }

    async fn unlisten(&self, listener: &ListenerId) {
        if self.state.write().await.listeners.remove(listener).is_some() {
            debug!(listener = %listener.0, "listener removed");
        }
    }

    async fn append(&self, collection: &str, record: RemoteRecord) -> Result<String, NetworkError> {
        let mut state = self.state.write().await;
        if !state.online {
            return Err(NetworkError::Unavailable("remote log is offline".into()));
        }

        let id = Uuid::new_v4().simple().to_string();
        let documents = state.collections.entry(collection.to_string()).or_default();
        documents.push(RemoteDocument {
            id: id.clone(),
            data: record,
        });
        documents.sort_by(|a, b| b.data.created_at.cmp(&a.data.created_at));
        let current = documents.clone();
        state.appends += 1;

        for listener in state.listeners.values() {
            if listener.collection == collection {
                (listener.sink)(Ok(current.clone()));
            }
        }
        Ok(id)
    }
}
