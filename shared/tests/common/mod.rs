#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chat_shared::capabilities::{
    DocumentSink, ListenerId, RemoteDocument, RemoteLog, RemoteRecord, RemoteTimestamp, RemoteUser,
};
use chat_shared::NetworkError;

pub fn record(text: &str, seconds: i64, user: &str) -> RemoteRecord {
    RemoteRecord {
        text: Some(text.to_string()),
        image_ref: None,
        location: None,
        created_at: Some(RemoteTimestamp {
            seconds,
            nanoseconds: 0,
        }),
        user: RemoteUser {
            id: user.to_string(),
            name: format!("name of {user}"),
            color: Some("#B9C6AE".into()),
        },
    }
}

pub fn doc(id: &str, seconds: i64) -> RemoteDocument {
    RemoteDocument {
        id: id.to_string(),
        data: record(&format!("text {id}"), seconds, "u1"),
    }
}

#[derive(Default)]
struct Script {
    sinks: Vec<DocumentSink>,
    active: HashSet<usize>,
    max_active: usize,
    fail_listens: u32,
    listen_calls: usize,
}

/// Remote log whose deliveries are fired by the test, in any order and at any
/// time, including after the listener was removed.
#[derive(Default)]
pub struct ScriptedLog {
    script: Mutex<Script>,
}

impl ScriptedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` listen calls fail with `Unavailable`.
    pub fn fail_next_listens(&self, n: u32) {
        self.script.lock().unwrap().fail_listens = n;
    }

    pub fn listen_calls(&self) -> usize {
        self.script.lock().unwrap().listen_calls
    }

    /// Listeners ever registered, in registration order.
    pub fn listener_count(&self) -> usize {
        self.script.lock().unwrap().sinks.len()
    }

    pub fn active_listeners(&self) -> usize {
        self.script.lock().unwrap().active.len()
    }

    pub fn max_active_listeners(&self) -> usize {
        self.script.lock().unwrap().max_active
    }

    pub fn newest_active(&self) -> Option<usize> {
        self.script.lock().unwrap().active.iter().copied().max()
    }

    pub fn deliver(&self, listener: usize, result: Result<Vec<RemoteDocument>, NetworkError>) {
        let sink = self.script.lock().unwrap().sinks.get(listener).cloned();
        if let Some(sink) = sink {
            sink(result);
        }
    }
}

#[async_trait]
impl RemoteLog for ScriptedLog {
    async fn listen(
        &self,
        _collection: &str,
        sink: DocumentSink,
    ) -> Result<ListenerId, NetworkError> {
        let mut script = self.script.lock().unwrap();
        script.listen_calls += 1;
        if script.fail_listens > 0 {
            script.fail_listens -= 1;
            return Err(NetworkError::Unavailable("scripted failure".into()));
        }
        let index = script.sinks.len();
        script.sinks.push(sink);
        script.active.insert(index);
        script.max_active = script.max_active.max(script.active.len());
        Ok(ListenerId(index.to_string()))
    }

    async fn unlisten(&self, listener: &ListenerId) {
        if let Ok(index) = listener.0.parse::<usize>() {
            self.script.lock().unwrap().active.remove(&index);
        }
    }

    async fn append(
        &self,
        _collection: &str,
        _record: RemoteRecord,
    ) -> Result<String, NetworkError> {
        Err(NetworkError::Unavailable("scripted log is read-only".into()))
    }
}

pub fn shared_log() -> Arc<ScriptedLog> {
    Arc::new(ScriptedLog::new())
}
