//! Platform seams the native shell provides.
//!
//! Each capability is a trait injected at construction so the core never
//! reaches for a global client. In-process implementations ship alongside
//! for tests and for shells that have nothing better.
mod clock;
mod kv;
mod remote_log;

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
mod sqlite;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::kv::{
    KeyNamespace, KeyValueStore, KvError, KvKey, MemoryKv, StorageErrorCode, MAX_KEY_LENGTH,
    MAX_VALUE_SIZE,
};
pub use self::remote_log::{
    DocumentSink, ListenerId, MemoryRemoteLog, RemoteDocument, RemoteLocation, RemoteLog,
    RemoteRecord, RemoteTimestamp, RemoteUser,
};

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use self::sqlite::SqliteKv;
