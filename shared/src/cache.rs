use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::capabilities::{KeyNamespace, KeyValueStore, KvError, KvKey, MAX_VALUE_SIZE};
use crate::error::CacheError;
use crate::model::{Message, Snapshot};

const CURRENT_SCHEMA_VERSION: u32 = 1;
const CACHE_MAGIC: &[u8; 4] = b"MSGC";

#[derive(Serialize, Deserialize, Debug)]
struct CacheEnvelope {
    magic: [u8; 4],
    schema_version: u32,
    checksum: [u8; 32],
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug)]
struct CachePayload {
    messages: Vec<Message>,
}

/// Single-entry durable copy of the last live snapshot.
pub struct LocalMessageCache<S: KeyValueStore> {
    storage: Arc<S>,
    key: KvKey,
}

impl<S: KeyValueStore> LocalMessageCache<S> {
    pub fn new(storage: Arc<S>, key: impl Into<String>) -> Result<Self, KvError> {
        Ok(Self {
            storage,
            key: KvKey::new(KeyNamespace::Cache, key)?,
        })
    }

    pub fn key(&self) -> &KvKey {
        &self.key
    }

    /// An absent entry reads as an empty snapshot.
    #[instrument(skip(self), fields(key = %self.key.raw()))]
    pub async fn read(&self) -> Result<Snapshot, CacheError> {
        match self.storage.get(&self.key).await? {
            Some(bytes) => {
                let snapshot = decode(&bytes)?;
                debug!(messages = snapshot.len(), "cache read");
                Ok(snapshot)
            }
            None => Ok(Snapshot::empty()),
        }
    }

    /// Replaces the entry with `snapshot` in one storage write.
    #[instrument(skip(self, snapshot), fields(key = %self.key.raw(), messages = snapshot.len()))]
    pub async fn write(&self, snapshot: &Snapshot) -> Result<(), CacheError> {
        let bytes = encode(snapshot)?;
        self.storage.set(&self.key, bytes).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<bool, CacheError> {
        Ok(self.storage.delete(&self.key).await?)
    }
}

fn encode(snapshot: &Snapshot) -> Result<Vec<u8>, CacheError> {
    let payload = CachePayload {
        messages: snapshot.newest_first().to_vec(),
    };

    let mut payload_bytes = Vec::new();
    ciborium::into_writer(&payload, &mut payload_bytes)?;

    let checksum = blake3::hash(&payload_bytes);

    let envelope = CacheEnvelope {
        magic: *CACHE_MAGIC,
        schema_version: CURRENT_SCHEMA_VERSION,
        checksum: *checksum.as_bytes(),
        payload: payload_bytes,
    };

    let mut envelope_bytes = Vec::new();
    ciborium::into_writer(&envelope, &mut envelope_bytes)?;

    if envelope_bytes.len() > MAX_VALUE_SIZE {
        return Err(CacheError::TooLarge {
            size: envelope_bytes.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(envelope_bytes)
}

fn decode(bytes: &[u8]) -> Result<Snapshot, CacheError> {
    if bytes.is_empty() {
        return Err(CacheError::Corrupted {
            reason: "empty entry",
        });
    }

    if bytes.len() > MAX_VALUE_SIZE {
        return Err(CacheError::TooLarge {
            size: bytes.len(),
            max: MAX_VALUE_SIZE,
        });
    }

    let envelope: CacheEnvelope = ciborium::from_reader(bytes)?;

    if envelope.magic != *CACHE_MAGIC {
        return Err(CacheError::Corrupted {
            reason: "invalid magic bytes",
        });
    }

    if envelope.schema_version > CURRENT_SCHEMA_VERSION {
        return Err(CacheError::FutureSchema {
            found: envelope.schema_version,
            max: CURRENT_SCHEMA_VERSION,
        });
    }

    if envelope.schema_version < CURRENT_SCHEMA_VERSION {
        return Err(CacheError::UnknownSchema(envelope.schema_version));
    }

    let actual_checksum = blake3::hash(&envelope.payload);
    if actual_checksum.as_bytes() != &envelope.checksum {
        return Err(CacheError::IntegrityCheckFailed {
            expected: hex::encode(envelope.checksum),
            actual: hex::encode(actual_checksum.as_bytes()),
        });
    }

    let payload: CachePayload = ciborium::from_reader(&envelope.payload[..])?;
    Ok(Snapshot::new(payload.messages))
}
