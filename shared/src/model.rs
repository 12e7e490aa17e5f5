use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::error::ValidationError;

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(MessageId);
typed_id!(UserId);

/// Unix timestamp in milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    pub fn now() -> Self {
        Self(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        )
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }
}

/// Validated lat/lon. Deserializing runs the same checks as [`LatLon::new`].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLatLon")]
pub struct LatLon {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawLatLon {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawLatLon> for LatLon {
    type Error = ValidationError;

    fn try_from(raw: RawLatLon) -> Result<Self, Self::Error> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl LatLon {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidCoordinate {
            latitude,
            longitude,
        };
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(invalid());
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(invalid());
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid());
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Author metadata, copied onto every message at submission time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub color: String,
}

impl Author {
    pub fn new(id: UserId, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: color.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Text(String),
    /// Resolved media URL; the bytes live in blob storage.
    Image(String),
    Location(LatLon),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Image(_) => "image",
            Payload::Location(_) => "location",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Payload,
    pub created_at: UnixTimeMs,
    pub author: Author,
}

// Redact debug output because this can contain user-authored content.
impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("payload", &self.payload.kind())
            .field("created_at", &self.created_at)
            .field("author_id", &self.author.id)
            .finish()
    }
}

/// Full, immutable view of the message log at one moment.
///
/// Messages are held newest first, the order the remote log serves them in.
/// Use [`Snapshot::chronological`] for display order.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Message>", into = "Vec<Message>")]
pub struct Snapshot {
    messages: Arc<[Message]>,
}

impl Snapshot {
    /// Builds a snapshot, ordering by `created_at` descending. Ties keep
    /// their input order.
    pub fn new(mut messages: Vec<Message>) -> Self {
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Self {
            messages: messages.into(),
        }
    }

    pub fn empty() -> Self {
        Self {
            messages: Vec::new().into(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn newest_first(&self) -> &[Message] {
        &self.messages
    }

    pub fn chronological(&self) -> impl DoubleEndedIterator<Item = &Message> + ExactSizeIterator {
        self.messages.iter().rev()
    }

    pub fn newest(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }
}

impl From<Vec<Message>> for Snapshot {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

impl From<Snapshot> for Vec<Message> {
    fn from(snapshot: Snapshot) -> Self {
        snapshot.messages.to_vec()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.messages.iter().map(|m| &m.id))
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn author(id: &str) -> Author {
        Author::new(UserId::new(id), format!("user {id}"), "#474056")
    }

    pub fn text_message(id: &str, created_at: u64) -> Message {
        Message {
            id: MessageId::new(id),
            payload: Payload::Text(format!("body of {id}")),
            created_at: UnixTimeMs(created_at),
            author: author("u1"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::text_message;
    use super::*;

    fn ids<'a>(it: impl Iterator<Item = &'a Message>) -> Vec<&'a str> {
        it.map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_latlon_validation() {
        assert!(LatLon::new(45.0, 9.0).is_ok());
        assert!(LatLon::new(91.0, 0.0).is_err());
        assert!(LatLon::new(0.0, -180.5).is_err());
        assert!(LatLon::new(f64::NAN, 0.0).is_err());
        assert!(LatLon::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_latlon_deserialize_validates() {
        let at: LatLon = serde_json::from_str(r#"{"latitude": 45.0, "longitude": 9.0}"#).unwrap();
        assert_eq!(at, LatLon::new(45.0, 9.0).unwrap());

        let err = serde_json::from_str::<LatLon>(r#"{"latitude": 91.0, "longitude": 0.0}"#)
            .unwrap_err();
        assert!(err.to_string().contains("invalid coordinate"));
    }

    #[test]
    fn test_snapshot_orders_newest_first() {
        let snapshot = Snapshot::new(vec![
            text_message("m1", 10),
            text_message("m3", 30),
            text_message("m2", 20),
        ]);

        assert_eq!(ids(snapshot.newest_first().iter()), ["m3", "m2", "m1"]);
        assert_eq!(ids(snapshot.chronological()), ["m1", "m2", "m3"]);
        assert_eq!(snapshot.newest().map(|m| m.id.as_str()), Some("m3"));
    }

    #[test]
    fn test_snapshot_ties_keep_input_order() {
        let snapshot = Snapshot::new(vec![text_message("a", 5), text_message("b", 5)]);
        assert_eq!(ids(snapshot.newest_first().iter()), ["a", "b"]);
    }

    #[test]
    fn test_default_snapshot_is_empty() {
        let snapshot = Snapshot::default();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot, Snapshot::empty());
        assert!(!snapshot.contains(&MessageId::new("m1")));
    }

    #[test]
    fn test_debug_redacts_payload() {
        let message = text_message("m1", 1);
        let rendered = format!("{message:?}");
        assert!(rendered.contains("text"));
        assert!(!rendered.contains("body of m1"));
    }
}
