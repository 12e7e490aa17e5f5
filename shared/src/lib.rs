// lib.rs - chat core: live sync, offline cache, message submission

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod cache;
pub mod capabilities;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod stream;
pub mod submit;
pub mod telemetry;
pub mod view;

pub use cache::LocalMessageCache;
pub use config::{ConfigError, RetryPolicy, SyncConfig};
pub use connectivity::{ConnectivityMonitor, Transition};
pub use coordinator::{SyncCoordinator, SyncEvent, SyncState};
pub use error::{
    CacheError, ErrorKind, NetworkError, Notice, SubmissionError, SubmitError, ValidationError,
};
pub use model::{Author, LatLon, Message, MessageId, Payload, Snapshot, UnixTimeMs, UserId};
pub use stream::{RemoteMessageStream, SubscriptionHandle};
pub use submit::{Draft, MessageSubmitter};
pub use view::{ChatViewModel, MessageBody, MessageView, SyncMode};
