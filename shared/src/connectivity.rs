//! Edge detection over raw reachability observations.
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// First observation; nothing was known before it.
    Initial { online: bool },
    Restored,
    Lost,
}

/// Turns a stream of `is_connected` samples into transitions, reporting
/// each edge once. Repeated samples of the same value produce nothing.
#[derive(Debug, Default, Clone)]
pub struct ConnectivityMonitor {
    last: Option<bool>,
    edges: u64,
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, online: bool) -> Option<Transition> {
        let transition = match self.last {
            None => Transition::Initial { online },
            Some(prev) if prev == online => return None,
            Some(_) if online => Transition::Restored,
            Some(_) => Transition::Lost,
        };
        self.last = Some(online);

        match transition {
            Transition::Initial { online } => info!(online, "connectivity known"),
            Transition::Restored => {
                self.edges += 1;
                info!("connectivity restored");
            }
            Transition::Lost => {
                self.edges += 1;
                warn!("connectivity lost");
            }
        }
        Some(transition)
    }

    /// `None` until the first observation.
    pub fn is_online(&self) -> Option<bool> {
        self.last
    }

    /// True→false and false→true edges seen so far.
    pub fn edges(&self) -> u64 {
        self.edges
    }
}
