use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and compatibility knobs of a call peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for the reply to a transport-info or transfer request.
    pub reply_timeout_ms: u64,
    /// Bound on how long transport-info waits for session-initiate processing.
    /// `None` waits indefinitely.
    pub initiate_wait_timeout_ms: Option<u64>,
    /// Bound on how long a content-add without candidates waits for a
    /// transport-info before it is dropped. `None` waits indefinitely.
    pub no_candidates_wait_ms: Option<u64>,
    /// Defer content-add without candidates until a transport-info arrives,
    /// for peers that trickle candidates separately.
    pub legacy_no_candidates: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 5_000,
            initiate_wait_timeout_ms: None,
            no_candidates_wait_ms: Some(60_000),
            legacy_no_candidates: true,
        }
    }
}

impl SessionConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn initiate_wait_timeout(&self) -> Option<Duration> {
        self.initiate_wait_timeout_ms.map(Duration::from_millis)
    }

    pub fn no_candidates_wait(&self) -> Option<Duration> {
        self.no_candidates_wait_ms.map(Duration::from_millis)
    }
}
