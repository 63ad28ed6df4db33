//! Call peer lifecycle state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of a call peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum PeerState {
    /// Created, nothing sent or received yet.
    #[default]
    Idle,
    /// Outgoing: session-initiate sent.
    Initiating,
    /// Incoming: session-initiate received and accepted for ringing.
    Incoming,
    /// Outgoing: the remote side is ringing.
    Alerting,
    Connecting,
    ConnectingEarlyMedia,
    /// Media flowing.
    Connected,
    OnHoldLocal,
    OnHoldRemote,
    /// Both sides put the call on hold.
    OnHoldMutual,
    Busy,
    Failed,
    Disconnected,
}

impl PeerState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Initiating => "Initiating",
            Self::Incoming => "Incoming",
            Self::Alerting => "Alerting",
            Self::Connecting => "Connecting",
            Self::ConnectingEarlyMedia => "ConnectingEarlyMedia",
            Self::Connected => "Connected",
            Self::OnHoldLocal => "OnHoldLocal",
            Self::OnHoldRemote => "OnHoldRemote",
            Self::OnHoldMutual => "OnHoldMutual",
            Self::Busy => "Busy",
            Self::Failed => "Failed",
            Self::Disconnected => "Disconnected",
        }
    }

    /// No transition leaves a terminal state.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Disconnected)
    }

    pub const fn is_on_hold(&self) -> bool {
        matches!(
            self,
            Self::OnHoldLocal | Self::OnHoldRemote | Self::OnHoldMutual
        )
    }

    /// Connected, possibly with one or both sides on hold.
    pub const fn is_established(&self) -> bool {
        matches!(self, Self::Connected) || self.is_on_hold()
    }

    /// An outgoing call that was not answered yet.
    pub const fn is_connecting(&self) -> bool {
        matches!(
            self,
            Self::Initiating | Self::Connecting | Self::ConnectingEarlyMedia | Self::Alerting
        )
    }

    /// Combines the two hold flags into the state an established call should
    /// be in. Returns `None` when the call is not established.
    pub const fn with_hold(&self, local: bool, remote: bool) -> Option<PeerState> {
        if !self.is_established() {
            return None;
        }
        Some(match (local, remote) {
            (true, true) => Self::OnHoldMutual,
            (true, false) => Self::OnHoldLocal,
            (false, true) => Self::OnHoldRemote,
            (false, false) => Self::Connected,
        })
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast to subscribers on every state change.
#[derive(Debug, Clone, Serialize)]
pub struct PeerStateChange {
    pub old: PeerState,
    pub new: PeerState,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl PeerStateChange {
    pub fn new(old: PeerState, new: PeerState, reason: Option<String>) -> Self {
        Self {
            old,
            new,
            reason,
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_hold() {
        let connected = PeerState::Connected;
        assert_eq!(connected.with_hold(true, false), Some(PeerState::OnHoldLocal));
        assert_eq!(connected.with_hold(false, true), Some(PeerState::OnHoldRemote));
        assert_eq!(connected.with_hold(true, true), Some(PeerState::OnHoldMutual));
        assert_eq!(
            PeerState::OnHoldMutual.with_hold(false, false),
            Some(PeerState::Connected)
        );
        assert_eq!(PeerState::Alerting.with_hold(true, false), None);
        assert_eq!(PeerState::Disconnected.with_hold(false, false), None);
    }

    #[test]
    fn test_classification() {
        assert!(PeerState::Failed.is_terminal());
        assert!(!PeerState::Busy.is_terminal());
        assert!(PeerState::OnHoldRemote.is_established());
        assert!(PeerState::Alerting.is_connecting());
        assert!(PeerState::Initiating.is_connecting());
        assert!(!PeerState::Incoming.is_connecting());
    }

    #[test]
    fn test_state_change_serializes() {
        let change = PeerStateChange::new(
            PeerState::Connected,
            PeerState::Disconnected,
            Some("bye".into()),
        );
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["old"], "Connected");
        assert_eq!(json["new"], "Disconnected");
        assert_eq!(json["reason"], "bye");
    }
}
