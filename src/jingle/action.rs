//! Jingle action definitions.
//!
//! These are the values of the `action` attribute on the `<jingle/>` element
//! (XEP-0166 §7.2).

use std::fmt;

/// The action carried by a Jingle IQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JingleAction {
    ContentAccept,
    ContentAdd,
    ContentModify,
    ContentReject,
    ContentRemove,
    DescriptionInfo,
    SecurityInfo,
    /// Responder accepts the session.
    SessionAccept,
    /// Ringing, hold/unhold, mute, transfer and conference indicators.
    SessionInfo,
    /// Opens the session. Carries at least one content.
    SessionInitiate,
    /// Closes the session. Carries a `<reason/>`.
    SessionTerminate,
    TransportAccept,
    /// Trickled transport candidates.
    TransportInfo,
    TransportReject,
    TransportReplace,
}

impl JingleAction {
    pub const ALL: [JingleAction; 15] = [
        Self::ContentAccept,
        Self::ContentAdd,
        Self::ContentModify,
        Self::ContentReject,
        Self::ContentRemove,
        Self::DescriptionInfo,
        Self::SecurityInfo,
        Self::SessionAccept,
        Self::SessionInfo,
        Self::SessionInitiate,
        Self::SessionTerminate,
        Self::TransportAccept,
        Self::TransportInfo,
        Self::TransportReject,
        Self::TransportReplace,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ContentAccept => "content-accept",
            Self::ContentAdd => "content-add",
            Self::ContentModify => "content-modify",
            Self::ContentReject => "content-reject",
            Self::ContentRemove => "content-remove",
            Self::DescriptionInfo => "description-info",
            Self::SecurityInfo => "security-info",
            Self::SessionAccept => "session-accept",
            Self::SessionInfo => "session-info",
            Self::SessionInitiate => "session-initiate",
            Self::SessionTerminate => "session-terminate",
            Self::TransportAccept => "transport-accept",
            Self::TransportInfo => "transport-info",
            Self::TransportReject => "transport-reject",
            Self::TransportReplace => "transport-replace",
        }
    }

    pub fn from_attr(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.as_str() == value)
    }

    /// Actions that must carry a non-empty content list.
    pub const fn requires_content(&self) -> bool {
        matches!(
            self,
            Self::SessionInitiate
                | Self::SessionAccept
                | Self::ContentAdd
                | Self::ContentAccept
                | Self::ContentModify
                | Self::ContentRemove
                | Self::TransportInfo
        )
    }

    /// Actions that change which contents exist in the session.
    pub const fn is_content_action(&self) -> bool {
        matches!(
            self,
            Self::ContentAccept
                | Self::ContentAdd
                | Self::ContentModify
                | Self::ContentReject
                | Self::ContentRemove
        )
    }
}

impl fmt::Display for JingleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_from_attr() {
        assert_eq!(
            JingleAction::from_attr("session-initiate"),
            Some(JingleAction::SessionInitiate)
        );
        assert_eq!(
            JingleAction::from_attr("transport-info"),
            Some(JingleAction::TransportInfo)
        );
        assert_eq!(JingleAction::from_attr("session-initiated"), None);
        assert_eq!(JingleAction::from_attr("SESSION-INITIATE"), None);
    }

    #[test]
    fn test_all_actions_are_distinct() {
        let mut names: Vec<_> = JingleAction::ALL.iter().map(|a| a.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), JingleAction::ALL.len());
    }

    #[test]
    fn test_action_classes() {
        assert!(JingleAction::SessionInitiate.requires_content());
        assert!(!JingleAction::SessionTerminate.requires_content());
        assert!(!JingleAction::ContentReject.requires_content());
        assert!(JingleAction::ContentReject.is_content_action());
    }

    #[test]
    fn test_display() {
        assert_eq!(JingleAction::ContentAdd.to_string(), "content-add");
    }
}
