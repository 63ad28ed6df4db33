//! Session-terminate reasons and the mapping from failure categories to them.
//!
//! ```xml
//! <reason>
//!   <busy/>
//!   <text>bye bye</text>
//!   <!-- optional auxiliary payload, e.g. <transferred/> -->
//! </reason>
//! ```

use std::fmt;

use jinglecore::{Node, NodeBuilder, StanzaError};

/// Wire-level reason conditions (XEP-0166 §7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    AlternativeSession,
    Busy,
    Cancel,
    ConnectivityError,
    Decline,
    Expired,
    FailedApplication,
    FailedTransport,
    GeneralError,
    Gone,
    IncompatibleParameters,
    MediaError,
    SecurityError,
    Success,
    Timeout,
    UnsupportedApplications,
    UnsupportedTransports,
}

impl Reason {
    pub const ALL: [Reason; 17] = [
        Self::AlternativeSession,
        Self::Busy,
        Self::Cancel,
        Self::ConnectivityError,
        Self::Decline,
        Self::Expired,
        Self::FailedApplication,
        Self::FailedTransport,
        Self::GeneralError,
        Self::Gone,
        Self::IncompatibleParameters,
        Self::MediaError,
        Self::SecurityError,
        Self::Success,
        Self::Timeout,
        Self::UnsupportedApplications,
        Self::UnsupportedTransports,
    ];

    /// Element name used inside `<reason/>`.
    pub const fn tag_name(&self) -> &'static str {
        match self {
            Self::AlternativeSession => "alternative-session",
            Self::Busy => "busy",
            Self::Cancel => "cancel",
            Self::ConnectivityError => "connectivity-error",
            Self::Decline => "decline",
            Self::Expired => "expired",
            Self::FailedApplication => "failed-application",
            Self::FailedTransport => "failed-transport",
            Self::GeneralError => "general-error",
            Self::Gone => "gone",
            Self::IncompatibleParameters => "incompatible-parameters",
            Self::MediaError => "media-error",
            Self::SecurityError => "security-error",
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::UnsupportedApplications => "unsupported-applications",
            Self::UnsupportedTransports => "unsupported-transports",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.tag_name() == tag)
    }
}

/// Renders as the upper-case code, e.g. `FAILED_APPLICATION`.
impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag_name().replace('-', "_").to_uppercase())
    }
}

/// A `<reason/>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasonElement {
    pub reason: Option<Reason>,
    pub text: Option<String>,
    /// Auxiliary payload, e.g. a `<transferred/>` marker.
    pub other: Option<Node>,
}

impl ReasonElement {
    pub fn new(reason: Reason, text: Option<String>) -> Self {
        Self {
            reason: Some(reason),
            text,
            other: None,
        }
    }

    pub fn with_other(mut self, other: Node) -> Self {
        self.other = Some(other);
        self
    }

    pub fn is_reason_node(node: &Node) -> bool {
        node.tag == "reason"
    }

    pub fn parse(node: &Node) -> Result<Self, StanzaError> {
        if !Self::is_reason_node(node) {
            return Err(StanzaError::UnexpectedTag {
                expected: "reason".into(),
                actual: node.tag.clone(),
            });
        }

        let mut reason = None;
        let mut text = None;
        let mut other = None;
        for child in node.children().unwrap_or_default() {
            if child.tag == "text" {
                text = child.text().map(str::to_string);
            } else if let Some(r) = Reason::from_tag(&child.tag).filter(|_| reason.is_none()) {
                reason = Some(r);
            } else if other.is_none() {
                other = Some(child.clone());
            }
        }

        Ok(Self {
            reason,
            text,
            other,
        })
    }

    pub fn to_node(&self) -> Node {
        let mut children = Vec::with_capacity(3);
        if let Some(reason) = self.reason {
            children.push(NodeBuilder::new(reason.tag_name()).build());
        }
        if let Some(text) = &self.text {
            children.push(NodeBuilder::new("text").string_content(text.clone()).build());
        }
        if let Some(other) = &self.other {
            children.push(other.clone());
        }
        NodeBuilder::new("reason").children(children).build()
    }
}

/// The phase a media negotiation failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    /// Consuming a remote offer (session-initiate, content-add).
    Offer,
    /// Building our answer to an incoming session.
    Answer,
    /// Applying a remote answer (session-accept, content-accept).
    Accept,
    /// Re-initialising a content (content-modify).
    Modify,
    /// Applying remote transport candidates.
    TransportInfo,
}

/// Failure taxonomy of session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Malformed transfer addressing, empty content-reject.
    ProtocolViolation,
    /// The media negotiator refused an offer, answer or re-init.
    Negotiation(NegotiationPhase),
    /// Streaming could not start after signaling was already sent.
    TransportStart,
    /// No correlated reply arrived in time.
    ReplyTimeout,
    /// The remote side rejected something we asked for.
    RemoteRejection,
    /// Lost a race that needs no reaction (hangup before a sid existed).
    BenignRaceLoss,
}

impl FailureCategory {
    /// Wire reason to terminate with, `None` for non-fatal categories.
    pub const fn reason(&self) -> Option<Reason> {
        match self {
            Self::ProtocolViolation => Some(Reason::IncompatibleParameters),
            Self::Negotiation(NegotiationPhase::Answer) => Some(Reason::FailedApplication),
            Self::Negotiation(NegotiationPhase::TransportInfo) => Some(Reason::GeneralError),
            Self::Negotiation(_) => Some(Reason::IncompatibleParameters),
            Self::TransportStart => Some(Reason::GeneralError),
            Self::ReplyTimeout => Some(Reason::GeneralError),
            Self::RemoteRejection => Some(Reason::IncompatibleParameters),
            Self::BenignRaceLoss => None,
        }
    }

    pub const fn is_fatal(&self) -> bool {
        self.reason().is_some()
    }
}

/// Text sent with a normal hangup of an established call.
pub const BYE_TEXT: &str = "Nice talking to you!";
/// Text sent when cancelling an outgoing call before it is answered.
pub const CANCEL_TEXT: &str = "Oops!";
/// Prefix of the local reason when the remote side ends the session.
pub const REMOTE_TERMINATE_TEXT: &str = "Call ended by remote side.";

/// Human-readable reason for a fatal failure, as shown to listeners.
pub fn error_text(message: impl fmt::Display) -> String {
    format!("Error: {message}")
}

/// Builds the local reason string for an inbound session-terminate.
pub fn remote_terminate_text(reason: Option<&ReasonElement>) -> String {
    let mut text = REMOTE_TERMINATE_TEXT.to_string();
    if let Some(element) = reason {
        if let Some(code) = element.reason {
            text.push_str(&format!(" Reason: {code}."));
        }
        if let Some(free) = &element.text {
            text.push(' ');
            text.push_str(free);
        }
    }
    text
}
