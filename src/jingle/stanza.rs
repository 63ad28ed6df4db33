//! Jingle IQ parsing and building.
//!
//! ```xml
//! <iq type="set" id="..." from="romeo@montague.lit/orchard" to="juliet@capulet.lit/balcony">
//!   <jingle xmlns="urn:xmpp:jingle:1" action="session-initiate" sid="a73sjjvkla37jfea"
//!           initiator="romeo@montague.lit/orchard">
//!     <content creator="initiator" name="voice">...</content>
//!   </jingle>
//! </iq>
//! ```

use std::fmt;

use jinglecore::{Jid, Node, NodeBuilder, StanzaError};

use super::action::JingleAction;
use super::content::Content;
use super::reason::{BYE_TEXT, CANCEL_TEXT, Reason, ReasonElement};

pub const NS_JINGLE: &str = "urn:xmpp:jingle:1";
pub const NS_RTP_INFO: &str = "urn:xmpp:jingle:apps:rtp:info:1";
pub const NS_TRANSFER: &str = "urn:xmpp:jingle:transfer:0";
pub const NS_COIN: &str = "urn:xmpp:coin:1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqType {
    Get,
    Set,
    Result,
    Error,
}

impl IqType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Result => "result",
            Self::Error => "error",
        }
    }

    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "get" => Some(Self::Get),
            "set" => Some(Self::Set),
            "result" => Some(Self::Result),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Payloads of a session-info action (XEP-0167 §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInfoType {
    Active,
    Hold,
    Unhold,
    Mute,
    Unmute,
    Ringing,
}

impl SessionInfoType {
    pub const ALL: [SessionInfoType; 6] = [
        Self::Active,
        Self::Hold,
        Self::Unhold,
        Self::Mute,
        Self::Unmute,
        Self::Ringing,
    ];

    pub const fn tag_name(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Hold => "hold",
            Self::Unhold => "unhold",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::Ringing => "ringing",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.tag_name() == tag)
    }

    fn to_node(self) -> Node {
        NodeBuilder::new(self.tag_name())
            .attr("xmlns", NS_RTP_INFO)
            .build()
    }
}

impl fmt::Display for SessionInfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

/// `<transfer xmlns="urn:xmpp:jingle:transfer:0" from=".." to=".." sid=".."/>`.
///
/// `sid` is present for attended transfers only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transfer {
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub sid: Option<String>,
}

impl Transfer {
    pub fn parse(node: &Node) -> Result<Self, StanzaError> {
        let mut attrs = node.attrs();
        let transfer = Self {
            from: attrs.optional_jid("from"),
            to: attrs.optional_jid("to"),
            sid: attrs.optional_string("sid").map(str::to_string),
        };
        attrs.finish()?;
        Ok(transfer)
    }

    pub fn to_node(&self) -> Node {
        NodeBuilder::new("transfer")
            .attr("xmlns", NS_TRANSFER)
            .optional_attr("from", self.from.as_ref().map(Jid::to_string))
            .optional_attr("to", self.to.as_ref().map(Jid::to_string))
            .optional_attr("sid", self.sid.clone())
            .build()
    }
}

/// Marker carried inside the terminate reason after a successful transfer.
pub fn transferred_marker() -> Node {
    NodeBuilder::new("transferred")
        .attr("xmlns", NS_TRANSFER)
        .build()
}

/// `<conference-info isfocus=".."/>`: the sender hosts a conference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConferenceInfo {
    pub is_focus: bool,
}

impl ConferenceInfo {
    pub fn parse(node: &Node) -> Result<Self, StanzaError> {
        let mut attrs = node.attrs();
        let is_focus = attrs.optional_bool("isfocus").unwrap_or(false);
        attrs.finish()?;
        Ok(Self { is_focus })
    }

    pub fn to_node(&self) -> Node {
        NodeBuilder::new("conference-info")
            .attr("xmlns", NS_COIN)
            .attr("isfocus", self.is_focus.to_string())
            .build()
    }
}

/// A parsed `<iq><jingle/></iq>`.
#[derive(Debug, Clone, PartialEq)]
pub struct JingleIq {
    /// Stanza id. Empty until the channel assigns one on send.
    pub id: String,
    pub iq_type: IqType,
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub action: JingleAction,
    pub sid: String,
    pub initiator: Option<Jid>,
    pub responder: Option<Jid>,
    pub contents: Vec<Content>,
    pub reason: Option<ReasonElement>,
    pub session_info: Option<SessionInfoType>,
    pub transfer: Option<Transfer>,
    pub conference_info: Option<ConferenceInfo>,
    /// Unrecognised `<jingle/>` children, kept verbatim.
    pub extensions: Vec<Node>,
}

impl JingleIq {
    pub fn new(action: JingleAction, sid: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            iq_type: IqType::Set,
            from: None,
            to: None,
            action,
            sid: sid.into(),
            initiator: None,
            responder: None,
            contents: Vec::new(),
            reason: None,
            session_info: None,
            transfer: None,
            conference_info: None,
            extensions: Vec::new(),
        }
    }

    /// True when the node is an IQ carrying a `<jingle/>` child.
    pub fn is_jingle(node: &Node) -> bool {
        node.tag == "iq"
            && node
                .get_optional_child("jingle")
                .is_some_and(|j| j.namespace() == Some(NS_JINGLE))
    }

    pub fn parse(node: &Node) -> Result<Self, StanzaError> {
        if node.tag != "iq" {
            return Err(StanzaError::UnexpectedTag {
                expected: "iq".into(),
                actual: node.tag.clone(),
            });
        }

        let mut attrs = node.attrs();
        let id = attrs.optional_string("id").unwrap_or_default().to_string();
        let iq_type = attrs.required_string("type")?;
        let iq_type = IqType::from_attr(iq_type)
            .ok_or_else(|| StanzaError::AttrParse(format!("unknown iq type '{iq_type}'")))?;
        let from = attrs.optional_jid("from");
        let to = attrs.optional_jid("to");
        attrs.finish()?;

        let jingle = node
            .get_optional_child("jingle")
            .filter(|j| j.namespace() == Some(NS_JINGLE))
            .ok_or_else(|| StanzaError::MissingChild("jingle".into()))?;

        let mut attrs = jingle.attrs();
        let action = attrs.required_string("action")?;
        let action = JingleAction::from_attr(action)
            .ok_or_else(|| StanzaError::AttrParse(format!("unknown jingle action '{action}'")))?;
        let sid = attrs.required_string("sid")?.to_string();
        let initiator = attrs.optional_jid("initiator");
        let responder = attrs.optional_jid("responder");
        attrs.finish()?;

        let mut iq = Self {
            id,
            iq_type,
            from,
            to,
            initiator,
            responder,
            ..Self::new(action, sid)
        };

        for child in jingle.children().unwrap_or_default() {
            match child.tag.as_str() {
                "content" => iq.contents.push(Content::parse(child)?),
                "reason" => iq.reason = Some(ReasonElement::parse(child)?),
                "transfer" if child.namespace() == Some(NS_TRANSFER) => {
                    iq.transfer = Some(Transfer::parse(child)?)
                }
                "conference-info" => iq.conference_info = Some(ConferenceInfo::parse(child)?),
                tag if child.namespace() == Some(NS_RTP_INFO) => match SessionInfoType::from_tag(tag) {
                    Some(kind) => iq.session_info = Some(kind),
                    None => iq.extensions.push(child.clone()),
                },
                _ => iq.extensions.push(child.clone()),
            }
        }

        Ok(iq)
    }

    pub fn to_node(&self) -> Node {
        let children = self
            .contents
            .iter()
            .map(Content::to_node)
            .chain(self.reason.iter().map(ReasonElement::to_node))
            .chain(self.session_info.map(SessionInfoType::to_node))
            .chain(self.transfer.iter().map(Transfer::to_node))
            .chain(self.conference_info.iter().map(ConferenceInfo::to_node))
            .chain(self.extensions.iter().cloned());

        let jingle = NodeBuilder::new("jingle")
            .attr("xmlns", NS_JINGLE)
            .attr("action", self.action.as_str())
            .attr("sid", self.sid.clone())
            .optional_attr("initiator", self.initiator.as_ref().map(Jid::to_string))
            .optional_attr("responder", self.responder.as_ref().map(Jid::to_string))
            .children(children)
            .build();

        NodeBuilder::new("iq")
            .optional_attr("id", Some(self.id.clone()).filter(|id| !id.is_empty()))
            .attr("type", self.iq_type.as_str())
            .optional_attr("from", self.from.as_ref().map(Jid::to_string))
            .optional_attr("to", self.to.as_ref().map(Jid::to_string))
            .children([jingle])
            .build()
    }

    pub fn first_content(&self) -> Option<&Content> {
        self.contents.first()
    }

    /// The terminate reason code, if one is present.
    pub fn reason_code(&self) -> Option<Reason> {
        self.reason.as_ref().and_then(|r| r.reason)
    }

    fn addressed(mut self, addr: &SessionAddress) -> Self {
        self.from = Some(addr.local.clone());
        self.to = Some(addr.peer.clone());
        self
    }
}

/// Addressing shared by every outgoing message of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAddress {
    pub local: Jid,
    pub peer: Jid,
    pub sid: String,
}

impl SessionAddress {
    pub fn new(local: Jid, peer: Jid, sid: impl Into<String>) -> Self {
        Self {
            local,
            peer,
            sid: sid.into(),
        }
    }

    fn iq(&self, action: JingleAction) -> JingleIq {
        JingleIq::new(action, self.sid.clone()).addressed(self)
    }
}

pub fn session_initiate(addr: &SessionAddress, contents: Vec<Content>) -> JingleIq {
    JingleIq {
        initiator: Some(addr.local.clone()),
        contents,
        ..addr.iq(JingleAction::SessionInitiate)
    }
}

pub fn session_accept(addr: &SessionAddress, contents: Vec<Content>) -> JingleIq {
    JingleIq {
        responder: Some(addr.local.clone()),
        contents,
        ..addr.iq(JingleAction::SessionAccept)
    }
}

pub fn session_terminate(addr: &SessionAddress, reason: ReasonElement) -> JingleIq {
    JingleIq {
        reason: Some(reason),
        ..addr.iq(JingleAction::SessionTerminate)
    }
}

/// Normal end of an established call.
pub fn bye(addr: &SessionAddress) -> JingleIq {
    session_terminate(
        addr,
        ReasonElement::new(Reason::Success, Some(BYE_TEXT.into())),
    )
}

/// Withdraws an outgoing call that was not answered yet.
pub fn cancel(addr: &SessionAddress) -> JingleIq {
    session_terminate(
        addr,
        ReasonElement::new(Reason::Cancel, Some(CANCEL_TEXT.into())),
    )
}

/// Declines an incoming call.
pub fn busy(addr: &SessionAddress) -> JingleIq {
    session_terminate(addr, ReasonElement::new(Reason::Busy, None))
}

pub fn session_info(addr: &SessionAddress, kind: SessionInfoType) -> JingleIq {
    JingleIq {
        session_info: Some(kind),
        ..addr.iq(JingleAction::SessionInfo)
    }
}

pub fn ringing(addr: &SessionAddress) -> JingleIq {
    session_info(addr, SessionInfoType::Ringing)
}

/// content-add, content-accept, content-reject, content-modify or content-remove.
pub fn content_action(
    addr: &SessionAddress,
    action: JingleAction,
    contents: Vec<Content>,
) -> JingleIq {
    debug_assert!(action.is_content_action());
    JingleIq {
        contents,
        ..addr.iq(action)
    }
}

pub fn transport_info(addr: &SessionAddress, contents: Vec<Content>) -> JingleIq {
    JingleIq {
        contents,
        ..addr.iq(JingleAction::TransportInfo)
    }
}

/// Session-info asking the peer to transfer the call.
pub fn transfer_request(addr: &SessionAddress, transfer: Transfer) -> JingleIq {
    JingleIq {
        transfer: Some(transfer),
        ..addr.iq(JingleAction::SessionInfo)
    }
}

pub fn conference_info(addr: &SessionAddress, is_focus: bool) -> JingleIq {
    JingleIq {
        conference_info: Some(ConferenceInfo { is_focus }),
        ..addr.iq(JingleAction::SessionInfo)
    }
}

/// Empty `result` acknowledging an inbound IQ.
pub fn build_iq_result(request: &Node) -> Node {
    let attrs = &request.attrs;
    NodeBuilder::new("iq")
        .optional_attr("id", attrs.get("id"))
        .attr("type", IqType::Result.as_str())
        .optional_attr("from", attrs.get("to"))
        .optional_attr("to", attrs.get("from"))
        .build()
}
