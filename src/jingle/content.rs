//! `<content/>` elements and their RTP descriptions (XEP-0167).

use std::fmt;

use jinglecore::{Node, NodeBuilder, StanzaError};

use super::transport::IceUdpTransport;

pub const NS_RTP: &str = "urn:xmpp:jingle:apps:rtp:1";

/// Which party created a content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creator {
    Initiator,
    Responder,
}

impl Creator {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initiator => "initiator",
            Self::Responder => "responder",
        }
    }

    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "initiator" => Some(Self::Initiator),
            "responder" => Some(Self::Responder),
            _ => None,
        }
    }

    /// The role of a party depending on whether it initiated the session.
    pub const fn for_initiator(is_initiator: bool) -> Self {
        if is_initiator {
            Self::Initiator
        } else {
            Self::Responder
        }
    }

    pub const fn other(&self) -> Self {
        match self {
            Self::Initiator => Self::Responder,
            Self::Responder => Self::Initiator,
        }
    }
}

/// Which parties send media on a content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Senders {
    None,
    Initiator,
    Responder,
    Both,
}

impl Senders {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Initiator => "initiator",
            Self::Responder => "responder",
            Self::Both => "both",
        }
    }

    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "initiator" => Some(Self::Initiator),
            "responder" => Some(Self::Responder),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub const fn only(role: Creator) -> Self {
        match role {
            Creator::Initiator => Self::Initiator,
            Creator::Responder => Self::Responder,
        }
    }
}

impl fmt::Display for Senders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
}

impl MediaType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadType {
    pub id: u8,
    pub name: Option<String>,
    pub clockrate: Option<u32>,
    pub channels: Option<u8>,
}

impl PayloadType {
    pub fn new(id: u8, name: impl Into<String>, clockrate: u32) -> Self {
        Self {
            id,
            name: Some(name.into()),
            clockrate: Some(clockrate),
            channels: None,
        }
    }

    fn parse(node: &Node) -> Result<Self, StanzaError> {
        let mut attrs = node.attrs();
        let id = attrs
            .optional_u8("id")
            .ok_or_else(|| StanzaError::MissingAttr("id".into()))?;
        let payload = Self {
            id,
            name: attrs.optional_string("name").map(str::to_string),
            clockrate: attrs.optional_u32("clockrate"),
            channels: attrs.optional_u8("channels"),
        };
        attrs.finish()?;
        Ok(payload)
    }

    fn to_node(&self) -> Node {
        NodeBuilder::new("payload-type")
            .attr("id", self.id.to_string())
            .optional_attr("name", self.name.clone())
            .optional_attr("clockrate", self.clockrate.map(|c| c.to_string()))
            .optional_attr("channels", self.channels.map(|c| c.to_string()))
            .build()
    }
}

/// `<description xmlns="urn:xmpp:jingle:apps:rtp:1" media="..."/>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpDescription {
    pub media: MediaType,
    pub payload_types: Vec<PayloadType>,
}

impl RtpDescription {
    pub fn new(media: MediaType) -> Self {
        Self {
            media,
            payload_types: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: PayloadType) -> Self {
        self.payload_types.push(payload);
        self
    }

    pub fn parse(node: &Node) -> Result<Self, StanzaError> {
        let mut attrs = node.attrs();
        let media = attrs.required_string("media")?;
        let media = MediaType::from_attr(media)
            .ok_or_else(|| StanzaError::AttrParse(format!("unknown media '{media}'")))?;
        let payload_types = node
            .get_children_by_tag("payload-type")
            .map(PayloadType::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            media,
            payload_types,
        })
    }

    pub fn to_node(&self) -> Node {
        NodeBuilder::new("description")
            .attr("xmlns", NS_RTP)
            .attr("media", self.media.as_str())
            .children(self.payload_types.iter().map(PayloadType::to_node))
            .build()
    }
}

/// One `<content/>` of a Jingle action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub name: String,
    pub creator: Creator,
    /// `None` when the attribute is absent on the wire.
    pub senders: Option<Senders>,
    pub description: Option<RtpDescription>,
    pub transport: Option<IceUdpTransport>,
}

impl Content {
    pub fn new(name: impl Into<String>, creator: Creator) -> Self {
        Self {
            name: name.into(),
            creator,
            senders: None,
            description: None,
            transport: None,
        }
    }

    pub fn with_senders(mut self, senders: Senders) -> Self {
        self.senders = Some(senders);
        self
    }

    pub fn with_description(mut self, description: RtpDescription) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_transport(mut self, transport: IceUdpTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn media(&self) -> Option<MediaType> {
        self.description.as_ref().map(|d| d.media)
    }

    pub fn has_candidates(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(IceUdpTransport::has_candidates)
    }

    pub fn parse(node: &Node) -> Result<Self, StanzaError> {
        if node.tag != "content" {
            return Err(StanzaError::UnexpectedTag {
                expected: "content".into(),
                actual: node.tag.clone(),
            });
        }
        let mut attrs = node.attrs();
        let name = attrs.required_string("name")?.to_string();
        let creator = attrs.optional_string("creator").unwrap_or("initiator");
        let creator = Creator::from_attr(creator)
            .ok_or_else(|| StanzaError::AttrParse(format!("unknown creator '{creator}'")))?;
        let senders = match attrs.optional_string("senders") {
            Some(value) => Some(
                Senders::from_attr(value)
                    .ok_or_else(|| StanzaError::AttrParse(format!("unknown senders '{value}'")))?,
            ),
            None => None,
        };
        let description = node
            .get_optional_child("description")
            .map(RtpDescription::parse)
            .transpose()?;
        let transport = node
            .get_optional_child("transport")
            .map(IceUdpTransport::parse)
            .transpose()?;

        Ok(Self {
            name,
            creator,
            senders,
            description,
            transport,
        })
    }

    pub fn to_node(&self) -> Node {
        let children = self
            .description
            .iter()
            .map(RtpDescription::to_node)
            .chain(self.transport.iter().map(IceUdpTransport::to_node));
        NodeBuilder::new("content")
            .attr("creator", self.creator.as_str())
            .attr("name", self.name.clone())
            .optional_attr("senders", self.senders.map(|s| s.as_str()))
            .children(children)
            .build()
    }
}
