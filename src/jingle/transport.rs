//! ICE-UDP transport payloads (XEP-0176).
//!
//! ```xml
//! <transport xmlns="urn:xmpp:jingle:transports:ice-udp:1" ufrag="..." pwd="...">
//!   <candidate component="1" foundation="1" generation="0" id="el0747fg11"
//!              ip="10.0.1.1" network="1" port="8998" priority="2130706431"
//!              protocol="udp" type="host"/>
//! </transport>
//! ```

use jinglecore::{Node, NodeBuilder, StanzaError};

pub const NS_ICE_UDP: &str = "urn:xmpp:jingle:transports:ice-udp:1";

/// ICE candidate type (RFC 5245).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateType {
    /// Direct host candidate
    Host,
    /// Server reflexive (STUN) candidate
    ServerReflexive,
    /// Peer reflexive candidate
    PeerReflexive,
    /// Relay (TURN) candidate
    Relay,
}

impl CandidateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::ServerReflexive => "srflx",
            Self::PeerReflexive => "prflx",
            Self::Relay => "relay",
        }
    }
}

impl std::str::FromStr for CandidateType {
    type Err = StanzaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Self::Host),
            "srflx" => Ok(Self::ServerReflexive),
            "prflx" => Ok(Self::PeerReflexive),
            "relay" => Ok(Self::Relay),
            other => Err(StanzaError::AttrParse(format!(
                "unknown candidate type '{other}'"
            ))),
        }
    }
}

/// One `<candidate/>` of an ICE-UDP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub component: u8,
    pub foundation: String,
    pub generation: u32,
    pub ip: String,
    pub port: u16,
    pub priority: u32,
    pub protocol: String,
    pub kind: CandidateType,
    pub network: Option<u8>,
    pub rel_addr: Option<String>,
    pub rel_port: Option<u16>,
}

impl Candidate {
    pub fn host(id: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            component: 1,
            foundation: "1".into(),
            generation: 0,
            ip: ip.into(),
            port,
            priority: 2_130_706_431,
            protocol: "udp".into(),
            kind: CandidateType::Host,
            network: None,
            rel_addr: None,
            rel_port: None,
        }
    }

    pub fn parse(node: &Node) -> Result<Self, StanzaError> {
        let mut attrs = node.attrs();
        let id = attrs.required_string("id")?.to_string();
        let ip = attrs.required_string("ip")?.to_string();
        let kind = attrs.optional_string("type").unwrap_or("host").parse()?;
        let candidate = Self {
            id,
            component: attrs.optional_u8("component").unwrap_or(1),
            foundation: attrs.optional_string("foundation").unwrap_or("1").to_string(),
            generation: attrs.optional_u32("generation").unwrap_or(0),
            ip,
            port: attrs
                .optional_u16("port")
                .ok_or_else(|| StanzaError::MissingAttr("port".into()))?,
            priority: attrs.optional_u32("priority").unwrap_or(0),
            protocol: attrs.optional_string("protocol").unwrap_or("udp").to_string(),
            kind,
            network: attrs.optional_u8("network"),
            rel_addr: attrs.optional_string("rel-addr").map(str::to_string),
            rel_port: attrs.optional_u16("rel-port"),
        };
        attrs.finish()?;
        Ok(candidate)
    }

    pub fn to_node(&self) -> Node {
        NodeBuilder::new("candidate")
            .attr("component", self.component.to_string())
            .attr("foundation", self.foundation.clone())
            .attr("generation", self.generation.to_string())
            .attr("id", self.id.clone())
            .attr("ip", self.ip.clone())
            .optional_attr("network", self.network.map(|n| n.to_string()))
            .attr("port", self.port.to_string())
            .attr("priority", self.priority.to_string())
            .attr("protocol", self.protocol.clone())
            .optional_attr("rel-addr", self.rel_addr.clone())
            .optional_attr("rel-port", self.rel_port.map(|p| p.to_string()))
            .attr("type", self.kind.as_str())
            .build()
    }
}

/// `<transport xmlns="urn:xmpp:jingle:transports:ice-udp:1"/>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IceUdpTransport {
    pub ufrag: Option<String>,
    pub pwd: Option<String>,
    pub candidates: Vec<Candidate>,
}

impl IceUdpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(mut self, ufrag: impl Into<String>, pwd: impl Into<String>) -> Self {
        self.ufrag = Some(ufrag.into());
        self.pwd = Some(pwd.into());
        self
    }

    pub fn add_candidate(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }

    pub fn parse(node: &Node) -> Result<Self, StanzaError> {
        let mut attrs = node.attrs();
        let ufrag = attrs.optional_string("ufrag").map(str::to_string);
        let pwd = attrs.optional_string("pwd").map(str::to_string);
        let candidates = node
            .get_children_by_tag("candidate")
            .map(Candidate::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            ufrag,
            pwd,
            candidates,
        })
    }

    pub fn to_node(&self) -> Node {
        NodeBuilder::new("transport")
            .attr("xmlns", NS_ICE_UDP)
            .optional_attr("ufrag", self.ufrag.clone())
            .optional_attr("pwd", self.pwd.clone())
            .children(self.candidates.iter().map(Candidate::to_node))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_type_parsing() {
        assert_eq!("srflx".parse::<CandidateType>().ok(), Some(CandidateType::ServerReflexive));
        assert!("bogus".parse::<CandidateType>().is_err());
    }

    #[test]
    fn test_transport_node_shape() {
        let mut transport = IceUdpTransport::new().with_credentials("8hhy", "asd88fgpdd777uzjYhagZg");
        transport.add_candidate(Candidate::host("el0747fg11", "10.0.1.1", 8998));

        let node = transport.to_node();
        assert_eq!(node.namespace(), Some(NS_ICE_UDP));
        assert_eq!(node.attrs.get("ufrag"), Some("8hhy"));
        let candidate = node.get_optional_child("candidate").unwrap();
        assert_eq!(candidate.attrs.get("type"), Some("host"));
        assert_eq!(candidate.attrs.get("port"), Some("8998"));
        assert!(!candidate.attrs.contains_key("rel-addr"));

        assert_eq!(IceUdpTransport::parse(&node).unwrap(), transport);
    }

    #[test]
    fn test_candidate_requires_port() {
        let node = NodeBuilder::new("candidate")
            .attr("id", "c1")
            .attr("ip", "192.0.2.1")
            .build();
        assert_eq!(
            Candidate::parse(&node),
            Err(StanzaError::MissingAttr("port".into()))
        );
    }

    #[test]
    fn test_transport_without_candidates() {
        let node = NodeBuilder::new("transport").attr("xmlns", NS_ICE_UDP).build();
        let transport = IceUdpTransport::parse(&node).unwrap();
        assert!(!transport.has_candidates());
    }
}
