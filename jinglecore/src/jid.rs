use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JidError {
    #[error("Invalid JID format: {0}")]
    InvalidFormat(String),
    #[error("JID has an empty domain: {0}")]
    EmptyDomain(String),
}

/// An XMPP address: `[node@]domain[/resource]`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Jid {
    pub node: String,
    pub domain: String,
    pub resource: String,
}

impl Jid {
    pub fn new(node: &str, domain: &str) -> Self {
        Self {
            node: node.to_string(),
            domain: domain.to_string(),
            ..Default::default()
        }
    }

    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resource = resource.to_string();
        self
    }

    /// The address without its resource part, as used for roster lookups.
    pub fn to_bare(&self) -> Self {
        Self {
            node: self.node.clone(),
            domain: self.domain.clone(),
            resource: String::new(),
        }
    }

    pub fn is_bare(&self) -> bool {
        self.resource.is_empty()
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (without_resource, resource) = match s.split_once('/') {
            Some((head, res)) => (head, res),
            None => (s, ""),
        };

        let (node, domain) = match without_resource.split_once('@') {
            Some((n, d)) => {
                if n.is_empty() {
                    return Err(JidError::InvalidFormat(s.to_string()));
                }
                (n, d)
            }
            None => ("", without_resource),
        };

        if domain.is_empty() {
            return Err(JidError::EmptyDomain(s.to_string()));
        }

        Ok(Jid {
            node: node.to_string(),
            domain: domain.to_string(),
            resource: resource.to_string(),
        })
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.node.is_empty() {
            write!(f, "{}@", self.node)?;
        }
        write!(f, "{}", self.domain)?;
        if !self.resource.is_empty() {
            write!(f, "/{}", self.resource)?;
        }
        Ok(())
    }
}
