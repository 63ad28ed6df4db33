use thiserror::Error;

use crate::jid::JidError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StanzaError {
    #[error("Unexpected tag: expected '{expected}', got '{actual}'")]
    UnexpectedTag { expected: String, actual: String },
    #[error("Attribute parsing failed: {0}")]
    AttrParse(String),
    #[error("Missing required attribute: {0}")]
    MissingAttr(String),
    #[error("Missing required child element: {0}")]
    MissingChild(String),
    #[error("JID parsing error: {0}")]
    Jid(#[from] JidError),
    #[error("Multiple attribute parsing errors: {0:?}")]
    AttrList(Vec<StanzaError>),
}

pub type Result<T> = std::result::Result<T, StanzaError>;
