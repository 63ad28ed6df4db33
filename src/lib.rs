// Stanza primitives live in their own crate
pub use jinglecore::{Jid, Node, NodeBuilder};

pub mod config;
pub mod jingle;
pub mod request;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::SessionConfig;
pub use request::{IqChannel, IqError};
