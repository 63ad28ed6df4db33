pub mod attrs;
pub mod builder;
pub mod error;
pub mod jid;
pub mod node;

pub use attrs::AttrParser;
pub use builder::NodeBuilder;
pub use error::{Result, StanzaError};
pub use jid::Jid;
pub use node::{Attrs, Node, NodeContent};
