//! Jingle (XEP-0166/0167) call signaling for one remote party.

pub mod action;
pub mod content;
pub mod error;
pub mod gate;
pub mod handler;
mod hold;
pub mod media;
pub mod negotiation;
pub mod peer;
pub mod reason;
pub mod stanza;
pub mod state;
mod transfer;
pub mod transport;

pub use action::JingleAction;
pub use content::{Content, Creator, MediaType, Senders};
pub use error::{JingleError, MediaError, MediaErrorKind};
pub use handler::{JingleHandler, Routed};
pub use media::{CallContainer, MediaNegotiator, SignalingChannel};
pub use peer::{CallPeer, PeerContext};
pub use reason::{Reason, ReasonElement};
pub use stanza::{JingleIq, SessionInfoType, Transfer};
pub use state::{PeerState, PeerStateChange};
