//! Collaborator interfaces a call peer is composed over.
//!
//! Hosts implement these traits to plug in the stanza transport, the media
//! engine and the surrounding call bookkeeping.

use std::time::Duration;

use async_trait::async_trait;
use jinglecore::{Jid, Node};

use super::content::{Content, MediaType};
use super::error::MediaError;
use crate::request::IqError;

/// Delivers outgoing stanzas and correlates replies by stanza id.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Fire-and-forget delivery.
    async fn send(&self, node: Node) -> Result<(), IqError>;

    /// Sends an IQ and waits for the `result` or `error` IQ with the same id.
    ///
    /// A missing id is assigned before sending. An `error` reply comes back
    /// as [`IqError::ServerError`].
    async fn send_and_await_reply(&self, node: Node, timeout: Duration) -> Result<Node, IqError>;
}

/// The media and transport negotiation engine of one call.
#[async_trait]
pub trait MediaNegotiator: Send + Sync {
    /// Local offer for the given media types. Empty means every supported type.
    async fn build_offer(&self, media: &[MediaType]) -> Result<Vec<Content>, MediaError>;

    /// Takes a remote offer (session-initiate or content-add).
    async fn consume_offer(&self, contents: &[Content]) -> Result<(), MediaError>;

    /// Answer to the last consumed offer.
    async fn build_answer(&self) -> Result<Vec<Content>, MediaError>;

    /// Applies a remote answer (session-accept or content-accept).
    async fn apply_answer(&self, contents: &[Content]) -> Result<(), MediaError>;

    /// Re-initialises one content. `media_change` is set when the remote
    /// description changed, not just the senders.
    async fn reinit_content(
        &self,
        name: &str,
        content: &Content,
        media_change: bool,
    ) -> Result<(), MediaError>;

    async fn reinit_all_contents(&self) -> Result<(), MediaError>;

    async fn remove_content(&self, name: &str);

    /// Starts or restarts streaming on every negotiated content.
    async fn start(&self) -> Result<(), MediaError>;

    /// Waits until local candidates are gathered.
    async fn await_transport_ready(&self) -> Result<(), MediaError>;

    /// Applies remote candidates received through transport-info.
    async fn process_transport_info(&self, contents: &[Content]) -> Result<(), MediaError>;

    async fn set_local_hold(&self, on_hold: bool);

    async fn set_remote_hold(&self, on_hold: bool);

    /// Whether a local stream of this type exists.
    fn has_stream(&self, media: MediaType) -> bool;

    /// The remote content of this type, if negotiated.
    fn remote_content(&self, media: MediaType) -> Option<Content>;

    /// Whether RTP translation (relaying for a conference) is enabled.
    fn is_translation_enabled(&self) -> bool;

    /// Releases the transport and streams. Must be safe to call repeatedly.
    async fn close(&self);
}

/// The call and account around a peer.
#[async_trait]
pub trait CallContainer: Send + Sync {
    /// Asks the local video pipeline to start or stop sending.
    async fn renegotiate_video(&self, peer: &Jid, enable: bool) -> anyhow::Result<()>;

    /// Whether capability info for the peer is cached.
    fn has_capabilities(&self, peer: &Jid) -> bool;

    async fn discover_capabilities(&self, peer: &Jid) -> anyhow::Result<()>;

    /// Whether the bare address is in the account's contact list.
    fn is_known_contact(&self, bare: &Jid) -> bool;

    /// Places a new call carrying the given extension elements.
    async fn create_outgoing_call(&self, to: &Jid, extensions: Vec<Node>) -> anyhow::Result<()>;
}
