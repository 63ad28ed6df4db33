//! Inbound Jingle IQ router.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use jinglecore::{Node, StanzaError};
use log::{debug, warn};

use super::action::JingleAction;
use super::error::JingleError;
use super::media::SignalingChannel;
use super::peer::CallPeer;
use super::stanza::{IqType, JingleIq, build_iq_result};

/// Where an inbound stanza went.
#[derive(Debug)]
pub enum Routed {
    /// Handed to the peer owning the session. Processing runs on its own task.
    Dispatched(Arc<CallPeer>),
    /// A session-initiate for a sid nobody owns. The caller decides whether
    /// to create an incoming peer for it.
    NewSession(JingleIq),
    /// A Jingle IQ for a sid nobody owns.
    UnknownSession(JingleIq),
    /// Not a Jingle `set` IQ.
    NotJingle,
    Malformed(StanzaError),
}

/// Acknowledges inbound Jingle IQs and routes them by session id.
pub struct JingleHandler {
    channel: Arc<dyn SignalingChannel>,
    sessions: Arc<DashMap<String, Arc<CallPeer>>>,
}

impl JingleHandler {
    pub fn new(channel: Arc<dyn SignalingChannel>) -> Self {
        Self {
            channel,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Starts routing the peer's session. The entry is dropped once the
    /// session ends.
    pub fn register(&self, peer: Arc<CallPeer>) -> Result<(), JingleError> {
        let sid = peer.sid().ok_or(JingleError::InvalidState {
            operation: "register",
            state: peer.state(),
        })?;
        self.register_with_sid(&sid, peer)
    }

    /// Routes `sid` to the peer before the peer knows it, e.g. for a
    /// [`Routed::NewSession`] whose session-initiate is still to be
    /// processed. Stanzas dispatched in the meantime wait for that.
    pub fn register_with_sid(&self, sid: &str, peer: Arc<CallPeer>) -> Result<(), JingleError> {
        let mut state = peer.watch_state();
        match self.sessions.entry(sid.to_string()) {
            Entry::Occupied(_) => return Err(JingleError::SidAlreadyAssigned(sid.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(peer);
            }
        }

        let sessions = Arc::clone(&self.sessions);
        let sid = sid.to_string();
        tokio::spawn(async move {
            let _ = state.wait_for(|s| s.is_terminal()).await;
            sessions.remove(&sid);
            debug!(target: "Jingle/Router", "Session {sid} ended, no longer routed");
        });
        Ok(())
    }

    /// Starts an outgoing session, routing its sid before session-initiate
    /// goes out.
    pub async fn initiate(
        &self,
        peer: &Arc<CallPeer>,
        extra_extensions: Vec<Node>,
    ) -> Result<(), JingleError> {
        peer.initiate_session_with(extra_extensions, |sid| {
            self.register_with_sid(sid, Arc::clone(peer))
        })
        .await
    }

    pub fn get(&self, sid: &str) -> Option<Arc<CallPeer>> {
        self.sessions.get(sid).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, sid: &str) -> Option<Arc<CallPeer>> {
        self.sessions.remove(sid).map(|(_, peer)| peer)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub async fn handle(&self, node: &Node) -> Routed {
        if !JingleIq::is_jingle(node) || node.attrs.get("type") != Some(IqType::Set.as_str()) {
            return Routed::NotJingle;
        }

        let iq = match JingleIq::parse(node) {
            Ok(iq) => iq,
            Err(e) => {
                warn!(target: "Jingle/Router", "Failed to parse jingle IQ: {e}");
                return Routed::Malformed(e);
            }
        };

        if iq.action.requires_content() && iq.contents.is_empty() {
            warn!(target: "Jingle/Router", "{} {} carries no content", iq.action, iq.id);
        }

        if let Err(e) = self.channel.send(build_iq_result(node)).await {
            warn!(target: "Jingle/Router", "Failed to acknowledge {}: {e}", iq.id);
        }

        let Some(peer) = self.get(&iq.sid) else {
            if iq.action == JingleAction::SessionInitiate {
                debug!(target: "Jingle/Router", "New session {} from {:?}", iq.sid, iq.from);
                return Routed::NewSession(iq);
            }
            debug!(target: "Jingle/Router", "{} for unknown session {}", iq.action, iq.sid);
            return Routed::UnknownSession(iq);
        };

        let task_peer = Arc::clone(&peer);
        tokio::spawn(async move {
            let action = iq.action;
            if let Err(e) = task_peer.process_jingle(iq).await {
                warn!(target: "Jingle/Router", "Failed to process {action}: {e}");
            }
        });
        Routed::Dispatched(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jingle::content::Creator;
    use crate::jingle::reason::{Reason, ReasonElement};
    use crate::jingle::state::PeerState;
    use crate::test_utils::*;
    use jinglecore::NodeBuilder;

    fn handler() -> (JingleHandler, Arc<MockChannel>) {
        let channel = Arc::new(MockChannel::default());
        (JingleHandler::new(channel.clone()), channel)
    }

    fn acks(channel: &MockChannel) -> Vec<Node> {
        channel
            .sent()
            .into_iter()
            .filter(|n| n.attrs.get("type") == Some("result"))
            .collect()
    }

    #[tokio::test]
    async fn test_non_jingle_is_ignored() {
        let (handler, channel) = handler();
        let ping = NodeBuilder::new("iq")
            .attr("type", "get")
            .children([NodeBuilder::new("ping").attr("xmlns", "urn:xmpp:ping").build()])
            .build();
        assert!(matches!(handler.handle(&ping).await, Routed::NotJingle));

        let mut result = session_initiate_from_romeo("s1");
        result.iq_type = IqType::Result;
        assert!(matches!(handler.handle(&result.to_node()).await, Routed::NotJingle));
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_new_session_is_acknowledged() {
        let (handler, channel) = handler();
        let node = session_initiate_from_romeo("s1").to_node();

        match handler.handle(&node).await {
            Routed::NewSession(iq) => {
                assert_eq!(iq.sid, "s1");
                assert_eq!(iq.contents.len(), 1);
            }
            other => panic!("unexpected routing: {other:?}"),
        }
        let ack = &acks(&channel)[0];
        assert_eq!(ack.attrs.get("id"), Some("s1-init"));
        assert_eq!(ack.attrs.get("to"), Some(romeo().to_string().as_str()));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (handler, channel) = handler();
        let mut info = JingleIq::new(JingleAction::TransportInfo, "nobody");
        info.id = "t1".into();
        assert!(matches!(
            handler.handle(&info.to_node()).await,
            Routed::UnknownSession(_)
        ));
        assert_eq!(acks(&channel).len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_jingle() {
        let (handler, channel) = handler();
        let node = NodeBuilder::new("iq")
            .attr("id", "m1")
            .attr("type", "set")
            .children([NodeBuilder::new("jingle")
                .attr("xmlns", crate::jingle::stanza::NS_JINGLE)
                .attr("action", "session-dance")
                .attr("sid", "s1")
                .build()])
            .build();
        assert!(matches!(handler.handle(&node).await, Routed::Malformed(_)));
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_register_requires_session_id() {
        let (handler, _) = handler();
        let test = outgoing_peer();
        assert!(matches!(
            handler.register(test.peer.clone()),
            Err(JingleError::InvalidState { .. })
        ));

        test.peer.initiate_session(Vec::new()).await.unwrap();
        handler.register(test.peer.clone()).unwrap();
        assert!(matches!(
            handler.register(test.peer.clone()),
            Err(JingleError::SidAlreadyAssigned(_))
        ));
        assert_eq!(handler.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_info_during_setup_waits_for_initiate() {
        let (handler, _) = handler();
        let Routed::NewSession(initiate) =
            handler.handle(&session_initiate_from_romeo("s1").to_node()).await
        else {
            panic!("session-initiate not routed as a new session");
        };
        let test = incoming_peer();
        handler.register_with_sid(&initiate.sid, test.peer.clone()).unwrap();

        let mut info = JingleIq::new(JingleAction::TransportInfo, "s1");
        info.id = "t1".into();
        info.from = Some(romeo());
        info.contents = vec![audio_content(Creator::Initiator)];
        assert!(matches!(
            handler.handle(&info.to_node()).await,
            Routed::Dispatched(_)
        ));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(test.media.count("process_transport_info"), 0);

        test.peer.process_session_initiate(initiate).await.unwrap();
        assert!(eventually(|| test.media.count("process_transport_info") == 1).await);
        assert_eq!(
            test.media.calls().iter().position(|c| c == "consume_offer"),
            Some(0)
        );
        assert_eq!(test.peer.state(), PeerState::Incoming);
    }

    #[tokio::test]
    async fn test_terminate_during_setup_ends_session() {
        let (handler, _) = handler();
        let test = incoming_peer();
        handler.register_with_sid("s1", test.peer.clone()).unwrap();
        assert!(matches!(
            handler.register_with_sid("s1", test.peer.clone()),
            Err(JingleError::SidAlreadyAssigned(_))
        ));

        let mut terminate = JingleIq::new(JingleAction::SessionTerminate, "s1");
        terminate.id = "term-1".into();
        terminate.from = Some(romeo());
        terminate.reason = Some(ReasonElement::new(Reason::Cancel, None));
        assert!(matches!(
            handler.handle(&terminate.to_node()).await,
            Routed::Dispatched(_)
        ));

        test.peer
            .process_session_initiate(session_initiate_from_romeo("s1"))
            .await
            .unwrap();
        assert!(eventually(|| test.peer.state() == PeerState::Disconnected).await);
        assert!(eventually(|| handler.is_empty()).await);
    }

    #[tokio::test]
    async fn test_initiate_routes_session_before_sending() {
        let (handler, _) = handler();
        let test = outgoing_peer();
        handler.initiate(&test.peer, Vec::new()).await.unwrap();

        let sid = test.peer.sid().unwrap();
        assert!(handler.get(&sid).is_some());
        assert_eq!(test.channel.count(JingleAction::SessionInitiate), 1);

        let mut ringing = inbound(&test.peer, JingleAction::SessionInfo, Vec::new());
        ringing.id = "r1".into();
        ringing.session_info = Some(crate::jingle::stanza::SessionInfoType::Ringing);
        handler.handle(&ringing.to_node()).await;
        assert!(eventually(|| test.peer.state() == PeerState::Alerting).await);
    }

    #[tokio::test]
    async fn test_dispatch_and_cleanup() {
        let (handler, _) = handler();
        let test = connected_outgoing_peer().await;
        let sid = test.peer.sid().unwrap();
        handler.register(test.peer.clone()).unwrap();
        assert!(handler.get(&sid).is_some());

        let mut terminate = inbound(&test.peer, JingleAction::SessionTerminate, Vec::new());
        terminate.id = "term-1".into();
        terminate.reason = Some(ReasonElement::new(Reason::Decline, None));
        assert!(matches!(
            handler.handle(&terminate.to_node()).await,
            Routed::Dispatched(_)
        ));

        assert!(eventually(|| test.peer.state() == PeerState::Disconnected).await);
        assert!(eventually(|| handler.is_empty()).await);
    }

    #[tokio::test]
    async fn test_dispatch_content_add() {
        let (handler, _) = handler();
        let test = connected_outgoing_peer().await;
        handler.register(test.peer.clone()).unwrap();

        let mut add = inbound(
            &test.peer,
            JingleAction::ContentAdd,
            vec![video_content(Creator::Responder)],
        );
        add.id = "add-1".into();
        handler.handle(&add.to_node()).await;

        assert!(eventually(|| test.channel.count(JingleAction::ContentAccept) == 1).await);
        assert!(handler.remove(&test.peer.sid().unwrap()).is_some());
        assert!(handler.is_empty());
    }
}
