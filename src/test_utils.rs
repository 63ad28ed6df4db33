use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jinglecore::{Jid, Node};
use tokio::sync::Notify;

use crate::config::SessionConfig;
use crate::jingle::action::JingleAction;
use crate::jingle::content::{Content, Creator, MediaType, PayloadType, RtpDescription};
use crate::jingle::error::MediaError;
use crate::jingle::media::{CallContainer, MediaNegotiator, SignalingChannel};
use crate::jingle::peer::{CallPeer, PeerContext};
use crate::jingle::stanza::{JingleIq, build_iq_result};
use crate::jingle::transport::{Candidate, IceUdpTransport};
use crate::request::IqError;

pub fn romeo() -> Jid {
    Jid::new("romeo", "montague.lit").with_resource("orchard")
}

pub fn juliet() -> Jid {
    Jid::new("juliet", "capulet.lit").with_resource("balcony")
}

pub fn audio_content(creator: Creator) -> Content {
    let mut transport = IceUdpTransport::new().with_credentials("8hhy", "asd88fgpdd777uzjYhagZg");
    transport.add_candidate(Candidate::host("el0747fg11", "10.0.1.1", 8998));
    Content::new("audio", creator)
        .with_description(
            RtpDescription::new(MediaType::Audio).with_payload(PayloadType::new(111, "opus", 48000)),
        )
        .with_transport(transport)
}

pub fn video_content(creator: Creator) -> Content {
    let mut transport = IceUdpTransport::new().with_credentials("9uB6", "YH75Fviy6338Vbrhrlp8Yh");
    transport.add_candidate(Candidate::host("y3s2b30v3r", "10.0.1.1", 9001));
    Content::new("video", creator)
        .with_description(
            RtpDescription::new(MediaType::Video).with_payload(PayloadType::new(100, "VP8", 90000)),
        )
        .with_transport(transport)
}

/// Media engine that records every call and fails the operations it is told to.
#[derive(Debug, Default)]
pub struct MockMedia {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    remote_video: Mutex<Option<Content>>,
    video_stream: AtomicBool,
    /// Set on the next successful `start`, simulating a video content coming up.
    video_on_start: AtomicBool,
    translation: AtomicBool,
    close_count: AtomicUsize,
    /// While set, `consume_offer` blocks until released.
    hold_offer: AtomicBool,
    offer_released: Notify,
}

impl MockMedia {
    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn set_remote_video(&self, content: Option<Content>) {
        *self.remote_video.lock().unwrap() = content;
    }

    pub fn set_translation(&self, enabled: bool) {
        self.translation.store(enabled, Ordering::SeqCst);
    }

    pub fn start_video_on_start(&self) {
        self.video_on_start.store(true, Ordering::SeqCst);
    }

    pub fn hold_consume_offer(&self) {
        self.hold_offer.store(true, Ordering::SeqCst);
    }

    pub fn release_consume_offer(&self) {
        self.offer_released.notify_one();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == operation || c.starts_with(&format!("{operation}:")))
            .count()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    fn record(&self, operation: &'static str) -> Result<(), MediaError> {
        self.calls.lock().unwrap().push(operation.to_string());
        if self.failing.lock().unwrap().contains(operation) {
            return Err(MediaError::general(format!("{operation} refused")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MediaNegotiator for MockMedia {
    async fn build_offer(&self, media: &[MediaType]) -> Result<Vec<Content>, MediaError> {
        self.record("build_offer")?;
        let contents = match media {
            [] => vec![
                audio_content(Creator::Initiator),
                video_content(Creator::Initiator),
            ],
            types => types
                .iter()
                .map(|m| match m {
                    MediaType::Audio => audio_content(Creator::Initiator),
                    MediaType::Video => video_content(Creator::Initiator),
                })
                .collect(),
        };
        Ok(contents)
    }

    async fn consume_offer(&self, _contents: &[Content]) -> Result<(), MediaError> {
        self.record("consume_offer")?;
        if self.hold_offer.swap(false, Ordering::SeqCst) {
            self.offer_released.notified().await;
        }
        Ok(())
    }

    async fn build_answer(&self) -> Result<Vec<Content>, MediaError> {
        self.record("build_answer")?;
        Ok(vec![audio_content(Creator::Initiator)])
    }

    async fn apply_answer(&self, _contents: &[Content]) -> Result<(), MediaError> {
        self.record("apply_answer")
    }

    async fn reinit_content(
        &self,
        name: &str,
        _content: &Content,
        media_change: bool,
    ) -> Result<(), MediaError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("reinit_content:{name}:{media_change}"));
        if self.failing.lock().unwrap().contains("reinit_content") {
            return Err(MediaError::general("reinit_content refused"));
        }
        Ok(())
    }

    async fn reinit_all_contents(&self) -> Result<(), MediaError> {
        self.record("reinit_all_contents")
    }

    async fn remove_content(&self, name: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("remove_content:{name}"));
    }

    async fn start(&self) -> Result<(), MediaError> {
        self.record("start")?;
        if self.video_on_start.swap(false, Ordering::SeqCst) {
            self.video_stream.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn await_transport_ready(&self) -> Result<(), MediaError> {
        self.record("await_transport_ready")
    }

    async fn process_transport_info(&self, _contents: &[Content]) -> Result<(), MediaError> {
        self.record("process_transport_info")
    }

    async fn set_local_hold(&self, on_hold: bool) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("set_local_hold:{on_hold}"));
    }

    async fn set_remote_hold(&self, on_hold: bool) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("set_remote_hold:{on_hold}"));
    }

    fn has_stream(&self, media: MediaType) -> bool {
        media == MediaType::Video && self.video_stream.load(Ordering::SeqCst)
    }

    fn remote_content(&self, media: MediaType) -> Option<Content> {
        match media {
            MediaType::Video => self.remote_video.lock().unwrap().clone(),
            MediaType::Audio => None,
        }
    }

    fn is_translation_enabled(&self) -> bool {
        self.translation.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push("close".to_string());
    }
}

/// Signaling channel that keeps every stanza it is handed.
///
/// Awaited requests are answered with an empty `result` unless a reply was
/// scripted with [`MockChannel::reply_with`].
#[derive(Debug, Default)]
pub struct MockChannel {
    sent: Mutex<Vec<Node>>,
    reply: Mutex<Option<Result<Node, IqError>>>,
}

impl MockChannel {
    pub fn reply_with(&self, reply: Result<Node, IqError>) {
        *self.reply.lock().unwrap() = Some(reply);
    }

    pub fn sent(&self) -> Vec<Node> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent Jingle IQs, parsed. Acknowledgements are skipped.
    pub fn sent_iqs(&self) -> Vec<JingleIq> {
        self.sent()
            .iter()
            .filter(|n| JingleIq::is_jingle(n))
            .map(|n| JingleIq::parse(n).unwrap())
            .collect()
    }

    pub fn sent_actions(&self) -> Vec<JingleAction> {
        self.sent_iqs().iter().map(|iq| iq.action).collect()
    }

    pub fn count(&self, action: JingleAction) -> usize {
        self.sent_actions().iter().filter(|a| **a == action).count()
    }

    pub fn last(&self, action: JingleAction) -> Option<JingleIq> {
        self.sent_iqs().into_iter().rev().find(|iq| iq.action == action)
    }
}

#[async_trait::async_trait]
impl SignalingChannel for MockChannel {
    async fn send(&self, node: Node) -> Result<(), IqError> {
        self.sent.lock().unwrap().push(node);
        Ok(())
    }

    async fn send_and_await_reply(&self, node: Node, _timeout: Duration) -> Result<Node, IqError> {
        let scripted = self.reply.lock().unwrap().clone();
        let reply = scripted.unwrap_or_else(|| Ok(build_iq_result(&node)));
        self.sent.lock().unwrap().push(node);
        reply
    }
}

#[derive(Debug, Default)]
pub struct MockContainer {
    known_contacts: Mutex<HashSet<String>>,
    has_capabilities: AtomicBool,
    discoveries: AtomicUsize,
    renegotiations: Mutex<Vec<bool>>,
    outgoing_calls: Mutex<Vec<(Jid, Vec<Node>)>>,
}

impl MockContainer {
    pub fn add_contact(&self, bare: &Jid) {
        self.known_contacts.lock().unwrap().insert(bare.to_string());
    }

    pub fn set_has_capabilities(&self, value: bool) {
        self.has_capabilities.store(value, Ordering::SeqCst);
    }

    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    pub fn renegotiations(&self) -> Vec<bool> {
        self.renegotiations.lock().unwrap().clone()
    }

    pub fn outgoing_calls(&self) -> Vec<(Jid, Vec<Node>)> {
        self.outgoing_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CallContainer for MockContainer {
    async fn renegotiate_video(&self, _peer: &Jid, enable: bool) -> anyhow::Result<()> {
        self.renegotiations.lock().unwrap().push(enable);
        Ok(())
    }

    fn has_capabilities(&self, _peer: &Jid) -> bool {
        self.has_capabilities.load(Ordering::SeqCst)
    }

    async fn discover_capabilities(&self, _peer: &Jid) -> anyhow::Result<()> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_known_contact(&self, bare: &Jid) -> bool {
        self.known_contacts.lock().unwrap().contains(&bare.to_string())
    }

    async fn create_outgoing_call(&self, to: &Jid, extensions: Vec<Node>) -> anyhow::Result<()> {
        self.outgoing_calls
            .lock()
            .unwrap()
            .push((to.clone(), extensions));
        Ok(())
    }
}

/// A peer wired to fresh mocks.
pub struct TestPeer {
    pub peer: Arc<CallPeer>,
    pub media: Arc<MockMedia>,
    pub channel: Arc<MockChannel>,
    pub container: Arc<MockContainer>,
}

fn mocks() -> (PeerContext, Arc<MockMedia>, Arc<MockChannel>, Arc<MockContainer>) {
    let media = Arc::new(MockMedia::default());
    let channel = Arc::new(MockChannel::default());
    let container = Arc::new(MockContainer::default());
    container.set_has_capabilities(true);
    let context = PeerContext {
        media: media.clone(),
        channel: channel.clone(),
        container: container.clone(),
    };
    (context, media, channel, container)
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        reply_timeout_ms: 200,
        initiate_wait_timeout_ms: Some(2_000),
        no_candidates_wait_ms: Some(2_000),
        ..SessionConfig::default()
    }
}

/// An outgoing call to juliet that has not sent anything yet.
pub fn outgoing_peer() -> TestPeer {
    outgoing_peer_with(test_config())
}

pub fn outgoing_peer_with(config: SessionConfig) -> TestPeer {
    let (context, media, channel, container) = mocks();
    let peer = CallPeer::outgoing(romeo(), juliet(), context, config);
    TestPeer {
        peer,
        media,
        channel,
        container,
    }
}

/// An incoming call from romeo that has not processed its session-initiate.
pub fn incoming_peer() -> TestPeer {
    let (context, media, channel, container) = mocks();
    let peer = CallPeer::incoming(juliet(), romeo(), context, test_config());
    TestPeer {
        peer,
        media,
        channel,
        container,
    }
}

/// A session-initiate from romeo to juliet.
pub fn session_initiate_from_romeo(sid: &str) -> JingleIq {
    let mut iq = JingleIq::new(JingleAction::SessionInitiate, sid);
    iq.id = format!("{sid}-init");
    iq.from = Some(romeo());
    iq.to = Some(juliet());
    iq.initiator = Some(romeo());
    iq.contents = vec![audio_content(Creator::Initiator)];
    iq
}

/// An inbound IQ of `action` for the peer's session.
pub fn inbound(peer: &CallPeer, action: JingleAction, contents: Vec<Content>) -> JingleIq {
    let mut iq = JingleIq::new(action, peer.sid().unwrap());
    iq.from = Some(peer.peer_address().clone());
    iq.to = Some(peer.local_address().clone());
    iq.contents = contents;
    iq
}

/// An outgoing call that was accepted by juliet.
pub async fn connected_outgoing_peer() -> TestPeer {
    let test = outgoing_peer();
    test.peer.initiate_session(Vec::new()).await.unwrap();
    let accept = inbound(
        &test.peer,
        JingleAction::SessionAccept,
        vec![audio_content(Creator::Initiator)],
    );
    test.peer.process_session_accept(accept).await;
    assert_eq!(test.peer.state(), crate::jingle::state::PeerState::Connected);
    test
}

/// An incoming call from romeo, ringing.
pub async fn ringing_incoming_peer(sid: &str) -> TestPeer {
    let test = incoming_peer();
    test.peer
        .process_session_initiate(session_initiate_from_romeo(sid))
        .await
        .unwrap();
    test
}

/// Polls `condition` until it holds, for work running on spawned tasks.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
