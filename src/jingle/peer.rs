//! Per-session Jingle state machine.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use jinglecore::{Jid, Node};
use log::{debug, info, warn};
use tokio::sync::{Mutex, broadcast, watch};

use super::action::JingleAction;
use super::content::Content;
use super::error::JingleError;
use super::gate::{Latch, SidGate, SidSlot, SignalGate};
use super::media::{CallContainer, MediaNegotiator, SignalingChannel};
use super::negotiation::DeferredContentAdds;
use super::reason::{
    FailureCategory, NegotiationPhase, ReasonElement, error_text, remote_terminate_text,
};
use super::stanza::{self, JingleIq, SessionAddress, SessionInfoType};
use super::state::{PeerState, PeerStateChange};
use crate::config::SessionConfig;
use crate::request::{IqError, generate_session_id};

const STATE_EVENT_CAPACITY: usize = 32;

/// The collaborators a call peer is composed over.
#[derive(Clone)]
pub struct PeerContext {
    pub media: Arc<dyn MediaNegotiator>,
    pub channel: Arc<dyn SignalingChannel>,
    pub container: Arc<dyn CallContainer>,
}

/// One remote party of a Jingle call.
pub struct CallPeer {
    pub(super) local: Jid,
    pub(super) peer: Jid,
    pub(super) config: SessionConfig,
    pub(super) media: Arc<dyn MediaNegotiator>,
    pub(super) channel: Arc<dyn SignalingChannel>,
    pub(super) container: Arc<dyn CallContainer>,
    state: watch::Sender<PeerState>,
    events: broadcast::Sender<PeerStateChange>,
    /// Serializes answer, hangup, initiate_session and process_session_initiate.
    lifecycle: Mutex<()>,
    pub(super) sid_gate: SidGate,
    initiator: OnceLock<bool>,
    session_initiate: OnceLock<JingleIq>,
    pub(super) initiate_processed: Latch,
    pub(super) candidates: SignalGate,
    pub(super) local_hold: AtomicBool,
    pub(super) remote_hold: AtomicBool,
    conference_focus: AtomicBool,
    pub(super) deferred: DeferredContentAdds,
    id_counter: AtomicU64,
}

impl std::fmt::Debug for CallPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallPeer")
            .field("local", &self.local)
            .field("peer", &self.peer)
            .field("sid", &self.sid_gate.slot())
            .field("state", &self.state())
            .field("initiator", &self.initiator.get())
            .finish()
    }
}

impl CallPeer {
    fn new(
        local: Jid,
        peer: Jid,
        initial: PeerState,
        context: PeerContext,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(STATE_EVENT_CAPACITY);
        Arc::new(Self {
            local,
            peer,
            config,
            media: context.media,
            channel: context.channel,
            container: context.container,
            state: watch::Sender::new(initial),
            events,
            lifecycle: Mutex::new(()),
            sid_gate: SidGate::new(),
            initiator: OnceLock::new(),
            session_initiate: OnceLock::new(),
            initiate_processed: Latch::new(),
            candidates: SignalGate::new(),
            local_hold: AtomicBool::new(false),
            remote_hold: AtomicBool::new(false),
            conference_focus: AtomicBool::new(false),
            deferred: DeferredContentAdds::default(),
            id_counter: AtomicU64::new(0),
        })
    }

    /// A peer we are about to call. Starts in [`PeerState::Initiating`].
    pub fn outgoing(
        local: Jid,
        peer: Jid,
        context: PeerContext,
        config: SessionConfig,
    ) -> Arc<Self> {
        Self::new(local, peer, PeerState::Initiating, context, config)
    }

    /// A peer that sent us a session-initiate. Starts in [`PeerState::Idle`]
    /// until [`CallPeer::process_session_initiate`] runs.
    pub fn incoming(
        local: Jid,
        peer: Jid,
        context: PeerContext,
        config: SessionConfig,
    ) -> Arc<Self> {
        Self::new(local, peer, PeerState::Idle, context, config)
    }

    pub fn state(&self) -> PeerState {
        *self.state.borrow()
    }

    pub fn sid(&self) -> Option<String> {
        self.sid_gate.sid()
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator.get().copied().unwrap_or(false)
    }

    pub fn is_cancelled_before_init(&self) -> bool {
        self.sid_gate.is_cancelled()
    }

    pub fn is_conference_focus(&self) -> bool {
        self.conference_focus.load(Ordering::Acquire)
    }

    pub fn is_locally_on_hold(&self) -> bool {
        self.local_hold.load(Ordering::Acquire)
    }

    pub fn is_remotely_on_hold(&self) -> bool {
        self.remote_hold.load(Ordering::Acquire)
    }

    pub fn local_address(&self) -> &Jid {
        &self.local
    }

    pub fn peer_address(&self) -> &Jid {
        &self.peer
    }

    /// The session-initiate that opened this session, sent or received.
    pub fn session_initiate(&self) -> Option<&JingleIq> {
        self.session_initiate.get()
    }

    pub fn session_initiate_id(&self) -> Option<&str> {
        self.session_initiate.get().map(|iq| iq.id.as_str())
    }

    /// State changes, in order. Lagging receivers lose the oldest changes.
    pub fn subscribe(&self) -> broadcast::Receiver<PeerStateChange> {
        self.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<PeerState> {
        self.state.subscribe()
    }

    pub(super) fn address(&self) -> Option<SessionAddress> {
        self.sid()
            .map(|sid| SessionAddress::new(self.local.clone(), self.peer.clone(), sid))
    }

    fn next_stanza_id(&self, sid: &str) -> String {
        let count = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("{sid}-{count}")
    }

    /// Records the new state and notifies subscribers. Entering a terminal
    /// state closes the media first. Terminal states are never left.
    pub(super) async fn set_state(&self, new: PeerState, reason: Option<String>) {
        let current = self.state();
        if current == new {
            return;
        }
        if current.is_terminal() {
            debug!(target: "Jingle/Peer", "Ignoring {current} -> {new} for {}", self.peer);
            return;
        }
        if new.is_terminal() {
            self.media.close().await;
        }

        let mut old = current;
        let changed = self.state.send_if_modified(|state| {
            old = *state;
            if *state == new || state.is_terminal() {
                false
            } else {
                *state = new;
                true
            }
        });
        if !changed {
            return;
        }

        info!(
            target: "Jingle/Peer",
            "{} {old} -> {new}{}",
            self.peer,
            reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default()
        );
        // No receivers is fine.
        let _ = self.events.send(PeerStateChange::new(old, new, reason));
    }

    /// Best-effort delivery. Returns the stanza id, or `None` when nothing
    /// was sent because the session was cancelled before it started.
    pub(super) async fn send(&self, mut iq: JingleIq) -> Option<String> {
        if self.sid_gate.is_cancelled() {
            debug!(target: "Jingle/Peer", "Not sending {} after early cancel", iq.action);
            return None;
        }
        if iq.id.is_empty() {
            iq.id = self.next_stanza_id(&iq.sid);
        }
        let id = iq.id.clone();
        debug!(target: "Jingle/Peer", "-> {} {} (id {id})", iq.action, self.peer);
        if let Err(e) = self.channel.send(iq.to_node()).await {
            warn!(target: "Jingle/Peer", "Failed to send {} to {}: {e}", iq.action, self.peer);
        }
        Some(id)
    }

    /// Sends and waits for the correlated reply.
    pub(super) async fn send_and_await(
        &self,
        mut iq: JingleIq,
        limit: Duration,
    ) -> Result<Node, IqError> {
        if iq.id.is_empty() {
            iq.id = self.next_stanza_id(&iq.sid);
        }
        debug!(target: "Jingle/Peer", "-> {} {} (id {}, awaiting reply)", iq.action, self.peer, iq.id);
        self.channel.send_and_await_reply(iq.to_node(), limit).await
    }

    /// Fails the session: state Failed with "Error: <detail>" and a
    /// best-effort session-terminate carrying the mapped reason.
    ///
    /// `wire_text` overrides the free text sent to the peer. Does nothing once
    /// the session has ended.
    pub(super) async fn fail(
        &self,
        category: FailureCategory,
        detail: &str,
        wire_text: Option<String>,
    ) {
        let Some(code) = category.reason() else {
            debug!(target: "Jingle/Peer", "Ignoring {category:?}: {detail}");
            return;
        };
        let state = self.state();
        if state.is_terminal() {
            debug!(target: "Jingle/Peer", "Session with {} already {state}, not failing it again: {detail}", self.peer);
            return;
        }
        warn!(target: "Jingle/Peer", "Session with {} failed ({category:?}): {detail}", self.peer);

        let reason_text = error_text(detail);
        self.set_state(PeerState::Failed, Some(reason_text.clone()))
            .await;
        if let Some(addr) = self.address() {
            let reason = ReasonElement::new(code, Some(wire_text.unwrap_or(reason_text)));
            self.send(stanza::session_terminate(&addr, reason)).await;
        }
    }

    /// Starts an outgoing session: builds the offer for every media type,
    /// assigns a fresh sid and sends session-initiate with the extra
    /// extension elements appended.
    pub async fn initiate_session(&self, extra_extensions: Vec<Node>) -> Result<(), JingleError> {
        self.initiate_session_with(extra_extensions, |_| Ok(())).await
    }

    /// Like [`CallPeer::initiate_session`], running `on_sid` with the fresh
    /// sid before session-initiate goes out. An error from `on_sid` aborts
    /// the send.
    pub async fn initiate_session_with<F>(
        &self,
        extra_extensions: Vec<Node>,
        on_sid: F,
    ) -> Result<(), JingleError>
    where
        F: FnOnce(&str) -> Result<(), JingleError> + Send,
    {
        let _guard = self.lifecycle.lock().await;
        let result = self.initiate_session_locked(extra_extensions, on_sid).await;
        self.initiate_processed.open();
        result
    }

    async fn initiate_session_locked<F>(
        &self,
        extra_extensions: Vec<Node>,
        on_sid: F,
    ) -> Result<(), JingleError>
    where
        F: FnOnce(&str) -> Result<(), JingleError> + Send,
    {
        if let Some(sid) = self.sid() {
            return Err(JingleError::SidAlreadyAssigned(sid));
        }
        if self.initiator.set(true).is_err() && !self.is_initiator() {
            return Err(JingleError::InvalidState {
                operation: "initiate_session",
                state: self.state(),
            });
        }

        let contents = match self.media.build_offer(&[]).await {
            Ok(contents) => contents,
            Err(e) => {
                if !self.sid_gate.is_cancelled() {
                    self.set_state(PeerState::Failed, Some(error_text(&e.message)))
                        .await;
                }
                return Err(e.into());
            }
        };

        let sid = generate_session_id();
        match self.sid_gate.assign(&sid) {
            Ok(()) => {}
            Err(SidSlot::CancelledBeforeInit) => {
                info!(target: "Jingle/Peer", "Call to {} cancelled before session-initiate", self.peer);
                self.media.close().await;
                return Ok(());
            }
            Err(SidSlot::Assigned(existing)) => return Err(JingleError::SidAlreadyAssigned(existing)),
            Err(SidSlot::Pending) => {
                return Err(JingleError::InvalidState {
                    operation: "initiate_session",
                    state: self.state(),
                });
            }
        }

        if let Err(e) = on_sid(&sid) {
            self.set_state(PeerState::Failed, Some(error_text(&e)))
                .await;
            return Err(e);
        }

        let addr = SessionAddress::new(self.local.clone(), self.peer.clone(), sid.clone());
        let mut iq = stanza::session_initiate(&addr, contents);
        iq.extensions.extend(extra_extensions);
        iq.id = self.next_stanza_id(&sid);
        let _ = self.session_initiate.set(iq.clone());

        self.send(iq).await;
        self.set_state(PeerState::Initiating, None).await;
        Ok(())
    }

    /// Handles the session-initiate that created an incoming peer.
    pub async fn process_session_initiate(&self, iq: JingleIq) -> Result<(), JingleError> {
        let _guard = self.lifecycle.lock().await;
        let result = self.process_session_initiate_locked(iq).await;
        self.initiate_processed.open();
        result
    }

    async fn process_session_initiate_locked(&self, iq: JingleIq) -> Result<(), JingleError> {
        if self.initiator.set(false).is_err() && self.is_initiator() {
            return Err(JingleError::InvalidState {
                operation: "process_session_initiate",
                state: self.state(),
            });
        }
        match self.sid_gate.assign(&iq.sid) {
            Ok(()) => {}
            Err(SidSlot::Assigned(existing)) => return Err(JingleError::SidAlreadyAssigned(existing)),
            Err(slot) => {
                debug!(target: "Jingle/Peer", "Dropping session-initiate {}: {slot:?}", iq.sid);
                return Ok(());
            }
        }
        let _ = self.session_initiate.set(iq.clone());

        if let Err(e) = self.media.consume_offer(&iq.contents).await {
            self.fail(
                FailureCategory::Negotiation(NegotiationPhase::Offer),
                &e.message,
                None,
            )
            .await;
            return Ok(());
        }

        if let Some(coin) = iq.conference_info {
            self.conference_focus.store(coin.is_focus, Ordering::Release);
        }

        if !self.container.has_capabilities(&self.peer) {
            let container = self.container.clone();
            let peer = self.peer.clone();
            tokio::spawn(async move {
                if let Err(e) = container.discover_capabilities(&peer).await {
                    warn!(target: "Jingle/Peer", "Capability discovery for {peer} failed: {e}");
                }
            });
        }

        if let Some(addr) = self.address() {
            self.send(stanza::ringing(&addr)).await;
        }
        self.set_state(PeerState::Incoming, None).await;
        Ok(())
    }

    /// Accepts the incoming session.
    pub async fn answer(&self) -> Result<(), JingleError> {
        let _guard = self.lifecycle.lock().await;
        let state = self.state();
        if state != PeerState::Incoming || self.is_initiator() {
            return Err(JingleError::InvalidState {
                operation: "answer",
                state,
            });
        }
        let Some(addr) = self.address() else {
            return Err(JingleError::InvalidState {
                operation: "answer",
                state,
            });
        };

        let answer = match self.media.await_transport_ready().await {
            Ok(()) => self.media.build_answer().await,
            Err(e) => Err(e),
        };
        let contents = match answer {
            Ok(contents) => contents,
            Err(e) => {
                info!(target: "Jingle/Peer", "Failed to answer {}: {e}", self.peer);
                self.fail(
                    FailureCategory::Negotiation(NegotiationPhase::Answer),
                    &e.message,
                    None,
                )
                .await;
                return Ok(());
            }
        };

        // session-accept goes out before streaming starts so relays can see it.
        self.send(stanza::session_accept(&addr, contents)).await;

        if let Err(e) = self.media.start().await {
            info!(target: "Jingle/Peer", "Failed to start streaming to {}: {e}", self.peer);
            self.fail(FailureCategory::TransportStart, &e.message, None)
                .await;
            return Ok(());
        }
        self.set_state(PeerState::Connected, None).await;
        Ok(())
    }

    pub async fn process_session_accept(&self, iq: JingleIq) {
        if self.state().is_terminal() {
            debug!(target: "Jingle/Peer", "Ignoring session-accept from {} in {}", self.peer, self.state());
            return;
        }

        let applied = match self.media.await_transport_ready().await {
            Ok(()) => self.media.apply_answer(&iq.contents).await,
            Err(e) => Err(e),
        };
        if let Err(e) = applied {
            info!(target: "Jingle/Peer", "Failed to process session-accept from {}: {e}", self.peer);
            self.fail(
                FailureCategory::Negotiation(NegotiationPhase::Accept),
                &e.message,
                Some(e.to_string()),
            )
            .await;
            return;
        }

        self.set_state(PeerState::Connected, None).await;
        if let Err(e) = self.media.start().await {
            self.fail(FailureCategory::TransportStart, &e.message, None)
                .await;
        }
    }

    pub async fn process_session_terminate(&self, iq: JingleIq) {
        let text = remote_terminate_text(iq.reason.as_ref());
        self.set_state(PeerState::Disconnected, Some(text)).await;
    }

    pub async fn process_session_info(&self, kind: SessionInfoType) {
        match kind {
            SessionInfoType::Ringing => {
                let state = self.state();
                if matches!(
                    state,
                    PeerState::Initiating | PeerState::Connecting | PeerState::ConnectingEarlyMedia
                ) {
                    self.set_state(PeerState::Alerting, None).await;
                } else {
                    debug!(target: "Jingle/Peer", "Ignoring late ringing from {} in {state}", self.peer);
                }
            }
            SessionInfoType::Hold => {
                self.media.set_remote_hold(true).await;
                self.remote_hold.store(true, Ordering::Release);
                self.reevaluate_hold().await;
            }
            SessionInfoType::Unhold | SessionInfoType::Active => {
                self.media.set_remote_hold(false).await;
                self.remote_hold.store(false, Ordering::Release);
                self.reevaluate_hold().await;
            }
            other => {
                debug!(target: "Jingle/Peer", "Ignoring session-info {other} from {}", self.peer);
            }
        }
    }

    /// Ends the session. Does nothing once Disconnected or Failed.
    ///
    /// `other_extension` is attached to the outgoing reason, or used as the
    /// reason when the message would carry none and it is a `<reason/>`.
    pub async fn hangup(&self, failed: bool, reason_text: Option<String>, other_extension: Option<Node>) {
        let _guard = self.lifecycle.lock().await;
        let prior = self.state();
        if prior.is_terminal() {
            debug!(target: "Jingle/Peer", "Ignoring hangup of {} in {prior}", self.peer);
            return;
        }

        let next = if failed {
            PeerState::Failed
        } else {
            PeerState::Disconnected
        };
        self.set_state(next, reason_text).await;

        let outbound = match prior {
            s if s.is_established() => self.address().map(|a| stanza::bye(&a)),
            s if s.is_connecting() => match self.sid_gate.sid_or_cancel() {
                Some(_) => self.address().map(|a| stanza::cancel(&a)),
                None => {
                    info!(target: "Jingle/Peer", "Call to {} cancelled before a session existed", self.peer);
                    None
                }
            },
            PeerState::Incoming => self.address().map(|a| stanza::busy(&a)),
            PeerState::Busy | PeerState::Failed => None,
            other => {
                info!(target: "Jingle/Peer", "No termination message for {} in {other}", self.peer);
                None
            }
        };

        let Some(mut iq) = outbound else {
            return;
        };
        if let Some(extension) = other_extension {
            match iq.reason.as_mut() {
                Some(reason) => reason.other = Some(extension),
                None if ReasonElement::is_reason_node(&extension) => match ReasonElement::parse(&extension) {
                    Ok(reason) => iq.reason = Some(reason),
                    Err(e) => warn!(target: "Jingle/Peer", "Dropping malformed reason extension: {e}"),
                },
                None => {}
            }
        }
        self.send(iq).await;
    }

    /// Routes one inbound Jingle IQ to its handler.
    pub async fn process_jingle(self: &Arc<Self>, iq: JingleIq) -> Result<(), JingleError> {
        debug!(target: "Jingle/Peer", "<- {} {} (id {})", iq.action, self.peer, iq.id);
        // Anything routed while the session is being set up waits for it.
        if iq.action != JingleAction::SessionInitiate
            && !self
                .initiate_processed
                .wait(self.config.initiate_wait_timeout())
                .await
        {
            warn!(target: "Jingle/Peer", "Dropping {} from {}: session-initiate never processed", iq.action, self.peer);
            return Ok(());
        }
        match iq.action {
            JingleAction::SessionInitiate => return self.process_session_initiate(iq).await,
            JingleAction::SessionAccept => self.process_session_accept(iq).await,
            JingleAction::SessionTerminate => self.process_session_terminate(iq).await,
            JingleAction::SessionInfo => {
                if let Some(transfer) = iq.transfer {
                    return self.process_transfer(transfer).await;
                }
                if let Some(coin) = iq.conference_info {
                    self.conference_focus.store(coin.is_focus, Ordering::Release);
                }
                if let Some(kind) = iq.session_info {
                    self.process_session_info(kind).await;
                }
            }
            JingleAction::ContentAdd => self.process_content_add(iq).await,
            JingleAction::ContentAccept => self.process_content_accept(iq).await,
            JingleAction::ContentModify => self.process_content_modify(iq).await,
            JingleAction::ContentReject => self.process_content_reject(iq).await,
            JingleAction::ContentRemove => self.process_content_remove(iq).await,
            JingleAction::TransportInfo => self.process_transport_info(iq).await,
            other => {
                debug!(target: "Jingle/Peer", "Unhandled jingle action {other} from {}", self.peer);
            }
        }
        Ok(())
    }

    /// Applies trickled candidates once the session-initiate was processed,
    /// then wakes deferred content-adds.
    pub async fn process_transport_info(&self, iq: JingleIq) {
        if !self
            .initiate_processed
            .wait(self.config.initiate_wait_timeout())
            .await
        {
            warn!(target: "Jingle/Peer", "Dropping transport-info from {}: session-initiate never processed", self.peer);
            return;
        }
        if self.state().is_terminal() {
            debug!(target: "Jingle/Peer", "Ignoring transport-info for ended session with {}", self.peer);
            return;
        }

        if let Err(e) = self.media.process_transport_info(&iq.contents).await {
            warn!(target: "Jingle/Peer", "Failed to process transport-info from {}: {e}", self.peer);
            self.fail(
                FailureCategory::Negotiation(NegotiationPhase::TransportInfo),
                &e.message,
                None,
            )
            .await;
            return;
        }
        self.candidates.signal();
    }

    /// Sends local candidates and waits for the acknowledgement. A missing
    /// acknowledgement fails the session.
    pub async fn send_transport_info(&self, contents: Vec<Content>) -> Result<(), JingleError> {
        if self.sid_gate.is_cancelled() {
            return Ok(());
        }
        let Some(addr) = self.address() else {
            debug!(target: "Jingle/Peer", "No session yet, not sending transport-info to {}", self.peer);
            return Ok(());
        };

        match self
            .send_and_await(stanza::transport_info(&addr, contents), self.config.reply_timeout())
            .await
        {
            Ok(_) => Ok(()),
            Err(IqError::Timeout) => {
                self.fail(
                    FailureCategory::ReplyTimeout,
                    "no reply to transport-info",
                    None,
                )
                .await;
                Err(IqError::Timeout.into())
            }
            Err(e) => {
                warn!(target: "Jingle/Peer", "transport-info to {} not acknowledged: {e}", self.peer);
                Err(e.into())
            }
        }
    }

    /// Tells the peer whether we are the focus of a conference.
    pub async fn send_coin_session_info(&self, is_conference: bool) {
        if let Some(addr) = self.address() {
            self.send(stanza::conference_info(&addr, is_conference)).await;
        }
    }
}
