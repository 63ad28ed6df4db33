//! Content-level negotiation: content-add/accept/modify/reject/remove and
//! the outgoing video content messages.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use super::action::JingleAction;
use super::content::{Content, Creator, MediaType, Senders};
use super::error::MediaError;
use super::peer::CallPeer;
use super::reason::{FailureCategory, NegotiationPhase};
use super::stanza::{self, JingleIq};

/// Content-adds waiting for candidates to arrive through transport-info.
#[derive(Debug, Default)]
pub(crate) struct DeferredContentAdds {
    /// Set while a content-add without candidates is waiting.
    no_candidates: AtomicBool,
    /// Keyed by the stanza id of the waiting content-add.
    pending: Mutex<HashMap<String, JingleIq>>,
}

impl DeferredContentAdds {
    pub(crate) fn is_waiting(&self) -> bool {
        self.no_candidates.load(Ordering::Acquire)
    }

    pub(crate) async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// What to send when the local video decision changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoContentAction {
    Add,
    Modify(Senders),
    Remove,
}

/// Picks the video content message for the current remote senders value.
///
/// `remote` is `None` when no remote video content exists, `Some(None)` when
/// it exists without a senders attribute.
pub fn video_content_action(
    allowed: bool,
    translation_enabled: bool,
    remote: Option<Option<Senders>>,
    ours: Creator,
) -> Option<VideoContentAction> {
    let allowed = allowed || translation_enabled;
    let own = Senders::only(ours);
    let other = Senders::only(ours.other());

    let Some(senders) = remote else {
        return allowed.then_some(VideoContentAction::Add);
    };

    let next = match (allowed, senders) {
        (true, Some(Senders::None)) => own,
        (true, Some(s)) if s == own => own,
        (true, _) => Senders::Both,
        (false, Some(s)) if s == own => return Some(VideoContentAction::Remove),
        (false, Some(Senders::Both) | None) => other,
        (false, Some(_)) => Senders::None,
    };
    Some(VideoContentAction::Modify(next))
}

impl CallPeer {
    fn our_creator(&self) -> Creator {
        Creator::for_initiator(self.is_initiator())
    }

    pub async fn process_content_add(self: &Arc<Self>, iq: JingleIq) {
        // Taken first so a transport-info racing the offer is not missed.
        let ticket = self.candidates.ticket();
        if !self.deferred.is_waiting() {
            let had_video = self.media.has_stream(MediaType::Video);
            if let Err(e) = self.media.consume_offer(&iq.contents).await {
                warn!(target: "Jingle/Content", "Rejecting content-add from {}: {e}", self.peer);
                self.finish_content_add(&iq, Err(e), had_video).await;
                return;
            }

            let lacks_candidates = iq.contents.iter().any(|c| !c.has_candidates());
            if lacks_candidates && self.config.legacy_no_candidates {
                self.deferred.no_candidates.store(true, Ordering::Release);
                self.defer_content_add(iq, ticket).await;
                return;
            }
        }
        self.complete_content_add(&iq).await;
    }

    /// Registers a continuation that re-runs the content-add once after the
    /// first transport-info newer than `ticket`.
    async fn defer_content_add(self: &Arc<Self>, iq: JingleIq, ticket: u64) {
        let key = iq.id.clone();
        {
            let mut pending = self.deferred.pending.lock().await;
            if pending.contains_key(&key) {
                debug!(target: "Jingle/Content", "content-add {key} already waiting for candidates");
                return;
            }
            pending.insert(key.clone(), iq);
        }
        info!(target: "Jingle/Content", "content-add {key} from {} has no candidates, waiting for transport-info", self.peer);

        let peer = Arc::clone(self);
        tokio::spawn(async move {
            let signalled = peer
                .candidates
                .wait_after(ticket, peer.config.no_candidates_wait())
                .await;
            let continuation = peer.deferred.pending.lock().await.remove(&key);
            match continuation {
                Some(iq) if signalled => peer.complete_content_add(&iq).await,
                Some(_) => {
                    warn!(target: "Jingle/Content", "Gave up on content-add {key}: no transport-info arrived")
                }
                None => {}
            }
            peer.deferred.no_candidates.store(false, Ordering::Release);
        });
    }

    async fn complete_content_add(&self, iq: &JingleIq) {
        let had_video = self.media.has_stream(MediaType::Video);
        let answer = match self.media.await_transport_ready().await {
            Ok(()) => self.media.build_answer().await,
            Err(e) => Err(e),
        };
        self.finish_content_add(iq, answer, had_video).await;
    }

    /// Answers the content-add, then restarts streaming whatever the answer
    /// was.
    async fn finish_content_add(
        &self,
        iq: &JingleIq,
        answer: Result<Vec<Content>, MediaError>,
        had_video: bool,
    ) {
        self.respond_to_content_add(iq, answer).await;

        if let Err(e) = self.media.start().await {
            warn!(target: "Jingle/Content", "Failed to start streaming after content-add: {e}");
        }

        let video_appeared = !had_video && self.media.has_stream(MediaType::Video);
        if video_appeared && self.media.is_translation_enabled() {
            if let Err(e) = self.container.renegotiate_video(&self.peer, true).await {
                error!(target: "Jingle/Content", "Failed to enable RTP translation: {e}");
            }
        }
    }

    async fn respond_to_content_add(&self, iq: &JingleIq, answer: Result<Vec<Content>, MediaError>) {
        let Some(addr) = self.address() else {
            return;
        };
        let response = match answer {
            Ok(contents) => stanza::content_action(&addr, JingleAction::ContentAccept, contents),
            Err(e) => {
                warn!(target: "Jingle/Content", "Answering content-add {} with content-reject: {e}", iq.id);
                let rejected = iq
                    .contents
                    .iter()
                    .map(|c| Content::new(c.name.clone(), c.creator))
                    .collect();
                stanza::content_action(&addr, JingleAction::ContentReject, rejected)
            }
        };
        self.send(response).await;
    }

    pub async fn process_content_accept(&self, iq: JingleIq) {
        let applied = match self.media.await_transport_ready().await {
            Ok(()) => self.media.apply_answer(&iq.contents).await,
            Err(e) => Err(e),
        };
        if let Err(e) = applied {
            info!(target: "Jingle/Content", "Failed to process content-accept from {}: {e}", self.peer);
            self.fail(
                FailureCategory::Negotiation(NegotiationPhase::Accept),
                &e.message,
                None,
            )
            .await;
            return;
        }
        if let Err(e) = self.media.start().await {
            warn!(target: "Jingle/Content", "Failed to start streaming after content-accept: {e}");
        }
    }

    pub async fn process_content_modify(&self, iq: JingleIq) {
        let Some(content) = iq.first_content() else {
            debug!(target: "Jingle/Content", "Ignoring empty content-modify from {}", self.peer);
            return;
        };
        let media_change = content.description.is_some();
        if let Err(e) = self
            .media
            .reinit_content(&content.name, content, media_change)
            .await
        {
            info!(target: "Jingle/Content", "Failed to process content-modify from {}: {e}", self.peer);
            self.fail(
                FailureCategory::Negotiation(NegotiationPhase::Modify),
                &e.message,
                None,
            )
            .await;
        }
    }

    pub async fn process_content_reject(&self, iq: JingleIq) {
        if iq.contents.is_empty() {
            self.fail(FailureCategory::ProtocolViolation, "content rejected", None)
                .await;
        }
    }

    pub async fn process_content_remove(&self, iq: JingleIq) {
        for content in &iq.contents {
            self.media.remove_content(&content.name).await;
        }
    }

    /// Turns local video on or off for this peer.
    pub async fn send_modify_video_content(&self, allowed: bool) {
        let remote = self.media.remote_content(MediaType::Video);
        let action = video_content_action(
            allowed,
            self.media.is_translation_enabled(),
            remote.as_ref().map(|c| c.senders),
            self.our_creator(),
        );

        match (action, remote) {
            (Some(VideoContentAction::Add), _) => self.send_add_video_content().await,
            (Some(VideoContentAction::Remove), Some(remote)) => {
                self.send_remove_video_content(&remote).await
            }
            (Some(VideoContentAction::Modify(senders)), Some(remote)) => {
                let Some(addr) = self.address() else {
                    return;
                };
                let content = Content::new(remote.name.clone(), remote.creator).with_senders(senders);
                self.send(stanza::content_action(
                    &addr,
                    JingleAction::ContentModify,
                    vec![content.clone()],
                ))
                .await;
                self.reinit_and_restart(&remote.name, &content).await;
            }
            _ => {}
        }
    }

    pub async fn send_add_video_content(&self) {
        let Some(addr) = self.address() else {
            return;
        };
        let contents = match self.media.build_offer(&[MediaType::Video]).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!(target: "Jingle/Content", "Failed to gather content for video: {e}");
                return;
            }
        };
        self.send(stanza::content_action(&addr, JingleAction::ContentAdd, contents))
            .await;
    }

    pub async fn send_remove_video_content(&self, remote: &Content) {
        let Some(addr) = self.address() else {
            return;
        };
        let mut content = Content::new(remote.name.clone(), remote.creator);
        content.senders = remote.senders;
        self.send(stanza::content_action(
            &addr,
            JingleAction::ContentRemove,
            vec![content],
        ))
        .await;
        self.media.remove_content(&remote.name).await;
    }

    /// Re-sends the video description, e.g. after a resolution change.
    pub async fn send_modify_video_resolution_content(&self) {
        let Some(remote) = self.media.remote_content(MediaType::Video) else {
            debug!(target: "Jingle/Content", "No remote video content to modify");
            return;
        };
        let Some(addr) = self.address() else {
            return;
        };
        let mut content = match self.media.build_offer(&[MediaType::Video]).await {
            Ok(contents) => match contents.into_iter().next() {
                Some(content) => content,
                None => {
                    warn!(target: "Jingle/Content", "Media engine offered no video content");
                    return;
                }
            },
            Err(e) => {
                warn!(target: "Jingle/Content", "Failed to gather content for video: {e}");
                return;
            }
        };
        // Only receiving video leaves senders unset.
        if remote.senders.is_some() {
            content.senders = remote.senders;
        }

        self.send(stanza::content_action(
            &addr,
            JingleAction::ContentModify,
            vec![content.clone()],
        ))
        .await;
        self.reinit_and_restart(&remote.name, &content).await;
    }

    async fn reinit_and_restart(&self, name: &str, content: &Content) {
        let restarted = match self.media.reinit_content(name, content, false).await {
            Ok(()) => self.media.start().await,
            Err(e) => Err(e),
        };
        if let Err(e) = restarted {
            warn!(target: "Jingle/Content", "Media reinitialization of {name} failed: {e}");
        }
    }
}
