//! Local and remote hold.

use std::sync::atomic::Ordering;

use log::{debug, warn};

use super::error::JingleError;
use super::peer::CallPeer;
use super::stanza::{self, SessionInfoType};

impl CallPeer {
    /// Puts the call on hold or resumes it, then tells the peer.
    pub async fn put_on_hold(&self, on_hold: bool) -> Result<(), JingleError> {
        self.media.set_local_hold(on_hold).await;
        self.local_hold.store(on_hold, Ordering::Release);

        let kind = if on_hold {
            SessionInfoType::Hold
        } else {
            if let Err(e) = self.media.reinit_all_contents().await {
                warn!(target: "Jingle/Hold", "Failed to reinitialize contents of {} on resume: {e}", self.peer);
                return Err(e.into());
            }
            SessionInfoType::Unhold
        };

        // The local state reflects the hold before anything goes on the wire.
        self.reevaluate_hold().await;

        if let Some(addr) = self.address() {
            self.send(stanza::session_info(&addr, kind)).await;
        }
        Ok(())
    }

    /// Moves an established call to the state matching both hold flags.
    pub(super) async fn reevaluate_hold(&self) {
        let local = self.local_hold.load(Ordering::Acquire);
        let remote = self.remote_hold.load(Ordering::Acquire);
        match self.state().with_hold(local, remote) {
            Some(next) => self.set_state(next, None).await,
            None => debug!(
                target: "Jingle/Hold",
                "Hold flags changed for {} in {}, state kept",
                self.peer,
                self.state()
            ),
        }
    }
}
