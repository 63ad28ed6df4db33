//! Session transfer (XEP-0251).

use jinglecore::Jid;
use log::info;

use super::error::JingleError;
use super::peer::CallPeer;
use super::reason::{Reason, ReasonElement};
use super::stanza::{self, IqType, Transfer, transferred_marker};
use super::state::PeerState;
use crate::request::IqError;

impl CallPeer {
    /// Asks the peer to transfer this call to `to`. With `sid` the transfer
    /// is attended: the peer replaces that session of ours instead of
    /// placing a fresh call.
    ///
    /// On success the local session is ended. Failures leave the state
    /// untouched.
    pub async fn transfer(&self, to: Option<Jid>, sid: Option<String>) -> Result<(), JingleError> {
        let to = to.ok_or_else(|| {
            JingleError::IllegalArgument("transfer target must be present".into())
        })?;
        let addr = self.address().ok_or(JingleError::InvalidState {
            operation: "transfer",
            state: self.state(),
        })?;

        let attended = sid.is_some();
        let request = Transfer {
            from: attended.then(|| self.local.clone()),
            to: Some(to.clone()),
            sid,
        };

        let reply = self
            .send_and_await(
                stanza::transfer_request(&addr, request),
                self.config.reply_timeout(),
            )
            .await;
        match reply {
            Ok(node) if node.attrs.get("type") == Some(IqType::Result.as_str()) => {}
            Ok(node) => {
                let kind = node.attrs.get("type").unwrap_or("none").to_string();
                return Err(JingleError::TransferRejected(kind));
            }
            Err(IqError::Timeout) => return Err(JingleError::TransferTimeout),
            Err(IqError::ServerError { kind, code, text }) => {
                return Err(JingleError::TransferRejected(format!(
                    "{kind} (code {code}) {text}"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let message = format!(
            "{} transfer to: {to}",
            if attended { "Attended" } else { "Unattended" }
        );
        let reason = ReasonElement::new(Reason::Success, Some(message.clone()))
            .with_other(transferred_marker());
        self.hangup(false, Some(message), Some(reason.to_node()))
            .await;
        Ok(())
    }

    /// Handles a transfer request from the peer by calling the target.
    pub async fn process_transfer(&self, transfer: Transfer) -> Result<(), JingleError> {
        let attendant = transfer.from.ok_or_else(|| {
            JingleError::IllegalArgument("session transfer must contain a 'from' attribute".into())
        })?;
        let callee = transfer.to.ok_or_else(|| {
            JingleError::IllegalArgument("session transfer must contain a 'to' attribute".into())
        })?;

        let bare = callee.to_bare();
        if !self.container.is_known_contact(&bare) {
            let message = format!(
                "Transfer impossible: account roster does not contain transfer peer: {bare}"
            );
            info!(target: "Jingle/Transfer", "{message}");
            self.set_state(PeerState::Failed, Some(message)).await;
        }

        let attended = transfer.sid.is_some();
        let extension = Transfer {
            from: Some(attendant),
            to: attended.then(|| callee.clone()),
            sid: transfer.sid,
        };
        info!(target: "Jingle/Transfer", "Calling {callee} on behalf of {}", self.peer);
        self.container
            .create_outgoing_call(&callee, vec![extension.to_node()])
            .await?;
        Ok(())
    }
}
