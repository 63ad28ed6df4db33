use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use jinglecore::Node;
use log::{debug, warn};
use rand::RngCore;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::timeout;

use crate::jingle::media::SignalingChannel;

/// Custom error types for IQ operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IqError {
    #[error("IQ request timed out")]
    Timeout,
    #[error("Channel is not connected")]
    NotConnected,
    #[error("Received an error response: type={kind}, code={code}, text='{text}'")]
    ServerError {
        kind: String,
        code: u16,
        text: String,
    },
    #[error("Internal channel closed unexpectedly")]
    InternalChannelClosed,
}

/// Random session id for a new Jingle session.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Writes outgoing stanzas to a queue drained by the host's connection and
/// matches `result`/`error` IQs back to their waiting requests.
pub struct IqChannel {
    outbound: mpsc::UnboundedSender<Node>,
    response_waiters: Mutex<HashMap<String, oneshot::Sender<Node>>>,
    unique_id: String,
    id_counter: AtomicU64,
}

impl IqChannel {
    /// Returns the channel and the receiving end of its outbound queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Node>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let mut unique_id_bytes = [0u8; 2];
        rand::rng().fill_bytes(&mut unique_id_bytes);
        let channel = Self {
            outbound,
            response_waiters: Mutex::new(HashMap::new()),
            unique_id: format!("{}.{}", unique_id_bytes[0], unique_id_bytes[1]),
            id_counter: AtomicU64::new(0),
        };
        (channel, rx)
    }

    /// Generates a new unique request ID string.
    pub fn generate_request_id(&self) -> String {
        let count = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.unique_id, count)
    }

    fn ensure_id(&self, node: &mut Node) -> String {
        if let Some(id) = node.attrs.get("id").filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        let id = self.generate_request_id();
        node.attrs.insert("id", id.clone());
        id
    }

    /// Handles an incoming IQ response by forwarding it to the waiting task.
    ///
    /// Returns `false` when the node is not a reply anyone is waiting for.
    pub async fn handle_iq_response(&self, node: Node) -> bool {
        if node.tag != "iq" || !matches!(node.attrs.get("type"), Some("result" | "error")) {
            return false;
        }
        let Some(id) = node.attrs.get("id").map(str::to_string) else {
            return false;
        };
        if let Some(waiter) = self.response_waiters.lock().await.remove(&id) {
            if waiter.send(node).is_err() {
                warn!(target: "Jingle/IQ", "Failed to send IQ response to waiter for ID {id}. Receiver was likely dropped.");
            }
            return true;
        }
        false
    }

    pub async fn pending_requests(&self) -> usize {
        self.response_waiters.lock().await.len()
    }

    fn parse_error_reply(reply: &Node) -> IqError {
        let Some(error_node) = reply.get_optional_child("error") else {
            return IqError::ServerError {
                kind: String::new(),
                code: 0,
                text: "Malformed error response".to_string(),
            };
        };
        let mut parser = error_node.attrs();
        let kind = parser.optional_string("type").unwrap_or("").to_string();
        let code = parser.optional_u16("code").unwrap_or(0);
        if !parser.ok() {
            warn!(
                target: "Jingle/IQ",
                "Attribute parsing errors in IQ error response: {:?}",
                parser.errors
            );
        }
        // The defined condition is the first child that is not <text/>.
        let text = error_node
            .get_optional_child("text")
            .and_then(Node::text)
            .map(str::to_string)
            .or_else(|| {
                error_node
                    .children()
                    .and_then(|c| c.iter().find(|n| n.tag != "text"))
                    .map(|n| n.tag.clone())
            })
            .unwrap_or_default();
        IqError::ServerError { kind, code, text }
    }
}

#[async_trait]
impl SignalingChannel for IqChannel {
    async fn send(&self, mut node: Node) -> Result<(), IqError> {
        if node.tag == "iq" {
            self.ensure_id(&mut node);
        }
        self.outbound.send(node).map_err(|_| IqError::NotConnected)
    }

    async fn send_and_await_reply(
        &self,
        mut node: Node,
        limit: Duration,
    ) -> Result<Node, IqError> {
        let req_id = self.ensure_id(&mut node);

        let (tx, rx) = oneshot::channel();
        self.response_waiters
            .lock()
            .await
            .insert(req_id.clone(), tx);

        if self.outbound.send(node).is_err() {
            self.response_waiters.lock().await.remove(&req_id);
            return Err(IqError::NotConnected);
        }
        debug!(target: "Jingle/IQ", "Sent IQ {req_id}, waiting up to {limit:?}");

        match timeout(limit, rx).await {
            Ok(Ok(response_node)) => {
                if response_node.attrs.get("type") == Some("error") {
                    return Err(Self::parse_error_reply(&response_node));
                }
                Ok(response_node)
            }
            Ok(Err(_)) => Err(IqError::InternalChannelClosed),
            Err(_) => {
                self.response_waiters.lock().await.remove(&req_id);
                Err(IqError::Timeout)
            }
        }
    }
}
