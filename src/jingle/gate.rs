//! Session-scoped ordering primitives.
//!
//! All three gates are built on `tokio::sync::watch`, so readers never block
//! and waiters can be bounded by a timeout.

use std::time::Duration;

use tokio::sync::watch;

/// Session id slot of a call peer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SidSlot {
    #[default]
    Pending,
    Assigned(String),
    /// Hangup ran before any sid existed. Nothing may be sent afterwards.
    CancelledBeforeInit,
}

/// Guards assignment of the session id against a concurrent early hangup.
#[derive(Debug)]
pub struct SidGate {
    slot: watch::Sender<SidSlot>,
}

impl Default for SidGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SidGate {
    pub fn new() -> Self {
        Self {
            slot: watch::Sender::new(SidSlot::Pending),
        }
    }

    /// Assigns the sid if the slot is still pending. On failure returns the
    /// slot as it was.
    pub fn assign(&self, sid: &str) -> Result<(), SidSlot> {
        let mut previous = None;
        self.slot.send_if_modified(|slot| {
            if *slot == SidSlot::Pending {
                *slot = SidSlot::Assigned(sid.to_string());
                true
            } else {
                previous = Some(slot.clone());
                false
            }
        });
        match previous {
            None => Ok(()),
            Some(slot) => Err(slot),
        }
    }

    /// Returns the sid if one exists, otherwise records the cancellation.
    pub fn sid_or_cancel(&self) -> Option<String> {
        let mut sid = None;
        self.slot.send_if_modified(|slot| match slot {
            SidSlot::Assigned(value) => {
                sid = Some(value.clone());
                false
            }
            SidSlot::Pending => {
                *slot = SidSlot::CancelledBeforeInit;
                true
            }
            SidSlot::CancelledBeforeInit => false,
        });
        sid
    }

    pub fn sid(&self) -> Option<String> {
        match &*self.slot.borrow() {
            SidSlot::Assigned(sid) => Some(sid.clone()),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.slot.borrow() == SidSlot::CancelledBeforeInit
    }

    pub fn slot(&self) -> SidSlot {
        self.slot.borrow().clone()
    }
}

/// A one-way latch: closed until opened, then open forever.
#[derive(Debug)]
pub struct Latch {
    open: watch::Sender<bool>,
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch {
    pub fn new() -> Self {
        Self {
            open: watch::Sender::new(false),
        }
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Waits until the latch is open. Returns `false` on timeout.
    pub async fn wait(&self, limit: Option<Duration>) -> bool {
        let mut rx = self.open.subscribe();
        let opened = async move { rx.wait_for(|open| *open).await.is_ok() };
        match limit {
            Some(limit) => tokio::time::timeout(limit, opened).await.unwrap_or(false),
            None => opened.await,
        }
    }
}

/// A generation-counted signal.
///
/// A waiter takes a ticket first, then waits for any signal raised after the
/// ticket was taken. Signals raised before the ticket are not observed.
#[derive(Debug)]
pub struct SignalGate {
    generation: watch::Sender<u64>,
}

impl Default for SignalGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalGate {
    pub fn new() -> Self {
        Self {
            generation: watch::Sender::new(0),
        }
    }

    pub fn ticket(&self) -> u64 {
        *self.generation.borrow()
    }

    pub fn signal(&self) {
        self.generation.send_modify(|g| *g += 1);
    }

    /// Waits for a signal newer than `ticket`. Returns `false` on timeout.
    pub async fn wait_after(&self, ticket: u64, limit: Option<Duration>) -> bool {
        let mut rx = self.generation.subscribe();
        let signalled = async move { rx.wait_for(|g| *g > ticket).await.is_ok() };
        match limit {
            Some(limit) => tokio::time::timeout(limit, signalled)
                .await
                .unwrap_or(false),
            None => signalled.await,
        }
    }
}
