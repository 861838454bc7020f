//! One-shot readiness signal shared between a single producer and any number
//! of waiters.
//!
//! The flag only ever moves from "not ready" to "ready". Marking it a second
//! time is a no-op, so two racing completion sources (an upstream signal and a
//! timeout, say) can both try to mark it without coordinating.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("timed out after {0:?} waiting for readiness")]
    TimedOut(Duration),
    #[error("readiness flag dropped before it became ready")]
    Closed,
}

#[async_trait]
pub trait Readiness: Send + Sync {
    /// Returns `true` once [`Readiness::mark_ready`] has been called.
    fn is_ready(&self) -> bool;

    /// Marks the flag ready. Returns `true` only for the call that performed
    /// the transition.
    fn mark_ready(&self) -> bool;

    /// When the flag became ready, if it has.
    fn ready_at(&self) -> Option<OffsetDateTime>;

    /// Waits until the flag is ready.
    async fn wait_ready(&self) -> Result<(), ReadinessError>;

    /// Waits until the flag is ready or `timeout` elapses.
    async fn wait_ready_timeout(&self, timeout: Duration) -> Result<(), ReadinessError> {
        match tokio::time::timeout(timeout, self.wait_ready()).await {
            Ok(result) => result,
            Err(_) => Err(ReadinessError::TimedOut(timeout)),
        }
    }
}

#[derive(Debug)]
pub struct ReadinessFlag {
    tx: watch::Sender<Option<OffsetDateTime>>,
}

impl ReadinessFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }
}

impl Default for ReadinessFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Readiness for ReadinessFlag {
    fn is_ready(&self) -> bool {
        self.tx.borrow().is_some()
    }

    fn mark_ready(&self) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(OffsetDateTime::now_utc());
            true
        })
    }

    fn ready_at(&self) -> Option<OffsetDateTime> {
        *self.tx.borrow()
    }

    async fn wait_ready(&self) -> Result<(), ReadinessError> {
        let mut rx = self.tx.subscribe();
        rx.wait_for(Option::is_some)
            .await
            .map(|_| ())
            .map_err(|_| ReadinessError::Closed)
    }
}
