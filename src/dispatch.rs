// src/dispatch.rs - Serialized outbound notification delivery
//
// Multiple per-server tasks produce; one worker consumes and calls the
// transport one item at a time. The SMS gateway is rate-sensitive, so the
// serialization is the point, not an accident.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One outbound notification, consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchItem {
    pub phone_number: String,
    pub message: String,
}

/// Outbound notification transport. A failed send is logged and the item is
/// dropped; there are no retries (at-most-once, best-effort).
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, phone_number: &str, message: &str) -> Result<()>;
}

/// Cloneable producer handle over the dispatch channel. Enqueueing never
/// blocks the event path.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<DispatchItem>,
}

impl DispatchQueue {
    /// Create the queue and the receiver half the worker consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, item: DispatchItem) {
        if self.tx.send(item).is_err() {
            // Worker gone; restart is the escalation mechanism.
            warn!("dispatch worker is not running, notification dropped");
        }
    }
}

/// Consume the queue in strict FIFO order for the lifetime of the process.
/// Returns only when every producer handle has been dropped.
pub async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<DispatchItem>,
    transport: Arc<dyn SmsTransport>,
) {
    while let Some(item) = rx.recv().await {
        match transport.send(&item.phone_number, &item.message).await {
            Ok(()) => info!(to = %item.phone_number, "notification sent"),
            Err(e) => warn!(to = %item.phone_number, error = %e, "notification failed, dropped"),
        }
    }
    info!("dispatch queue closed, worker exiting");
}
