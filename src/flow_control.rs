//! Flow control: correlates outgoing requests with their eventual response
//! or error packet.
//!
//! Grounded on `examples/original_source/wsrpc/flow_control.go`: a map of
//! pending waiters keyed by message id, and a background sweeper that
//! expires waiters older than `timeout`. The Go original wakes a waiter by
//! sending on a buffered channel of size 1; here a `tokio::sync::oneshot`
//! is the natural one-shot equivalent, and the sweeper runs at the same
//! `timeout / 3` cadence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::packet::Packet;

struct PendingWaiter {
    sender: oneshot::Sender<Packet>,
    registered_at: Instant,
}

/// Tracks in-flight calls for one session and resolves them as their
/// response arrives, or expires them once `timeout` elapses.
pub struct FlowController {
    waiters: Mutex<HashMap<String, PendingWaiter>>,
    timeout: Duration,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl FlowController {
    /// Build a controller with no sweeper running yet; call
    /// [`FlowController::spawn_sweeper`] once wrapped in an `Arc` to start
    /// expiring stale waiters.
    pub fn new(timeout: Duration) -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            timeout,
            sweeper: std::sync::Mutex::new(None),
        }
    }

    /// Register a new waiter for `message_id`, returning the receiver half
    /// the caller awaits on. Never suspends except to acquire the internal
    /// mutex.
    pub async fn new_waiter(&self, message_id: String) -> oneshot::Receiver<Packet> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock().await;
        waiters.insert(
            message_id,
            PendingWaiter {
                sender: tx,
                registered_at: Instant::now(),
            },
        );
        rx
    }

    /// Remove and return the waiter for `message_id`, if any. Used both by
    /// the reader loop (to deliver a response) and by `call` itself (to
    /// deregister on early return).
    pub async fn take_waiter(&self, message_id: &str) -> Option<oneshot::Sender<Packet>> {
        let mut waiters = self.waiters.lock().await;
        waiters.remove(message_id).map(|w| w.sender)
    }

    /// Deliver `packet` to its waiter, if one is still registered. Silently
    /// drops packets with no matching id (the reader loop logs this case).
    pub async fn resolve(&self, packet: Packet) -> bool {
        let id = packet.id();
        if let Some(sender) = self.take_waiter(&id).await {
            let _ = sender.send(packet);
            true
        } else {
            false
        }
    }

    /// Number of waiters currently pending; exposed for tests and metrics.
    pub async fn pending_count(&self) -> usize {
        self.waiters.lock().await.len()
    }

    /// Spawn the background sweeper, ticking at `timeout / 3` and dropping
    /// any waiter older than `timeout` (the dropped `oneshot::Sender` makes
    /// the caller's `await` resolve to a closed-channel error, which `call`
    /// maps to [`crate::error::RpcError::TimeoutError`]).
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let this = self.clone();
        let interval = (this.timeout / 3).max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                this.sweep_expired().await;
            }
        });
        *self.sweeper.lock().unwrap() = Some(handle);
    }

    async fn sweep_expired(&self) {
        let now = Instant::now();
        let mut waiters = self.waiters.lock().await;
        let expired: Vec<String> = waiters
            .iter()
            .filter(|(_, w)| now.duration_since(w.registered_at) >= self.timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            tracing::debug!(message_id = %id, "expiring stale waiter");
            waiters.remove(&id);
        }
    }
}

impl Drop for FlowController {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }
}
