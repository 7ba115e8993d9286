//! In-process duplex transport for tests, grounded on the `FakeConn` test
//! double in `examples/original_source/dummy_test.go`: a pair of channels,
//! one per direction, with `Close` modeled as sending a sentinel the
//! reader recognizes rather than tearing down the channel itself.
//!
//! The Go double also re-encodes and re-decodes every packet it carries
//! ("simulate dump/parse in real scenario") so that tests exercise the
//! wire codec even without a real socket; this transport does the same.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;

use crate::packet::Packet;
use crate::transport::Transport;

/// One end of an in-memory duplex pair. Build two with [`duplex_pair`] to
/// wire a test client directly to a test server without a socket.
pub struct InMemoryTransport {
    outgoing: mpsc::Sender<Packet>,
    incoming: tokio::sync::Mutex<mpsc::Receiver<Packet>>,
    closed: AtomicBool,
}

/// Build two ends of an in-memory connection: whatever end A sends, end B
/// receives, and vice versa.
pub fn duplex_pair() -> (InMemoryTransport, InMemoryTransport) {
    let (a_tx, b_rx) = mpsc::channel(64);
    let (b_tx, a_rx) = mpsc::channel(64);
    (
        InMemoryTransport {
            outgoing: a_tx,
            incoming: tokio::sync::Mutex::new(a_rx),
            closed: AtomicBool::new(false),
        },
        InMemoryTransport {
            outgoing: b_tx,
            incoming: tokio::sync::Mutex::new(b_rx),
            closed: AtomicBool::new(false),
        },
    )
}

#[async_trait::async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, packet: &Packet) -> Result<()> {
        if self.is_closed() {
            return Err(anyhow!("transport closed"));
        }
        // Round-trip through the wire codec, matching the Go double's
        // "simulate dump/parse in real scenario" behavior.
        let roundtripped = Packet::decode(&packet.encode())?;
        self.outgoing
            .send(roundtripped)
            .await
            .map_err(|_| anyhow!("peer dropped"))
    }

    async fn recv(&self) -> Result<Packet> {
        if self.is_closed() {
            return Err(anyhow!("transport closed"));
        }
        let mut incoming = self.incoming.lock().await;
        match incoming.recv().await {
            Some(packet) => Ok(packet),
            None => {
                self.closed.store(true, Ordering::SeqCst);
                Err(anyhow!("simulated close"))
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
