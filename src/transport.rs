//! External transport contract.
//!
//! Grounded on `examples/original_source/wsrpc/abs.go`'s `RPCTransport`
//! interface and the async `IpcTransport` trait pattern used elsewhere in
//! this codebase: an async trait returning opaque `anyhow::Result`s,
//! since transport failures (a dropped socket, a broken pipe) are not part
//! of the library's own typed error taxonomy — callers that need to branch
//! on "closed vs. other I/O error" check [`Transport::is_closed`] rather
//! than matching on the error variant, mirroring the Go original's separate
//! `Closed() <-chan error` signal.
//!
//! Unlike the Go interface (`Recv() <-chan *Packet`), `recv` here is a
//! plain async method returning one packet per call; a session's reader
//! loop just calls it in a loop, which reads the same either way without
//! needing a channel plumbed through the trait object.

use async_trait::async_trait;

use crate::packet::Packet;

/// One full-duplex connection carrying framed [`Packet`]s. Implementors own
/// whatever serializes concurrent writers (see `transport::tcp`'s internal
/// lock, grounded on the Go original's `wlock sync.Mutex`).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one packet. Implementations must serialize concurrent calls
    /// internally; callers may invoke `send` from multiple tasks at once
    /// (the server writer task and a notifier, for instance).
    async fn send(&self, packet: &Packet) -> anyhow::Result<()>;

    /// Block until the next packet arrives. Returns an error once the
    /// connection is closed or encounters an I/O failure; callers
    /// distinguish the two with [`Transport::is_closed`].
    async fn recv(&self) -> anyhow::Result<Packet>;

    /// Tear down the connection. Idempotent.
    async fn close(&self) -> anyhow::Result<()>;

    /// Whether the connection has been closed, either locally via
    /// [`Transport::close`] or observed as closed by the peer.
    fn is_closed(&self) -> bool;
}

pub mod tcp;
pub mod inmemory;
