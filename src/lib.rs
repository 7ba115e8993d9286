//! # rpcmux
//!
//! A bidirectional RPC framework multiplexing request/response exchanges
//! and server-initiated notifications over a single full-duplex transport.
//! Requests and responses are correlated by message id; notifications ride
//! the same connection unsolicited.

pub mod cli;
pub mod client;
pub mod error;
pub mod flow_control;
pub mod logging;
pub mod packet;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod worker_pool;

pub use client::Client;
pub use error::{ProtocolShapeError, RpcError};
pub use flow_control::FlowController;
pub use packet::{Packet, PacketType};
pub use protocol::{
    ClientProtocolBuilder, ClientProtocolDescriptor, Notification, ServerProtocolBuilder,
    ServerProtocolDescriptor,
};
pub use server::{Notifier, Server, SessionProtocol};
pub use transport::Transport;
pub use worker_pool::WorkerPool;

/// The current version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values used by the demo binary and tests.
pub mod defaults {
    use std::time::Duration;

    /// Default call timeout before a waiter expires.
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default number of worker-pool tasks started per server.
    pub const WORKER_POOL_SIZE: usize = 4;

    /// Default capacity of a client's notification dispatch queue; a
    /// notification arriving once the queue is full is dropped with a
    /// warning rather than blocking the reader loop.
    pub const NOTIFICATION_QUEUE_SIZE: usize = 100;

    /// Default TCP port for the demo binary.
    pub const DEMO_PORT: u16 = 7878;
}
