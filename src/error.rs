//! Error taxonomy for the RPC core.
//!
//! Library code returns [`RpcError`] so callers can match on a specific
//! failure kind instead of string-sniffing an opaque error, the way
//! `anyhow::Error` would force them to. The transport boundary is the one
//! place an opaque error is appropriate, so [`crate::transport::Transport`]
//! methods still return `anyhow::Result`.

use thiserror::Error;

/// Errors surfaced by the flow controller, client session, server session,
/// and protocol descriptor construction.
#[derive(Debug, Error)]
pub enum RpcError {
    /// `call` was invoked with a method name absent from the protocol
    /// descriptor.
    #[error("unknown method {0}")]
    UnknownMethod(String),

    /// The static type used at the call site doesn't match the type the
    /// method was registered with.
    #[error("invalid request type, {expected} expected")]
    InvalidRequestType {
        /// The registered input type's name (`std::any::type_name`).
        expected: &'static str,
    },

    /// Body encode or decode failure; carries the serializer's message.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The peer returned an `ERROR` packet; text is the packet body verbatim.
    #[error("{0}")]
    RemoteError(String),

    /// The waiter expired before a response or error packet arrived.
    #[error("call timed out")]
    TimeoutError,

    /// The transport was already closed, or closed during the call.
    #[error("connection closed")]
    ClosedConn,

    /// A server handler tried to publish a notification whose payload type
    /// is not declared in the protocol.
    #[error("notification {0} is not declared in protocol")]
    UndeclaredNotification(String),

    /// The client received a notification whose name isn't declared.
    #[error("unexpected notification {0}")]
    UnexpectedNotification(String),

    /// Packet decode rejected a frame (too short, or method length doesn't
    /// fit the remaining buffer).
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// Protocol descriptor construction failed; fatal at startup.
    #[error(transparent)]
    ProtocolShape(#[from] ProtocolShapeError),

    /// A lower-level transport error propagated verbatim from `call`'s send
    /// attempt. The raw error surfaces unless the transport is known
    /// closed, in which case `ClosedConn` takes precedence.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Distinct failure kinds for protocol descriptor construction. Each of
/// these is fatal at startup, never at call time.
#[derive(Debug, Error)]
pub enum ProtocolShapeError {
    /// The same method name was registered twice on the same builder.
    #[error("method {0} already registered")]
    DuplicateMethod(String),

    /// The same notification name was registered twice on the same builder.
    #[error("notification {0} already registered")]
    DuplicateNotification(String),
}
