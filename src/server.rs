//! Server session.
//!
//! Grounded on `examples/original_source/wsrpc/server.go`: `procConn`'s
//! three-way select (incoming packet / outgoing response / shutdown)
//! becomes a `tokio::select!` over the transport's `recv` and a shutdown
//! notification; `callMethod`'s dispatch-on-a-goroutine becomes a job
//! submitted to [`crate::worker_pool::WorkerPool`]; `RPCNotifier.Notify`'s
//! non-blocking-send-else-spawn becomes `try_send`-else-spawn on the same
//! response channel the worker pool writes to.
//!
//! Handlers need `&mut P`, but the worker pool may run several handler
//! invocations for the same connection concurrently — the per-connection
//! state is therefore wrapped in `Arc<tokio::sync::Mutex<P>>`, which
//! serializes handler execution on one connection. This is a deliberate
//! trade-off recorded in DESIGN.md: the Go original has the same effective
//! serialization (a single goroutine per handler call, but no protection
//! against a second call mutating shared protocol state concurrently) made
//! explicit by Rust's aliasing rules.

use std::any::TypeId;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use crate::error::RpcError;
use crate::packet::Packet;
use crate::protocol::{Notification, ServerProtocolDescriptor};
use crate::transport::Transport;
use crate::worker_pool::WorkerPool;

/// Per-connection protocol state. Mirrors the Go `SessionProtocol`
/// interface (`abs.go`): `on_connect` fires once, handed a [`Notifier`] for
/// publishing notifications on this connection; `on_disconnect` fires once
/// the connection ends, carrying the reason if there was one.
pub trait SessionProtocol: Send + Sized + 'static {
    fn on_connect(&mut self, _notifier: Notifier<Self>) {}
    fn on_disconnect(&mut self, _reason: Option<String>) {}
}

/// Publishes notifications on one connection. Cloneable; handed to
/// [`SessionProtocol::on_connect`] and usable from any task afterward.
pub struct Notifier<P> {
    descriptor: Arc<ServerProtocolDescriptor<P>>,
    sender: mpsc::Sender<Packet>,
}

impl<P> Clone for Notifier<P> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<P: Send + 'static> Notifier<P> {
    /// Publish `payload` as a notification. Fails with
    /// [`RpcError::UndeclaredNotification`] if `N` wasn't registered on
    /// this protocol's descriptor (notifications are a closed set per
    /// connection).
    pub async fn notify<N: Notification>(&self, payload: &N) -> Result<(), RpcError> {
        let signature = self
            .descriptor
            .notification(N::NAME)
            .ok_or_else(|| RpcError::UndeclaredNotification(N::NAME.to_string()))?;
        if signature.payload_type_id != TypeId::of::<N>() {
            return Err(RpcError::UndeclaredNotification(N::NAME.to_string()));
        }

        let body = serde_json::to_vec(payload).map_err(|e| RpcError::Serialization(e.to_string()))?;
        let packet = Packet::notification(N::NAME, body);

        match self.sender.try_send(packet) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(packet)) => {
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let _ = sender.send(packet).await;
                });
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RpcError::ClosedConn),
        }
    }
}

/// Runs connections against one protocol descriptor, dispatching requests
/// through a shared [`WorkerPool`]. Accepting connections and handing them
/// to [`Server::serve_connection`] is left to the caller (the demo binary's
/// accept loop), matching the Go original's `conns <-chan RPCTransport`
/// being fed from outside `server.go`.
pub struct Server<P: SessionProtocol> {
    descriptor: Arc<ServerProtocolDescriptor<P>>,
    worker_pool: Arc<WorkerPool>,
    shutdown: Arc<Notify>,
}

impl<P: SessionProtocol> Server<P> {
    pub fn new(descriptor: ServerProtocolDescriptor<P>, initial_workers: usize) -> Arc<Self> {
        Arc::new(Self {
            descriptor: Arc::new(descriptor),
            worker_pool: WorkerPool::new(initial_workers),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Signal every in-flight [`Server::serve_connection`] call to close
    /// its connection and return, and close the shared worker pool so
    /// queued and in-flight jobs drain instead of being abandoned.
    pub async fn shutdown(&self) {
        self.shutdown.notify_waiters();
        self.worker_pool.close().await;
    }

    /// Drive one connection to completion: construct its session state,
    /// invoke `on_connect`, dispatch requests through the worker pool, and
    /// run until the transport closes or [`Server::shutdown`] fires.
    pub async fn serve_connection(&self, transport: Arc<dyn Transport>, state: P) {
        let state = Arc::new(tokio::sync::Mutex::new(state));
        let (resp_tx, mut resp_rx) = mpsc::channel::<Packet>(16);
        let notifier = Notifier {
            descriptor: self.descriptor.clone(),
            sender: resp_tx.clone(),
        };

        state.lock().await.on_connect(notifier);

        let writer_transport = transport.clone();
        let writer = tokio::spawn(async move {
            while let Some(packet) = resp_rx.recv().await {
                if let Err(e) = writer_transport.send(&packet).await {
                    tracing::warn!(error = %e, "cant send response");
                    break;
                }
            }
        });

        let disconnect_reason = loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    let _ = transport.close().await;
                    break Some("server shutdown".to_string());
                }
                result = transport.recv() => {
                    match result {
                        Ok(packet) => {
                            let descriptor = self.descriptor.clone();
                            let state = state.clone();
                            let resp_tx = resp_tx.clone();
                            self.worker_pool
                                .submit(Box::new(move || {
                                    Box::pin(async move {
                                        dispatch(descriptor, state, packet, resp_tx).await;
                                    })
                                }))
                                .await;
                        }
                        Err(e) => break Some(e.to_string()),
                    }
                }
            }
        };

        drop(resp_tx);
        let _ = writer.await;
        state.lock().await.on_disconnect(disconnect_reason);
    }
}

async fn dispatch<P: Send + 'static>(
    descriptor: Arc<ServerProtocolDescriptor<P>>,
    state: Arc<tokio::sync::Mutex<P>>,
    packet: Packet,
    resp_tx: mpsc::Sender<Packet>,
) {
    let invoke = match descriptor.method(&packet.method) {
        Some((_, invoke)) => invoke.clone(),
        None => {
            let response = packet.error_for(format!("no method {} found", packet.method));
            let _ = resp_tx.send(response).await;
            return;
        }
    };

    let response = {
        let mut guard = state.lock().await;
        match invoke(&mut guard, &packet.body).await {
            Ok(body) => packet.response_for(body),
            Err(err_text) => packet.error_for(err_text),
        }
    };
    let _ = resp_tx.send(response).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerProtocolBuilder;
    use crate::transport::inmemory::duplex_pair;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct SomeReq {
        name: String,
    }
    #[derive(Serialize, Deserialize)]
    struct SomeResp {
        is_bob: bool,
    }
    #[derive(Serialize, Deserialize)]
    struct MyNotif {
        msg: String,
    }
    impl Notification for MyNotif {
        const NAME: &'static str = "MyNotif";
    }

    struct MyProtocol {
        connected: bool,
    }

    impl SessionProtocol for MyProtocol {
        fn on_connect(&mut self, notifier: Notifier<Self>) {
            self.connected = true;
            tokio::spawn(async move {
                let _ = notifier
                    .notify(&MyNotif {
                        msg: "hello, dude!".to_string(),
                    })
                    .await;
            });
        }

        fn on_disconnect(&mut self, _reason: Option<String>) {
            self.connected = false;
        }
    }

    fn build_descriptor() -> ServerProtocolDescriptor<MyProtocol> {
        ServerProtocolBuilder::<MyProtocol>::new()
            .method("MyMethod", |_state: &mut MyProtocol, req: SomeReq| async move {
                Ok::<_, String>(SomeResp {
                    is_bob: req.name == "Bob",
                })
            })
            .unwrap()
            .notification::<MyNotif>()
            .unwrap()
            .build()
    }

    #[tokio::test]
    async fn notification_arrives_before_any_request_is_served() {
        let (client_end, server_end) = duplex_pair();
        let server = Server::new(build_descriptor(), 2);
        let server_clone = server.clone();
        let handle = tokio::spawn(async move {
            server_clone
                .serve_connection(Arc::new(server_end), MyProtocol { connected: false })
                .await;
        });

        let first = client_end.recv().await.unwrap();
        assert_eq!(first.method, "MyNotif");
        assert_eq!(first.kind, crate::packet::PacketType::Notification);

        client_end.close().await.unwrap();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn unknown_method_returns_error_packet_with_same_message_id() {
        let (client_end, server_end) = duplex_pair();
        let server = Server::new(build_descriptor(), 2);
        let server_clone = server.clone();
        let handle = tokio::spawn(async move {
            server_clone
                .serve_connection(Arc::new(server_end), MyProtocol { connected: false })
                .await;
        });

        let _notif = client_end.recv().await.unwrap();

        let req = Packet::request("MyMethodInvalid", b"{}".to_vec());
        client_end.send(&req).await.unwrap();
        let resp = client_end.recv().await.unwrap();

        assert_eq!(resp.kind, crate::packet::PacketType::Error);
        assert_eq!(resp.message_id, req.message_id);
        assert_eq!(resp.body, b"no method MyMethodInvalid found");

        client_end.close().await.unwrap();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn request_is_served_and_response_echoes_message_id() {
        let (client_end, server_end) = duplex_pair();
        let server = Server::new(build_descriptor(), 2);
        let server_clone = server.clone();
        let handle = tokio::spawn(async move {
            server_clone
                .serve_connection(Arc::new(server_end), MyProtocol { connected: false })
                .await;
        });

        let _notif = client_end.recv().await.unwrap();

        let req = Packet::request("MyMethod", br#"{"name":"Bob"}"#.to_vec());
        client_end.send(&req).await.unwrap();
        let resp = client_end.recv().await.unwrap();

        assert_eq!(resp.kind, crate::packet::PacketType::Response);
        assert_eq!(resp.message_id, req.message_id);
        let body: SomeResp = serde_json::from_slice(&resp.body).unwrap();
        assert!(body.is_bob);

        client_end.close().await.unwrap();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn shutdown_closes_the_connection() {
        let (client_end, server_end) = duplex_pair();
        let server = Server::new(build_descriptor(), 2);
        let server_clone = server.clone();
        let handle = tokio::spawn(async move {
            server_clone
                .serve_connection(Arc::new(server_end), MyProtocol { connected: false })
                .await;
        });

        let _notif = client_end.recv().await.unwrap();
        server.shutdown().await;

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("serve_connection should return promptly after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_the_shared_worker_pool() {
        let (client_end, server_end) = duplex_pair();
        let server = Server::new(build_descriptor(), 2);
        let server_clone = server.clone();
        let handle = tokio::spawn(async move {
            server_clone
                .serve_connection(Arc::new(server_end), MyProtocol { connected: false })
                .await;
        });

        let _notif = client_end.recv().await.unwrap();
        client_end.close().await.unwrap();
        let _ = handle.await;

        server.shutdown().await;
        assert_eq!(server.worker_pool.worker_count(), 0);
    }
}
