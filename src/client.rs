//! Client session.
//!
//! Grounded on `examples/original_source/client.go`: `Call` validates the
//! method name and request type against the protocol descriptor, registers
//! a flow-control waiter, sends the request, and blocks on the waiter. Two
//! background tasks run alongside it, matching the original's `go
//! cli.loop()` / `go cli.notifLoop()` pair: the reader loop (`loop()`)
//! pulls packets off the transport and either resolves a waiter
//! (`RESPONSE`/`ERROR`) or hands a `NOTIFICATION` to a bounded queue
//! (`notifications chan *Packet, 100` in the original) via a non-blocking
//! send that drops and warns if the queue is full (`onNotif`'s
//! `select{...default: drop}`); a separate dispatcher task (`notifLoop()`)
//! drains that queue and invokes the protocol descriptor's callback. Kept
//! as two tasks rather than one inline call so a slow or blocked
//! notification callback can never stall resolution of pending `call`
//! waiters on the same connection. The type-matching the Go original does
//! with `reflect.TypeOf(request).Elem()` becomes a `TypeId` comparison
//! here — see `protocol.rs` for the static-registration replacement this
//! relies on.

use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RpcError;
use crate::flow_control::FlowController;
use crate::packet::{Packet, PacketType};
use crate::protocol::{ClientProtocolDescriptor, Typed};
use crate::transport::Transport;

/// A client-side RPC session bound to one transport and one protocol
/// descriptor. Cheap to clone (it's handed out as an `Arc`); `call` may be
/// invoked concurrently from multiple tasks.
pub struct Client {
    transport: Arc<dyn Transport>,
    flow: Arc<FlowController>,
    protocol: Arc<ClientProtocolDescriptor>,
    closed: Arc<AtomicBool>,
    notifications: mpsc::Sender<Packet>,
    reader_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    notif_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Open a session: starts the flow controller's sweeper, the
    /// background reader loop, and the notification dispatcher loop.
    /// `timeout` bounds how long `call` waits for a response before giving
    /// up.
    pub fn connect(
        transport: Arc<dyn Transport>,
        protocol: ClientProtocolDescriptor,
        timeout: Duration,
    ) -> Arc<Self> {
        Self::connect_with_notification_capacity(
            transport,
            protocol,
            timeout,
            crate::defaults::NOTIFICATION_QUEUE_SIZE,
        )
    }

    fn connect_with_notification_capacity(
        transport: Arc<dyn Transport>,
        protocol: ClientProtocolDescriptor,
        timeout: Duration,
        notification_capacity: usize,
    ) -> Arc<Self> {
        let flow = Arc::new(FlowController::new(timeout));
        flow.spawn_sweeper();
        let (notif_tx, notif_rx) = mpsc::channel(notification_capacity.max(1));

        let client = Arc::new(Self {
            transport,
            flow,
            protocol: Arc::new(protocol),
            closed: Arc::new(AtomicBool::new(false)),
            notifications: notif_tx,
            reader_handle: std::sync::Mutex::new(None),
            notif_handle: std::sync::Mutex::new(None),
        });
        client.spawn_reader_loop();
        client.spawn_notif_loop(notif_rx);
        client
    }

    /// Invoke a registered method and wait for its response.
    ///
    /// Fails with [`RpcError::UnknownMethod`] if `method` isn't declared,
    /// [`RpcError::InvalidRequestType`] if `Req` doesn't match the type the
    /// method was registered with, [`RpcError::ClosedConn`] if the session
    /// is already closed, [`RpcError::TimeoutError`] if no response arrives
    /// within the session's timeout, and [`RpcError::RemoteError`] if the
    /// peer reports a handler failure.
    pub async fn call<Req, Resp>(&self, method: &str, request: Req) -> Result<Resp, RpcError>
    where
        Req: Serialize + Typed,
        Resp: DeserializeOwned,
    {
        let signature = self
            .protocol
            .method(method)
            .ok_or_else(|| RpcError::UnknownMethod(method.to_string()))?;

        if signature.input_type_id != TypeId::of::<Req>() {
            return Err(RpcError::InvalidRequestType {
                expected: signature.input_type_name,
            });
        }

        if self.closed.load(Ordering::SeqCst) {
            return Err(RpcError::ClosedConn);
        }

        let body = serde_json::to_vec(&request).map_err(|e| RpcError::Serialization(e.to_string()))?;
        let packet = Packet::request(method, body);
        let id = packet.id();

        let waiter = self.flow.new_waiter(id.clone()).await;

        if let Err(e) = self.transport.send(&packet).await {
            self.flow.take_waiter(&id).await;
            if self.transport.is_closed() {
                self.closed.store(true, Ordering::SeqCst);
                return Err(RpcError::ClosedConn);
            }
            return Err(RpcError::Transport(e.to_string()));
        }

        let response = waiter.await.map_err(|_| RpcError::TimeoutError)?;

        match response.kind {
            PacketType::Error => Err(RpcError::RemoteError(
                String::from_utf8_lossy(&response.body).into_owned(),
            )),
            PacketType::Response => serde_json::from_slice(&response.body)
                .map_err(|e| RpcError::Serialization(e.to_string())),
            other => Err(RpcError::InvalidPacket(format!(
                "unexpected packet kind {other:?} delivered to a call waiter"
            ))),
        }
    }

    /// Whether the session's reader loop has observed the transport close.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the underlying transport and stop the reader and notification
    /// dispatcher loops.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader_handle.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.notif_handle.lock().unwrap().take() {
            handle.abort();
        }
        self.transport.close().await
    }

    fn spawn_reader_loop(self: &Arc<Self>) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match this.transport.recv().await {
                    Ok(packet) => match packet.kind {
                        PacketType::Response | PacketType::Error => {
                            if !this.flow.resolve(packet.clone()).await {
                                tracing::debug!(
                                    message_id = %packet.id(),
                                    "response arrived for an unknown or expired waiter"
                                );
                            }
                        }
                        PacketType::Notification => match this.notifications.try_send(packet) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                tracing::warn!(
                                    "notification dropped: no free room in the dispatch queue"
                                );
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                tracing::debug!(
                                    "notification dropped: dispatcher loop already stopped"
                                );
                            }
                        },
                        PacketType::Request => {
                            tracing::warn!("client received unexpected REQUEST packet; ignoring");
                        }
                    },
                    Err(e) => {
                        tracing::debug!(error = %e, "client reader loop closed");
                        this.closed.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });
        *self.reader_handle.lock().unwrap() = Some(handle);
    }

    /// Drain the notification queue and dispatch each packet to the
    /// protocol descriptor's registered callback, kept off the reader
    /// loop's task so a slow callback can't delay waiter resolution.
    fn spawn_notif_loop(self: &Arc<Self>, mut queue: mpsc::Receiver<Packet>) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(packet) = queue.recv().await {
                this.protocol
                    .dispatch_notification(&packet.method, &packet.body);
            }
        });
        *self.notif_handle.lock().unwrap() = Some(handle);
    }
}
