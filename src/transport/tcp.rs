//! Length-prefixed TCP transport, the demo binary's concrete [`super::Transport`].
//!
//! Grounded on `src/ipc/tcp_socket.rs`'s `read_message`/`write_message`
//! framing (4-byte little-endian length prefix, `socket2` for
//! `TCP_NODELAY` and buffer sizing) and on
//! `examples/original_source/wsrpc/ws_transport.go`'s `wlock sync.Mutex`,
//! which serializes concurrent writers ahead of the single underlying
//! socket — the same role `write_lock` plays here.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::packet::Packet;
use crate::transport::Transport;

/// Packets larger than this are rejected outright, guarding against a
/// corrupt or adversarial length prefix forcing a huge allocation.
const MAX_PACKET_BYTES: u32 = 16 * 1024 * 1024;

/// A TCP connection framing [`Packet`]s with a 4-byte length prefix ahead
/// of each encoded packet.
pub struct TcpTransport {
    stream: Mutex<TcpStream>,
    write_lock: Mutex<()>,
    closed: AtomicBool,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Wrap an already-connected socket, tuning it for low-latency framed
    /// RPC traffic on both ends of a connection.
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr().context("reading peer address")?;
        let std_stream = stream.into_std()?;
        let socket = socket2::Socket::from(std_stream.try_clone()?);
        socket.set_nodelay(true)?;
        let stream = TcpStream::from_std(std_stream)?;
        Ok(Self {
            stream: Mutex::new(stream),
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            peer,
        })
    }

    /// Connect to `addr` as a client.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connecting to {addr}"))?;
        Self::new(stream)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&self, packet: &Packet) -> Result<()> {
        if self.is_closed() {
            return Err(anyhow!("transport closed"));
        }
        let _guard = self.write_lock.lock().await;
        let encoded = packet.encode();
        let len = encoded.len() as u32;
        let mut stream = self.stream.lock().await;
        stream.write_all(&len.to_le_bytes()).await?;
        stream.write_all(&encoded).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Packet> {
        if self.is_closed() {
            return Err(anyhow!("transport closed"));
        }
        let mut stream = self.stream.lock().await;
        let mut len_bytes = [0u8; 4];
        if let Err(e) = stream.read_exact(&mut len_bytes).await {
            self.closed.store(true, Ordering::SeqCst);
            return Err(e.into());
        }
        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_PACKET_BYTES {
            self.closed.store(true, Ordering::SeqCst);
            return Err(anyhow!("packet of {len} bytes exceeds maximum"));
        }
        let mut buf = vec![0u8; len as usize];
        stream.read_exact(&mut buf).await?;
        drop(stream);
        Packet::decode(&buf).map_err(Into::into)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let mut stream = self.stream.lock().await;
        let _ = stream.shutdown().await;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
