//! Binary packet codec.
//!
//! Wire format is bit-exact and carries no length field for `body`: it
//! consumes whatever remains after the method name.
//!
//! ```text
//! offset  length  field
//!  0      16      message_id (raw bytes, v4 UUID)
//! 16       1      type        (u8: 1=REQUEST, 2=RESPONSE, 3=NOTIFICATION, 66=ERROR)
//! 17       1      method_len  (u8, 0..=255)
//! 18       N      method      (UTF-8, N = method_len)
//! 18+N     *      body        (remaining bytes; opaque)
//! ```

use uuid::Uuid;

use crate::error::RpcError;

/// Minimum size of a valid packet: 16-byte id + 1-byte type + 1-byte
/// method length, with an empty method and empty body.
pub const MIN_PACKET_SIZE: usize = 18;

/// Packet type discriminant as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Request,
    Response,
    Notification,
    Error,
}

impl PacketType {
    fn to_byte(self) -> u8 {
        match self {
            PacketType::Request => 1,
            PacketType::Response => 2,
            PacketType::Notification => 3,
            PacketType::Error => 66,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(PacketType::Request),
            2 => Some(PacketType::Response),
            3 => Some(PacketType::Notification),
            66 => Some(PacketType::Error),
            _ => None,
        }
    }
}

/// A single framed message. `message_id` correlates request/response/error
/// triples; `method` names the handler (requests), the notification
/// (notifications), or is empty (error packets derived via [`Packet::error_for`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub message_id: [u8; 16],
    pub kind: PacketType,
    pub method: String,
    pub body: Vec<u8>,
}

impl Packet {
    /// Build a new packet with a fresh, random message id.
    pub fn new(kind: PacketType, method: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            message_id: *Uuid::new_v4().as_bytes(),
            kind,
            method: method.into(),
            body,
        }
    }

    pub fn request(method: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(PacketType::Request, method, body)
    }

    pub fn notification(method: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(PacketType::Notification, method, body)
    }

    /// Canonical hyphenated UUID form of `message_id`; the routing key used
    /// inside a session.
    pub fn id(&self) -> String {
        Uuid::from_bytes(self.message_id).to_string()
    }

    /// Build a `RESPONSE` packet copying this packet's `message_id` and
    /// `method`, as the worker pool does once a handler succeeds.
    pub fn response_for(&self, body: Vec<u8>) -> Self {
        Self {
            message_id: self.message_id,
            kind: PacketType::Response,
            method: self.method.clone(),
            body,
        }
    }

    /// Derive an `ERROR` response from this packet: same `message_id`,
    /// empty method, body set to the error text.
    pub fn error_for(&self, text: impl Into<String>) -> Self {
        Self {
            message_id: self.message_id,
            kind: PacketType::Error,
            method: String::new(),
            body: text.into().into_bytes(),
        }
    }

    /// Deterministic, stable wire encoding.
    pub fn encode(&self) -> Vec<u8> {
        let method_bytes = self.method.as_bytes();
        let mlen = method_bytes.len().min(255);
        let mut out = Vec::with_capacity(MIN_PACKET_SIZE + mlen + self.body.len());
        out.extend_from_slice(&self.message_id);
        out.push(self.kind.to_byte());
        out.push(mlen as u8);
        out.extend_from_slice(&method_bytes[..mlen]);
        out.extend_from_slice(&self.body);
        out
    }

    /// Decode a packet from `raw`. Fails with [`RpcError::InvalidPacket`] if
    /// the buffer is shorter than [`MIN_PACKET_SIZE`] or the declared
    /// method length doesn't fit the remaining bytes.
    pub fn decode(raw: &[u8]) -> Result<Self, RpcError> {
        if raw.len() < MIN_PACKET_SIZE {
            return Err(RpcError::InvalidPacket(format!(
                "buffer of {} bytes is shorter than the {}-byte minimum",
                raw.len(),
                MIN_PACKET_SIZE
            )));
        }

        let mut message_id = [0u8; 16];
        message_id.copy_from_slice(&raw[0..16]);

        let kind = PacketType::from_byte(raw[16])
            .ok_or_else(|| RpcError::InvalidPacket(format!("unknown packet type {}", raw[16])))?;

        let mlen = raw[17] as usize;
        if raw.len() < 18 + mlen {
            return Err(RpcError::InvalidPacket(format!(
                "method length {} doesn't fit remaining {} bytes",
                mlen,
                raw.len() - 18
            )));
        }

        let method = String::from_utf8(raw[18..18 + mlen].to_vec())
            .map_err(|e| RpcError::InvalidPacket(format!("method is not valid UTF-8: {e}")))?;
        let body = raw[18 + mlen..].to_vec();

        Ok(Self {
            message_id,
            kind,
            method,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn round_trip() {
        let p = Packet::request("MyMethod", b"{\"Name\":\"Alice\"}".to_vec());
        let raw = p.encode();
        let back = Packet::decode(&raw).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn round_trip_empty_body_and_method() {
        let p = Packet::new(PacketType::Error, "", Vec::new());
        let raw = p.encode();
        assert_eq!(raw.len(), MIN_PACKET_SIZE);
        let back = Packet::decode(&raw).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn encode_is_deterministic() {
        let p = Packet::request("M", b"x".to_vec());
        assert_eq!(p.encode(), p.encode());
    }

    #[test]
    fn rejects_buffers_shorter_than_minimum() {
        let raw = vec![0u8; MIN_PACKET_SIZE - 1];
        assert!(matches!(
            Packet::decode(&raw),
            Err(RpcError::InvalidPacket(_))
        ));
    }

    #[test]
    fn rejects_method_length_overrunning_buffer() {
        let mut raw = vec![0u8; MIN_PACKET_SIZE];
        raw[16] = PacketType::Request.to_byte();
        raw[17] = 10; // claims 10 bytes of method but none follow
        assert!(matches!(
            Packet::decode(&raw),
            Err(RpcError::InvalidPacket(_))
        ));
    }

    #[test]
    fn message_ids_are_pairwise_distinct() {
        let ids: HashSet<String> = (0..256)
            .map(|_| Packet::request("M", Vec::new()).id())
            .collect();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn error_for_copies_message_id_and_clears_method() {
        let req = Packet::request("MyMethod", b"{}".to_vec());
        let err = req.error_for("bad name!");
        assert_eq!(err.message_id, req.message_id);
        assert_eq!(err.kind, PacketType::Error);
        assert_eq!(err.method, "");
        assert_eq!(err.body, b"bad name!");
    }

    #[test]
    fn response_for_copies_message_id_and_method() {
        let req = Packet::request("MyMethod", b"{}".to_vec());
        let resp = req.response_for(b"{\"IsBob\":false}".to_vec());
        assert_eq!(resp.message_id, req.message_id);
        assert_eq!(resp.method, req.method);
        assert_eq!(resp.kind, PacketType::Response);
    }
}
