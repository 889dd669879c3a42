//! Packet envelope
//!
//! Every socket frame is a JSON object `{ "op": u8, "d": any, "t": i64? }`. Outbound
//! packets are stamped with the server time in unix millis.

use super::OpCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Operation code
    pub op: OpCode,

    /// Payload, its shape depends on `op`
    #[serde(default)]
    pub d: Value,

    /// Timestamp in unix millis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<i64>,
}

/// Envelope as read from a socket, before the op code is known to be valid
#[derive(Deserialize)]
struct RawPacket {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    t: Option<i64>,
}

impl Packet {
    #[must_use]
    pub fn new(op: OpCode, d: Value) -> Self {
        Self { op, d, t: None }
    }

    /// Packet without a payload
    #[must_use]
    pub fn empty(op: OpCode) -> Self {
        Self::new(op, Value::Null)
    }

    /// Packet with a serialized payload
    pub fn with_data<T: Serialize>(op: OpCode, data: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(op, serde_json::to_value(data)?))
    }

    /// Error report carrying only the correlation id
    #[must_use]
    pub fn error(error_id: uuid::Uuid) -> Self {
        Self::new(OpCode::Error, Value::String(error_id.to_string()))
    }

    /// Decode the payload into a concrete type
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.d)
    }

    /// Set `t` to the current server time
    #[must_use]
    pub fn stamped(mut self) -> Self {
        self.t = Some(chrono::Utc::now().timestamp_millis());
        self
    }

    /// Parse a client frame
    ///
    /// Returns `Ok(None)` for a well-formed envelope with an unknown op code.
    pub fn decode(text: &str) -> Result<Option<Self>, serde_json::Error> {
        let raw: RawPacket = serde_json::from_str(text)?;
        Ok(OpCode::from_u8(raw.op).map(|op| Self {
            op,
            d: raw.d,
            t: raw.t,
        }))
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
