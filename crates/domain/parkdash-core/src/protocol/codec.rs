use std::sync::atomic::{AtomicU32, Ordering};

use serde::Deserialize;
use serde_json::Value;

use super::{
    AckMessage, CommandMessage, CommandType, Message, MessageType, SyncRequestMessage,
    PROTOCOL_VERSION,
};
use crate::ProcessStatus;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unknown message type {t:#04x} (id {id})")]
    UnknownMessageType { t: u64, id: u32 },
    #[error("invalid {kind:?} payload (id {id}): {source}")]
    InvalidPayload {
        kind: MessageType,
        id: u32,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Sequence id of the offending frame when its envelope parsed.
    pub fn frame_id(&self) -> Option<u32> {
        match self {
            DecodeError::Malformed(_) => None,
            DecodeError::UnknownMessageType { id, .. } | DecodeError::InvalidPayload { id, .. } => {
                Some(*id)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to encode frame: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

#[derive(Deserialize)]
struct Envelope {
    id: u32,
    #[allow(dead_code)]
    v: u8,
    t: u64,
}

/// Translates between frames and [`Message`] values and hands out outbound
/// sequence ids.
///
/// One instance lives for the whole process; ids keep increasing across
/// reconnects.
#[derive(Debug)]
pub struct ProtocolCodec {
    seq: AtomicU32,
    version: u8,
}

impl Default for ProtocolCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec {
    pub fn new() -> Self {
        Self::with_version(PROTOCOL_VERSION)
    }

    pub fn with_version(version: u8) -> Self {
        Self {
            seq: AtomicU32::new(0),
            version,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn next_id(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Makes the next id larger than `id`. Ids only move forward.
    pub fn advance_past(&self, id: u32) {
        self.seq.fetch_max(id, Ordering::Relaxed);
    }

    /// Last id handed out, 0 before the first frame.
    pub fn last_id(&self) -> u32 {
        self.seq.load(Ordering::Relaxed)
    }

    pub fn build_command(&self, cmd: CommandType, param: Option<u32>) -> Message {
        Message::Command(CommandMessage {
            id: self.next_id(),
            v: self.version,
            cmd,
            p: param,
        })
    }

    pub fn build_sync_request(&self, last_ts: u64, last_version: u32) -> Message {
        Message::SyncRequest(SyncRequestMessage {
            id: self.next_id(),
            v: self.version,
            lts: last_ts,
            lv: last_version,
        })
    }

    pub fn build_ack(&self, original_id: u32) -> Message {
        Message::Ack(AckMessage {
            id: self.next_id(),
            v: self.version,
            rid: original_id,
            st: ProcessStatus::Success,
            c: None,
        })
    }

    pub fn encode(message: &Message) -> Result<String, EncodeError> {
        let mut value = match message {
            Message::Ack(m) => serde_json::to_value(m)?,
            Message::SyncRequest(m) => serde_json::to_value(m)?,
            Message::SyncResponse(m) => serde_json::to_value(m)?,
            Message::SlotStatus(m) => serde_json::to_value(m)?,
            Message::History(m) => serde_json::to_value(m)?,
            Message::BatchHistory(m) => serde_json::to_value(m)?,
            Message::Progress(m) => serde_json::to_value(m)?,
            Message::Command(m) => serde_json::to_value(m)?,
            Message::Error(m) => serde_json::to_value(m)?,
        };
        if let Value::Object(map) = &mut value {
            map.insert("t".into(), Value::from(message.message_type().code()));
        }
        Ok(serde_json::to_string(&value)?)
    }

    pub fn decode(raw: &str) -> Result<Message, DecodeError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(DecodeError::Malformed("frame is not an object".into()));
        }
        let envelope = Envelope::deserialize(&value)
            .map_err(|e| DecodeError::Malformed(format!("bad envelope: {e}")))?;

        let kind = u8::try_from(envelope.t)
            .ok()
            .and_then(|t| MessageType::try_from(t).ok())
            .ok_or(DecodeError::UnknownMessageType {
                t: envelope.t,
                id: envelope.id,
            })?;

        let invalid = |source| DecodeError::InvalidPayload {
            kind,
            id: envelope.id,
            source,
        };

        let message = match kind {
            MessageType::Ack => Message::Ack(serde_json::from_value(value).map_err(invalid)?),
            MessageType::SyncRequest => {
                Message::SyncRequest(serde_json::from_value(value).map_err(invalid)?)
            }
            MessageType::SyncResponse => {
                Message::SyncResponse(serde_json::from_value(value).map_err(invalid)?)
            }
            MessageType::SlotStatus => {
                Message::SlotStatus(serde_json::from_value(value).map_err(invalid)?)
            }
            MessageType::History if value.get("recs").is_some() => {
                Message::BatchHistory(serde_json::from_value(value).map_err(invalid)?)
            }
            MessageType::History => {
                Message::History(serde_json::from_value(value).map_err(invalid)?)
            }
            MessageType::Progress => {
                Message::Progress(serde_json::from_value(value).map_err(invalid)?)
            }
            MessageType::Command => {
                Message::Command(serde_json::from_value(value).map_err(invalid)?)
            }
            MessageType::Error => Message::Error(serde_json::from_value(value).map_err(invalid)?),
        };
        Ok(message)
    }
}
