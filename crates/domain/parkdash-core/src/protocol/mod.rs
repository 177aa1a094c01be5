//! Wire format shared with the parking controller.
//!
//! Frames are JSON objects with a numeric `id`, protocol version `v` and a
//! type code `t` that selects the remaining fields. Keys use the
//! controller's short form; the long spellings are accepted on decode.

use serde::{Deserialize, Serialize};

use crate::{ActionType, ProcessStatus, SlotState};

pub mod codec;
pub mod slots;

pub use codec::{DecodeError, EncodeError, ProtocolCodec};

pub const PROTOCOL_VERSION: u8 = 0;

wire_code! {
    MessageType {
        Ack = 0x01,
        SyncRequest = 0x02,
        SyncResponse = 0x03,
        SlotStatus = 0x10,
        History = 0x20,
        Progress = 0x30,
        Command = 0x50,
        Error = 0xFF,
    }
}

wire_code! {
    CommandType {
        Pause = 0,
        Resume = 1,
        Reset = 2,
        Homing = 3,
        Move = 4,
    }
}

/// Named event channel a decoded frame (or connection transition) is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    ConnectionOpened,
    ConnectionClosed,
    Ack,
    SyncRequest,
    SyncResponse,
    SlotStatus,
    History,
    Progress,
    Command,
    Error,
    FilterChange,
}

impl Channel {
    pub fn name(self) -> &'static str {
        match self {
            Channel::ConnectionOpened => "ws:open",
            Channel::ConnectionClosed => "ws:close",
            Channel::Ack => "ws:ack",
            Channel::SyncRequest => "ws:sync_req",
            Channel::SyncResponse => "ws:sync_res",
            Channel::SlotStatus => "ws:slot_status",
            Channel::History => "ws:history",
            Channel::Progress => "ws:progress",
            Channel::Command => "ws:command",
            Channel::Error => "ws:error",
            Channel::FilterChange => "filter:change",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMessage {
    pub id: u32,
    pub v: u8,
    pub rid: u32,
    #[serde(alias = "status")]
    pub st: ProcessStatus,
    #[serde(default, alias = "code", skip_serializing_if = "Option::is_none")]
    pub c: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSlot {
    pub sid: u8,
    #[serde(alias = "state")]
    pub st: SlotState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatusMessage {
    pub id: u32,
    pub v: u8,
    pub slots: Vec<WireSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    pub ts: u64,
    pub sid: u8,
    pub uid: u32,
    #[serde(alias = "action")]
    pub act: ActionType,
    #[serde(alias = "state", alias = "status")]
    pub st: ProcessStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: u32,
    pub v: u8,
    pub rec: WireRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchHistoryMessage {
    pub id: u32,
    pub v: u8,
    pub recs: Vec<WireRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub id: u32,
    pub v: u8,
    pub rid: u32,
    #[serde(alias = "percent")]
    pub p: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub id: u32,
    pub v: u8,
    pub cmd: CommandType,
    #[serde(default, alias = "param", skip_serializing_if = "Option::is_none")]
    pub p: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequestMessage {
    pub id: u32,
    pub v: u8,
    #[serde(alias = "lastTs")]
    pub lts: u64,
    #[serde(alias = "lastVersion")]
    pub lv: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncUpdates {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<WireSlot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recs: Vec<WireRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponseMessage {
    pub id: u32,
    pub v: u8,
    pub rid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<SyncUpdates>,
    #[serde(alias = "configVersion")]
    pub cv: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub id: u32,
    pub v: u8,
    #[serde(alias = "code")]
    pub c: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ack(AckMessage),
    SyncRequest(SyncRequestMessage),
    SyncResponse(SyncResponseMessage),
    SlotStatus(SlotStatusMessage),
    History(HistoryMessage),
    BatchHistory(BatchHistoryMessage),
    Progress(ProgressMessage),
    Command(CommandMessage),
    Error(ErrorMessage),
}

impl Message {
    pub fn id(&self) -> u32 {
        match self {
            Message::Ack(m) => m.id,
            Message::SyncRequest(m) => m.id,
            Message::SyncResponse(m) => m.id,
            Message::SlotStatus(m) => m.id,
            Message::History(m) => m.id,
            Message::BatchHistory(m) => m.id,
            Message::Progress(m) => m.id,
            Message::Command(m) => m.id,
            Message::Error(m) => m.id,
        }
    }

    pub fn version(&self) -> u8 {
        match self {
            Message::Ack(m) => m.v,
            Message::SyncRequest(m) => m.v,
            Message::SyncResponse(m) => m.v,
            Message::SlotStatus(m) => m.v,
            Message::History(m) => m.v,
            Message::BatchHistory(m) => m.v,
            Message::Progress(m) => m.v,
            Message::Command(m) => m.v,
            Message::Error(m) => m.v,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Ack(_) => MessageType::Ack,
            Message::SyncRequest(_) => MessageType::SyncRequest,
            Message::SyncResponse(_) => MessageType::SyncResponse,
            Message::SlotStatus(_) => MessageType::SlotStatus,
            Message::History(_) | Message::BatchHistory(_) => MessageType::History,
            Message::Progress(_) => MessageType::Progress,
            Message::Command(_) => MessageType::Command,
            Message::Error(_) => MessageType::Error,
        }
    }

    pub fn channel(&self) -> Channel {
        match self.message_type() {
            MessageType::Ack => Channel::Ack,
            MessageType::SyncRequest => Channel::SyncRequest,
            MessageType::SyncResponse => Channel::SyncResponse,
            MessageType::SlotStatus => Channel::SlotStatus,
            MessageType::History => Channel::History,
            MessageType::Progress => Channel::Progress,
            MessageType::Command => Channel::Command,
            MessageType::Error => Channel::Error,
        }
    }

    /// History records carried by this frame, whether single, batched or
    /// part of a sync response.
    pub fn records(&self) -> &[WireRecord] {
        match self {
            Message::History(m) => std::slice::from_ref(&m.rec),
            Message::BatchHistory(m) => &m.recs,
            Message::SyncResponse(m) => m.updates.as_ref().map_or(&[], |u| u.recs.as_slice()),
            _ => &[],
        }
    }
}
