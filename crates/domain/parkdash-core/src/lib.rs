use serde::{Deserialize, Serialize};

/// Declares a fieldless enum that travels on the wire as its `u8` code.
macro_rules! wire_code {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(try_from = "u8", into = "u8")]
        pub enum $name {
            $($variant = $code),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn code(self) -> u8 {
                self as u8
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = $crate::UnknownCode;

            fn try_from(code: u8) -> Result<Self, $crate::UnknownCode> {
                match code {
                    $($code => Ok($name::$variant),)+
                    _ => Err($crate::UnknownCode {
                        kind: stringify!($name),
                        code,
                    }),
                }
            }
        }
    };
}

pub mod protocol;
pub mod reconcile;

pub use protocol::slots::{format_uid, slot_id, slot_label, SLOT_LABELS, TOTAL_SLOTS};

/// Stable key of a history record.
pub type RecordKey = String;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} code {code}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: u8,
}

wire_code! {
    /// Physical state of one parking bay.
    SlotState {
        Empty = 0,
        Occupied = 1,
        Moving = 2,
        Error = 3,
    }
}

wire_code! {
    ActionType {
        In = 0,
        Out = 1,
    }
}

wire_code! {
    /// Processing status of a transaction, also used as ack status.
    ProcessStatus {
        Error = 0,
        Success = 1,
        Pending = 2,
        Processing = 3,
    }
}

impl SlotState {
    pub fn label(self) -> &'static str {
        match self {
            SlotState::Empty => "EMPTY",
            SlotState::Occupied => "OCCUPIED",
            SlotState::Moving => "MOVING...",
            SlotState::Error => "ERROR",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            SlotState::Empty => "empty",
            SlotState::Occupied => "occupied",
            SlotState::Moving => "moving",
            SlotState::Error => "error",
        }
    }
}

impl ActionType {
    pub fn label(self) -> &'static str {
        match self {
            ActionType::In => "IN",
            ActionType::Out => "OUT",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            ActionType::In => "in",
            ActionType::Out => "out",
        }
    }
}

impl ProcessStatus {
    /// Pending and processing rows show a progress bar instead of text.
    pub fn label(self) -> &'static str {
        match self {
            ProcessStatus::Pending | ProcessStatus::Processing => "",
            ProcessStatus::Success => "Success",
            ProcessStatus::Error => "Error",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            ProcessStatus::Success => "success",
            ProcessStatus::Error => "error",
            ProcessStatus::Pending | ProcessStatus::Processing => "processing",
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, ProcessStatus::Success | ProcessStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotData {
    pub sid: u8,
    pub state: SlotState,
    #[serde(default)]
    pub uid: Option<u32>,
}

impl SlotData {
    /// Builds a slot, dropping the uid when the bay is empty.
    pub fn new(sid: u8, state: SlotState, uid: Option<u32>) -> Self {
        let uid = if state == SlotState::Empty { None } else { uid };
        Self { sid, state, uid }
    }

    pub fn empty(sid: u8) -> Self {
        Self::new(sid, SlotState::Empty, None)
    }

    pub fn label(&self) -> String {
        slot_label(self.sid)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", self.sid))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub id: RecordKey,
    pub timestamp: String,
    pub uid: u32,
    pub action: ActionType,
    pub sid: u8,
    /// Display label derived from `sid` when the record was created.
    pub slot: String,
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    pub sid: Option<u8>,
    pub status: Option<SlotState>,
}

impl Filters {
    pub fn cleared() -> Self {
        Self::default()
    }

    /// Selecting the active slot again clears the slot filter.
    pub fn toggle_slot(&self, sid: u8) -> Self {
        if self.sid == Some(sid) {
            Self {
                sid: None,
                ..*self
            }
        } else {
            Self {
                sid: Some(sid),
                status: None,
            }
        }
    }

    pub fn toggle_status(&self, state: SlotState) -> Self {
        if self.status == Some(state) {
            Self {
                status: None,
                ..*self
            }
        } else {
            Self {
                sid: None,
                status: Some(state),
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.sid.is_some() || self.status.is_some()
    }

    pub fn matches_slot(&self, slot: &SlotData) -> bool {
        self.status.is_none_or(|s| s == slot.state) && self.sid.is_none_or(|sid| sid == slot.sid)
    }

    /// History rows are narrowed by slot only; the status filter targets bays.
    pub fn matches_record(&self, record: &TxRecord) -> bool {
        self.sid.is_none_or(|sid| sid == record.sid)
    }
}
