/// Display labels indexed by `sid - 1`.
pub const SLOT_LABELS: [&str; 9] = ["A1", "A2", "A3", "B1", "B2", "B3", "C1", "C2", "C3"];

pub const TOTAL_SLOTS: usize = SLOT_LABELS.len();

/// Shown wherever a uid or slot label is unknown.
pub const PLACEHOLDER: &str = "-";

pub fn slot_label(sid: u8) -> Option<&'static str> {
    usize::from(sid)
        .checked_sub(1)
        .and_then(|ix| SLOT_LABELS.get(ix))
        .copied()
}

pub fn slot_id(label: &str) -> Option<u8> {
    SLOT_LABELS
        .iter()
        .position(|l| l.eq_ignore_ascii_case(label))
        .and_then(|ix| u8::try_from(ix + 1).ok())
}

/// Iterator over every valid slot id, in display order.
pub fn slot_ids() -> impl Iterator<Item = u8> {
    (1..=TOTAL_SLOTS).filter_map(|sid| u8::try_from(sid).ok())
}

/// Formats a card uid as big-endian hex byte pairs, e.g. `AB:12:CD:34`.
pub fn format_uid(uid: Option<u32>) -> String {
    match uid {
        None => PLACEHOLDER.to_string(),
        Some(uid) => uid
            .to_be_bytes()
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":"),
    }
}
