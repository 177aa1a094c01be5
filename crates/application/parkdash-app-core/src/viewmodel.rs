use parkdash_core::protocol::slots::PLACEHOLDER;
use parkdash_core::{format_uid, slot_label, Filters, SlotData, SlotState, TxRecord};

use crate::connection::ConnectionState;
use crate::store::SlotMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTileVm {
    pub sid: u8,
    pub label: String,
    pub state: SlotState,
    pub css_class: &'static str,
    pub info: String,
    pub dimmed: bool,
    pub selected: bool,
}

impl SlotTileVm {
    pub fn from_slot(slot: &SlotData, filters: &Filters) -> Self {
        let info = match (slot.state, slot.uid) {
            (SlotState::Occupied, Some(uid)) => format!("UID: {}", format_uid(Some(uid))),
            (state, _) => state.label().to_string(),
        };
        Self {
            sid: slot.sid,
            label: slot.label(),
            state: slot.state,
            css_class: slot.state.css_class(),
            info,
            dimmed: !filters.matches_slot(slot),
            selected: filters.sid == Some(slot.sid),
        }
    }
}

pub fn slot_tiles(slots: &SlotMap, filters: &Filters) -> Vec<SlotTileVm> {
    slots
        .values()
        .map(|slot| SlotTileVm::from_slot(slot, filters))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatItemVm {
    pub label: &'static str,
    pub value: usize,
    /// Status filter applied when the item is clicked; `None` clears all filters.
    pub filter: Option<SlotState>,
    pub active: bool,
}

impl StatItemVm {
    /// Filters after clicking this item.
    pub fn toggle(&self, current: &Filters) -> Filters {
        match self.filter {
            None => Filters::cleared(),
            Some(state) => current.toggle_status(state),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBarVm {
    pub total: usize,
    pub empty: usize,
    pub occupied: usize,
    pub moving: usize,
    pub items: Vec<StatItemVm>,
}

impl StatusBarVm {
    pub fn new(slots: &SlotMap, filters: &Filters) -> Self {
        let count = |state: SlotState| slots.values().filter(|s| s.state == state).count();
        let total = slots.len();
        let empty = count(SlotState::Empty);
        let occupied = count(SlotState::Occupied);
        let moving = count(SlotState::Moving);

        let item = |label, value, filter: Option<SlotState>| StatItemVm {
            label,
            value,
            filter,
            active: filter.is_some() && filters.status == filter,
        };
        let items = vec![
            item("Total", total, None),
            item("Empty", empty, Some(SlotState::Empty)),
            item("Occupied", occupied, Some(SlotState::Occupied)),
            item("Moving", moving, Some(SlotState::Moving)),
        ];

        Self {
            total,
            empty,
            occupied,
            moving,
            items,
        }
    }
}

/// One line of the history table as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRowVm {
    pub key: String,
    pub timestamp: String,
    pub uid: String,
    pub action: &'static str,
    pub slot: String,
    pub status: &'static str,
}

impl From<&TxRecord> for HistoryRowVm {
    fn from(rec: &TxRecord) -> Self {
        Self {
            key: rec.id.clone(),
            timestamp: rec.timestamp.clone(),
            uid: format_uid(Some(rec.uid)),
            action: rec.action.label(),
            slot: if rec.slot.is_empty() {
                slot_label(rec.sid).unwrap_or(PLACEHOLDER).to_string()
            } else {
                rec.slot.clone()
            },
            status: rec.status.label(),
        }
    }
}

pub fn connection_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => "Online",
        ConnectionState::Connecting => "Connecting...",
        ConnectionState::ReconnectWait => "Offline, retrying",
        ConnectionState::Disconnected => "Offline",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AppState;

    #[test]
    fn occupied_tile_shows_uid_and_filter_dims_others() {
        let mut slots = AppState::default().slots.as_ref().clone();
        slots.insert(1, SlotData::new(1, SlotState::Occupied, Some(0xAB12CD34)));
        let filters = Filters::default().toggle_status(SlotState::Occupied);

        let tiles = slot_tiles(&slots, &filters);
        assert_eq!(tiles[0].info, "UID: AB:12:CD:34");
        assert!(!tiles[0].dimmed);
        assert!(tiles[1].dimmed);
        assert_eq!(tiles[1].info, "EMPTY");
    }

    #[test]
    fn status_bar_counts_and_toggles() {
        let mut slots = AppState::default().slots.as_ref().clone();
        slots.insert(2, SlotData::new(2, SlotState::Moving, Some(9)));
        let filters = Filters::default().toggle_slot(4);
        let bar = StatusBarVm::new(&slots, &filters);

        assert_eq!((bar.total, bar.empty, bar.occupied, bar.moving), (9, 8, 0, 1));
        let moving = bar.items[3];
        let next = moving.toggle(&filters);
        assert_eq!(next.status, Some(SlotState::Moving));
        assert_eq!(next.sid, None);
        assert_eq!(bar.items[0].toggle(&next), Filters::cleared());
    }
}
