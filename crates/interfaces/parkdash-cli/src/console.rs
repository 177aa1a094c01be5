//! Line-oriented rendering of dashboard updates for the terminal.

use parkdash_app_core::{
    connection_label, ConnectionState, HistoryRowVm, ProgressStyle, RenderOp, RenderPlan,
    RenderSurface, SlotTileVm, StatusBarVm, StatusCell,
};
use parkdash_core::RecordKey;

pub struct ConsoleSurface;

impl ConsoleSurface {
    fn row_line(row: &HistoryRowVm) -> String {
        format!(
            "{:<8} {:<11} {:<3} {:<2} {}",
            row.timestamp,
            row.uid,
            row.action,
            row.slot,
            if row.status.is_empty() { "..." } else { row.status }
        )
    }
}

impl RenderSurface for ConsoleSurface {
    fn apply_history(&self, plan: &RenderPlan) {
        for op in &plan.ops {
            match op {
                RenderOp::ShowEmpty => println!("   (no transactions)"),
                RenderOp::HideEmpty => {}
                RenderOp::Remove { key } => tracing::debug!(%key, "row removed"),
                RenderOp::Insert { row, .. } => {
                    println!(" + {}", Self::row_line(&HistoryRowVm::from(&row.record)))
                }
                RenderOp::Move { key, .. } => tracing::debug!(%key, "row moved"),
                RenderOp::PatchStatus { key, cell } => match cell {
                    StatusCell::Label(status) => println!(" ~ {key}: {}", status.label()),
                    StatusCell::Progress(_) => println!(" ~ {key}: processing"),
                },
            }
        }
    }

    fn progress(&self, key: &RecordKey, style: &ProgressStyle) {
        tracing::debug!(
            %key,
            percent = style.percent_label(),
            easing = style.easing.css(),
            "progress"
        );
    }

    fn slots(&self, tiles: &[SlotTileVm]) {
        let line: Vec<String> = tiles
            .iter()
            .map(|t| {
                let mark = if t.dimmed { " " } else { "*" };
                format!("{mark}{} {}", t.label, t.info)
            })
            .collect();
        println!(":: Slots  {}", line.join(" | "));
    }

    fn status_bar(&self, vm: &StatusBarVm) {
        println!(
            ":: Total {}  Empty {}  Occupied {}  Moving {}",
            vm.total, vm.empty, vm.occupied, vm.moving
        );
    }

    fn connection(&self, state: ConnectionState) {
        println!(":: {}", connection_label(state));
    }
}
