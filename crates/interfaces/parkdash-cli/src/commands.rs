use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use camino::Utf8PathBuf;
use parkdash_app_core::reducer::record_status;
use parkdash_app_core::{
    ActionReceipt, ActionService, ConnectionState, Dashboard, HistoryRowVm, HttpActions,
    NewRecord, ReactiveStore, SendOutcome, WsConnector,
};
use parkdash_config::ACTION_TIMEOUT;
use parkdash_core::protocol::CommandType;
use parkdash_core::{format_uid, slot_label, ActionType, ProcessStatus};
use parkdash_infra::resolve_endpoint;
use parkdash_persistence::{DbState, RedbSnapshotStore, Snapshot, SnapshotStore};

use crate::console::ConsoleSurface;
use crate::CliAckPolicy;

/// Where the controller lives.
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    /// Full WebSocket URL; derived from `host` when absent.
    pub endpoint: Option<String>,
}

impl Target {
    pub fn endpoint(&self) -> String {
        resolve_endpoint(self.endpoint.as_deref(), Some(&self.host))
    }
}

fn dashboard(
    target: &Target,
    store: ReactiveStore,
    ack: CliAckPolicy,
) -> anyhow::Result<Dashboard> {
    let actions = HttpActions::for_host(&target.host).context("Failed to build HTTP client")?;
    Ok(Dashboard::new(store, Arc::new(WsConnector::new()), Arc::new(ConsoleSurface))
        .with_actions(Arc::new(actions))
        .with_ack_policy(ack.into()))
}

async fn wait_connected(dashboard: &Dashboard, timeout: Duration) -> bool {
    let mut state = dashboard.connection().watch_state();
    tokio::time::timeout(timeout, async move {
        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .is_ok()
    })
    .await
    .unwrap_or(false)
}

pub async fn cmd_watch(
    target: &Target,
    snapshot: Option<Utf8PathBuf>,
    ack: CliAckPolicy,
) -> anyhow::Result<()> {
    let endpoint = target.endpoint();
    println!(":: Watching {}", endpoint);

    let store = match snapshot {
        Some(path) => {
            println!("   Snapshot: {}", path);
            ReactiveStore::restore(Arc::new(RedbSnapshotStore::new(path)))
        }
        None => ReactiveStore::new(),
    };

    let dashboard = dashboard(target, store, ack)?;
    dashboard.start(Some(endpoint));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!(":: Shutting down");
    dashboard.shutdown().await;
    Ok(())
}

/// Sends one command and, when `track` is given, follows the resulting
/// record until it settles or `wait` runs out.
pub async fn cmd_command(
    target: &Target,
    cmd: CommandType,
    param: Option<u32>,
    track: Option<NewRecord>,
    wait: Duration,
) -> anyhow::Result<Option<ProcessStatus>> {
    let endpoint = target.endpoint();
    println!(":: Sending {:?} to {}", cmd, endpoint);

    let dashboard = dashboard(target, ReactiveStore::new(), CliAckPolicy::default())?;
    dashboard.start(Some(endpoint.clone()));

    if !wait_connected(&dashboard, ACTION_TIMEOUT).await {
        dashboard.shutdown().await;
        bail!("Could not reach controller at {}", endpoint);
    }

    let tracked = track.is_some();
    let (id, outcome) = dashboard.send_command(cmd, param, track);
    if outcome == SendOutcome::Dropped {
        dashboard.shutdown().await;
        bail!("Command {} was dropped", id);
    }
    println!("   Command id: {}", id);

    let mut settled = None;
    if tracked {
        let key = id.to_string();
        let deadline = tokio::time::Instant::now() + wait;
        while tokio::time::Instant::now() < deadline {
            if let Some(status) = record_status(dashboard.store(), &key) {
                if status.is_settled() {
                    settled = Some(status);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        match settled {
            Some(status) => println!(":: Result: {}", status.label()),
            None => println!(":: No result after {:?}", wait),
        }
    }

    dashboard.shutdown().await;
    Ok(settled)
}

pub async fn cmd_action(
    host: &str,
    uid: u32,
    action: ActionType,
    sid: u8,
) -> anyhow::Result<ActionReceipt> {
    let slot = slot_label(sid).ok_or_else(|| anyhow!("Unknown slot {}", sid))?;
    println!(
        ":: {} {} at {} via {}",
        action.label(),
        format_uid(Some(uid)),
        slot,
        host
    );

    let store = ReactiveStore::new();
    let port = HttpActions::for_host(host).context("Failed to build HTTP client")?;
    let service = ActionService::new(store.clone(), Arc::new(port));
    let receipt = service.send_action(uid, action, sid).await;

    if let Some(rec) = store.history().iter().find(|r| r.id == receipt.key) {
        let row = HistoryRowVm::from(rec);
        println!("   {} {} {} {}", row.timestamp, row.uid, row.slot, row.status);
    }
    if !receipt.confirmed {
        bail!("Controller did not accept the action");
    }
    Ok(receipt)
}

pub fn cmd_snapshot_show(path: Utf8PathBuf) -> anyhow::Result<Option<Snapshot>> {
    let store = RedbSnapshotStore::new(path);
    println!(":: Snapshot: {}", store.path());

    match store.validate()? {
        DbState::Missing => {
            println!("   No snapshot saved yet.");
            return Ok(None);
        }
        DbState::Busy => bail!("Snapshot is in use by another process"),
        DbState::Corrupt => {
            println!("   Snapshot was corrupt and has been set aside.");
            return Ok(None);
        }
        DbState::NewerSchema { found, supported } => {
            bail!("Snapshot schema {} is newer than supported {}", found, supported)
        }
        DbState::Valid => {}
    }

    let Some(snapshot) = store.load()? else {
        println!("   Snapshot is empty.");
        return Ok(None);
    };

    println!("\n:: Slots");
    for (sid, slot) in &snapshot.slots {
        let info = match slot.uid {
            Some(uid) => format!("{} {}", slot.state.label(), format_uid(Some(uid))),
            None => slot.state.label().to_string(),
        };
        println!("   {:<3} {}", slot_label(*sid).unwrap_or("?"), info);
    }

    println!("\n:: History ({} records)", snapshot.history.len());
    for rec in &snapshot.history {
        let row = HistoryRowVm::from(rec);
        println!(
            "   {} {} {:<3} {:<2} {}",
            row.timestamp, row.uid, row.action, row.slot, row.status
        );
    }

    Ok(Some(snapshot))
}

pub fn cmd_snapshot_clear(path: Utf8PathBuf) -> anyhow::Result<()> {
    let store = RedbSnapshotStore::new(path);
    store.clear()?;
    println!(":: Cleared snapshot at {}", store.path());
    Ok(())
}
