use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use camino::Utf8PathBuf;
use parkdash_cli::commands;
use parkdash_core::{ActionType, Filters, ProcessStatus, SlotData, SlotState, TxRecord};
use parkdash_persistence::{RedbSnapshotStore, Snapshot, SnapshotStore};
use tempfile::tempdir;

type Seen = Arc<Mutex<Vec<serde_json::Value>>>;

async fn start_mock_controller(status: StatusCode) -> (String, Seen) {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route(
            "/api/action",
            post(
                move |State(seen): State<Seen>, Json(body): Json<serde_json::Value>| async move {
                    seen.lock().unwrap().push(body);
                    status
                },
            ),
        )
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr.to_string(), seen)
}

#[tokio::test]
async fn action_reaches_controller() {
    let (host, seen) = start_mock_controller(StatusCode::OK).await;

    let receipt = commands::cmd_action(&host, 0xAB12CD34, ActionType::Out, 9)
        .await
        .unwrap();

    assert!(receipt.confirmed);
    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![serde_json::json!({"uid": 2870136116u32, "action": "out", "sid": 9})]
    );
}

#[tokio::test]
async fn rejected_action_fails_the_command() {
    let (host, _) = start_mock_controller(StatusCode::SERVICE_UNAVAILABLE).await;
    let err = commands::cmd_action(&host, 1, ActionType::In, 1)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("did not accept"));
}

#[tokio::test]
async fn action_rejects_unknown_slot() {
    assert!(commands::cmd_action("127.0.0.1:9", 1, ActionType::In, 12)
        .await
        .is_err());
}

#[test]
fn snapshot_show_and_clear() {
    let dir = tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("state.redb")).unwrap();

    assert!(commands::cmd_snapshot_show(path.clone()).unwrap().is_none());

    let snapshot = Snapshot {
        slots: vec![(2, SlotData::new(2, SlotState::Occupied, Some(0x1F)))],
        history: vec![TxRecord {
            id: "7".into(),
            timestamp: "10:00:00".into(),
            uid: 0x1F,
            action: ActionType::In,
            sid: 2,
            slot: "A2".into(),
            status: ProcessStatus::Success,
            progress: Some(100),
        }],
        filters: Filters {
            sid: Some(2),
            status: None,
        },
    };
    {
        let store = RedbSnapshotStore::new(path.clone());
        store.save(&snapshot).unwrap();
    }

    let shown = commands::cmd_snapshot_show(path.clone()).unwrap();
    assert_eq!(shown, Some(snapshot));

    commands::cmd_snapshot_clear(path.clone()).unwrap();
    assert!(commands::cmd_snapshot_show(path).unwrap().is_none());
}
