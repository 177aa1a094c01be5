mod support;

use std::sync::Arc;
use std::time::Duration;

use parkdash_app_core::{
    AckPolicy, Backoff, BusEvent, ConnectionManager, ConnectionState, EventBus, SendOutcome,
    SyncCursor,
};
use parkdash_core::protocol::{Channel, CommandType, Message, ProtocolCodec};
use support::{tap, ScriptedConnector, ALL_CHANNELS};

fn manager(
    connector: Arc<ScriptedConnector>,
    bus: &Arc<EventBus>,
    cursor: &Arc<SyncCursor>,
) -> ConnectionManager {
    ConnectionManager::new(
        connector,
        bus.clone(),
        Arc::new(ProtocolCodec::new()),
        cursor.clone(),
    )
}

#[test]
fn backoff_doubles_up_to_ceiling_and_resets() {
    let mut backoff = Backoff::default();
    let delays: Vec<u64> = (0..7)
        .map(|_| backoff.next_delay().as_millis() as u64)
        .collect();
    assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);

    backoff.reset();
    assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
}

#[tokio::test]
async fn open_syncs_then_acks_and_publishes_each_frame_once() {
    let connector = ScriptedConnector::new();
    let mut peer = connector.accept();
    let bus = Arc::new(EventBus::new());
    let mut events = tap(&bus, &ALL_CHANNELS);
    let mgr = manager(connector.clone(), &bus, &Arc::new(SyncCursor::new()));

    mgr.connect(Some("ws://controller/ws".into()));

    let sync = peer.recv_json().await;
    assert_eq!(sync["t"], 0x02);
    assert_eq!(sync["id"], 1);
    assert_eq!((sync["lts"].as_u64(), sync["lv"].as_u64()), (Some(0), Some(0)));
    assert!(matches!(events.recv().await, Some((Channel::ConnectionOpened, BusEvent::Opened))));
    assert_eq!(mgr.state(), ConnectionState::Connected);

    peer.send(r#"{"id":42,"v":0,"t":16,"slots":[{"sid":1,"st":1,"uid":2870136116}]}"#);
    let ack = peer.recv_json().await;
    assert_eq!(ack["t"], 0x01);
    assert_eq!(ack["rid"], 42);
    assert_eq!(ack["st"], 1);
    assert_eq!(ack["id"], 2);

    let (channel, event) = events.recv().await.unwrap();
    assert_eq!(channel, Channel::SlotStatus);
    let Some(Message::SlotStatus(msg)) = event.message() else {
        panic!("expected slot status, got {event:?}");
    };
    assert_eq!(msg.slots[0].uid, Some(0xAB12CD34));

    peer.send(r#"{"id":43,"v":0,"t":255,"c":9}"#);
    assert_eq!(peer.recv_json().await["rid"], 43);
    let (channel, _) = events.recv().await.unwrap();
    assert_eq!(channel, Channel::Error);
    assert!(events.try_recv().is_err(), "each frame is published exactly once");
    assert!(peer.try_recv().is_none(), "each frame is acked exactly once");

    mgr.shutdown().await;
    assert_eq!(mgr.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn unknown_type_is_acked_but_never_published() {
    let connector = ScriptedConnector::new();
    let mut peer = connector.accept();
    let bus = Arc::new(EventBus::new());
    let mgr = manager(connector.clone(), &bus, &Arc::new(SyncCursor::new()));
    mgr.connect(None);
    peer.recv_json().await;
    let mut events = tap(&bus, &ALL_CHANNELS);

    peer.send(r#"{"id":7,"v":0,"t":153}"#);
    assert_eq!(peer.recv_json().await["rid"], 7);

    peer.send("definitely not json");
    peer.send(r#"{"id":8,"v":0,"t":48,"rid":5,"p":30}"#);
    let ack = peer.recv_json().await;
    assert_eq!(ack["rid"], 8, "malformed frames get no ack");

    let (channel, _) = events.recv().await.unwrap();
    assert_eq!(channel, Channel::Progress);
    assert!(events.try_recv().is_err());
    assert_eq!(mgr.state(), ConnectionState::Connected);
    mgr.shutdown().await;
}

#[tokio::test]
async fn known_only_policy_skips_ack_for_unknown_types() {
    let connector = ScriptedConnector::new();
    let mut peer = connector.accept();
    let bus = Arc::new(EventBus::new());
    let mgr = manager(connector.clone(), &bus, &Arc::new(SyncCursor::new()))
        .with_ack_policy(AckPolicy::KnownOnly);
    mgr.connect(None);
    peer.recv_json().await;

    peer.send(r#"{"id":7,"v":0,"t":153}"#);
    peer.send(r#"{"id":8,"v":0,"t":255,"c":1}"#);
    assert_eq!(peer.recv_json().await["rid"], 8);
    mgr.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_delays_double_and_reset_after_open() {
    let connector = ScriptedConnector::new();
    connector.refuse();
    connector.refuse();
    connector.refuse();
    let mut first = connector.accept();
    let mut second = connector.accept();

    let bus = Arc::new(EventBus::new());
    let mut closed = tap(&bus, &[Channel::ConnectionClosed]);
    let cursor = Arc::new(SyncCursor::new());
    let mgr = manager(connector.clone(), &bus, &cursor);
    mgr.connect(None);

    first.recv_json().await;
    cursor.advance_ts(1700);
    cursor.set_version(3);
    first.close();

    let sync = second.recv_json().await;
    assert_eq!(sync["lts"], 1700);
    assert_eq!(sync["lv"], 3);
    assert_eq!(sync["id"], 2, "sequence ids survive reconnects");

    let opened = connector.opened_at();
    let gaps: Vec<u64> = opened
        .windows(2)
        .map(|w| (w[1] - w[0]).as_millis() as u64)
        .collect();
    assert_eq!(gaps, vec![1000, 2000, 4000, 1000]);

    let mut closes = 0;
    while closed.try_recv().is_ok() {
        closes += 1;
    }
    assert_eq!(closes, 4);
    mgr.shutdown().await;
}

fn drain_count<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> usize {
    let mut n = 0;
    while rx.try_recv().is_ok() {
        n += 1;
    }
    n
}

#[tokio::test(start_paused = true)]
async fn stream_error_closes_sink_then_reconnects_after_backoff() {
    let connector = ScriptedConnector::new();
    let mut first = connector.accept();
    connector.refuse();
    let mut second = connector.accept();

    let bus = Arc::new(EventBus::new());
    let mut closed = tap(&bus, &[Channel::ConnectionClosed]);
    let mgr = manager(connector.clone(), &bus, &Arc::new(SyncCursor::new()));
    let mut state = mgr.watch_state();
    mgr.connect(None);
    first.recv_json().await;

    first.fail("connection reset by peer");
    state
        .wait_for(|s| *s == ConnectionState::ReconnectWait)
        .await
        .unwrap();
    tokio::task::yield_now().await;
    assert!(first.sink_closed());
    assert_eq!(drain_count(&mut closed), 1);

    second.recv_json().await;
    let opened = connector.opened_at();
    let gaps: Vec<u64> = opened
        .windows(2)
        .map(|w| (w[1] - w[0]).as_millis() as u64)
        .collect();
    assert_eq!(gaps, vec![1000, 2000]);
    assert_eq!(drain_count(&mut closed), 1);
    assert_eq!(mgr.state(), ConnectionState::Connected);
    mgr.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_write_is_handled_as_a_close() {
    let connector = ScriptedConnector::new();
    let mut first = connector.accept();
    let mut second = connector.accept();

    let bus = Arc::new(EventBus::new());
    let mut closed = tap(&bus, &[Channel::ConnectionClosed]);
    let mgr = manager(connector.clone(), &bus, &Arc::new(SyncCursor::new()));
    let mut state = mgr.watch_state();
    mgr.connect(None);
    first.recv_json().await;

    first.stop_reading();
    first.send(r#"{"id":9,"v":0,"t":255,"c":1}"#);
    state
        .wait_for(|s| *s == ConnectionState::ReconnectWait)
        .await
        .unwrap();
    tokio::task::yield_now().await;
    assert!(first.sink_closed());
    assert_eq!(drain_count(&mut closed), 1);

    let sync = second.recv_json().await;
    assert_eq!(sync["t"], 0x02);
    let opened = connector.opened_at();
    assert_eq!((opened[1] - opened[0]).as_millis(), 1000);
    mgr.shutdown().await;
}

#[tokio::test]
async fn settings_apply_only_before_connect() {
    let connector = ScriptedConnector::new();
    let mut peer = connector.accept();
    let bus = Arc::new(EventBus::new());
    let floor = Duration::from_millis(50);
    let ceiling = Duration::from_millis(400);
    let mgr = manager(connector.clone(), &bus, &Arc::new(SyncCursor::new()))
        .with_ack_policy(AckPolicy::KnownOnly)
        .with_backoff(floor, ceiling);
    assert_eq!(mgr.ack_policy(), AckPolicy::KnownOnly);
    assert_eq!(mgr.backoff_bounds(), (floor, ceiling));

    mgr.connect(None);
    peer.recv_json().await;
    let mgr = mgr
        .with_ack_policy(AckPolicy::AllParsed)
        .with_backoff(Duration::from_secs(9), Duration::from_secs(90));
    assert_eq!(mgr.ack_policy(), AckPolicy::KnownOnly);
    assert_eq!(mgr.backoff_bounds(), (floor, ceiling));

    peer.send(r#"{"id":5,"v":0,"t":119}"#);
    peer.send(r#"{"id":6,"v":0,"t":255,"c":2}"#);
    assert_eq!(peer.recv_json().await["rid"], 6);
    mgr.shutdown().await;
}

#[tokio::test]
async fn send_is_dropped_unless_connected() {
    let connector = ScriptedConnector::new();
    let mut peer = connector.accept();
    let bus = Arc::new(EventBus::new());
    let mgr = manager(connector.clone(), &bus, &Arc::new(SyncCursor::new()));

    let early = mgr.codec().build_command(CommandType::Pause, None);
    assert_eq!(mgr.send(&early), SendOutcome::Dropped);

    mgr.connect(None);
    peer.recv_json().await;
    let cmd = mgr.codec().build_command(CommandType::Move, Some(5));
    assert_eq!(mgr.send(&cmd), SendOutcome::Sent);

    let frame = peer.recv_json().await;
    assert_eq!(frame["t"], 0x50);
    assert_eq!(frame["cmd"], 4);
    assert_eq!(frame["p"], 5);
    mgr.shutdown().await;
}
