use std::sync::{Arc, Mutex};
use std::time::Duration;

use kameo::Actor;

use steps_ws::conn::{
    AddListener, ConnectionActor, ConnectionActorArgs, ConnectionEvent, GetConnectionState,
    GetConnectionStats, RemoveAllListeners, RemoveListener, WatchConnectionState,
};
use steps_ws::core::{
    BufferConfig, ClientConfig, ConnectionState, JsonPingPong, SessionIdentity, TokioScheduler,
};
use steps_ws::protocol::{MessageKind, ServerMessage, StepUpdate};
use steps_ws::testing::{MockTransport, NoReconnect, await_state};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_frames_are_dropped_without_state_change() {
    let (transport, mut server) = MockTransport::channel_pair();
    let actor = ConnectionActor::spawn(ConnectionActorArgs {
        base_url: "ws://mock.test/feed".to_string(),
        identity: SessionIdentity::new("u1"),
        config: ClientConfig::default(),
        transport,
        reconnect: NoReconnect,
        ping: JsonPingPong::new(Duration::from_secs(60)),
        scheduler: TokioScheduler,
        buffers: BufferConfig::default(),
    });
    let mut state_rx = actor.ask(WatchConnectionState).await.unwrap();

    let received: Arc<Mutex<Vec<StepUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    actor
        .ask(AddListener {
            kind: MessageKind::StepUpdate,
            callback: Box::new(move |message| {
                if let ServerMessage::StepUpdate(update) = message {
                    sink.lock().unwrap().push(update.clone());
                }
            }),
        })
        .await
        .unwrap();

    actor.tell(ConnectionEvent::Connect).send().await.unwrap();
    let conn = server.accept(Duration::from_secs(1)).await;
    await_state(
        &mut state_rx,
        ConnectionState::Connected,
        Duration::from_secs(1),
    )
    .await;

    // Invalid JSON, valid JSON of the wrong shape, unknown type tag: all
    // logged and dropped.
    conn.send_text("{not json").unwrap();
    conn.send_text(r#"{"hello":"world"}"#).unwrap();
    conn.send_text(r#"{"type":"mystery_update","timestamp":1}"#).unwrap();

    // A well-formed update after the garbage still gets through.
    conn.send_text(
        r#"{"type":"step_update","participant_id":"p1","steps":5000,"delta":500,"route":"10km","allocated_funds":50,"timestamp":1234}"#,
    )
    .unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if !received.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("valid update should still be dispatched");

    assert_eq!(
        actor.ask(GetConnectionState).await.unwrap(),
        ConnectionState::Connected,
        "malformed frames must not change connection state"
    );

    let updates = received.lock().unwrap().clone();
    assert_eq!(updates.len(), 1);
    let update = &updates[0];
    assert_eq!(update.participant_id, "p1");
    assert_eq!(update.naam, None);
    assert_eq!(update.steps, 5000);
    assert_eq!(update.delta, 500);
    assert_eq!(update.route, "10km");
    assert_eq!(update.allocated_funds, 50.0);
    assert_eq!(update.timestamp, 1234);

    let stats = actor.ask(GetConnectionStats).await.unwrap();
    assert_eq!(stats.recent_protocol_errors, 3);
    assert_eq!(stats.messages, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_listener_does_not_break_the_connection() {
    let (transport, mut server) = MockTransport::channel_pair();
    let actor = ConnectionActor::spawn(ConnectionActorArgs {
        base_url: "ws://mock.test/feed".to_string(),
        identity: SessionIdentity::new("u1"),
        config: ClientConfig::default(),
        transport,
        reconnect: NoReconnect,
        ping: JsonPingPong::new(Duration::from_secs(60)),
        scheduler: TokioScheduler,
        buffers: BufferConfig::default(),
    });
    let mut state_rx = actor.ask(WatchConnectionState).await.unwrap();

    actor
        .ask(AddListener {
            kind: MessageKind::BadgeEarned,
            callback: Box::new(|_| panic!("confetti machine jammed")),
        })
        .await
        .unwrap();

    let received = Arc::new(Mutex::new(0usize));
    let counter = received.clone();
    actor
        .ask(AddListener {
            kind: MessageKind::BadgeEarned,
            callback: Box::new(move |_| *counter.lock().unwrap() += 1),
        })
        .await
        .unwrap();

    actor.tell(ConnectionEvent::Connect).send().await.unwrap();
    let conn = server.accept(Duration::from_secs(1)).await;
    await_state(
        &mut state_rx,
        ConnectionState::Connected,
        Duration::from_secs(1),
    )
    .await;

    conn.send_text(
        r#"{"type":"badge_earned","participant_id":"p1","badge_name":"Streak","points":10,"timestamp":3}"#,
    )
    .unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if *received.lock().unwrap() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("second listener should still be delivered to");

    assert_eq!(
        actor.ask(GetConnectionState).await.unwrap(),
        ConnectionState::Connected
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removed_listeners_stop_receiving() {
    let (transport, mut server) = MockTransport::channel_pair();
    let actor = ConnectionActor::spawn(ConnectionActorArgs {
        base_url: "ws://mock.test/feed".to_string(),
        identity: SessionIdentity::new("u1"),
        config: ClientConfig::default(),
        transport,
        reconnect: NoReconnect,
        ping: JsonPingPong::new(Duration::from_secs(60)),
        scheduler: TokioScheduler,
        buffers: BufferConfig::default(),
    });
    let mut state_rx = actor.ask(WatchConnectionState).await.unwrap();

    let hits = Arc::new(Mutex::new(0usize));
    let counter = hits.clone();
    let removable = actor
        .ask(AddListener {
            kind: MessageKind::TotalUpdate,
            callback: Box::new(move |_| *counter.lock().unwrap() += 1),
        })
        .await
        .unwrap();
    let counter = hits.clone();
    actor
        .ask(AddListener {
            kind: MessageKind::TotalUpdate,
            callback: Box::new(move |_| *counter.lock().unwrap() += 1),
        })
        .await
        .unwrap();

    actor.tell(ConnectionEvent::Connect).send().await.unwrap();
    let conn = server.accept(Duration::from_secs(1)).await;
    await_state(
        &mut state_rx,
        ConnectionState::Connected,
        Duration::from_secs(1),
    )
    .await;

    assert!(
        actor
            .ask(RemoveListener {
                kind: MessageKind::TotalUpdate,
                id: removable,
            })
            .await
            .unwrap()
    );

    conn.send_text(r#"{"type":"total_update","total_steps":10,"year":2026,"timestamp":1}"#)
        .unwrap();
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if *hits.lock().unwrap() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("remaining listener should be delivered to");
    assert_eq!(*hits.lock().unwrap(), 1, "removed listener must not fire");

    actor
        .ask(RemoveAllListeners { kind: None })
        .await
        .unwrap();
    conn.send_text(r#"{"type":"total_update","total_steps":20,"year":2026,"timestamp":2}"#)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*hits.lock().unwrap(), 1, "cleared listeners must not fire");
}
