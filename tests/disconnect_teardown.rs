use std::time::Duration;

use kameo::Actor;

use steps_ws::conn::{
    ConnectionActor, ConnectionActorArgs, ConnectionEvent, GetConnectionState,
    WatchConnectionState,
};
use steps_ws::core::{
    BufferConfig, ClientConfig, ConnectionState, ExponentialBackoff, JsonPingPong,
    SessionIdentity, TokioScheduler, WsFrame,
};
use steps_ws::protocol::ClientMessage;
use steps_ws::testing::{MockTransport, await_state};

fn fast_config() -> ClientConfig {
    ClientConfig {
        reconnect_interval: Duration::from_millis(10),
        max_reconnect_interval: Duration::from_millis(50),
        reconnect_decay: 1.5,
        max_reconnect_attempts: None,
        ping_interval: Duration::from_millis(40),
        debug: false,
    }
}

fn spawn_actor(
    transport: MockTransport,
    config: ClientConfig,
) -> kameo::prelude::ActorRef<
    ConnectionActor<MockTransport, ExponentialBackoff, JsonPingPong, TokioScheduler>,
> {
    ConnectionActor::spawn(ConnectionActorArgs {
        base_url: "ws://mock.test/feed".to_string(),
        identity: SessionIdentity::new("u1"),
        config,
        transport,
        reconnect: ExponentialBackoff::from_config(&config),
        ping: JsonPingPong::new(config.ping_interval),
        scheduler: TokioScheduler,
        buffers: BufferConfig::default(),
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_silences_all_timers_and_ends_disconnected() {
    let (transport, mut server) = MockTransport::channel_pair();
    let config = fast_config();
    let actor = spawn_actor(transport, config);
    let mut state_rx = actor.ask(WatchConnectionState).await.unwrap();

    // A couple of connect/disconnect cycles; the final disconnect must win.
    for _ in 0..2 {
        actor.tell(ConnectionEvent::Connect).send().await.unwrap();
        let _conn = server.accept(Duration::from_secs(1)).await;
        await_state(
            &mut state_rx,
            ConnectionState::Connected,
            Duration::from_secs(1),
        )
        .await;

        actor.tell(ConnectionEvent::Disconnect).send().await.unwrap();
        await_state(
            &mut state_rx,
            ConnectionState::Disconnected,
            Duration::from_secs(1),
        )
        .await;
    }

    // Disconnect is idempotent from any state, including already disconnected.
    actor.tell(ConnectionEvent::Disconnect).send().await.unwrap();

    // With ping_interval at 40ms, several intervals pass; neither a ping nor
    // a reconnect attempt may surface after the final disconnect.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        server.try_next_connection().is_none(),
        "no reconnect attempt may fire after disconnect()"
    );
    assert_eq!(
        actor.ask(GetConnectionState).await.unwrap(),
        ConnectionState::Disconnected
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_sends_normal_close_frame() {
    let (transport, mut server) = MockTransport::channel_pair();
    let actor = spawn_actor(transport, fast_config());
    let mut state_rx = actor.ask(WatchConnectionState).await.unwrap();

    actor.tell(ConnectionEvent::Connect).send().await.unwrap();
    let mut conn = server.accept(Duration::from_secs(1)).await;
    await_state(
        &mut state_rx,
        ConnectionState::Connected,
        Duration::from_secs(1),
    )
    .await;

    actor.tell(ConnectionEvent::Disconnect).send().await.unwrap();
    await_state(
        &mut state_rx,
        ConnectionState::Disconnected,
        Duration::from_secs(1),
    )
    .await;

    let mut saw_close = false;
    while let Some(frame) = conn.recv_outbound_timeout(Duration::from_millis(200)).await {
        if let WsFrame::Close(Some(close)) = frame {
            assert!(close.is_normal(), "close code must be 1000, got {}", close.code);
            saw_close = true;
            break;
        }
    }
    assert!(saw_close, "disconnect must close the transport with code 1000");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_while_disconnected_is_dropped_without_error() {
    let (transport, _server) = MockTransport::channel_pair();
    let actor = spawn_actor(transport, fast_config());

    // Never connected; the send is logged and dropped, nothing panics.
    actor
        .tell(ConnectionEvent::Send(ClientMessage::Ping { timestamp: 1 }))
        .send()
        .await
        .unwrap();

    assert_eq!(
        actor.ask(GetConnectionState).await.unwrap(),
        ConnectionState::Disconnected
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exhausted_retries_reach_failed_until_manual_resume() {
    let (transport, mut server) = MockTransport::channel_pair();
    let mut config = fast_config();
    config.max_reconnect_attempts = Some(2);
    server.fail_next_connects(8);

    let actor = spawn_actor(transport, config);
    let mut state_rx = actor.ask(WatchConnectionState).await.unwrap();

    actor.tell(ConnectionEvent::Connect).send().await.unwrap();
    await_state(
        &mut state_rx,
        ConnectionState::Failed,
        Duration::from_secs(2),
    )
    .await;

    // No further automatic attempts while failed.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        actor.ask(GetConnectionState).await.unwrap(),
        ConnectionState::Failed
    );

    // Manual resume starts a fresh streak and succeeds once the server accepts.
    server.fail_next_connects(0);
    actor.tell(ConnectionEvent::Connect).send().await.unwrap();
    let _conn = server.accept(Duration::from_secs(1)).await;
    await_state(
        &mut state_rx,
        ConnectionState::Connected,
        Duration::from_secs(1),
    )
    .await;
}
