use std::net::SocketAddr;
use std::time::Duration;

use kameo::Actor;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use steps_ws::client::accept_async;
use steps_ws::conn::{ConnectionActor, ConnectionActorArgs, ConnectionEvent, WatchConnectionState};
use steps_ws::core::{
    BufferConfig, ClientConfig, ConnectionState, JsonPingPong, SessionIdentity, TokioScheduler,
    WsFrame,
};
use steps_ws::testing::{FixedReconnect, await_state};
use steps_ws::transport::tungstenite::TungsteniteTransport;

#[derive(Debug)]
enum ServerEvent {
    Connected { conn_id: usize },
    Data { conn_id: usize, text: String },
}

/// Local websocket server; the first accepted connection is dropped without
/// a close frame after `drop_first_after`, later ones are kept open.
async fn spawn_ws_server(
    drop_first_after: Duration,
) -> (SocketAddr, mpsc::UnboundedReceiver<ServerEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut conn_id = 0usize;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            conn_id += 1;
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                let _ = tx.send(ServerEvent::Connected { conn_id });

                let drop_at = (conn_id == 1).then(|| tokio::time::sleep(drop_first_after));
                if let Some(timer) = drop_at {
                    tokio::pin!(timer);
                    loop {
                        tokio::select! {
                            _ = &mut timer => {
                                // Unclean drop: no close handshake.
                                break;
                            }
                            message = ws.next() => {
                                match message {
                                    Some(Ok(WsFrame::Text(text))) => {
                                        let _ = tx.send(ServerEvent::Data {
                                            conn_id,
                                            text: String::from_utf8_lossy(text.as_ref()).into_owned(),
                                        });
                                    }
                                    Some(Ok(WsFrame::Close(_))) | None | Some(Err(_)) => break,
                                    Some(Ok(_)) => {}
                                }
                            }
                        }
                    }
                } else {
                    while let Some(message) = ws.next().await {
                        match message {
                            Ok(WsFrame::Text(text)) => {
                                let _ = tx.send(ServerEvent::Data {
                                    conn_id,
                                    text: String::from_utf8_lossy(text.as_ref()).into_owned(),
                                });
                            }
                            Ok(WsFrame::Close(_)) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                }
            });
        }
    });

    (addr, rx)
}

async fn next_connection(
    rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    timeout: Duration,
) -> usize {
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Some(ServerEvent::Connected { conn_id }) => return conn_id,
                Some(_) => {}
                None => panic!("server event stream ended"),
            }
        }
    })
    .await
    .expect("timed out waiting for server connection")
}

async fn next_data_for_conn(
    rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    conn_id: usize,
    timeout: Duration,
) -> String {
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Some(ServerEvent::Data {
                    conn_id: got,
                    text,
                }) if got == conn_id => return text,
                Some(_) => {}
                None => panic!("server event stream ended"),
            }
        }
    })
    .await
    .expect("timed out waiting for server data")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn desired_subscriptions_survive_a_real_socket_drop() {
    let (addr, mut rx) = spawn_ws_server(Duration::from_millis(75)).await;

    let actor = ConnectionActor::spawn(ConnectionActorArgs {
        base_url: format!("ws://{addr}"),
        identity: SessionIdentity::new("u1").with_participant("p1"),
        config: ClientConfig::default(),
        transport: TungsteniteTransport::default(),
        reconnect: FixedReconnect::new(Duration::from_millis(10)),
        ping: JsonPingPong::new(Duration::from_secs(60)),
        scheduler: TokioScheduler,
        buffers: BufferConfig::default(),
    });
    let mut state_rx = actor.ask(WatchConnectionState).await.unwrap();

    actor
        .tell(ConnectionEvent::Subscribe(vec![
            "step_updates".to_string(),
        ]))
        .send()
        .await
        .unwrap();
    actor.tell(ConnectionEvent::Connect).send().await.unwrap();

    let first = next_connection(&mut rx, Duration::from_secs(2)).await;
    let announced = next_data_for_conn(&mut rx, first, Duration::from_secs(2)).await;
    assert_eq!(
        announced,
        r#"{"type":"subscribe","channels":["step_updates"]}"#
    );

    // Grow the desired set while the first socket is still up.
    actor
        .tell(ConnectionEvent::Subscribe(vec![
            "badge_updates".to_string(),
        ]))
        .send()
        .await
        .unwrap();

    // The server drops the first socket without a close frame; the actor
    // reconnects and re-announces the whole desired set as one frame.
    let second = next_connection(&mut rx, Duration::from_secs(2)).await;
    assert_ne!(first, second);
    let reannounced = next_data_for_conn(&mut rx, second, Duration::from_secs(2)).await;
    assert_eq!(
        reannounced,
        r#"{"type":"subscribe","channels":["step_updates","badge_updates"]}"#
    );

    await_state(
        &mut state_rx,
        ConnectionState::Connected,
        Duration::from_secs(2),
    )
    .await;

    actor.tell(ConnectionEvent::Disconnect).send().await.unwrap();
    await_state(
        &mut state_rx,
        ConnectionState::Disconnected,
        Duration::from_secs(2),
    )
    .await;
}
