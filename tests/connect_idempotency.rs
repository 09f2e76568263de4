use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Sink;
use futures_util::stream;
use kameo::Actor;

use steps_ws::conn::{ConnectionActor, ConnectionActorArgs, ConnectionEvent, WatchConnectionState};
use steps_ws::core::{
    BufferConfig, ClientConfig, ConnectionState, JsonPingPong, RealtimeError, SessionIdentity,
    TokioScheduler, WsFrame,
};
use steps_ws::testing::{NoReconnect, await_state};
use steps_ws::transport::{TransportConnectFuture, WsTransport};

#[derive(Clone)]
struct CountingTransport {
    connects: Arc<AtomicUsize>,
    delay: Duration,
}

impl WsTransport for CountingTransport {
    type Reader = stream::Pending<Result<WsFrame, RealtimeError>>;
    type Writer = StubWriter;

    fn connect(
        &self,
        _url: String,
        _buffers: BufferConfig,
    ) -> TransportConnectFuture<Self::Reader, Self::Writer> {
        let connects = self.connects.clone();
        let delay = self.delay;
        Box::pin(async move {
            connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok((stream::pending(), StubWriter))
        })
    }
}

#[derive(Clone, Copy)]
struct StubWriter;

impl Sink<WsFrame> for StubWriter {
    type Error = RealtimeError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, _item: WsFrame) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_is_single_flight_and_idempotent() {
    let connects = Arc::new(AtomicUsize::new(0));
    let actor = ConnectionActor::spawn(ConnectionActorArgs {
        base_url: "ws://counting.test/feed".to_string(),
        identity: SessionIdentity::new("u1"),
        config: ClientConfig::default(),
        transport: CountingTransport {
            connects: connects.clone(),
            delay: Duration::from_millis(100),
        },
        reconnect: NoReconnect,
        ping: JsonPingPong::new(Duration::from_secs(60)),
        scheduler: TokioScheduler,
        buffers: BufferConfig::default(),
    });

    let mut state_rx = actor.ask(WatchConnectionState).await.unwrap();

    for _ in 0..50 {
        actor.tell(ConnectionEvent::Connect).send().await.unwrap();
    }

    await_state(
        &mut state_rx,
        ConnectionState::Connected,
        Duration::from_secs(1),
    )
    .await;
    assert_eq!(
        connects.load(Ordering::SeqCst),
        1,
        "connect() should only open one transport while a handshake is in flight"
    );

    // Still a no-op once connected.
    for _ in 0..10 {
        actor.tell(ConnectionEvent::Connect).send().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 1);
}
