//! Connection manager actor.
//!
//! The actor owns connection state and policy; socket IO runs on plain tokio
//! tasks that feed the mailbox. At most one live transport exists per actor,
//! and every IO task and timer is tagged with a connection epoch so that
//! completions from a torn-down socket are discarded instead of corrupting
//! the state machine.

use futures_util::{FutureExt, StreamExt};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage, WeakActorRef};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::conn::writer::{WriteFrame, WriterActor, spawn_writer_supervised, spawn_writer_supervisor};
use crate::core::{
    BufferConfig, ClientConfig, ConnectionState, ConnectionStats, ExponentialBackoff,
    HealthMonitor, JsonPingPong, PingStrategy, RealtimeError, RealtimeResult, ReconnectStrategy,
    Scheduler, SessionIdentity, TimerHandle, TokioScheduler, WsFrame, frame_bytes,
};
use crate::dispatch::{Dispatcher, ListenerId, MessageCallback};
use crate::protocol::{
    ClientMessage, MessageKind, ServerMessage, connect_url, decode_server_message,
    encode_client_message,
};
use crate::subscriptions::SubscriptionRegistry;
use crate::supervision::TypedSupervisor;
use crate::transport::WsTransport;
use crate::transport::tungstenite::TungsteniteTransport;

/// Why a socket stopped being usable.
#[derive(Debug, Clone)]
pub enum CloseCause {
    /// Close frame with the normal-closure code: intentional shutdown.
    Normal,
    /// Close frame with any other code.
    Abnormal { code: u16, reason: String },
    /// Stream ended without a close frame.
    StreamEnded,
    ReadError(String),
}

impl CloseCause {
    fn is_intentional(&self) -> bool {
        matches!(self, CloseCause::Normal)
    }
}

/// External events accepted by the connection actor.
#[derive(Debug)]
pub enum ConnectionEvent {
    Connect,
    Disconnect,
    /// Immediate teardown + retry, bypassing any pending backoff delay.
    ForceReconnect,
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    Send(ClientMessage),
    SendPing,
}

/// Arguments for constructing a connection actor.
pub struct ConnectionActorArgs<
    T = TungsteniteTransport,
    R = ExponentialBackoff,
    P = JsonPingPong,
    S = TokioScheduler,
> where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    pub base_url: String,
    pub identity: SessionIdentity,
    pub config: ClientConfig,
    pub transport: T,
    pub reconnect: R,
    pub ping: P,
    pub scheduler: S,
    pub buffers: BufferConfig,
}

pub struct ConnectionActor<
    T = TungsteniteTransport,
    R = ExponentialBackoff,
    P = JsonPingPong,
    S = TokioScheduler,
> where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    base_url: String,
    identity: SessionIdentity,
    label: String,
    config: ClientConfig,
    transport: T,
    buffers: BufferConfig,
    reconnect: R,
    ping: P,
    scheduler: S,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    registry: SubscriptionRegistry,
    dispatcher: Dispatcher,
    health: HealthMonitor,
    epoch: u64,
    actor_ref: ActorRef<Self>,
    reader_task: Option<JoinHandle<()>>,
    ping_timer: Option<S::Handle>,
    retry_timer: Option<S::Handle>,
    shutdown_tx: watch::Sender<bool>,
    writer_ref: Option<ActorRef<WriterActor<T::Writer>>>,
    writer_supervisor_ref: Option<ActorRef<TypedSupervisor<WriterActor<T::Writer>>>>,
}

impl<T, R, P, S> Actor for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Args = ConnectionActorArgs<T, R, P, S>;
    type Error = RealtimeError;

    fn name() -> &'static str {
        "ConnectionActor"
    }

    async fn on_start(args: Self::Args, ctx: ActorRef<Self>) -> RealtimeResult<Self> {
        let ConnectionActorArgs {
            base_url,
            identity,
            config,
            transport,
            reconnect,
            ping,
            scheduler,
            buffers,
        } = args;

        let label = identity.user_id.clone();
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        Ok(Self {
            base_url,
            identity,
            label,
            config,
            transport,
            buffers,
            reconnect,
            ping,
            scheduler,
            state: ConnectionState::Disconnected,
            state_tx,
            registry: SubscriptionRegistry::new(),
            dispatcher: Dispatcher::new(),
            health: HealthMonitor::new(),
            epoch: 0,
            actor_ref: ctx,
            reader_task: None,
            ping_timer: None,
            retry_timer: None,
            shutdown_tx,
            writer_ref: None,
            writer_supervisor_ref: None,
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        _reason: kameo::error::ActorStopReason,
    ) -> RealtimeResult<()> {
        self.teardown(false).await;
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            error!(error = ?err, "ConnectionActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

impl<T, R, P, S> KameoMessage<ConnectionEvent> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = RealtimeResult<()>;

    async fn handle(
        &mut self,
        event: ConnectionEvent,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match event {
            ConnectionEvent::Connect => self.handle_connect(),
            ConnectionEvent::Disconnect => self.handle_disconnect().await,
            ConnectionEvent::ForceReconnect => self.handle_force_reconnect().await,
            ConnectionEvent::Subscribe(channels) => self.handle_subscribe(channels).await,
            ConnectionEvent::Unsubscribe(channels) => self.handle_unsubscribe(channels).await,
            ConnectionEvent::Send(message) => self.handle_send(message).await,
            ConnectionEvent::SendPing => self.handle_send_ping().await,
        }
        Ok(())
    }
}

/// Internal: socket handshake completed for `epoch`.
pub(crate) struct ConnectionEstablished<T: WsTransport> {
    epoch: u64,
    reader: T::Reader,
    writer: T::Writer,
}

/// Internal: socket handshake failed for `epoch`.
pub(crate) struct ConnectFailed {
    epoch: u64,
    error: String,
}

/// Internal: a frame arrived on the socket of `epoch`.
pub(crate) struct Inbound {
    epoch: u64,
    frame: WsFrame,
}

/// Internal: the socket of `epoch` is gone.
pub(crate) struct SocketClosed {
    epoch: u64,
    cause: CloseCause,
}

/// Internal: the backoff delay for `epoch` elapsed.
pub(crate) struct RetryElapsed {
    epoch: u64,
}

impl<T, R, P, S> KameoMessage<ConnectionEstablished<T>> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = RealtimeResult<()>;

    async fn handle(
        &mut self,
        msg: ConnectionEstablished<T>,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.epoch != self.epoch || self.state != ConnectionState::Connecting {
            debug!(
                connection = %self.label,
                epoch = msg.epoch,
                state = ?self.state,
                "dropping stale connection establishment"
            );
            return Ok(());
        }
        self.on_connection_established(msg.reader, msg.writer).await;
        Ok(())
    }
}

impl<T, R, P, S> KameoMessage<ConnectFailed> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = RealtimeResult<()>;

    async fn handle(
        &mut self,
        msg: ConnectFailed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.epoch != self.epoch || self.state != ConnectionState::Connecting {
            return Ok(());
        }
        warn!(connection = %self.label, error = %msg.error, "websocket handshake failed");
        self.enter_reconnect("handshake failed").await;
        Ok(())
    }
}

impl<T, R, P, S> KameoMessage<Inbound> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = RealtimeResult<()>;

    async fn handle(
        &mut self,
        msg: Inbound,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.epoch != self.epoch || !self.state.is_connected() {
            return Ok(());
        }
        self.process_inbound(msg.frame).await;
        Ok(())
    }
}

impl<T, R, P, S> KameoMessage<SocketClosed> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = RealtimeResult<()>;

    async fn handle(
        &mut self,
        msg: SocketClosed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.epoch != self.epoch {
            return Ok(());
        }
        if msg.cause.is_intentional() {
            info!(connection = %self.label, "server closed connection normally");
            self.teardown(false).await;
            self.set_state(ConnectionState::Disconnected);
        } else {
            warn!(connection = %self.label, cause = ?msg.cause, "websocket connection lost");
            self.enter_reconnect("connection lost").await;
        }
        Ok(())
    }
}

impl<T, R, P, S> KameoMessage<RetryElapsed> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = RealtimeResult<()>;

    async fn handle(
        &mut self,
        msg: RetryElapsed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.epoch != self.epoch || self.state != ConnectionState::Reconnecting {
            return Ok(());
        }
        self.retry_timer = None;
        self.handle_connect();
        Ok(())
    }
}

/// Ask: current state, answered from the mailbox so it reflects every queued
/// transition before it.
pub struct GetConnectionState;

impl<T, R, P, S> KameoMessage<GetConnectionState> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = ConnectionState;

    async fn handle(
        &mut self,
        _msg: GetConnectionState,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.state
    }
}

/// Ask: a watch receiver publishing every state transition. This is the
/// state-change notification surface; it is deliberately separate from the
/// message-kind dispatch map.
pub struct WatchConnectionState;

impl<T, R, P, S> KameoMessage<WatchConnectionState> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = watch::Receiver<ConnectionState>;

    async fn handle(
        &mut self,
        _msg: WatchConnectionState,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.state_tx.subscribe()
    }
}

pub struct GetConnectionStats;

impl<T, R, P, S> KameoMessage<GetConnectionStats> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = ConnectionStats;

    async fn handle(
        &mut self,
        _msg: GetConnectionStats,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.health.get_stats()
    }
}

/// Ask: the current desired channel set, in subscription order.
pub struct GetSubscriptions;

impl<T, R, P, S> KameoMessage<GetSubscriptions> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = Vec<String>;

    async fn handle(
        &mut self,
        _msg: GetSubscriptions,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.registry.to_vec()
    }
}

/// Ask: register a callback for one message kind.
pub struct AddListener {
    pub kind: MessageKind,
    pub callback: MessageCallback,
}

impl<T, R, P, S> KameoMessage<AddListener> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = ListenerId;

    async fn handle(
        &mut self,
        msg: AddListener,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.dispatcher.on(msg.kind, msg.callback)
    }
}

/// Ask: remove one previously registered callback.
pub struct RemoveListener {
    pub kind: MessageKind,
    pub id: ListenerId,
}

impl<T, R, P, S> KameoMessage<RemoveListener> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = bool;

    async fn handle(
        &mut self,
        msg: RemoveListener,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.dispatcher.off(msg.kind, msg.id)
    }
}

/// Ask: clear callbacks for one kind, or all of them.
pub struct RemoveAllListeners {
    pub kind: Option<MessageKind>,
}

impl<T, R, P, S> KameoMessage<RemoveAllListeners> for ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: RemoveAllListeners,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.dispatcher.remove_all(msg.kind);
    }
}

impl<T, R, P, S> ConnectionActor<T, R, P, S>
where
    T: WsTransport,
    R: ReconnectStrategy,
    P: PingStrategy,
    S: Scheduler,
{
    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        let previous = std::mem::replace(&mut self.state, next);
        info!(
            connection = %self.label,
            from = ?previous,
            to = ?next,
            "connection state changed"
        );
        // send_replace: the value must update even before anyone subscribes.
        self.state_tx.send_replace(next);
    }

    fn handle_connect(&mut self) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!(
                    connection = %self.label,
                    state = ?self.state,
                    "connect ignored: already active"
                );
                return;
            }
            ConnectionState::Failed => {
                // Manual resume after exhaustion starts a fresh streak.
                self.reconnect.reset();
            }
            _ => {}
        }

        let url = match connect_url(&self.base_url, &self.identity) {
            Ok(url) => url,
            Err(err) => {
                // Sessions validate the URL on activation; this only fires
                // when the actor is driven directly with a bad base URL.
                error!(connection = %self.label, error = %err, "cannot build connection url");
                return;
            }
        };

        self.set_state(ConnectionState::Connecting);
        self.spawn_connect(url);
    }

    fn spawn_connect(&mut self, url: String) {
        self.epoch += 1;
        let epoch = self.epoch;
        let self_ref = self.actor_ref.clone();
        let transport = self.transport.clone();
        let buffers = self.buffers;

        tokio::spawn(async move {
            match transport.connect(url, buffers).await {
                Ok((reader, writer)) => {
                    let _ = self_ref
                        .tell(ConnectionEstablished::<T> {
                            epoch,
                            reader,
                            writer,
                        })
                        .send()
                        .await;
                }
                Err(err) => {
                    let _ = self_ref
                        .tell(ConnectFailed {
                            epoch,
                            error: err.to_string(),
                        })
                        .send()
                        .await;
                }
            }
        });
    }

    async fn on_connection_established(&mut self, reader: T::Reader, writer: T::Writer) {
        info!(connection = %self.label, "websocket connection established");

        self.reconnect.reset();
        self.ping.reset();
        self.health.reset_epoch();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = shutdown_tx;

        if self.writer_supervisor_ref.is_none() {
            self.writer_supervisor_ref = Some(spawn_writer_supervisor::<T::Writer>());
        }
        let supervisor = self
            .writer_supervisor_ref
            .as_ref()
            .expect("writer supervisor must be set");
        let writer_ref = spawn_writer_supervised(supervisor, writer, shutdown_rx.clone()).await;
        self.writer_ref = Some(writer_ref);

        self.spawn_reader(reader, shutdown_rx);

        self.set_state(ConnectionState::Connected);

        // The full desired channel set goes out as one subscribe frame before
        // any inbound application message is processed: inbound frames queue
        // behind this handler in the mailbox.
        if !self.registry.is_empty() {
            let channels = self.registry.to_vec();
            info!(
                connection = %self.label,
                channels = channels.len(),
                "re-announcing subscriptions"
            );
            self.send_client_message(ClientMessage::Subscribe { channels })
                .await;
        }

        self.start_keep_alive();
    }

    fn spawn_reader(&mut self, reader: T::Reader, mut shutdown_rx: watch::Receiver<bool>) {
        let epoch = self.epoch;
        let actor_ref = self.actor_ref.clone();
        let mut reader = reader;

        self.reader_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = shutdown_rx.changed() => {
                        if res.is_err() || *shutdown_rx.borrow_and_update() {
                            break;
                        }
                    }
                    frame = reader.next() => {
                        match frame {
                            Some(Ok(WsFrame::Close(close))) => {
                                let cause = match close {
                                    Some(frame) if frame.is_normal() => CloseCause::Normal,
                                    Some(frame) => CloseCause::Abnormal {
                                        code: frame.code,
                                        reason: String::from_utf8_lossy(frame.reason.as_ref())
                                            .into_owned(),
                                    },
                                    None => CloseCause::StreamEnded,
                                };
                                let _ = actor_ref
                                    .tell(SocketClosed { epoch, cause })
                                    .send()
                                    .await;
                                break;
                            }
                            Some(Ok(frame)) => {
                                if actor_ref
                                    .tell(Inbound { epoch, frame })
                                    .send()
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Some(Err(err)) => {
                                let _ = actor_ref
                                    .tell(SocketClosed {
                                        epoch,
                                        cause: CloseCause::ReadError(err.to_string()),
                                    })
                                    .send()
                                    .await;
                                break;
                            }
                            None => {
                                let _ = actor_ref
                                    .tell(SocketClosed {
                                        epoch,
                                        cause: CloseCause::StreamEnded,
                                    })
                                    .send()
                                    .await;
                                break;
                            }
                        }
                    }
                }
            }
        }));
    }

    fn start_keep_alive(&mut self) {
        let actor_ref = self.actor_ref.clone();
        let handle = self.scheduler.schedule_repeating(
            self.ping.interval(),
            Box::new(move || {
                let actor_ref = actor_ref.clone();
                async move {
                    let _ = actor_ref.tell(ConnectionEvent::SendPing).send().await;
                }
                .boxed()
            }),
        );
        self.ping_timer = Some(handle);
    }

    async fn handle_send_ping(&mut self) {
        if !self.state.is_connected() {
            debug!(
                connection = %self.label,
                state = ?self.state,
                "skipping keep-alive ping: not connected"
            );
            return;
        }
        let ping = self.ping.create_ping();
        self.send_client_message(ping).await;
    }

    async fn handle_subscribe(&mut self, channels: Vec<String>) {
        let added = self.registry.add(channels);
        if added.is_empty() {
            return;
        }
        if self.state.is_connected() {
            self.send_client_message(ClientMessage::Subscribe { channels: added })
                .await;
        } else {
            debug!(
                connection = %self.label,
                pending = self.registry.len(),
                "subscription retained until next connect"
            );
        }
    }

    async fn handle_unsubscribe(&mut self, channels: Vec<String>) {
        let removed = self.registry.remove(channels);
        if removed.is_empty() {
            return;
        }
        if self.state.is_connected() {
            self.send_client_message(ClientMessage::Unsubscribe { channels: removed })
                .await;
        }
    }

    async fn handle_send(&mut self, message: ClientMessage) {
        if !self.state.is_connected() {
            warn!(
                connection = %self.label,
                error = %RealtimeError::NotConnected { state: self.state },
                "outbound message dropped"
            );
            return;
        }
        self.send_client_message(message).await;
    }

    async fn send_client_message(&mut self, message: ClientMessage) {
        let frame = match encode_client_message(&message) {
            Ok(frame) => frame,
            Err(err) => {
                error!(connection = %self.label, error = %err, "failed to encode outbound message");
                return;
            }
        };
        self.send_frame(frame).await;
    }

    async fn send_frame(&mut self, frame: WsFrame) {
        let Some(writer) = self.writer_ref.clone() else {
            warn!(connection = %self.label, "send dropped: no live writer");
            return;
        };
        if let Err(err) = writer.tell(WriteFrame { frame }).send().await {
            let detail = err.to_string();
            warn!(connection = %self.label, error = %detail, "websocket writer send failed");
            self.enter_reconnect("writer send failed").await;
        }
    }

    async fn process_inbound(&mut self, frame: WsFrame) {
        match &frame {
            WsFrame::Ping(payload) => {
                // Protocol-level ping from the server; answer in kind.
                let pong = WsFrame::Pong(payload.clone());
                self.send_frame(pong).await;
                return;
            }
            WsFrame::Pong(_) => {
                if self.config.debug {
                    debug!(connection = %self.label, "received protocol pong frame");
                }
                return;
            }
            _ => {}
        }

        let Some(bytes) = frame_bytes(&frame) else {
            return;
        };

        let message = match decode_server_message(bytes) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    connection = %self.label,
                    error = %err,
                    payload_len = bytes.len(),
                    "dropping malformed inbound frame"
                );
                self.health.record_protocol_error(&err.to_string());
                return;
            }
        };

        match message {
            ServerMessage::Pong(pong) => {
                let rtt = self.ping.on_pong(pong.timestamp);
                if let Some(rtt) = rtt {
                    self.health.record_rtt(rtt);
                }
                debug!(
                    connection = %self.label,
                    timestamp = pong.timestamp,
                    rtt_us = rtt.map(|d| d.as_micros() as u64),
                    "keep-alive pong received"
                );
            }
            message => {
                self.health.record_message();
                let delivered = self.dispatcher.dispatch(&message);
                if self.config.debug {
                    debug!(
                        connection = %self.label,
                        kind = message.kind().map(MessageKind::as_str),
                        delivered,
                        "dispatched inbound message"
                    );
                }
            }
        }
    }

    async fn enter_reconnect(&mut self, reason: &str) {
        self.teardown(false).await;
        self.health.increment_reconnect();

        let delay = self.reconnect.next_delay();
        self.set_state(ConnectionState::Reconnecting);

        if !self.reconnect.should_retry() {
            let attempts = self.reconnect.attempts();
            error!(
                connection = %self.label,
                attempts,
                error = %RealtimeError::ReconnectExhausted { attempts },
                "giving up on automatic reconnection"
            );
            self.set_state(ConnectionState::Failed);
            return;
        }

        warn!(
            connection = %self.label,
            reason = %reason,
            attempt = self.reconnect.attempts(),
            delay_ms = delay.as_millis().min(u64::MAX as u128) as u64,
            "scheduling reconnect"
        );

        let epoch = self.epoch;
        let actor_ref = self.actor_ref.clone();
        let handle = self.scheduler.schedule_once(
            delay,
            async move {
                let _ = actor_ref.tell(RetryElapsed { epoch }).send().await;
            }
            .boxed(),
        );
        self.retry_timer = Some(handle);
    }

    async fn handle_disconnect(&mut self) {
        self.teardown(true).await;
        self.reconnect.reset();
        self.set_state(ConnectionState::Disconnected);
    }

    async fn handle_force_reconnect(&mut self) {
        info!(connection = %self.label, "forcing immediate reconnect");
        self.teardown(true).await;
        self.reconnect.reset();
        self.set_state(ConnectionState::Disconnected);
        self.handle_connect();
    }

    /// Stop every timer and IO task of the current epoch. With `close_socket`
    /// a normal-closure frame goes out first. Safe to call repeatedly and
    /// from any state; after it returns, stale completions are fenced off by
    /// the epoch bump.
    async fn teardown(&mut self, close_socket: bool) {
        if let Some(timer) = self.retry_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.ping_timer.take() {
            timer.cancel();
        }
        self.ping.reset();

        if close_socket
            && let Some(writer) = self.writer_ref.clone()
        {
            // Ask, not tell: the close frame must reach the sink before the
            // writer observes the shutdown flag below.
            let _ = writer
                .ask(WriteFrame {
                    frame: WsFrame::close_normal(),
                })
                .await;
        }

        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.reader_task.take() {
            if let Err(err) = handle.await {
                warn!(connection = %self.label, error = %err, "reader task ended with error");
            }
        }

        if let Some(writer) = self.writer_ref.take() {
            let _ = writer.stop_gracefully().await;
            writer.wait_for_shutdown().await;
            if let Some(supervisor) = self.writer_supervisor_ref.as_ref() {
                writer.unlink(supervisor).await;
            }
        }

        self.epoch += 1;
    }
}
