//! Session adapter: binds one connection manager to a UI session's lifetime.
//!
//! A session owns exactly one connection actor. Activation spawns the actor,
//! wires the snapshot projection and auto-subscribes the role's channel
//! preset; shutdown stops the actor and its IO before the handle is gone, so
//! two live sessions can never share a socket. Callers replacing a session
//! (identity change, remount) must `shutdown()` the old one first.

use std::sync::Arc;

use kameo::prelude::{Actor, ActorRef};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::conn::{
    AddListener, ConnectionActor, ConnectionActorArgs, ConnectionEvent, GetConnectionState,
    GetConnectionStats, GetSubscriptions, WatchConnectionState,
};
use crate::core::{
    BufferConfig, ClientConfig, ConnectionState, ConnectionStats, ExponentialBackoff,
    JsonPingPong, RealtimeError, RealtimeResult, SessionIdentity, TokioScheduler,
};
use crate::protocol::{
    BadgeEarned, LeaderboardEntry, MessageKind, ServerMessage, StepUpdate, channels, connect_url,
};
use crate::transport::WsTransport;
use crate::transport::tungstenite::TungsteniteTransport;

/// Which channel preset a session auto-subscribes once activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// A participant's own dashboard: step and badge events.
    Participant,
    /// Public displays: aggregate totals and the leaderboard.
    Public,
    /// Admin monitoring: everything.
    Monitor,
}

impl SessionRole {
    pub fn channels(self) -> &'static [&'static str] {
        match self {
            SessionRole::Participant => &[channels::STEP_UPDATES, channels::BADGE_UPDATES],
            SessionRole::Public => &[channels::TOTAL_UPDATES, channels::LEADERBOARD_UPDATES],
            SessionRole::Monitor => &channels::ALL,
        }
    }
}

/// Read-only projection of everything pushed so far.
///
/// `total_steps` and `leaderboard` always hold the most recent server
/// snapshot wholesale; values from before a reconnect are replaced, never
/// merged, since ordering does not span connection epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSnapshot {
    pub connected: bool,
    pub connection_state: ConnectionState,
    pub latest_update: Option<StepUpdate>,
    pub total_steps: Option<u64>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub latest_badge: Option<BadgeEarned>,
}

impl Default for RealtimeSnapshot {
    fn default() -> Self {
        Self {
            connected: false,
            connection_state: ConnectionState::Disconnected,
            latest_update: None,
            total_steps: None,
            leaderboard: Vec::new(),
            latest_badge: None,
        }
    }
}

/// Handle to one live realtime session.
pub struct RealtimeSession<T = TungsteniteTransport>
where
    T: WsTransport,
{
    actor: ActorRef<ConnectionActor<T>>,
    snapshot_rx: watch::Receiver<RealtimeSnapshot>,
    projection_task: JoinHandle<()>,
}

impl RealtimeSession<TungsteniteTransport> {
    /// Activate a session over the production transport.
    pub async fn activate(
        base_url: impl Into<String>,
        identity: SessionIdentity,
        role: SessionRole,
        config: ClientConfig,
    ) -> RealtimeResult<Self> {
        Self::activate_with_transport(
            TungsteniteTransport::default(),
            base_url,
            identity,
            role,
            config,
        )
        .await
    }
}

impl<T> RealtimeSession<T>
where
    T: WsTransport,
{
    /// Activate a session over an arbitrary transport.
    pub async fn activate_with_transport(
        transport: T,
        base_url: impl Into<String>,
        identity: SessionIdentity,
        role: SessionRole,
        config: ClientConfig,
    ) -> RealtimeResult<Self> {
        let base_url = base_url.into();
        // Fail activation on a bad URL instead of the first connect attempt.
        connect_url(&base_url, &identity)?;

        info!(user = %identity.user_id, role = ?role, "activating realtime session");

        let actor = ConnectionActor::spawn(ConnectionActorArgs {
            base_url,
            identity,
            config,
            transport,
            reconnect: ExponentialBackoff::from_config(&config),
            ping: JsonPingPong::new(config.ping_interval),
            scheduler: TokioScheduler,
            buffers: BufferConfig::default(),
        });

        let (snapshot_tx, snapshot_rx) = watch::channel(RealtimeSnapshot::default());
        let snapshot_tx = Arc::new(snapshot_tx);

        Self::register_projections(&actor, &snapshot_tx).await?;

        let mut state_rx = actor
            .ask(WatchConnectionState)
            .await
            .map_err(actor_error)?;
        let state_snapshot_tx = snapshot_tx.clone();
        let projection_task = tokio::spawn(async move {
            loop {
                let state = *state_rx.borrow_and_update();
                state_snapshot_tx.send_modify(|snapshot| {
                    snapshot.connection_state = state;
                    snapshot.connected = state.is_connected();
                });
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        let preset: Vec<String> = role.channels().iter().map(|c| c.to_string()).collect();
        actor
            .tell(ConnectionEvent::Subscribe(preset))
            .send()
            .await
            .map_err(actor_error)?;
        actor
            .tell(ConnectionEvent::Connect)
            .send()
            .await
            .map_err(actor_error)?;

        Ok(Self {
            actor,
            snapshot_rx,
            projection_task,
        })
    }

    async fn register_projections(
        actor: &ActorRef<ConnectionActor<T>>,
        snapshot_tx: &Arc<watch::Sender<RealtimeSnapshot>>,
    ) -> RealtimeResult<()> {
        let tx = snapshot_tx.clone();
        actor
            .ask(AddListener {
                kind: MessageKind::StepUpdate,
                callback: Box::new(move |message| {
                    if let ServerMessage::StepUpdate(update) = message {
                        let update = update.clone();
                        tx.send_modify(|snapshot| snapshot.latest_update = Some(update));
                    }
                }),
            })
            .await
            .map_err(actor_error)?;

        let tx = snapshot_tx.clone();
        actor
            .ask(AddListener {
                kind: MessageKind::TotalUpdate,
                callback: Box::new(move |message| {
                    if let ServerMessage::TotalUpdate(update) = message {
                        let total = update.total_steps;
                        tx.send_modify(|snapshot| snapshot.total_steps = Some(total));
                    }
                }),
            })
            .await
            .map_err(actor_error)?;

        let tx = snapshot_tx.clone();
        actor
            .ask(AddListener {
                kind: MessageKind::LeaderboardUpdate,
                callback: Box::new(move |message| {
                    if let ServerMessage::LeaderboardUpdate(update) = message {
                        let entries = update.entries.clone();
                        tx.send_modify(|snapshot| snapshot.leaderboard = entries);
                    }
                }),
            })
            .await
            .map_err(actor_error)?;

        let tx = snapshot_tx.clone();
        actor
            .ask(AddListener {
                kind: MessageKind::BadgeEarned,
                callback: Box::new(move |message| {
                    if let ServerMessage::BadgeEarned(badge) = message {
                        let badge = badge.clone();
                        tx.send_modify(|snapshot| snapshot.latest_badge = Some(badge));
                    }
                }),
            })
            .await
            .map_err(actor_error)?;

        Ok(())
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> RealtimeSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that observes every snapshot change.
    pub fn watch_snapshot(&self) -> watch::Receiver<RealtimeSnapshot> {
        self.snapshot_rx.clone()
    }

    pub async fn subscribe(&self, channels: Vec<String>) -> RealtimeResult<()> {
        self.actor
            .tell(ConnectionEvent::Subscribe(channels))
            .send()
            .await
            .map_err(actor_error)
    }

    pub async fn unsubscribe(&self, channels: Vec<String>) -> RealtimeResult<()> {
        self.actor
            .tell(ConnectionEvent::Unsubscribe(channels))
            .send()
            .await
            .map_err(actor_error)
    }

    /// Resume after an explicit disconnect (or after reconnect exhaustion).
    pub async fn connect(&self) -> RealtimeResult<()> {
        self.actor
            .tell(ConnectionEvent::Connect)
            .send()
            .await
            .map_err(actor_error)
    }

    /// Tear the socket down and retry immediately, bypassing any pending
    /// backoff delay.
    pub async fn reconnect(&self) -> RealtimeResult<()> {
        self.actor
            .tell(ConnectionEvent::ForceReconnect)
            .send()
            .await
            .map_err(actor_error)
    }

    pub async fn disconnect(&self) -> RealtimeResult<()> {
        self.actor
            .tell(ConnectionEvent::Disconnect)
            .send()
            .await
            .map_err(actor_error)
    }

    pub async fn connection_state(&self) -> RealtimeResult<ConnectionState> {
        self.actor.ask(GetConnectionState).await.map_err(actor_error)
    }

    pub async fn stats(&self) -> RealtimeResult<ConnectionStats> {
        self.actor.ask(GetConnectionStats).await.map_err(actor_error)
    }

    pub async fn subscriptions(&self) -> RealtimeResult<Vec<String>> {
        self.actor.ask(GetSubscriptions).await.map_err(actor_error)
    }

    /// Deactivate: disconnect, stop the actor, and wait until it is gone.
    ///
    /// Await this before constructing a replacement session for the same
    /// identity — it is what guarantees no two live transports overlap.
    pub async fn shutdown(self) -> RealtimeResult<()> {
        let _ = self
            .actor
            .tell(ConnectionEvent::Disconnect)
            .send()
            .await;
        self.actor.stop_gracefully().await.map_err(actor_error)?;
        self.actor.wait_for_shutdown().await;
        self.projection_task.abort();
        Ok(())
    }
}

impl<T> Drop for RealtimeSession<T>
where
    T: WsTransport,
{
    fn drop(&mut self) {
        // Safety net for handles dropped without `shutdown()`: the actor's
        // on_stop still tears down IO and timers.
        self.projection_task.abort();
        self.actor.kill();
    }
}

fn actor_error(err: impl std::fmt::Display) -> RealtimeError {
    RealtimeError::Actor(err.to_string())
}
