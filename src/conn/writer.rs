use futures_util::{Sink, SinkExt};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use tokio::sync::watch;
use tracing::debug;

use crate::core::{RealtimeError, RealtimeResult, WsFrame};
use crate::supervision::TypedSupervisor;

/// Writer actor that owns the transport writer and serializes writes.
pub struct WriterActor<W>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Sync + Unpin + 'static,
{
    writer: W,
    shutdown_rx: watch::Receiver<bool>,
}

impl<W> WriterActor<W>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Sync + Unpin + 'static,
{
    pub fn new(writer: W, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            writer,
            shutdown_rx,
        }
    }
}

impl<W> Actor for WriterActor<W>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Sync + Unpin + 'static,
{
    type Args = Self;
    type Error = RealtimeError;

    fn name() -> &'static str {
        "WriterActor"
    }

    async fn on_start(args: Self::Args, _ctx: ActorRef<Self>) -> Result<Self, Self::Error> {
        Ok(args)
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "WriterActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

#[derive(Clone)]
pub struct WriteFrame {
    pub frame: WsFrame,
}

impl<W> KameoMessage<WriteFrame> for WriterActor<W>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Sync + Unpin + 'static,
{
    type Reply = RealtimeResult<()>;

    async fn handle(
        &mut self,
        msg: WriteFrame,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if *self.shutdown_rx.borrow() {
            return Err(RealtimeError::InvalidState("writer stopped".to_string()));
        }
        debug!(target: "steps-ws-writer", "sending websocket frame to wire");
        self.writer.send(msg.frame).await?;
        Ok(())
    }
}

/// Spawn a supervisor for writer instances of one connection manager.
pub fn spawn_writer_supervisor<W>() -> ActorRef<TypedSupervisor<WriterActor<W>>>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Sync + Unpin + 'static,
{
    TypedSupervisor::spawn(TypedSupervisor::new("steps-ws-writer"))
}

/// Spawn a writer and link it to an existing supervisor.
pub async fn spawn_writer_supervised<W>(
    supervisor: &ActorRef<TypedSupervisor<WriterActor<W>>>,
    writer: W,
    shutdown_rx: watch::Receiver<bool>,
) -> ActorRef<WriterActor<W>>
where
    W: Sink<WsFrame, Error = RealtimeError> + Send + Sync + Unpin + 'static,
{
    let actor = WriterActor::spawn(WriterActor::new(writer, shutdown_rx));
    actor.link(supervisor).await;
    actor
}
