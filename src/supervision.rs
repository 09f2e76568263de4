//! Minimal typed supervisor.
//!
//! Writer actors are "restart-by-reconnect": a dead writer is replaced by the
//! next connection epoch, never restarted in place. The supervisor's job is
//! only to be a stable parent for linking, so a writer death is observed
//! without propagating.

use std::convert::Infallible;
use std::marker::PhantomData;
use std::ops::ControlFlow;

use kameo::{
    Actor,
    actor::{ActorID, ActorRef, WeakActorRef},
    error::ActorStopReason,
};

/// Typed link-based supervisor for homogeneous actors.
pub struct TypedSupervisor<A>
where
    A: Actor + Send + Sync + 'static,
{
    _name: String,
    _phantom: PhantomData<A>,
}

impl<A> TypedSupervisor<A>
where
    A: Actor + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            _name: name.into(),
            _phantom: PhantomData,
        }
    }
}

impl<A> Actor for TypedSupervisor<A>
where
    A: Actor + Send + Sync + 'static,
{
    type Args = Self;
    type Error = Infallible;

    async fn on_start(args: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        Ok(args)
    }

    fn on_link_died(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        _id: ActorID,
        _reason: ActorStopReason,
    ) -> impl std::future::Future<Output = Result<ControlFlow<ActorStopReason>, Self::Error>> + Send
    {
        async { Ok(ControlFlow::Continue(())) }
    }
}
