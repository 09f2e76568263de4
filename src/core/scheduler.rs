use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Cancellable timer registration. Dropping a handle cancels the timer, so a
/// torn-down connection manager cannot leave callbacks behind.
pub trait TimerHandle: Send + 'static {
    fn cancel(&self);
}

/// Timer seam between the connection manager and the host runtime.
///
/// Both the reconnect delay and the keep-alive interval go through this
/// trait, so the state machine can be driven without wall-clock waits.
pub trait Scheduler: Clone + Send + Sync + 'static {
    type Handle: TimerHandle;

    /// Run `task` once after `delay`.
    fn schedule_once(&self, delay: Duration, task: BoxFuture<'static, ()>) -> Self::Handle;

    /// Run a task produced by `make_task` every `interval`, first firing one
    /// interval from now.
    fn schedule_repeating(
        &self,
        interval: Duration,
        make_task: Box<dyn FnMut() -> BoxFuture<'static, ()> + Send>,
    ) -> Self::Handle;
}

/// Production scheduler backed by tokio timers.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

pub struct TokioTimerHandle {
    handle: JoinHandle<()>,
}

impl TimerHandle for TokioTimerHandle {
    fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for TokioTimerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl Scheduler for TokioScheduler {
    type Handle = TokioTimerHandle;

    fn schedule_once(&self, delay: Duration, task: BoxFuture<'static, ()>) -> Self::Handle {
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        });
        TokioTimerHandle { handle }
    }

    fn schedule_repeating(
        &self,
        interval: Duration,
        mut make_task: Box<dyn FnMut() -> BoxFuture<'static, ()> + Send>,
    ) -> Self::Handle {
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                make_task().await;
            }
        });
        TokioTimerHandle { handle }
    }
}
