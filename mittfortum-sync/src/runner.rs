//! Periodic driver for the poller.
//!
//! The host owns cancellation: dropping the integration cancels the token,
//! which interrupts both the wait between ticks and a tick in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::poller::{Poller, TickOutcome};

/// Runs a tick function every period until cancelled.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    cancel: CancellationToken,
}

impl Scheduler {
    /// Scheduler with its own cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler stopped by `cancel`.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Token that stops the scheduler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the scheduler.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Calls `tick` immediately and then every `period`. Ticks never
    /// overlap; a slow tick delays the next one. Returns the number of
    /// ticks that ran to completion.
    pub async fn schedule<F, Fut>(&self, period: Duration, mut tick: F) -> u64
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completed = 0;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("Tick aborted by cancellation");
                    break;
                }
                () = tick() => completed += 1,
            }
        }

        info!(ticks = completed, "Scheduler stopped");
        completed
    }

    /// Drives a shared poller, handing each outcome to `on_tick`.
    pub async fn run_poller<F>(&self, poller: Arc<Mutex<Poller>>, period: Duration, on_tick: F) -> u64
    where
        F: Fn(&TickOutcome),
    {
        let on_tick = &on_tick;
        self.schedule(period, || {
            let poller = Arc::clone(&poller);
            async move {
                let outcome = poller.lock().await.tick().await;
                on_tick(&outcome);
            }
        })
        .await
    }
}
