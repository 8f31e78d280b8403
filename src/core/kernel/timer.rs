use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Background task that runs a callback on a fixed period until cancelled.
///
/// The first run happens one full period after start. Each run is awaited
/// before the next tick is taken, so runs never overlap.
pub struct IntervalTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl IntervalTimer {
    /// Start a timer bound to `cancel`; cancelling the token stops it.
    pub fn start<F, Fut>(period: Duration, cancel: CancellationToken, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = tick() => {}
                }
            }

            debug!("interval timer stopped");
        });

        Self { cancel, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel and wait for the background task to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
