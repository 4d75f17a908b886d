//! Periodic presence sweep.
//!
//! Evicts clients not seen within the staleness threshold.  The interval is
//! validated at config load to be at most half the threshold, so a client is
//! never reported more than 1.5 thresholds after its last request.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::application::context::ServerContext;

/// Sweeps every `period` until `running` is cleared.
pub async fn run_presence_sweep(
    ctx: Arc<ServerContext>,
    period: Duration,
    running: Arc<AtomicBool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; nothing can be stale yet.
    ticker.tick().await;

    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        if ctx.sweep_presence().await {
            let count = ctx.presence_count().await;
            debug!(count, "stale clients evicted");
        }
    }
    info!("presence sweep stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::ContextSettings;
    use lansync_core::AuthState;

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_sweep_future_is_send() {
        let ctx = ServerContext::new(ContextSettings::default(), AuthState::new(), "localhost".into());
        let running = Arc::new(AtomicBool::new(true));

        let future = run_presence_sweep(ctx, Duration::from_secs(1), running);

        assert_send(&future);
    }

    #[tokio::test]
    async fn test_sweep_task_evicts_after_threshold() {
        // Arrange
        let settings = ContextSettings {
            stale_after: Duration::from_millis(100),
            ..Default::default()
        };
        let ctx = ServerContext::new(settings, AuthState::new(), "localhost".into());
        ctx.touch_presence("10.0.0.7").await;
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_presence_sweep(
            Arc::clone(&ctx),
            Duration::from_millis(20),
            Arc::clone(&running),
        ));

        // Act
        tokio::time::sleep(Duration::from_millis(400)).await;

        // Assert
        assert_eq!(ctx.presence_count().await, 0);
        assert_eq!(ctx.snapshot().await.presence_count, 0);
        running.store(false, Ordering::Relaxed);
        task.await.unwrap();
    }
}
