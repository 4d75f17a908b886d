//! Interface enumeration for local address selection.
//!
//! The selection rule itself lives in `lansync_core::domain::identity` and is
//! tested there against fixed interface lists; this adapter reads the
//! machine's interfaces and re-resolves them periodically so a changed LAN
//! address reaches the snapshot and the rendezvous registration.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use get_if_addrs::get_if_addrs;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::context::ServerContext;

use lansync_core::domain::identity::FALLBACK_ADDRESS;
use lansync_core::{select_local_address, AdapterPolicy, InterfaceAddr};

/// Every address on every interface, in the order the OS reports them.
///
/// An enumeration failure yields an empty list.
pub fn enumerate_interfaces() -> Vec<InterfaceAddr> {
    match get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .map(|iface| {
                let ip = iface.ip();
                InterfaceAddr::new(iface.name, ip)
            })
            .collect(),
        Err(e) => {
            warn!("failed to list network interfaces: {e}");
            Vec::new()
        }
    }
}

/// The address peers on the LAN should use to reach this node, or
/// `"localhost"` when no real adapter has an IPv4 address.
pub fn resolve_local_address(policy: &AdapterPolicy) -> String {
    let interfaces = enumerate_interfaces();
    let chosen = select_local_address(&interfaces, |name| policy.allows(name));
    if chosen == FALLBACK_ADDRESS {
        warn!(
            interfaces = interfaces.len(),
            "no usable LAN address found; falling back to {FALLBACK_ADDRESS}"
        );
    } else {
        debug!(address = %chosen, "local address selected");
    }
    chosen
}

/// Re-runs `resolve` every `period` and stores the result when it differs
/// from the current local address.  Stops once `running` is cleared.
pub async fn run_address_refresh<F>(
    ctx: Arc<ServerContext>,
    resolve: F,
    period: Duration,
    running: Arc<AtomicBool>,
) where
    F: Fn() -> String + Send + 'static,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        let current = resolve();
        let previous = ctx.local_address().await;
        if current != previous {
            info!(%previous, %current, "local address changed");
            ctx.set_local_address(current).await;
        }
    }
    debug!("address refresh stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::ContextSettings;
    use lansync_core::AuthState;
    use std::sync::Mutex;

    #[test]
    fn test_resolve_never_returns_empty() {
        let address = resolve_local_address(&AdapterPolicy::default());
        assert!(!address.is_empty());
    }

    #[test]
    fn test_rejecting_every_adapter_falls_back_to_localhost() {
        let chosen = select_local_address(&enumerate_interfaces(), |_| false);
        assert_eq!(chosen, FALLBACK_ADDRESS);
    }

    #[tokio::test]
    async fn test_address_refresh_publishes_changed_address() {
        // Arrange
        let ctx = ServerContext::new(ContextSettings::default(), AuthState::new(), "192.168.1.20".into());
        let mut snapshots = ctx.subscribe();
        snapshots.borrow_and_update();
        let next = Arc::new(Mutex::new("192.168.1.20".to_string()));
        let source = Arc::clone(&next);
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_address_refresh(
            Arc::clone(&ctx),
            move || source.lock().unwrap().clone(),
            Duration::from_millis(20),
            Arc::clone(&running),
        ));

        // Act
        *next.lock().unwrap() = "10.1.2.3".to_string();
        tokio::time::timeout(Duration::from_secs(2), snapshots.changed())
            .await
            .expect("snapshot pushed")
            .unwrap();

        // Assert
        assert_eq!(ctx.local_address().await, "10.1.2.3");
        assert_eq!(snapshots.borrow().local_address, "10.1.2.3");
        running.store(false, Ordering::Relaxed);
        task.await.unwrap();
    }
}
