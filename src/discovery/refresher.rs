use std::{sync::Arc, time::Duration};

use log::{info, warn};
use tokio::{sync::broadcast, task::JoinHandle};

use crate::registry::ServiceRegistry;

const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(10);

/// Refreshes the registry's discovered services on a fixed interval until a
/// shutdown signal arrives.
///
/// A failed refresh keeps the previously discovered services in place.
pub fn spawn_discovery_refresher(
    registry: Arc<ServiceRegistry>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = interval.max(MIN_REFRESH_INTERVAL);
        info!(interval_ms = interval.as_millis() as u64; "Discovery refresher started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = registry.refresh_discovered().await {
                        warn!(error:% = e; "Discovery refresh failed, keeping previous services");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Discovery refresher received shutdown signal.");
                    break;
                }
            }
        }
    })
}
