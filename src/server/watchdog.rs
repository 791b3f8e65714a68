//! Per-stream watchdogs.
//!
//! Two timers cooperate per active push stream: a long-interval reaper
//! that removes connections nobody is pushing to any more, and a
//! short-interval kicker that keeps `last_used` fresh while one segment's
//! transcode outlives the push timeout. Both tasks hold identities only
//! and re-resolve the connection through the registry on every tick, so
//! neither keeps an evicted connection alive.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::node::IngestNode;

use super::ManifestId;

/// Fraction of the push timeout between liveness refreshes.
const KICK_FRACTION: f64 = 0.9;

/// Start the inactivity reaper for a connection.
///
/// Runs until the connection goes stale (and is removed), the external
/// binding disappears, or the node shuts down.
pub fn start_inactivity_reaper(node: Arc<IngestNode>, internal: ManifestId, external: ManifestId) {
    tokio::spawn(async move {
        let timeout = node.push_timeout;
        let mut ticker = tokio::time::interval(timeout);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of an interval completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = node.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let cxn = node.registry.get_internal(&internal);
            if internal != external && !node.registry.external_bound(&external) {
                warn!(
                    external_manifest_id = %external,
                    "watchdog tried closing session which was already closed"
                );
                return;
            }
            let stale = match &cxn {
                Some(c) => c.last_used().elapsed() > timeout,
                // Connection vanished underneath us; let remove() log it.
                None => true,
            };
            if stale {
                let _ = node.remove_stream(&external);
                return;
            }
        }
    });
}

/// Start the liveness kicker for one push request.
///
/// Refreshes the connection's `last_used` every 0.9×timeout until `done`
/// fires. The handler arms `done` through a drop guard, so the signal is
/// delivered exactly once on every exit path; extra cancels are no-ops.
pub fn start_liveness_kicker(node: Arc<IngestNode>, internal: ManifestId, done: CancellationToken) {
    tokio::spawn(async move {
        let interval = node.push_timeout.mul_f64(KICK_FRACTION);
        loop {
            tokio::select! {
                _ = done.cancelled() => return,
                _ = tokio::time::sleep(interval) => {
                    debug!(manifest_id = %internal, "refreshing connection liveness");
                    if let Some(cxn) = node.registry.get_internal(&internal) {
                        cxn.refresh_last_used();
                    }
                }
            }
        }
    });
}
