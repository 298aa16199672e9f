//! Per-session tickers.
//!
//! Every active session owns one lightweight tokio task that periodically
//! refreshes the cached estimate and detects the deadline. The task is tied to
//! a [`CancellationToken`] stored next to the session, and every path that
//! removes a session cancels it. Tickers only hold a weak reference to the
//! engine, so dropping the last engine handle stops them too.
//!
//! Correctness never depends on ticks actually firing: status queries and
//! startup recovery re-derive everything from timestamps.

use std::sync::Weak;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::EngineInner;

/// What a ticker should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Continue,
    Stop,
}

/// Spawns the ticker for `entity_id` on the current tokio runtime.
pub(crate) fn spawn_ticker(
    engine: Weak<EngineInner>,
    entity_id: String,
    period: Duration,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let Some(engine) = engine.upgrade() else {
                break;
            };
            if engine.tick(&entity_id, &token).await == TickOutcome::Stop {
                break;
            }
        }

        debug!(entity_id = %entity_id, "session ticker stopped");
    });
}
