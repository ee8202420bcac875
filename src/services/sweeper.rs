//! Periodic overdue sweep

use std::time::Duration;

use tokio::task::JoinHandle;

use super::ledger::LendingLedger;

/// Spawn the sweep loop. Each tick marks overdue loans and re-attempts
/// queued compensations. Returns `None` when the interval is zero.
pub fn spawn(ledger: LendingLedger, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        tracing::info!("Periodic overdue sweep disabled");
        return None;
    }

    let period = Duration::from_secs(interval_secs);
    tracing::info!("Periodic overdue sweep every {:?}", period);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tick(&ledger).await;
        }
    }))
}

async fn tick(ledger: &LendingLedger) {
    match ledger.sweep_now().await {
        Ok(swept) => tracing::debug!("Sweep tick: {} loan(s) now overdue", swept.len()),
        Err(e) => tracing::warn!("Sweep tick failed: {}", e),
    }

    let applied = ledger.retry_pending_compensations().await;
    if applied > 0 {
        tracing::info!("Sweep tick applied {} pending release(s)", applied);
    }
}
