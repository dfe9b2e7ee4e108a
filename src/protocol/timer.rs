//! 定时对账：按间隔做一次受节流的刷新，再重试待处理的链接失败

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::LinkCoordinator;
use crate::core::LinkError;

pub fn spawn_reconciliation_timer(
    coordinator: Arc<LinkCoordinator>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // interval 不接受零周期
        let period = coordinator.timer_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            "Reconciliation timer started (every {:?})",
            period
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = run_tick(&coordinator, &cancel).await {
                        if e == LinkError::Cancelled {
                            break;
                        }
                        tracing::warn!("Scheduled reconciliation failed: {}", e);
                    }
                }
            }
        }
        tracing::info!("Reconciliation timer stopped");
    })
}

async fn run_tick(coordinator: &LinkCoordinator, cancel: &CancellationToken) -> Result<(), LinkError> {
    coordinator.refresh_if_needed(cancel).await?;
    let summary = coordinator.retry_pending_failures(cancel).await?;
    if summary.resolved > 0 || summary.still_failing > 0 {
        tracing::info!(
            "Background link retry: {} resolved, {} still failing, {} skipped",
            summary.resolved,
            summary.still_failing,
            summary.skipped
        );
    }
    Ok(())
}
