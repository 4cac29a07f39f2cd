// Periodic expiry/archive pass
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::{AppError, AppResult};
use crate::services::PurgeService;

#[derive(Clone)]
pub struct PurgeExpiredJob {
    service: Arc<PurgeService>,
    timeout: Duration,
}

impl PurgeExpiredJob {
    pub fn new(service: Arc<PurgeService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// One bounded pass. Errors are returned, never retried here.
    pub async fn run_once(&self) -> AppResult<usize> {
        match tokio::time::timeout(self.timeout, self.service.purge_expired(Utc::now())).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Internal(format!(
                "purge expired timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Logs the outcome of one tick; the next tick picks up anything left.
    pub async fn tick(&self) {
        tracing::debug!("Starting purge expired job");
        match self.run_once().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(deleted_count = count, "Purge expired job completed"),
            Err(e) => tracing::error!(error = %e, "Purge expired job failed"),
        }
    }
}

/// Ticks `job` every `every` until `shutdown` flips to true. The first tick
/// fires immediately.
pub async fn run_scheduler(job: PurgeExpiredJob, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(interval_secs = every.as_secs(), "Starting purge scheduler");

    loop {
        tokio::select! {
            _ = interval.tick() => job.tick().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Stopping purge scheduler");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grumble::{GrumbleRepository, SqliteGrumbleRepository, TimelineFilter};
    use crate::services::test_support::{harness, FaultyGrumbles};

    #[tokio::test]
    async fn run_once_archives_expired_rows() {
        let h = harness().await;
        let author = h.user().await;
        // Posted in the past, so already expired at wall-clock now
        h.post_as(&author, None).await;

        let job = PurgeExpiredJob::new(h.services.purge.clone(), Duration::from_secs(30));
        assert_eq!(job.run_once().await.unwrap(), 1);
        assert_eq!(job.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_once_times_out_without_archiving() {
        let h = harness().await;
        let author = h.user().await;
        h.post_as(&author, None).await;

        let slow = FaultyGrumbles::new(SqliteGrumbleRepository::new(h.pool.clone(), h.clock))
            .archive_delay(Duration::from_secs(5));
        let job = PurgeExpiredJob::new(
            Arc::new(PurgeService::new(Arc::new(slow))),
            Duration::from_millis(50),
        );

        let err = job.run_once().await.unwrap_err();
        assert!(matches!(err, AppError::Internal(ref m) if m.contains("timed out")));

        let live = h
            .grumble_repo
            .count_timeline(&TimelineFilter::default())
            .await
            .unwrap();
        assert_eq!(live, 1);

        // The next healthy run picks the row up
        let healthy = PurgeExpiredJob::new(h.services.purge.clone(), Duration::from_secs(30));
        assert_eq!(healthy.run_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scheduler_stops_on_shutdown() {
        let h = harness().await;
        let author = h.user().await;
        h.post_as(&author, None).await;

        let job = PurgeExpiredJob::new(h.services.purge.clone(), Duration::from_secs(30));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scheduler(job, Duration::from_secs(3600), rx));

        // The immediate first tick archives the row
        let mut archived = false;
        for _ in 0..100 {
            let live = h
                .grumble_repo
                .count_timeline(&TimelineFilter::default())
                .await
                .unwrap();
            if live == 0 {
                archived = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(archived);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
