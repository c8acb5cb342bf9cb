use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::app::photos::PhotoService;
use crate::infra::catalog::Catalog;

const ERROR_BACKOFF_MS: u64 = 1000;

/// Totals for one sweep over the catalog.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub discarded: usize,
    pub failed: usize,
}

/// Finds photo records whose artifacts went missing (a crash between the
/// record write and the file writes, or files removed by hand) and deletes
/// them. Records touched within the grace period are left alone so an
/// in-flight ingest is never mistaken for an orphan.
pub struct Reconciler {
    catalog: Arc<dyn Catalog>,
    photos: PhotoService,
    grace: Duration,
    batch_size: i64,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        photos: PhotoService,
        grace: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            catalog,
            photos,
            grace,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(&self, interval: Duration) -> Result<()> {
        info!(
            interval_seconds = interval.as_secs(),
            grace_seconds = self.grace.as_secs(),
            "reconciler started"
        );
        loop {
            match self.sweep().await {
                Ok(report) => {
                    info!(
                        scanned = report.scanned,
                        discarded = report.discarded,
                        failed = report.failed,
                        "reconcile pass finished"
                    );
                    tokio::time::sleep(interval).await;
                }
                Err(err) => {
                    warn!(error = ?err, "reconcile pass failed, backing off");
                    tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
                }
            }
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let cutoff = OffsetDateTime::now_utc() - self.grace;
        let mut report = SweepReport::default();
        let mut after = None;

        loop {
            let batch = self
                .catalog
                .photos_updated_before(cutoff, after, self.batch_size)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            after = Some(last.id);
            let exhausted = (batch.len() as i64) < self.batch_size;

            for photo in &batch {
                report.scanned += 1;
                match self.photos.discard_if_incomplete(photo).await {
                    Ok(true) => report.discarded += 1,
                    Ok(false) => {}
                    Err(err) => {
                        report.failed += 1;
                        error!(error = ?err, photo_id = %photo.id, "failed to reconcile photo");
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        Ok(report)
    }
}
