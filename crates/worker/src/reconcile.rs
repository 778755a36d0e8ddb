use akses_domain::DomainResult;
use akses_domain::error::DomainError;
use akses_domain::trust::TrustCore;

use crate::observability;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: u64,
    pub corrected: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Walks every report in id order and rewrites cached aggregates that no
/// longer match the ledgers.
pub struct ReconcileSweep {
    core: TrustCore,
    batch: usize,
}

impl ReconcileSweep {
    pub fn new(core: TrustCore, batch: usize) -> Self {
        Self {
            core,
            batch: batch.max(1),
        }
    }

    /// A failed page fetch aborts the sweep. Per-report failures are counted
    /// and the sweep moves on.
    pub async fn run(&self) -> DomainResult<SweepStats> {
        let mut stats = SweepStats::default();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.core.report_page(cursor.as_deref(), self.batch).await?;
            let Some(last) = page.last().cloned() else {
                break;
            };
            for report_id in &page {
                stats.scanned += 1;
                self.reconcile_one(report_id, &mut stats).await;
            }
            if page.len() < self.batch {
                break;
            }
            cursor = Some(last);
        }
        Ok(stats)
    }

    async fn reconcile_one(&self, report_id: &str, stats: &mut SweepStats) {
        match self.core.reconcile_report(report_id).await {
            Ok(outcome) if outcome.drifted() => {
                stats.corrected += 1;
                if outcome.vote_drift {
                    observability::register_drift_corrected("votes");
                }
                if outcome.duplicate_drift {
                    observability::register_drift_corrected("duplicate_flags");
                }
                observability::register_report_reconciled("corrected");
            }
            Ok(_) => observability::register_report_reconciled("clean"),
            // Deleted between listing and reconciling.
            Err(DomainError::NotFound(_)) => {
                stats.skipped += 1;
                observability::register_report_reconciled("skipped");
            }
            Err(err) => {
                stats.failed += 1;
                observability::register_report_reconciled("failed");
                tracing::warn!(
                    report_id,
                    error_kind = err.kind(),
                    error = %err,
                    "report reconcile failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use akses_domain::policy::TrustPolicy;
    use akses_domain::reports::{Report, TargetType, VoteCache};
    use akses_domain::votes::VoteValue;
    use akses_infra::bootstrap::MemoryStores;

    async fn seeded() -> (MemoryStores, TrustCore) {
        let stores = MemoryStores::new();
        for id in ["r1", "r2", "r3", "r4", "r5"] {
            stores
                .reports
                .upsert(Report::new(id, TargetType::Elevator, "elev-1"))
                .await;
        }
        stores.users.insert_user("u1", 4.0).await;
        let core = TrustCore::new(stores.ports(), TrustPolicy::default()).expect("core");
        (stores, core)
    }

    #[tokio::test]
    async fn sweep_pages_through_every_report() {
        let (_, core) = seeded().await;
        let stats = ReconcileSweep::new(core, 2).run().await.expect("sweep");
        assert_eq!(stats.scanned, 5);
        assert_eq!(stats.corrected, 0);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn sweep_rewrites_drifted_cache() {
        let (stores, core) = seeded().await;
        core.cast_vote("r3", "u1", VoteValue::Up)
            .await
            .expect("vote");

        let mut stale = stores.reports.get("r3").await.expect("report");
        stale.votes = VoteCache::default();
        stores.reports.upsert(stale).await;

        let stats = ReconcileSweep::new(core, 10).run().await.expect("sweep");
        assert_eq!(stats.corrected, 1);
        let fixed = stores.reports.get("r3").await.expect("report");
        assert_eq!(fixed.votes.up_vote, 1);
        assert_eq!(fixed.votes.weighted_score, 4.0);
    }
}
