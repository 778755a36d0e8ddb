use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::duplicates::{DuplicateTotals, tally_flags};
use crate::ports::duplicates::DuplicateFlagRepository;
use crate::ports::reports::{ReportAggregateWriter, ReportLookup};
use crate::ports::votes::VoteRepository;
use crate::reports::{DuplicateCache, VoteCache};
use crate::util::require_id;
use crate::votes::{VoteTotals, tally_votes};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReconcileOutcome {
    pub report_id: String,
    pub vote_drift: bool,
    pub duplicate_drift: bool,
}

impl ReconcileOutcome {
    pub fn drifted(&self) -> bool {
        self.vote_drift || self.duplicate_drift
    }
}

/// Keeps the denormalized blocks on report records in step with the ledgers.
/// Totals are always recomputed by a full scan, never incremented.
#[derive(Clone)]
pub struct AggregateCacheService {
    votes: Arc<dyn VoteRepository>,
    flags: Arc<dyn DuplicateFlagRepository>,
    reports: Arc<dyn ReportLookup>,
    writer: Arc<dyn ReportAggregateWriter>,
}

impl AggregateCacheService {
    pub fn new(
        votes: Arc<dyn VoteRepository>,
        flags: Arc<dyn DuplicateFlagRepository>,
        reports: Arc<dyn ReportLookup>,
        writer: Arc<dyn ReportAggregateWriter>,
    ) -> Self {
        Self {
            votes,
            flags,
            reports,
            writer,
        }
    }

    pub async fn vote_totals(&self, report_id: &str) -> DomainResult<VoteTotals> {
        let votes = self.votes.list_by_report(report_id).await?;
        Ok(tally_votes(&votes))
    }

    pub async fn duplicate_totals(&self, report_id: &str) -> DomainResult<DuplicateTotals> {
        let flags = self.flags.list_by_report(report_id).await?;
        Ok(tally_flags(&flags))
    }

    pub async fn refresh_votes(&self, report_id: &str) -> DomainResult<VoteTotals> {
        let totals = self.vote_totals(report_id).await?;
        let cache = VoteCache::from(&totals);
        cache.validate()?;
        self.writer.write_vote_totals(report_id, &cache).await?;
        Ok(totals)
    }

    pub async fn refresh_duplicates(&self, report_id: &str) -> DomainResult<DuplicateTotals> {
        let totals = self.duplicate_totals(report_id).await?;
        let cache = DuplicateCache::from(&totals);
        cache.validate()?;
        self.writer.write_duplicate_totals(report_id, &cache).await?;
        Ok(totals)
    }

    /// Refresh after a committed ledger write. A failure leaves a stale cache
    /// for the reconciliation sweep instead of failing the caller.
    pub async fn refresh_votes_or_log(&self, report_id: &str) {
        if let Err(err) = self.refresh_votes(report_id).await {
            tracing::warn!(report_id, error = %err, "vote cache refresh failed");
        }
    }

    pub async fn refresh_duplicates_or_log(&self, report_id: &str) {
        if let Err(err) = self.refresh_duplicates(report_id).await {
            tracing::warn!(report_id, error = %err, "duplicate cache refresh failed");
        }
    }

    /// One page of report ids in ascending order, starting after `after`.
    pub async fn report_page(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> DomainResult<Vec<String>> {
        self.reports.list_report_ids(after, limit.max(1)).await
    }

    /// Compares both cached blocks with a fresh scan and rewrites the ones
    /// that drifted.
    pub async fn reconcile(&self, report_id: &str) -> DomainResult<ReconcileOutcome> {
        let report_id = require_id(report_id, "report_id")?;
        let report = self.reports.resolve(&report_id).await?;

        let fresh_votes = VoteCache::from(&self.vote_totals(&report.report_id).await?);
        let vote_drift = !report.votes.approx_eq(&fresh_votes);
        if vote_drift {
            fresh_votes.validate()?;
            self.writer
                .write_vote_totals(&report.report_id, &fresh_votes)
                .await?;
        }

        let fresh_flags = DuplicateCache::from(&self.duplicate_totals(&report.report_id).await?);
        let duplicate_drift = !report.duplicate_flags.approx_eq(&fresh_flags);
        if duplicate_drift {
            fresh_flags.validate()?;
            self.writer
                .write_duplicate_totals(&report.report_id, &fresh_flags)
                .await?;
        }

        if vote_drift || duplicate_drift {
            tracing::info!(
                report_id = %report.report_id,
                vote_drift,
                duplicate_drift,
                "aggregate cache drift corrected"
            );
        }
        Ok(ReconcileOutcome {
            report_id: report.report_id,
            vote_drift,
            duplicate_drift,
        })
    }
}
