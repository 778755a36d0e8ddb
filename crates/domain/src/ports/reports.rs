use crate::DomainResult;
use crate::ports::BoxFuture;
use crate::reports::{DuplicateCache, Report, VoteCache};

#[allow(clippy::needless_pass_by_value)]
pub trait ReportLookup: Send + Sync {
    /// Resolves a report by its stable id or a known alias. Missing reports
    /// fail with `NotFound`.
    fn resolve(&self, id_or_alias: &str) -> BoxFuture<'_, DomainResult<Report>>;

    /// Stable ids in ascending order, strictly after `after` when given.
    fn list_report_ids(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> BoxFuture<'_, DomainResult<Vec<String>>>;
}

pub trait ReportAggregateWriter: Send + Sync {
    fn write_vote_totals(
        &self,
        report_id: &str,
        totals: &VoteCache,
    ) -> BoxFuture<'_, DomainResult<()>>;

    fn write_duplicate_totals(
        &self,
        report_id: &str,
        totals: &DuplicateCache,
    ) -> BoxFuture<'_, DomainResult<()>>;
}

pub trait ReportMergeWriter: Send + Sync {
    /// Hides `dup_report_id` and points it at `keep_report_id`. Succeeds when
    /// the report already points at the same keep report; fails with
    /// `Conflict` when it points elsewhere.
    fn mark_merged(
        &self,
        dup_report_id: &str,
        keep_report_id: &str,
    ) -> BoxFuture<'_, DomainResult<Report>>;

    /// Set-union of `dup_report_id` into the keep report's `merged_from`.
    fn add_merged_from(
        &self,
        keep_report_id: &str,
        dup_report_id: &str,
    ) -> BoxFuture<'_, DomainResult<()>>;
}
