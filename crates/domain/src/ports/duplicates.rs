use crate::DomainResult;
use crate::duplicates::DuplicateFlag;
use crate::ports::{BoxFuture, PutOutcome};

#[allow(clippy::needless_pass_by_value)]
pub trait DuplicateFlagRepository: Send + Sync {
    fn get(
        &self,
        report_id: &str,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<DuplicateFlag>>>;

    fn list_by_report(&self, report_id: &str) -> BoxFuture<'_, DomainResult<Vec<DuplicateFlag>>>;

    /// Inserts a new flag; `(report_id, user_id)` is unique.
    fn insert(&self, flag: &DuplicateFlag)
    -> BoxFuture<'_, DomainResult<PutOutcome<DuplicateFlag>>>;

    /// Updates an existing flag without touching its weight. `canonical`
    /// `None` leaves the stored canonical id as is. `None` is returned when
    /// the row does not exist.
    fn update(
        &self,
        report_id: &str,
        user_id: &str,
        canonical: Option<String>,
        updated_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Option<DuplicateFlag>>>;

    fn delete(&self, report_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<bool>>;
}
