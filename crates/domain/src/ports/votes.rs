use crate::DomainResult;
use crate::ports::{BoxFuture, PutOutcome};
use crate::votes::Vote;

#[derive(Debug, Clone, PartialEq)]
pub enum RehomeOutcome {
    Moved(Vote),
    /// The destination already holds a vote for the same user.
    Occupied(Vote),
    /// The source row is gone.
    Missing,
}

#[allow(clippy::needless_pass_by_value)]
pub trait VoteRepository: Send + Sync {
    fn get(&self, report_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<Option<Vote>>>;

    fn list_by_report(&self, report_id: &str) -> BoxFuture<'_, DomainResult<Vec<Vote>>>;

    /// Inserts a new row; `(report_id, user_id)` is unique.
    fn insert(&self, vote: &Vote) -> BoxFuture<'_, DomainResult<PutOutcome<Vote>>>;

    /// Overwrites value, weight and `updated_at_ms` of the row keyed by the
    /// vote's `(report_id, user_id)`, keeping its identity. `None` when the
    /// row does not exist.
    fn replace(&self, vote: &Vote) -> BoxFuture<'_, DomainResult<Option<Vote>>>;

    fn delete(&self, report_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<bool>>;

    fn delete_by_id(&self, vote_id: &str) -> BoxFuture<'_, DomainResult<bool>>;

    /// Moves the user's vote from one report to another without touching
    /// value or weight.
    fn rehome(
        &self,
        from_report_id: &str,
        user_id: &str,
        to_report_id: &str,
    ) -> BoxFuture<'_, DomainResult<RehomeOutcome>>;
}
