use crate::DomainResult;
use crate::ports::BoxFuture;

pub trait UserLookup: Send + Sync {
    fn get_reputation(&self, user_id: &str) -> BoxFuture<'_, DomainResult<f64>>;
}

/// Storage for reputation mutations. Implementations must apply the
/// arithmetic and the clamp in a single atomic storage operation.
pub trait ReputationRepository: Send + Sync {
    fn adjust_reputation(
        &self,
        user_id: &str,
        delta: f64,
        max: Option<f64>,
    ) -> BoxFuture<'_, DomainResult<f64>>;

    fn set_reputation(&self, user_id: &str, value: f64) -> BoxFuture<'_, DomainResult<f64>>;
}
