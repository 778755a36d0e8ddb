use std::sync::Arc;

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::users::ReputationRepository;
use crate::util::require_id;

#[derive(Clone)]
pub struct ReputationService {
    repository: Arc<dyn ReputationRepository>,
}

impl ReputationService {
    pub fn new(repository: Arc<dyn ReputationRepository>) -> Self {
        Self { repository }
    }

    /// Adds `delta` and clamps to `[0, max]` (or `[0, +inf)`) in one atomic
    /// storage update.
    pub async fn adjust(&self, user_id: &str, delta: f64, max: Option<f64>) -> DomainResult<f64> {
        let user_id = require_id(user_id, "user_id")?;
        if !delta.is_finite() {
            return Err(DomainError::invalid("reputation delta must be finite"));
        }
        if let Some(max) = max {
            if !max.is_finite() || max < 0.0 {
                return Err(DomainError::invalid(
                    "reputation max must be a finite non-negative number",
                ));
            }
        }
        self.repository
            .adjust_reputation(&user_id, delta, max)
            .await
    }

    pub async fn set(&self, user_id: &str, value: f64) -> DomainResult<f64> {
        let user_id = require_id(user_id, "user_id")?;
        validate_reputation_value(value)?;
        self.repository.set_reputation(&user_id, value).await
    }
}

pub fn validate_reputation_value(value: f64) -> DomainResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(DomainError::invalid(
            "reputation must be a finite non-negative number",
        ));
    }
    Ok(())
}

/// Clamp shared by storage implementations that compute the adjustment
/// themselves while holding a row lock.
pub fn clamp_reputation(current: f64, delta: f64, max: Option<f64>) -> f64 {
    let next = (current + delta).max(0.0);
    match max {
        Some(max) => next.min(max),
        None => next,
    }
}
