use crate::DomainResult;
use crate::error::DomainError;

pub const DEFAULT_MIN_WEIGHT: f64 = 1.0;
pub const DEFAULT_REPUTATION_MAX: f64 = 100.0;
pub const DEFAULT_AUTHOR_VOTE_DELTA: f64 = 1.0;

/// Tunables shared by the vote, flag and reputation services.
#[derive(Clone, Debug, PartialEq)]
pub struct TrustPolicy {
    /// Floor applied to every weight snapshot so a vote or flag always counts.
    pub min_weight: f64,
    /// Soft cap for author reputation adjustments. `None` leaves it unbounded.
    pub reputation_max: Option<f64>,
    /// Reputation moved per unit of vote value received by a report author.
    pub author_vote_delta: f64,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            min_weight: DEFAULT_MIN_WEIGHT,
            reputation_max: Some(DEFAULT_REPUTATION_MAX),
            author_vote_delta: DEFAULT_AUTHOR_VOTE_DELTA,
        }
    }
}

impl TrustPolicy {
    pub fn validate(&self) -> DomainResult<()> {
        if !self.min_weight.is_finite() || self.min_weight <= 0.0 {
            return Err(DomainError::invalid("min_weight must be a positive number"));
        }
        if let Some(max) = self.reputation_max {
            if !max.is_finite() || max < 0.0 {
                return Err(DomainError::invalid(
                    "reputation_max must be a finite non-negative number",
                ));
            }
        }
        if !self.author_vote_delta.is_finite() || self.author_vote_delta < 0.0 {
            return Err(DomainError::invalid(
                "author_vote_delta must be a finite non-negative number",
            ));
        }
        Ok(())
    }

    pub fn snapshot_weight(&self, reputation: f64) -> f64 {
        if reputation.is_finite() {
            reputation.max(self.min_weight)
        } else {
            self.min_weight
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_is_floored_at_min_weight() {
        let policy = TrustPolicy::default();
        assert_eq!(policy.snapshot_weight(0.0), 1.0);
        assert_eq!(policy.snapshot_weight(0.4), 1.0);
        assert_eq!(policy.snapshot_weight(10.0), 10.0);
        assert_eq!(policy.snapshot_weight(f64::NAN), 1.0);
    }

    #[test]
    fn rejects_non_positive_min_weight() {
        let policy = TrustPolicy {
            min_weight: 0.0,
            ..TrustPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
