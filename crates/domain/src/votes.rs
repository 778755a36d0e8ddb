use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::aggregates::AggregateCacheService;
use crate::error::DomainError;
use crate::policy::TrustPolicy;
use crate::ports::PutOutcome;
use crate::ports::reports::ReportLookup;
use crate::ports::users::UserLookup;
use crate::ports::votes::VoteRepository;
use crate::reports::Report;
use crate::reputation::ReputationService;
use crate::util::{now_ms, require_id, uuid_v7_without_dashes};

/// Bound on read-then-resolve rounds after a uniqueness collision.
pub const UPSERT_RETRY_LIMIT: usize = 3;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            1 => Some(Self::Up),
            -1 => Some(Self::Down),
            _ => None,
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(DomainError::invalid(format!(
                "vote must be +1 or -1, got {other}"
            ))),
        }
    }
}

/// One ledger row. `vote` is kept raw so rows written by older clients that
/// fall outside +1/-1 can still be loaded and cleaned up.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub vote_id: String,
    pub report_id: String,
    pub user_id: String,
    pub vote: i8,
    pub weight: f64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Vote {
    pub fn new(
        report_id: impl Into<String>,
        user_id: impl Into<String>,
        value: VoteValue,
        weight: f64,
        now_ms: i64,
    ) -> Self {
        Self {
            vote_id: uuid_v7_without_dashes(),
            report_id: report_id.into(),
            user_id: user_id.into(),
            vote: value.as_i8(),
            weight,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub fn value(&self) -> Option<VoteValue> {
        VoteValue::from_i8(self.vote)
    }

    pub fn is_well_formed(&self) -> bool {
        !self.user_id.trim().is_empty() && self.value().is_some() && self.weight.is_finite()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct VoteTotals {
    pub up_votes: u64,
    pub down_votes: u64,
    pub vote_count: u64,
    pub raw_score: i64,
    pub up_weight: f64,
    pub down_weight: f64,
    pub weighted_score: f64,
}

/// Full scan of a report's vote ledger. Malformed rows do not count.
pub fn tally_votes(votes: &[Vote]) -> VoteTotals {
    let mut totals = VoteTotals::default();
    for vote in votes.iter().filter(|vote| vote.is_well_formed()) {
        let weight = vote.weight.max(0.0);
        match vote.value() {
            Some(VoteValue::Up) => {
                totals.up_votes += 1;
                totals.up_weight += weight;
            }
            Some(VoteValue::Down) => {
                totals.down_votes += 1;
                totals.down_weight += weight;
            }
            None => {}
        }
    }
    totals.vote_count = totals.up_votes + totals.down_votes;
    totals.raw_score = totals.up_votes as i64 - totals.down_votes as i64;
    totals.weighted_score = totals.up_weight - totals.down_weight;
    totals
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CastReceipt {
    pub report_id: String,
    pub user_id: String,
    pub vote: VoteValue,
    pub weight: f64,
}

#[derive(Clone)]
pub struct VoteService {
    votes: Arc<dyn VoteRepository>,
    reports: Arc<dyn ReportLookup>,
    users: Arc<dyn UserLookup>,
    reputation: ReputationService,
    cache: AggregateCacheService,
    policy: TrustPolicy,
}

impl VoteService {
    pub fn new(
        votes: Arc<dyn VoteRepository>,
        reports: Arc<dyn ReportLookup>,
        users: Arc<dyn UserLookup>,
        reputation: ReputationService,
        cache: AggregateCacheService,
        policy: TrustPolicy,
    ) -> Self {
        Self {
            votes,
            reports,
            users,
            reputation,
            cache,
            policy,
        }
    }

    pub async fn cast_vote(
        &self,
        report_id: &str,
        user_id: &str,
        value: VoteValue,
    ) -> DomainResult<CastReceipt> {
        let report_id = require_id(report_id, "report_id")?;
        let user_id = require_id(user_id, "user_id")?;
        let report = self.reports.resolve(&report_id).await?;
        report.ensure_accepts_signal()?;

        let reputation = self.users.get_reputation(&user_id).await?;
        let weight = self.policy.snapshot_weight(reputation);

        let mut previous = 0i8;
        let mut stored = None;
        for attempt in 0..UPSERT_RETRY_LIMIT {
            let now = now_ms();
            match self.votes.get(&report.report_id, &user_id).await? {
                Some(existing) => {
                    let replacement = Vote {
                        vote: value.as_i8(),
                        weight,
                        updated_at_ms: now.max(existing.updated_at_ms),
                        ..existing.clone()
                    };
                    if let Some(updated) = self.votes.replace(&replacement).await? {
                        previous = existing.value().map(VoteValue::as_i8).unwrap_or(0);
                        stored = Some(updated);
                        break;
                    }
                }
                None => {
                    let fresh = Vote::new(
                        report.report_id.clone(),
                        user_id.clone(),
                        value,
                        weight,
                        now,
                    );
                    if let PutOutcome::Stored(inserted) = self.votes.insert(&fresh).await? {
                        stored = Some(inserted);
                        break;
                    }
                }
            }
            tracing::debug!(
                report_id = %report.report_id,
                user_id = %user_id,
                attempt,
                "vote upsert raced with another writer, re-reading"
            );
        }
        let stored = stored.ok_or_else(|| {
            DomainError::Transient(format!(
                "vote upsert for report '{}' did not settle after {UPSERT_RETRY_LIMIT} attempts",
                report.report_id
            ))
        })?;

        // A merge may have hidden the report while this cast was in flight.
        let current = self.reports.resolve(&report.report_id).await?;
        if let Some(keep_id) = current.merged_into.as_deref() {
            if self.votes.delete(&report.report_id, &user_id).await? {
                self.cache.refresh_votes_or_log(&report.report_id).await;
                return Err(DomainError::conflict(format!(
                    "report '{}' was merged into '{keep_id}' while the vote was cast",
                    report.report_id
                )));
            }
            // The merge already carried this vote over to the keep report.
            self.cache.refresh_votes_or_log(keep_id).await;
            return Ok(CastReceipt {
                report_id: keep_id.to_string(),
                user_id: stored.user_id,
                vote: value,
                weight: stored.weight,
            });
        }

        self.cache.refresh_votes_or_log(&report.report_id).await;
        self.adjust_author(&report, &user_id, previous, value.as_i8())
            .await;

        Ok(CastReceipt {
            report_id: stored.report_id,
            user_id: stored.user_id,
            vote: value,
            weight: stored.weight,
        })
    }

    pub async fn remove_vote(&self, report_id: &str, user_id: &str) -> DomainResult<()> {
        let report_id = require_id(report_id, "report_id")?;
        let user_id = require_id(user_id, "user_id")?;
        let report = self.reports.resolve(&report_id).await?;

        let Some(existing) = self.votes.get(&report.report_id, &user_id).await? else {
            return Ok(());
        };
        if !self.votes.delete(&report.report_id, &user_id).await? {
            return Ok(());
        }

        self.cache.refresh_votes_or_log(&report.report_id).await;
        let previous = existing.value().map(VoteValue::as_i8).unwrap_or(0);
        self.adjust_author(&report, &user_id, previous, 0).await;
        Ok(())
    }

    pub async fn get_totals(&self, report_id: &str) -> DomainResult<VoteTotals> {
        let report_id = require_id(report_id, "report_id")?;
        let report = self.reports.resolve(&report_id).await?;
        self.cache.vote_totals(&report.report_id).await
    }

    /// `-1`, `0` (no vote) or `+1`.
    pub async fn get_user_vote(&self, report_id: &str, user_id: &str) -> DomainResult<i8> {
        let report_id = require_id(report_id, "report_id")?;
        let user_id = require_id(user_id, "user_id")?;
        let report = self.reports.resolve(&report_id).await?;
        Ok(self
            .votes
            .get(&report.report_id, &user_id)
            .await?
            .and_then(|vote| vote.value())
            .map(VoteValue::as_i8)
            .unwrap_or(0))
    }

    /// Rewards or penalizes the report author by the change in vote value.
    /// Never fails the vote itself.
    async fn adjust_author(&self, report: &Report, voter_id: &str, previous: i8, next: i8) {
        let Some(author_id) = report.author_id.as_deref() else {
            return;
        };
        if author_id == voter_id {
            return;
        }
        let delta = f64::from(next - previous) * self.policy.author_vote_delta;
        if delta == 0.0 {
            return;
        }
        if let Err(err) = self
            .reputation
            .adjust(author_id, delta, self.policy.reputation_max)
            .await
        {
            tracing::warn!(
                report_id = %report.report_id,
                author_id,
                delta,
                error = %err,
                "author reputation adjustment failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(user_id: &str, value: i8, weight: f64) -> Vote {
        Vote {
            vote_id: format!("v-{user_id}"),
            report_id: "r1".to_string(),
            user_id: user_id.to_string(),
            vote: value,
            weight,
            created_at_ms: 1,
            updated_at_ms: 1,
        }
    }

    #[test]
    fn tally_matches_weighted_scenario() {
        let totals = tally_votes(&[vote("user-1", 1, 1.0), vote("user-2", -1, 10.0)]);
        assert_eq!(totals.up_votes, 1);
        assert_eq!(totals.down_votes, 1);
        assert_eq!(totals.vote_count, 2);
        assert_eq!(totals.raw_score, 0);
        assert_eq!(totals.weighted_score, -9.0);
    }

    #[test]
    fn tally_skips_malformed_rows() {
        let totals = tally_votes(&[
            vote("user-1", 1, 2.0),
            vote("user-2", 3, 5.0),
            vote(" ", 1, 5.0),
        ]);
        assert_eq!(totals.vote_count, 1);
        assert_eq!(totals.up_weight, 2.0);
    }

    #[test]
    fn empty_ledger_tallies_to_zero() {
        assert_eq!(tally_votes(&[]), VoteTotals::default());
    }

    #[test]
    fn vote_value_accepts_only_unit_values() {
        assert_eq!(VoteValue::try_from(1), Ok(VoteValue::Up));
        assert_eq!(VoteValue::try_from(-1), Ok(VoteValue::Down));
        assert!(VoteValue::try_from(0).is_err());
        assert!(VoteValue::try_from(2).is_err());
    }
}
