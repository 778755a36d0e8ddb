use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::aggregates::AggregateCacheService;
use crate::error::DomainError;
use crate::ports::reports::{ReportLookup, ReportMergeWriter};
use crate::ports::votes::{RehomeOutcome, VoteRepository};
use crate::reports::Report;
use crate::util::require_id;
use crate::votes::{UPSERT_RETRY_LIMIT, Vote, VoteTotals};

/// Passes over the duplicate's ledger before giving up on votes that keep
/// arriving mid-merge.
pub const MERGE_SWEEP_LIMIT: usize = 3;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VoteMoveSummary {
    pub moved: u64,
    pub overwritten: u64,
    pub deleted: u64,
    pub invalid: u64,
}

impl VoteMoveSummary {
    pub fn total(&self) -> u64 {
        self.moved + self.overwritten + self.deleted + self.invalid
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MergeSummary {
    pub keep_report_id: String,
    pub dup_report_id: String,
    pub vote_move_summary: VoteMoveSummary,
    pub totals: VoteTotals,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConflictWinner {
    Keep,
    Dup,
}

/// The more recently updated vote wins; a tie keeps the keep-side row.
fn pick_winner(keep: &Vote, dup: &Vote) -> ConflictWinner {
    if dup.updated_at_ms > keep.updated_at_ms {
        ConflictWinner::Dup
    } else {
        ConflictWinner::Keep
    }
}

fn check_preconditions(keep: &Report, dup: &Report) -> DomainResult<()> {
    if keep.report_id == dup.report_id {
        return Err(DomainError::invalid(
            "keep and duplicate resolve to the same report",
        ));
    }
    if let Some(target) = &keep.merged_into {
        return Err(DomainError::conflict(format!(
            "keep report '{}' was already merged into '{target}'",
            keep.report_id
        )));
    }
    if let Some(target) = &dup.merged_into {
        if target != &keep.report_id {
            return Err(DomainError::conflict(format!(
                "duplicate report '{}' was already merged into '{target}'",
                dup.report_id
            )));
        }
    }
    Ok(())
}

/// Folds a duplicate report's vote ledger into a canonical report and hides
/// the duplicate. Every step either checks current state or is idempotent,
/// so re-running an interrupted merge converges on the same result.
#[derive(Clone)]
pub struct MergeService {
    votes: Arc<dyn VoteRepository>,
    reports: Arc<dyn ReportLookup>,
    writer: Arc<dyn ReportMergeWriter>,
    cache: AggregateCacheService,
}

impl MergeService {
    pub fn new(
        votes: Arc<dyn VoteRepository>,
        reports: Arc<dyn ReportLookup>,
        writer: Arc<dyn ReportMergeWriter>,
        cache: AggregateCacheService,
    ) -> Self {
        Self {
            votes,
            reports,
            writer,
            cache,
        }
    }

    pub async fn merge(
        &self,
        keep_report_id: &str,
        dup_report_id: &str,
    ) -> DomainResult<MergeSummary> {
        let keep_report_id = require_id(keep_report_id, "keep_report_id")?;
        let dup_report_id = require_id(dup_report_id, "dup_report_id")?;
        if keep_report_id == dup_report_id {
            return Err(DomainError::invalid(
                "keep_report_id and dup_report_id must differ",
            ));
        }

        let keep = self.reports.resolve(&keep_report_id).await?;
        let dup = self.reports.resolve(&dup_report_id).await?;
        check_preconditions(&keep, &dup)?;
        if !keep.same_target(&dup) {
            return Err(DomainError::invalid(format!(
                "cannot merge reports on different targets ({} {} vs {} {})",
                keep.target_type, keep.target_id, dup.target_type, dup.target_id
            )));
        }

        let mut summary = VoteMoveSummary::default();
        self.migrate_votes(&keep.report_id, &dup.report_id, &mut summary)
            .await?;

        // Nothing on either report record changes until migration is done;
        // re-check that neither side moved underneath us in the meantime.
        let keep_now = self.reports.resolve(&keep.report_id).await?;
        let dup_now = self.reports.resolve(&dup.report_id).await?;
        check_preconditions(&keep_now, &dup_now)?;
        if !keep_now.same_target(&dup_now) {
            return Err(DomainError::conflict(
                "report targets changed while the merge was running",
            ));
        }

        self.writer
            .mark_merged(&dup.report_id, &keep.report_id)
            .await?;
        self.writer
            .add_merged_from(&keep.report_id, &dup.report_id)
            .await?;

        // Casts that passed their merged check before the duplicate was
        // hidden may have landed after the first sweep. None can start now.
        self.migrate_votes(&keep.report_id, &dup.report_id, &mut summary)
            .await?;

        let totals = self.cache.refresh_votes(&keep.report_id).await?;
        self.cache.refresh_votes_or_log(&dup.report_id).await;

        tracing::info!(
            keep_report_id = %keep.report_id,
            dup_report_id = %dup.report_id,
            moved = summary.moved,
            overwritten = summary.overwritten,
            deleted = summary.deleted,
            invalid = summary.invalid,
            "reports merged"
        );
        Ok(MergeSummary {
            keep_report_id: keep.report_id,
            dup_report_id: dup.report_id,
            vote_move_summary: summary,
            totals,
        })
    }

    async fn migrate_votes(
        &self,
        keep_id: &str,
        dup_id: &str,
        summary: &mut VoteMoveSummary,
    ) -> DomainResult<()> {
        for _ in 0..MERGE_SWEEP_LIMIT {
            let pending = self.votes.list_by_report(dup_id).await?;
            if pending.is_empty() {
                return Ok(());
            }
            for vote in pending {
                if !vote.is_well_formed() {
                    if self.votes.delete_by_id(&vote.vote_id).await? {
                        summary.invalid += 1;
                    }
                    continue;
                }
                self.migrate_vote(keep_id, dup_id, &vote.user_id, summary)
                    .await?;
            }
        }

        if self.votes.list_by_report(dup_id).await?.is_empty() {
            return Ok(());
        }
        Err(DomainError::conflict(format!(
            "votes kept arriving on '{dup_id}' during merge"
        )))
    }

    async fn migrate_vote(
        &self,
        keep_id: &str,
        dup_id: &str,
        user_id: &str,
        summary: &mut VoteMoveSummary,
    ) -> DomainResult<()> {
        for _ in 0..UPSERT_RETRY_LIMIT {
            let occupant = match self.votes.get(keep_id, user_id).await? {
                Some(existing) => existing,
                None => match self.votes.rehome(dup_id, user_id, keep_id).await? {
                    RehomeOutcome::Moved(_) => {
                        summary.moved += 1;
                        return Ok(());
                    }
                    // Removed by its owner since we listed it.
                    RehomeOutcome::Missing => return Ok(()),
                    RehomeOutcome::Occupied(existing) => existing,
                },
            };

            // Compare against the duplicate row as it is now, not as listed.
            let Some(dup_vote) = self.votes.get(dup_id, user_id).await? else {
                return Ok(());
            };
            if !dup_vote.is_well_formed() {
                if self.votes.delete_by_id(&dup_vote.vote_id).await? {
                    summary.invalid += 1;
                }
                return Ok(());
            }

            match pick_winner(&occupant, &dup_vote) {
                ConflictWinner::Dup => {
                    let winner = Vote {
                        vote: dup_vote.vote,
                        weight: dup_vote.weight,
                        updated_at_ms: dup_vote.updated_at_ms,
                        ..occupant
                    };
                    if self.votes.replace(&winner).await?.is_none() {
                        // Keep-side row vanished; try re-homing again.
                        continue;
                    }
                    if self.votes.delete(dup_id, user_id).await? {
                        summary.overwritten += 1;
                    }
                }
                ConflictWinner::Keep => {
                    if self.votes.delete(dup_id, user_id).await? {
                        summary.deleted += 1;
                    }
                }
            }
            return Ok(());
        }
        Err(DomainError::conflict(format!(
            "could not settle vote of user '{user_id}' while merging '{dup_id}' into '{keep_id}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::TargetType;

    fn vote_at(report_id: &str, value: i8, updated_at_ms: i64) -> Vote {
        Vote {
            vote_id: format!("{report_id}-u"),
            report_id: report_id.to_string(),
            user_id: "u".to_string(),
            vote: value,
            weight: 1.0,
            created_at_ms: 0,
            updated_at_ms,
        }
    }

    #[test]
    fn later_vote_wins_and_ties_prefer_keep() {
        let keep = vote_at("A", 1, 10);
        assert_eq!(
            pick_winner(&keep, &vote_at("B", -1, 20)),
            ConflictWinner::Dup
        );
        assert_eq!(
            pick_winner(&keep, &vote_at("B", -1, 5)),
            ConflictWinner::Keep
        );
        assert_eq!(
            pick_winner(&keep, &vote_at("B", -1, 10)),
            ConflictWinner::Keep
        );
    }

    #[test]
    fn keep_side_that_was_merged_is_a_conflict() {
        let mut keep = Report::new("A", TargetType::Station, "s1");
        keep.merged_into = Some("Z".to_string());
        let dup = Report::new("B", TargetType::Station, "s1");
        assert!(matches!(
            check_preconditions(&keep, &dup),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn duplicate_already_pointing_at_keep_is_resumable() {
        let keep = Report::new("A", TargetType::Station, "s1");
        let mut dup = Report::new("B", TargetType::Station, "s1");
        dup.merged_into = Some("A".to_string());
        assert!(check_preconditions(&keep, &dup).is_ok());
        dup.merged_into = Some("C".to_string());
        assert!(matches!(
            check_preconditions(&keep, &dup),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn summary_total_adds_every_bucket() {
        let summary = VoteMoveSummary {
            moved: 2,
            overwritten: 1,
            deleted: 1,
            invalid: 1,
        };
        assert_eq!(summary.total(), 5);
    }
}
