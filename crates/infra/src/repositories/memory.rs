use std::collections::HashMap;
use std::sync::Arc;

use akses_domain::DomainResult;
use akses_domain::duplicates::DuplicateFlag;
use akses_domain::error::DomainError;
use akses_domain::ports::duplicates::DuplicateFlagRepository;
use akses_domain::ports::reports::{ReportAggregateWriter, ReportLookup, ReportMergeWriter};
use akses_domain::ports::users::{ReputationRepository, UserLookup};
use akses_domain::ports::votes::{RehomeOutcome, VoteRepository};
use akses_domain::ports::{BoxFuture, PutOutcome};
use akses_domain::reports::{DuplicateCache, Report, ReportStatus, VoteCache};
use akses_domain::reputation::clamp_reputation;
use akses_domain::votes::Vote;
use tokio::sync::RwLock;

type LedgerKey = (String, String);

fn ledger_key(report_id: &str, user_id: &str) -> LedgerKey {
    (report_id.to_string(), user_id.to_string())
}

#[derive(Default)]
struct ReportState {
    reports: HashMap<String, Report>,
    aliases: HashMap<String, String>,
}

impl ReportState {
    fn resolve_id(&self, id_or_alias: &str) -> Option<String> {
        if self.reports.contains_key(id_or_alias) {
            return Some(id_or_alias.to_string());
        }
        self.aliases
            .get(id_or_alias)
            .filter(|report_id| self.reports.contains_key(*report_id))
            .cloned()
    }
}

/// Stand-in for the report CRUD layer.
#[derive(Default, Clone)]
pub struct InMemoryReportRepository {
    state: Arc<RwLock<ReportState>>,
}

impl InMemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a report record.
    pub async fn upsert(&self, report: Report) {
        self.state
            .write()
            .await
            .reports
            .insert(report.report_id.clone(), report);
    }

    pub async fn add_alias(&self, alias: impl Into<String>, report_id: impl Into<String>) {
        self.state
            .write()
            .await
            .aliases
            .insert(alias.into(), report_id.into());
    }

    pub async fn get(&self, report_id: &str) -> Option<Report> {
        self.state.read().await.reports.get(report_id).cloned()
    }
}

impl ReportLookup for InMemoryReportRepository {
    fn resolve(&self, id_or_alias: &str) -> BoxFuture<'_, DomainResult<Report>> {
        let key = id_or_alias.trim().to_string();
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            state
                .resolve_id(&key)
                .and_then(|report_id| state.reports.get(&report_id).cloned())
                .ok_or_else(|| DomainError::report_not_found(&key))
        })
    }

    fn list_report_ids(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> BoxFuture<'_, DomainResult<Vec<String>>> {
        let after = after.map(str::to_string);
        let state = self.state.clone();
        Box::pin(async move {
            let mut ids = state
                .read()
                .await
                .reports
                .keys()
                .filter(|report_id| {
                    after
                        .as_deref()
                        .is_none_or(|cursor| report_id.as_str() > cursor)
                })
                .cloned()
                .collect::<Vec<_>>();
            ids.sort();
            ids.truncate(limit);
            Ok(ids)
        })
    }
}

impl ReportAggregateWriter for InMemoryReportRepository {
    fn write_vote_totals(
        &self,
        report_id: &str,
        totals: &VoteCache,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let report_id = report_id.to_string();
        let totals = totals.clone();
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let report = state
                .reports
                .get_mut(&report_id)
                .ok_or_else(|| DomainError::report_not_found(&report_id))?;
            report.votes = totals;
            Ok(())
        })
    }

    fn write_duplicate_totals(
        &self,
        report_id: &str,
        totals: &DuplicateCache,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let report_id = report_id.to_string();
        let totals = totals.clone();
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let report = state
                .reports
                .get_mut(&report_id)
                .ok_or_else(|| DomainError::report_not_found(&report_id))?;
            report.duplicate_flags = totals;
            Ok(())
        })
    }
}

impl ReportMergeWriter for InMemoryReportRepository {
    fn mark_merged(
        &self,
        dup_report_id: &str,
        keep_report_id: &str,
    ) -> BoxFuture<'_, DomainResult<Report>> {
        let dup_report_id = dup_report_id.to_string();
        let keep_report_id = keep_report_id.to_string();
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let report = state
                .reports
                .get_mut(&dup_report_id)
                .ok_or_else(|| DomainError::report_not_found(&dup_report_id))?;
            match report.merged_into.as_deref() {
                Some(existing) if existing != keep_report_id => {
                    return Err(DomainError::conflict(format!(
                        "report '{dup_report_id}' is already merged into '{existing}'"
                    )));
                }
                _ => {}
            }
            report.status = ReportStatus::Hidden;
            report.merged_into = Some(keep_report_id);
            Ok(report.clone())
        })
    }

    fn add_merged_from(
        &self,
        keep_report_id: &str,
        dup_report_id: &str,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let keep_report_id = keep_report_id.to_string();
        let dup_report_id = dup_report_id.to_string();
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let report = state
                .reports
                .get_mut(&keep_report_id)
                .ok_or_else(|| DomainError::report_not_found(&keep_report_id))?;
            report.merged_from.insert(dup_report_id);
            Ok(())
        })
    }
}

/// Stand-in for the account layer. The write lock makes add-and-clamp atomic.
#[derive(Default, Clone)]
pub struct InMemoryUserRepository {
    reputations: Arc<RwLock<HashMap<String, f64>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user_id: impl Into<String>, reputation: f64) {
        self.reputations
            .write()
            .await
            .insert(user_id.into(), reputation);
    }
}

impl UserLookup for InMemoryUserRepository {
    fn get_reputation(&self, user_id: &str) -> BoxFuture<'_, DomainResult<f64>> {
        let user_id = user_id.to_string();
        let reputations = self.reputations.clone();
        Box::pin(async move {
            reputations
                .read()
                .await
                .get(&user_id)
                .copied()
                .ok_or_else(|| DomainError::user_not_found(&user_id))
        })
    }
}

impl ReputationRepository for InMemoryUserRepository {
    fn adjust_reputation(
        &self,
        user_id: &str,
        delta: f64,
        max: Option<f64>,
    ) -> BoxFuture<'_, DomainResult<f64>> {
        let user_id = user_id.to_string();
        let reputations = self.reputations.clone();
        Box::pin(async move {
            let mut reputations = reputations.write().await;
            let current = reputations
                .get_mut(&user_id)
                .ok_or_else(|| DomainError::user_not_found(&user_id))?;
            *current = clamp_reputation(*current, delta, max);
            Ok(*current)
        })
    }

    fn set_reputation(&self, user_id: &str, value: f64) -> BoxFuture<'_, DomainResult<f64>> {
        let user_id = user_id.to_string();
        let reputations = self.reputations.clone();
        Box::pin(async move {
            let mut reputations = reputations.write().await;
            let current = reputations
                .get_mut(&user_id)
                .ok_or_else(|| DomainError::user_not_found(&user_id))?;
            *current = value;
            Ok(value)
        })
    }
}

/// Keyed by `(report_id, user_id)`, which gives the same uniqueness the
/// database index provides.
#[derive(Default, Clone)]
pub struct InMemoryVoteRepository {
    rows: Arc<RwLock<HashMap<LedgerKey, Vote>>>,
}

impl InMemoryVoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

impl VoteRepository for InMemoryVoteRepository {
    fn get(&self, report_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<Option<Vote>>> {
        let key = ledger_key(report_id, user_id);
        let rows = self.rows.clone();
        Box::pin(async move { Ok(rows.read().await.get(&key).cloned()) })
    }

    fn list_by_report(&self, report_id: &str) -> BoxFuture<'_, DomainResult<Vec<Vote>>> {
        let report_id = report_id.to_string();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut votes = rows
                .read()
                .await
                .values()
                .filter(|vote| vote.report_id == report_id)
                .cloned()
                .collect::<Vec<_>>();
            votes.sort_by(|a, b| {
                a.created_at_ms
                    .cmp(&b.created_at_ms)
                    .then_with(|| a.vote_id.cmp(&b.vote_id))
            });
            Ok(votes)
        })
    }

    fn insert(&self, vote: &Vote) -> BoxFuture<'_, DomainResult<PutOutcome<Vote>>> {
        let vote = vote.clone();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut rows = rows.write().await;
            let key = ledger_key(&vote.report_id, &vote.user_id);
            if let Some(existing) = rows.get(&key) {
                return Ok(PutOutcome::Existing(existing.clone()));
            }
            rows.insert(key, vote.clone());
            Ok(PutOutcome::Stored(vote))
        })
    }

    fn replace(&self, vote: &Vote) -> BoxFuture<'_, DomainResult<Option<Vote>>> {
        let vote = vote.clone();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut rows = rows.write().await;
            let key = ledger_key(&vote.report_id, &vote.user_id);
            let Some(existing) = rows.get_mut(&key) else {
                return Ok(None);
            };
            existing.vote = vote.vote;
            existing.weight = vote.weight;
            existing.updated_at_ms = vote.updated_at_ms;
            Ok(Some(existing.clone()))
        })
    }

    fn delete(&self, report_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let key = ledger_key(report_id, user_id);
        let rows = self.rows.clone();
        Box::pin(async move { Ok(rows.write().await.remove(&key).is_some()) })
    }

    fn delete_by_id(&self, vote_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let vote_id = vote_id.to_string();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut rows = rows.write().await;
            let before = rows.len();
            rows.retain(|_, vote| vote.vote_id != vote_id);
            Ok(rows.len() < before)
        })
    }

    fn rehome(
        &self,
        from_report_id: &str,
        user_id: &str,
        to_report_id: &str,
    ) -> BoxFuture<'_, DomainResult<RehomeOutcome>> {
        let from = ledger_key(from_report_id, user_id);
        let to = ledger_key(to_report_id, user_id);
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut rows = rows.write().await;
            if let Some(occupant) = rows.get(&to) {
                return Ok(RehomeOutcome::Occupied(occupant.clone()));
            }
            let Some(mut vote) = rows.remove(&from) else {
                return Ok(RehomeOutcome::Missing);
            };
            vote.report_id = to.0.clone();
            rows.insert(to, vote.clone());
            Ok(RehomeOutcome::Moved(vote))
        })
    }
}

#[derive(Default, Clone)]
pub struct InMemoryDuplicateFlagRepository {
    rows: Arc<RwLock<HashMap<LedgerKey, DuplicateFlag>>>,
}

impl InMemoryDuplicateFlagRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DuplicateFlagRepository for InMemoryDuplicateFlagRepository {
    fn get(
        &self,
        report_id: &str,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<DuplicateFlag>>> {
        let key = ledger_key(report_id, user_id);
        let rows = self.rows.clone();
        Box::pin(async move { Ok(rows.read().await.get(&key).cloned()) })
    }

    fn list_by_report(&self, report_id: &str) -> BoxFuture<'_, DomainResult<Vec<DuplicateFlag>>> {
        let report_id = report_id.to_string();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut flags = rows
                .read()
                .await
                .values()
                .filter(|flag| flag.report_id == report_id)
                .cloned()
                .collect::<Vec<_>>();
            flags.sort_by(|a, b| {
                a.created_at_ms
                    .cmp(&b.created_at_ms)
                    .then_with(|| a.flag_id.cmp(&b.flag_id))
            });
            Ok(flags)
        })
    }

    fn insert(
        &self,
        flag: &DuplicateFlag,
    ) -> BoxFuture<'_, DomainResult<PutOutcome<DuplicateFlag>>> {
        let flag = flag.clone();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut rows = rows.write().await;
            let key = ledger_key(&flag.report_id, &flag.user_id);
            if let Some(existing) = rows.get(&key) {
                return Ok(PutOutcome::Existing(existing.clone()));
            }
            rows.insert(key, flag.clone());
            Ok(PutOutcome::Stored(flag))
        })
    }

    fn update(
        &self,
        report_id: &str,
        user_id: &str,
        canonical: Option<String>,
        updated_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Option<DuplicateFlag>>> {
        let key = ledger_key(report_id, user_id);
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut rows = rows.write().await;
            let Some(existing) = rows.get_mut(&key) else {
                return Ok(None);
            };
            if let Some(canonical) = canonical {
                existing.canonical_report_id = canonical;
            }
            existing.updated_at_ms = updated_at_ms;
            Ok(Some(existing.clone()))
        })
    }

    fn delete(&self, report_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let key = ledger_key(report_id, user_id);
        let rows = self.rows.clone();
        Box::pin(async move { Ok(rows.write().await.remove(&key).is_some()) })
    }
}
