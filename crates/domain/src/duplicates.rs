use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::aggregates::AggregateCacheService;
use crate::error::DomainError;
use crate::policy::TrustPolicy;
use crate::ports::PutOutcome;
use crate::ports::duplicates::DuplicateFlagRepository;
use crate::ports::reports::ReportLookup;
use crate::ports::users::UserLookup;
use crate::reports::Report;
use crate::util::{now_ms, require_id, uuid_v7_without_dashes};
use crate::votes::UPSERT_RETRY_LIMIT;

pub const MAX_CANDIDATES: usize = 5;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DuplicateFlag {
    pub flag_id: String,
    pub report_id: String,
    pub user_id: String,
    /// Empty when the flagger has no opinion on which report is canonical.
    pub canonical_report_id: String,
    /// Snapshotted once, when the flag is first created.
    pub weight: f64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// How a flag call treats the stored canonical id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CanonicalUpdate {
    /// Field omitted: leave the stored value alone.
    Keep,
    /// Empty or whitespace: clear the stored value.
    Clear,
    Set(String),
}

impl CanonicalUpdate {
    pub fn from_input(value: Option<&str>) -> Self {
        match value {
            None => Self::Keep,
            Some(raw) if raw.trim().is_empty() => Self::Clear,
            Some(raw) => Self::Set(raw.trim().to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DuplicateCandidate {
    pub report_id: String,
    pub count: u64,
    pub weight: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct DuplicateTotals {
    pub flag_count: u64,
    pub weight_total: f64,
    pub top_candidate_report_id: String,
    pub top_candidate_count: u64,
    pub top_candidate_weight: f64,
    pub candidates: Vec<DuplicateCandidate>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FlagReceipt {
    pub report_id: String,
    pub user_id: String,
    pub canonical_report_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct UserFlag {
    pub flagged: bool,
    pub canonical_report_id: String,
}

fn compare_candidates(left: &DuplicateCandidate, right: &DuplicateCandidate) -> Ordering {
    right
        .weight
        .total_cmp(&left.weight)
        .then_with(|| right.count.cmp(&left.count))
        .then_with(|| left.report_id.cmp(&right.report_id))
}

/// Full scan of a report's flag ledger. Flags without a canonical opinion
/// count toward the totals but nominate nobody.
pub fn tally_flags(flags: &[DuplicateFlag]) -> DuplicateTotals {
    let mut totals = DuplicateTotals::default();
    let mut grouped: HashMap<&str, DuplicateCandidate> = HashMap::new();
    for flag in flags {
        let weight = if flag.weight.is_finite() {
            flag.weight.max(0.0)
        } else {
            0.0
        };
        totals.flag_count += 1;
        totals.weight_total += weight;

        let canonical = flag.canonical_report_id.trim();
        if canonical.is_empty() {
            continue;
        }
        let entry = grouped
            .entry(canonical)
            .or_insert_with(|| DuplicateCandidate {
                report_id: canonical.to_string(),
                count: 0,
                weight: 0.0,
            });
        entry.count += 1;
        entry.weight += weight;
    }

    let mut candidates = grouped.into_values().collect::<Vec<_>>();
    candidates.sort_by(compare_candidates);
    candidates.truncate(MAX_CANDIDATES);
    if let Some(top) = candidates.first() {
        totals.top_candidate_report_id = top.report_id.clone();
        totals.top_candidate_count = top.count;
        totals.top_candidate_weight = top.weight;
    }
    totals.candidates = candidates;
    totals
}

#[derive(Clone)]
pub struct DuplicateFlagService {
    flags: Arc<dyn DuplicateFlagRepository>,
    reports: Arc<dyn ReportLookup>,
    users: Arc<dyn UserLookup>,
    cache: AggregateCacheService,
    policy: TrustPolicy,
}

impl DuplicateFlagService {
    pub fn new(
        flags: Arc<dyn DuplicateFlagRepository>,
        reports: Arc<dyn ReportLookup>,
        users: Arc<dyn UserLookup>,
        cache: AggregateCacheService,
        policy: TrustPolicy,
    ) -> Self {
        Self {
            flags,
            reports,
            users,
            cache,
            policy,
        }
    }

    pub async fn flag_duplicate(
        &self,
        report_id: &str,
        user_id: &str,
        canonical: CanonicalUpdate,
    ) -> DomainResult<FlagReceipt> {
        let report_id = require_id(report_id, "report_id")?;
        let user_id = require_id(user_id, "user_id")?;
        let report = self.reports.resolve(&report_id).await?;
        report.ensure_accepts_signal()?;

        // `None` leaves the stored canonical id untouched.
        let canonical = match canonical {
            CanonicalUpdate::Keep => None,
            CanonicalUpdate::Clear => Some(String::new()),
            CanonicalUpdate::Set(candidate) => {
                Some(self.resolve_canonical(&report, &candidate).await?)
            }
        };

        let mut stored = None;
        for attempt in 0..UPSERT_RETRY_LIMIT {
            let now = now_ms();
            match self.flags.get(&report.report_id, &user_id).await? {
                Some(existing) => {
                    let updated_at_ms = now.max(existing.updated_at_ms);
                    if let Some(updated) = self
                        .flags
                        .update(&report.report_id, &user_id, canonical.clone(), updated_at_ms)
                        .await?
                    {
                        stored = Some(updated);
                        break;
                    }
                }
                None => {
                    let reputation = self.users.get_reputation(&user_id).await?;
                    let flag = DuplicateFlag {
                        flag_id: uuid_v7_without_dashes(),
                        report_id: report.report_id.clone(),
                        user_id: user_id.clone(),
                        canonical_report_id: canonical.clone().unwrap_or_default(),
                        weight: self.policy.snapshot_weight(reputation),
                        created_at_ms: now,
                        updated_at_ms: now,
                    };
                    if let PutOutcome::Stored(inserted) = self.flags.insert(&flag).await? {
                        stored = Some(inserted);
                        break;
                    }
                }
            }
            tracing::debug!(
                report_id = %report.report_id,
                user_id = %user_id,
                attempt,
                "duplicate flag upsert raced with another writer, re-reading"
            );
        }
        let stored = stored.ok_or_else(|| {
            DomainError::Transient(format!(
                "duplicate flag upsert for report '{}' did not settle after {UPSERT_RETRY_LIMIT} attempts",
                report.report_id
            ))
        })?;

        self.cache.refresh_duplicates_or_log(&report.report_id).await;
        Ok(FlagReceipt {
            report_id: stored.report_id,
            user_id: stored.user_id,
            canonical_report_id: stored.canonical_report_id,
        })
    }

    pub async fn remove_flag(&self, report_id: &str, user_id: &str) -> DomainResult<()> {
        let report_id = require_id(report_id, "report_id")?;
        let user_id = require_id(user_id, "user_id")?;
        let report = self.reports.resolve(&report_id).await?;
        if self.flags.delete(&report.report_id, &user_id).await? {
            self.cache.refresh_duplicates_or_log(&report.report_id).await;
        }
        Ok(())
    }

    pub async fn get_totals(&self, report_id: &str) -> DomainResult<DuplicateTotals> {
        let report_id = require_id(report_id, "report_id")?;
        let report = self.reports.resolve(&report_id).await?;
        self.cache.duplicate_totals(&report.report_id).await
    }

    pub async fn get_user_flag(&self, report_id: &str, user_id: &str) -> DomainResult<UserFlag> {
        let report_id = require_id(report_id, "report_id")?;
        let user_id = require_id(user_id, "user_id")?;
        let report = self.reports.resolve(&report_id).await?;
        Ok(self
            .flags
            .get(&report.report_id, &user_id)
            .await?
            .map(|flag| UserFlag {
                flagged: true,
                canonical_report_id: flag.canonical_report_id,
            })
            .unwrap_or_default())
    }

    /// A nominated canonical report must exist, describe the same target and
    /// differ from the flagged report. Every failure is an invalid argument.
    async fn resolve_canonical(&self, report: &Report, candidate: &str) -> DomainResult<String> {
        if candidate == report.report_id {
            return Err(DomainError::invalid(
                "canonical_report_id cannot reference the flagged report",
            ));
        }
        let canonical = match self.reports.resolve(candidate).await {
            Ok(canonical) => canonical,
            Err(DomainError::NotFound(_)) => {
                return Err(DomainError::invalid(format!(
                    "canonical_report_id '{candidate}' does not exist"
                )));
            }
            Err(err) => return Err(err),
        };
        if canonical.report_id == report.report_id {
            return Err(DomainError::invalid(
                "canonical_report_id cannot reference the flagged report",
            ));
        }
        if !canonical.same_target(report) {
            return Err(DomainError::invalid(format!(
                "canonical_report_id '{candidate}' belongs to a different target"
            )));
        }
        Ok(canonical.report_id)
    }
}
