use std::sync::Arc;
use std::time::Duration;

use akses_domain::DomainResult;
use akses_domain::duplicates::DuplicateFlag;
use akses_domain::error::DomainError;
use akses_domain::ports::duplicates::DuplicateFlagRepository;
use akses_domain::ports::reports::{ReportAggregateWriter, ReportLookup, ReportMergeWriter};
use akses_domain::ports::users::{ReputationRepository, UserLookup};
use akses_domain::ports::votes::{RehomeOutcome, VoteRepository};
use akses_domain::ports::{BoxFuture, PutOutcome};
use akses_domain::reports::{DuplicateCache, Report, ReportStatus, TargetType, VoteCache};
use akses_domain::votes::Vote;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json, to_value};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;

use crate::db::bounded;

const REPORT_FIELDS: &str = "report_id, target_type, target_id, author_id, text, status, \
     votes, duplicate_flags, merged_into, merged_from";
const VOTE_FIELDS: &str =
    "vote_id, report_id, user_id, vote, weight, created_at_ms, updated_at_ms";
const FLAG_FIELDS: &str = "flag_id, report_id, user_id, canonical_report_id, weight, \
     created_at_ms, updated_at_ms";

/// Unique index and record id collisions. Table and index names such as
/// `duplicate_flag` must not match.
fn is_uniqueness_violation(error_message: &str) -> bool {
    let error_message = error_message.to_lowercase();
    (error_message.contains("index") && error_message.contains("already contains"))
        || (error_message.contains("record") && error_message.contains("already exists"))
}

fn map_surreal_error(err: surrealdb::Error) -> DomainError {
    let error_message = err.to_string();
    if is_uniqueness_violation(&error_message) {
        return DomainError::Conflict(format!("uniqueness violation: {error_message}"));
    }
    DomainError::Transient(format!("surreal query failed: {error_message}"))
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, what: &str) -> DomainResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value::<T>(row)
                .map_err(|err| DomainError::invalid(format!("invalid {what} row: {err}")))
        })
        .collect()
}

/// Shared connection plus the deadline applied to every statement.
#[derive(Clone)]
struct SurrealHandle {
    client: Arc<Surreal<Client>>,
    timeout: Duration,
}

impl SurrealHandle {
    async fn rows(
        &self,
        operation: &'static str,
        sql: String,
        bindings: Vec<(&'static str, Value)>,
    ) -> DomainResult<Vec<Value>> {
        let client = self.client.clone();
        bounded(self.timeout, operation, async move {
            let mut query = client.query(sql);
            for (name, value) in bindings {
                query = query.bind((name, value));
            }
            let mut response = query.await.map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(map_surreal_error)?;
            Ok(rows)
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct SurrealReportRow {
    report_id: String,
    target_type: String,
    target_id: String,
    author_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    votes: Option<VoteCache>,
    #[serde(default)]
    duplicate_flags: Option<DuplicateCache>,
    merged_into: Option<String>,
    #[serde(default)]
    merged_from: Option<Vec<String>>,
}

impl SurrealReportRow {
    fn into_report(self) -> DomainResult<Report> {
        let target_type = self.target_type.parse::<TargetType>().map_err(|_| {
            DomainError::invalid(format!("invalid report target_type '{}'", self.target_type))
        })?;
        let status = match self.status.as_deref() {
            Some(value) => value.parse::<ReportStatus>()?,
            None => ReportStatus::Open,
        };
        Ok(Report {
            report_id: self.report_id,
            target_type,
            target_id: self.target_id,
            author_id: self.author_id.filter(|id| !id.trim().is_empty()),
            text: self.text.unwrap_or_default(),
            status,
            votes: self.votes.unwrap_or_default(),
            duplicate_flags: self.duplicate_flags.unwrap_or_default(),
            merged_into: self.merged_into.filter(|id| !id.is_empty()),
            merged_from: self.merged_from.unwrap_or_default().into_iter().collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SurrealReportIdRow {
    report_id: String,
}

#[derive(Clone)]
pub struct SurrealReportRepository {
    handle: SurrealHandle,
}

impl SurrealReportRepository {
    pub fn with_client(client: Arc<Surreal<Client>>, timeout: Duration) -> Self {
        Self {
            handle: SurrealHandle { client, timeout },
        }
    }

    async fn find_by_id(&self, report_id: &str) -> DomainResult<Option<Report>> {
        let rows = self
            .handle
            .rows(
                "report lookup",
                format!("SELECT {REPORT_FIELDS} FROM report WHERE report_id = $report_id LIMIT 1"),
                vec![("report_id", json!(report_id))],
            )
            .await?;
        decode_rows::<SurrealReportRow>(rows, "report")?
            .into_iter()
            .next()
            .map(SurrealReportRow::into_report)
            .transpose()
    }

    async fn find_alias_target(&self, alias: &str) -> DomainResult<Option<String>> {
        let rows = self
            .handle
            .rows(
                "report alias lookup",
                "SELECT report_id FROM report_alias WHERE alias = $alias LIMIT 1".to_string(),
                vec![("alias", json!(alias))],
            )
            .await?;
        Ok(decode_rows::<SurrealReportIdRow>(rows, "report alias")?
            .into_iter()
            .next()
            .map(|row| row.report_id))
    }

    async fn write_block(
        &self,
        operation: &'static str,
        field: &'static str,
        report_id: String,
        block: Value,
    ) -> DomainResult<()> {
        let rows = self
            .handle
            .rows(
                operation,
                format!(
                    "UPDATE report SET {field} = $block WHERE report_id = $report_id \
                     RETURN report_id"
                ),
                vec![("report_id", json!(report_id)), ("block", block)],
            )
            .await?;
        if rows.is_empty() {
            return Err(DomainError::report_not_found(&report_id));
        }
        Ok(())
    }
}

impl ReportLookup for SurrealReportRepository {
    fn resolve(&self, id_or_alias: &str) -> BoxFuture<'_, DomainResult<Report>> {
        let key = id_or_alias.trim().to_string();
        Box::pin(async move {
            if let Some(report) = self.find_by_id(&key).await? {
                return Ok(report);
            }
            if let Some(target) = self.find_alias_target(&key).await? {
                if let Some(report) = self.find_by_id(&target).await? {
                    return Ok(report);
                }
            }
            Err(DomainError::report_not_found(&key))
        })
    }

    fn list_report_ids(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> BoxFuture<'_, DomainResult<Vec<String>>> {
        let after = after.map(str::to_string);
        let limit = limit as i64;
        Box::pin(async move {
            let (sql, bindings) = match after {
                Some(cursor) => (
                    "SELECT report_id FROM report WHERE report_id > $after \
                     ORDER BY report_id ASC LIMIT $limit",
                    vec![("after", json!(cursor)), ("limit", json!(limit))],
                ),
                None => (
                    "SELECT report_id FROM report ORDER BY report_id ASC LIMIT $limit",
                    vec![("limit", json!(limit))],
                ),
            };
            let rows = self
                .handle
                .rows("report id page", sql.to_string(), bindings)
                .await?;
            let mut ids = decode_rows::<SurrealReportIdRow>(rows, "report id")?
                .into_iter()
                .map(|row| row.report_id)
                .collect::<Vec<_>>();
            ids.sort();
            Ok(ids)
        })
    }
}

impl ReportAggregateWriter for SurrealReportRepository {
    fn write_vote_totals(
        &self,
        report_id: &str,
        totals: &VoteCache,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let report_id = report_id.to_string();
        let block = to_value(totals);
        Box::pin(async move {
            let block = block
                .map_err(|err| DomainError::invalid(format!("invalid vote cache: {err}")))?;
            self.write_block("vote cache write", "votes", report_id, block)
                .await
        })
    }

    fn write_duplicate_totals(
        &self,
        report_id: &str,
        totals: &DuplicateCache,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let report_id = report_id.to_string();
        let block = to_value(totals);
        Box::pin(async move {
            let block = block
                .map_err(|err| DomainError::invalid(format!("invalid duplicate cache: {err}")))?;
            self.write_block(
                "duplicate cache write",
                "duplicate_flags",
                report_id,
                block,
            )
            .await
        })
    }
}

impl ReportMergeWriter for SurrealReportRepository {
    fn mark_merged(
        &self,
        dup_report_id: &str,
        keep_report_id: &str,
    ) -> BoxFuture<'_, DomainResult<Report>> {
        let dup_report_id = dup_report_id.to_string();
        let keep_report_id = keep_report_id.to_string();
        Box::pin(async move {
            let rows = self
                .handle
                .rows(
                    "mark merged",
                    format!(
                        "UPDATE report SET status = 'hidden', merged_into = $keep \
                         WHERE report_id = $dup \
                           AND (merged_into = NONE OR merged_into = NULL OR merged_into = $keep) \
                         RETURN {REPORT_FIELDS}"
                    ),
                    vec![
                        ("dup", json!(dup_report_id)),
                        ("keep", json!(keep_report_id)),
                    ],
                )
                .await?;
            if let Some(row) = decode_rows::<SurrealReportRow>(rows, "report")?
                .into_iter()
                .next()
            {
                return row.into_report();
            }
            match self.find_by_id(&dup_report_id).await? {
                None => Err(DomainError::report_not_found(&dup_report_id)),
                Some(current) => Err(DomainError::conflict(format!(
                    "report '{dup_report_id}' is already merged into '{}'",
                    current.merged_into.unwrap_or_default()
                ))),
            }
        })
    }

    fn add_merged_from(
        &self,
        keep_report_id: &str,
        dup_report_id: &str,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let keep_report_id = keep_report_id.to_string();
        let dup_report_id = dup_report_id.to_string();
        Box::pin(async move {
            let rows = self
                .handle
                .rows(
                    "merged_from union",
                    "UPDATE report SET merged_from = array::union(merged_from ?? [], [$dup]) \
                     WHERE report_id = $keep RETURN report_id"
                        .to_string(),
                    vec![
                        ("keep", json!(keep_report_id)),
                        ("dup", json!(dup_report_id)),
                    ],
                )
                .await?;
            if rows.is_empty() {
                return Err(DomainError::report_not_found(&keep_report_id));
            }
            Ok(())
        })
    }
}

fn default_reputation() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct SurrealReputationRow {
    #[serde(default = "default_reputation")]
    reputation: f64,
}

#[derive(Clone)]
pub struct SurrealUserRepository {
    handle: SurrealHandle,
}

impl SurrealUserRepository {
    pub fn with_client(client: Arc<Surreal<Client>>, timeout: Duration) -> Self {
        Self {
            handle: SurrealHandle { client, timeout },
        }
    }

    async fn reputation_query(
        &self,
        operation: &'static str,
        user_id: String,
        sql: &'static str,
        mut bindings: Vec<(&'static str, Value)>,
    ) -> DomainResult<f64> {
        bindings.push(("user_id", json!(user_id)));
        let rows = self.handle.rows(operation, sql.to_string(), bindings).await?;
        decode_rows::<SurrealReputationRow>(rows, "reputation")?
            .into_iter()
            .next()
            .map(|row| row.reputation)
            .ok_or_else(|| DomainError::user_not_found(&user_id))
    }
}

impl UserLookup for SurrealUserRepository {
    fn get_reputation(&self, user_id: &str) -> BoxFuture<'_, DomainResult<f64>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.reputation_query(
                "reputation lookup",
                user_id,
                "SELECT reputation FROM type::record('app_user', $user_id)",
                vec![],
            )
            .await
        })
    }
}

impl ReputationRepository for SurrealUserRepository {
    fn adjust_reputation(
        &self,
        user_id: &str,
        delta: f64,
        max: Option<f64>,
    ) -> BoxFuture<'_, DomainResult<f64>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            // Add and clamp inside one UPDATE so concurrent adjustments never
            // overwrite each other.
            match max {
                Some(max) => {
                    self.reputation_query(
                        "reputation adjust",
                        user_id,
                        "UPDATE type::record('app_user', $user_id) \
                         SET reputation = math::clamp((reputation ?? 1) + $delta, 0, $max) \
                         RETURN reputation",
                        vec![("delta", json!(delta)), ("max", json!(max))],
                    )
                    .await
                }
                None => {
                    self.reputation_query(
                        "reputation adjust",
                        user_id,
                        "UPDATE type::record('app_user', $user_id) \
                         SET reputation = math::max([0, (reputation ?? 1) + $delta]) \
                         RETURN reputation",
                        vec![("delta", json!(delta))],
                    )
                    .await
                }
            }
        })
    }

    fn set_reputation(&self, user_id: &str, value: f64) -> BoxFuture<'_, DomainResult<f64>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.reputation_query(
                "reputation set",
                user_id,
                "UPDATE type::record('app_user', $user_id) SET reputation = $value \
                 RETURN reputation",
                vec![("value", json!(value))],
            )
            .await
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SurrealVoteRow {
    vote_id: String,
    report_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    vote: i64,
    #[serde(default)]
    weight: f64,
    #[serde(default)]
    created_at_ms: i64,
    #[serde(default)]
    updated_at_ms: i64,
}

impl SurrealVoteRow {
    fn from_vote(vote: &Vote) -> Self {
        Self {
            vote_id: vote.vote_id.clone(),
            report_id: vote.report_id.clone(),
            user_id: vote.user_id.clone(),
            vote: i64::from(vote.vote),
            weight: vote.weight,
            created_at_ms: vote.created_at_ms,
            updated_at_ms: vote.updated_at_ms,
        }
    }

    fn into_vote(self) -> Vote {
        Vote {
            vote_id: self.vote_id,
            report_id: self.report_id,
            user_id: self.user_id,
            // Out-of-range legacy values collapse to 0 and read as malformed.
            vote: i8::try_from(self.vote).unwrap_or(0),
            weight: self.weight,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
        }
    }
}

fn decode_votes(rows: Vec<Value>) -> DomainResult<Vec<Vote>> {
    Ok(decode_rows::<SurrealVoteRow>(rows, "vote")?
        .into_iter()
        .map(SurrealVoteRow::into_vote)
        .collect())
}

#[derive(Clone)]
pub struct SurrealVoteRepository {
    handle: SurrealHandle,
}

impl SurrealVoteRepository {
    pub fn with_client(client: Arc<Surreal<Client>>, timeout: Duration) -> Self {
        Self {
            handle: SurrealHandle { client, timeout },
        }
    }

    async fn fetch(&self, report_id: &str, user_id: &str) -> DomainResult<Option<Vote>> {
        let rows = self
            .handle
            .rows(
                "vote lookup",
                format!(
                    "SELECT {VOTE_FIELDS} FROM report_vote \
                     WHERE report_id = $report_id AND user_id = $user_id LIMIT 1"
                ),
                vec![
                    ("report_id", json!(report_id)),
                    ("user_id", json!(user_id)),
                ],
            )
            .await?;
        Ok(decode_votes(rows)?.into_iter().next())
    }
}

impl VoteRepository for SurrealVoteRepository {
    fn get(&self, report_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<Option<Vote>>> {
        let report_id = report_id.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move { self.fetch(&report_id, &user_id).await })
    }

    fn list_by_report(&self, report_id: &str) -> BoxFuture<'_, DomainResult<Vec<Vote>>> {
        let report_id = report_id.to_string();
        Box::pin(async move {
            let rows = self
                .handle
                .rows(
                    "vote scan",
                    format!("SELECT {VOTE_FIELDS} FROM report_vote WHERE report_id = $report_id"),
                    vec![("report_id", json!(report_id))],
                )
                .await?;
            let mut votes = decode_votes(rows)?;
            votes.sort_by(|a, b| {
                a.created_at_ms
                    .cmp(&b.created_at_ms)
                    .then_with(|| a.vote_id.cmp(&b.vote_id))
            });
            Ok(votes)
        })
    }

    fn insert(&self, vote: &Vote) -> BoxFuture<'_, DomainResult<PutOutcome<Vote>>> {
        let payload = to_value(SurrealVoteRow::from_vote(vote));
        let vote_id = vote.vote_id.clone();
        let report_id = vote.report_id.clone();
        let user_id = vote.user_id.clone();
        Box::pin(async move {
            let payload =
                payload.map_err(|err| DomainError::invalid(format!("invalid payload: {err}")))?;
            let created = self
                .handle
                .rows(
                    "vote insert",
                    format!(
                        "CREATE type::record('report_vote', $vote_id) CONTENT $payload \
                         RETURN {VOTE_FIELDS}"
                    ),
                    vec![("vote_id", json!(vote_id)), ("payload", payload)],
                )
                .await;
            match created {
                Ok(rows) => decode_votes(rows)?
                    .into_iter()
                    .next()
                    .map(PutOutcome::Stored)
                    .ok_or_else(|| DomainError::Transient("vote insert returned no row".into())),
                Err(DomainError::Conflict(_)) => self
                    .fetch(&report_id, &user_id)
                    .await?
                    .map(PutOutcome::Existing)
                    .ok_or_else(|| {
                        DomainError::Transient(
                            "vote row contended but disappeared before re-read".into(),
                        )
                    }),
                Err(err) => Err(err),
            }
        })
    }

    fn replace(&self, vote: &Vote) -> BoxFuture<'_, DomainResult<Option<Vote>>> {
        let vote = vote.clone();
        Box::pin(async move {
            let rows = self
                .handle
                .rows(
                    "vote replace",
                    format!(
                        "UPDATE report_vote \
                         SET vote = $vote, weight = $weight, updated_at_ms = $updated_at_ms \
                         WHERE report_id = $report_id AND user_id = $user_id \
                         RETURN {VOTE_FIELDS}"
                    ),
                    vec![
                        ("report_id", json!(vote.report_id)),
                        ("user_id", json!(vote.user_id)),
                        ("vote", json!(i64::from(vote.vote))),
                        ("weight", json!(vote.weight)),
                        ("updated_at_ms", json!(vote.updated_at_ms)),
                    ],
                )
                .await?;
            Ok(decode_votes(rows)?.into_iter().next())
        })
    }

    fn delete(&self, report_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let report_id = report_id.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            let rows = self
                .handle
                .rows(
                    "vote delete",
                    "DELETE report_vote WHERE report_id = $report_id AND user_id = $user_id \
                     RETURN BEFORE"
                        .to_string(),
                    vec![
                        ("report_id", json!(report_id)),
                        ("user_id", json!(user_id)),
                    ],
                )
                .await?;
            Ok(!rows.is_empty())
        })
    }

    fn delete_by_id(&self, vote_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let vote_id = vote_id.to_string();
        Box::pin(async move {
            let rows = self
                .handle
                .rows(
                    "vote delete by id",
                    "DELETE report_vote WHERE vote_id = $vote_id RETURN BEFORE".to_string(),
                    vec![("vote_id", json!(vote_id))],
                )
                .await?;
            Ok(!rows.is_empty())
        })
    }

    fn rehome(
        &self,
        from_report_id: &str,
        user_id: &str,
        to_report_id: &str,
    ) -> BoxFuture<'_, DomainResult<RehomeOutcome>> {
        let from_report_id = from_report_id.to_string();
        let user_id = user_id.to_string();
        let to_report_id = to_report_id.to_string();
        Box::pin(async move {
            let moved = self
                .handle
                .rows(
                    "vote rehome",
                    format!(
                        "UPDATE report_vote SET report_id = $to \
                         WHERE report_id = $from AND user_id = $user_id \
                         RETURN {VOTE_FIELDS}"
                    ),
                    vec![
                        ("from", json!(from_report_id)),
                        ("to", json!(to_report_id)),
                        ("user_id", json!(user_id)),
                    ],
                )
                .await;
            match moved {
                Ok(rows) => Ok(decode_votes(rows)?
                    .into_iter()
                    .next()
                    .map(RehomeOutcome::Moved)
                    .unwrap_or(RehomeOutcome::Missing)),
                // The unique index rejected the move: a vote for this user
                // landed on the destination first.
                Err(DomainError::Conflict(_)) => match self.fetch(&to_report_id, &user_id).await? {
                    Some(occupant) => Ok(RehomeOutcome::Occupied(occupant)),
                    None => Err(DomainError::Transient(
                        "vote rehome contended but destination row disappeared".into(),
                    )),
                },
                Err(err) => Err(err),
            }
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SurrealFlagRow {
    flag_id: String,
    report_id: String,
    user_id: String,
    #[serde(default)]
    canonical_report_id: Option<String>,
    #[serde(default)]
    weight: f64,
    #[serde(default)]
    created_at_ms: i64,
    #[serde(default)]
    updated_at_ms: i64,
}

impl SurrealFlagRow {
    fn from_flag(flag: &DuplicateFlag) -> Self {
        Self {
            flag_id: flag.flag_id.clone(),
            report_id: flag.report_id.clone(),
            user_id: flag.user_id.clone(),
            canonical_report_id: Some(flag.canonical_report_id.clone()),
            weight: flag.weight,
            created_at_ms: flag.created_at_ms,
            updated_at_ms: flag.updated_at_ms,
        }
    }

    fn into_flag(self) -> DuplicateFlag {
        DuplicateFlag {
            flag_id: self.flag_id,
            report_id: self.report_id,
            user_id: self.user_id,
            canonical_report_id: self.canonical_report_id.unwrap_or_default(),
            weight: self.weight,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
        }
    }
}

fn decode_flags(rows: Vec<Value>) -> DomainResult<Vec<DuplicateFlag>> {
    Ok(decode_rows::<SurrealFlagRow>(rows, "duplicate flag")?
        .into_iter()
        .map(SurrealFlagRow::into_flag)
        .collect())
}

#[derive(Clone)]
pub struct SurrealDuplicateFlagRepository {
    handle: SurrealHandle,
}

impl SurrealDuplicateFlagRepository {
    pub fn with_client(client: Arc<Surreal<Client>>, timeout: Duration) -> Self {
        Self {
            handle: SurrealHandle { client, timeout },
        }
    }

    async fn fetch(&self, report_id: &str, user_id: &str) -> DomainResult<Option<DuplicateFlag>> {
        let rows = self
            .handle
            .rows(
                "flag lookup",
                format!(
                    "SELECT {FLAG_FIELDS} FROM duplicate_flag \
                     WHERE report_id = $report_id AND user_id = $user_id LIMIT 1"
                ),
                vec![
                    ("report_id", json!(report_id)),
                    ("user_id", json!(user_id)),
                ],
            )
            .await?;
        Ok(decode_flags(rows)?.into_iter().next())
    }
}

impl DuplicateFlagRepository for SurrealDuplicateFlagRepository {
    fn get(
        &self,
        report_id: &str,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<DuplicateFlag>>> {
        let report_id = report_id.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move { self.fetch(&report_id, &user_id).await })
    }

    fn list_by_report(&self, report_id: &str) -> BoxFuture<'_, DomainResult<Vec<DuplicateFlag>>> {
        let report_id = report_id.to_string();
        Box::pin(async move {
            let rows = self
                .handle
                .rows(
                    "flag scan",
                    format!(
                        "SELECT {FLAG_FIELDS} FROM duplicate_flag WHERE report_id = $report_id"
                    ),
                    vec![("report_id", json!(report_id))],
                )
                .await?;
            let mut flags = decode_flags(rows)?;
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
        let payload = to_value(SurrealFlagRow::from_flag(flag));
        let flag_id = flag.flag_id.clone();
        let report_id = flag.report_id.clone();
        let user_id = flag.user_id.clone();
        Box::pin(async move {
            let payload =
                payload.map_err(|err| DomainError::invalid(format!("invalid payload: {err}")))?;
            let created = self
                .handle
                .rows(
                    "flag insert",
                    format!(
                        "CREATE type::record('duplicate_flag', $flag_id) CONTENT $payload \
                         RETURN {FLAG_FIELDS}"
                    ),
                    vec![("flag_id", json!(flag_id)), ("payload", payload)],
                )
                .await;
            match created {
                Ok(rows) => decode_flags(rows)?
                    .into_iter()
                    .next()
                    .map(PutOutcome::Stored)
                    .ok_or_else(|| DomainError::Transient("flag insert returned no row".into())),
                Err(DomainError::Conflict(_)) => self
                    .fetch(&report_id, &user_id)
                    .await?
                    .map(PutOutcome::Existing)
                    .ok_or_else(|| {
                        DomainError::Transient(
                            "flag row contended but disappeared before re-read".into(),
                        )
                    }),
                Err(err) => Err(err),
            }
        })
    }

    fn update(
        &self,
        report_id: &str,
        user_id: &str,
        canonical: Option<String>,
        updated_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Option<DuplicateFlag>>> {
        let report_id = report_id.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            let mut bindings = vec![
                ("report_id", json!(report_id)),
                ("user_id", json!(user_id)),
                ("updated_at_ms", json!(updated_at_ms)),
            ];
            // Weight is never part of the SET list.
            let assignments = match canonical {
                Some(canonical) => {
                    bindings.push(("canonical", json!(canonical)));
                    "canonical_report_id = $canonical, updated_at_ms = $updated_at_ms"
                }
                None => "updated_at_ms = $updated_at_ms",
            };
            let rows = self
                .handle
                .rows(
                    "flag update",
                    format!(
                        "UPDATE duplicate_flag SET {assignments} \
                         WHERE report_id = $report_id AND user_id = $user_id \
                         RETURN {FLAG_FIELDS}"
                    ),
                    bindings,
                )
                .await?;
            Ok(decode_flags(rows)?.into_iter().next())
        })
    }

    fn delete(&self, report_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let report_id = report_id.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            let rows = self
                .handle
                .rows(
                    "flag delete",
                    "DELETE duplicate_flag WHERE report_id = $report_id AND user_id = $user_id \
                     RETURN BEFORE"
                        .to_string(),
                    vec![
                        ("report_id", json!(report_id)),
                        ("user_id", json!(user_id)),
                    ],
                )
                .await?;
            Ok(!rows.is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_row_defaults_missing_cache_blocks() {
        let row: SurrealReportRow = serde_json::from_value(json!({
            "report_id": "r1",
            "target_type": "elevator",
            "target_id": "elev-3",
            "author_id": null,
            "merged_into": null,
        }))
        .expect("row");
        let report = row.into_report().expect("report");
        assert_eq!(report.votes, VoteCache::default());
        assert_eq!(report.status, ReportStatus::Open);
        assert!(report.merged_from.is_empty());
    }

    #[test]
    fn report_row_reads_camel_case_cache_blocks() {
        let row: SurrealReportRow = serde_json::from_value(json!({
            "report_id": "r1",
            "target_type": "aps",
            "target_id": "aps-1",
            "author_id": "u9",
            "status": "hidden",
            "votes": {
                "upVote": 1, "downVote": 0, "voteCount": 1, "score": 3.0,
                "rawScore": 1, "weightedScore": 3.0, "upWeight": 3.0, "downWeight": 0.0
            },
            "merged_into": "r0",
            "merged_from": ["r7", "r7"],
        }))
        .expect("row");
        let report = row.into_report().expect("report");
        assert_eq!(report.votes.weighted_score, 3.0);
        assert_eq!(report.merged_into.as_deref(), Some("r0"));
        assert_eq!(report.merged_from.len(), 1);
    }

    #[test]
    fn unknown_target_type_is_rejected() {
        let row: SurrealReportRow = serde_json::from_value(json!({
            "report_id": "r1",
            "target_type": "bridge",
            "target_id": "b-1",
            "author_id": null,
            "merged_into": null,
        }))
        .expect("row");
        assert!(matches!(
            row.into_report(),
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn only_index_and_record_collisions_are_uniqueness_violations() {
        assert!(is_uniqueness_violation(
            "Database index `report_vote_report_user` already contains ['r1', 'u1'], \
             with record `report_vote:abc`"
        ));
        assert!(is_uniqueness_violation(
            "Database record `report_vote:abc` already exists"
        ));
        assert!(!is_uniqueness_violation(
            "The query was not executed due to a failed transaction on table duplicate_flag"
        ));
        assert!(!is_uniqueness_violation(
            "Found NONE for field `weight` on index duplicate_flag_report_user"
        ));
    }

    #[test]
    fn out_of_range_vote_reads_as_malformed() {
        let row: SurrealVoteRow = serde_json::from_value(json!({
            "vote_id": "v1",
            "report_id": "r1",
            "user_id": "u1",
            "vote": 300,
            "weight": 2,
        }))
        .expect("row");
        let vote = row.into_vote();
        assert_eq!(vote.weight, 2.0);
        assert!(!vote.is_well_formed());
    }
}
