use std::sync::Arc;

use crate::DomainResult;
use crate::aggregates::{AggregateCacheService, ReconcileOutcome};
use crate::duplicates::{
    CanonicalUpdate, DuplicateFlagService, DuplicateTotals, FlagReceipt, UserFlag,
};
use crate::merge::{MergeService, MergeSummary};
use crate::policy::TrustPolicy;
use crate::ports::duplicates::DuplicateFlagRepository;
use crate::ports::reports::{ReportAggregateWriter, ReportLookup, ReportMergeWriter};
use crate::ports::users::{ReputationRepository, UserLookup};
use crate::ports::votes::VoteRepository;
use crate::reputation::ReputationService;
use crate::votes::{CastReceipt, VoteService, VoteTotals, VoteValue};

/// Storage handles the core needs. The report-side ports are normally backed
/// by the report CRUD layer.
#[derive(Clone)]
pub struct TrustPorts {
    pub reports: Arc<dyn ReportLookup>,
    pub aggregate_writer: Arc<dyn ReportAggregateWriter>,
    pub merge_writer: Arc<dyn ReportMergeWriter>,
    pub users: Arc<dyn UserLookup>,
    pub reputation: Arc<dyn ReputationRepository>,
    pub votes: Arc<dyn VoteRepository>,
    pub flags: Arc<dyn DuplicateFlagRepository>,
}

/// Entry point used by the route layer.
#[derive(Clone)]
pub struct TrustCore {
    votes: VoteService,
    flags: DuplicateFlagService,
    reputation: ReputationService,
    merge: MergeService,
    cache: AggregateCacheService,
}

impl TrustCore {
    pub fn new(ports: TrustPorts, policy: TrustPolicy) -> DomainResult<Self> {
        policy.validate()?;
        let reputation = ReputationService::new(ports.reputation.clone());
        let cache = AggregateCacheService::new(
            ports.votes.clone(),
            ports.flags.clone(),
            ports.reports.clone(),
            ports.aggregate_writer.clone(),
        );
        let votes = VoteService::new(
            ports.votes.clone(),
            ports.reports.clone(),
            ports.users.clone(),
            reputation.clone(),
            cache.clone(),
            policy.clone(),
        );
        let flags = DuplicateFlagService::new(
            ports.flags.clone(),
            ports.reports.clone(),
            ports.users.clone(),
            cache.clone(),
            policy,
        );
        let merge = MergeService::new(
            ports.votes,
            ports.reports,
            ports.merge_writer,
            cache.clone(),
        );
        Ok(Self {
            votes,
            flags,
            reputation,
            merge,
            cache,
        })
    }

    pub async fn cast_vote(
        &self,
        report_id: &str,
        user_id: &str,
        vote: VoteValue,
    ) -> DomainResult<CastReceipt> {
        self.votes.cast_vote(report_id, user_id, vote).await
    }

    pub async fn remove_vote(&self, report_id: &str, user_id: &str) -> DomainResult<()> {
        self.votes.remove_vote(report_id, user_id).await
    }

    pub async fn get_vote_totals(&self, report_id: &str) -> DomainResult<VoteTotals> {
        self.votes.get_totals(report_id).await
    }

    pub async fn get_user_vote(&self, report_id: &str, user_id: &str) -> DomainResult<i8> {
        self.votes.get_user_vote(report_id, user_id).await
    }

    pub async fn flag_duplicate(
        &self,
        report_id: &str,
        user_id: &str,
        canonical: CanonicalUpdate,
    ) -> DomainResult<FlagReceipt> {
        self.flags
            .flag_duplicate(report_id, user_id, canonical)
            .await
    }

    pub async fn remove_flag(&self, report_id: &str, user_id: &str) -> DomainResult<()> {
        self.flags.remove_flag(report_id, user_id).await
    }

    pub async fn get_duplicate_totals(&self, report_id: &str) -> DomainResult<DuplicateTotals> {
        self.flags.get_totals(report_id).await
    }

    pub async fn get_user_flag(&self, report_id: &str, user_id: &str) -> DomainResult<UserFlag> {
        self.flags.get_user_flag(report_id, user_id).await
    }

    pub async fn adjust_reputation(
        &self,
        user_id: &str,
        delta: f64,
        max: Option<f64>,
    ) -> DomainResult<f64> {
        self.reputation.adjust(user_id, delta, max).await
    }

    pub async fn set_reputation(&self, user_id: &str, value: f64) -> DomainResult<f64> {
        self.reputation.set(user_id, value).await
    }

    pub async fn merge_duplicate_reports(
        &self,
        keep_report_id: &str,
        dup_report_id: &str,
    ) -> DomainResult<MergeSummary> {
        self.merge.merge(keep_report_id, dup_report_id).await
    }

    pub async fn report_page(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> DomainResult<Vec<String>> {
        self.cache.report_page(after, limit).await
    }

    pub async fn reconcile_report(&self, report_id: &str) -> DomainResult<ReconcileOutcome> {
        self.cache.reconcile(report_id).await
    }
}
