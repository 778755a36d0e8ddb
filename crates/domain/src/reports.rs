use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::duplicates::DuplicateTotals;
use crate::error::DomainError;
use crate::votes::VoteTotals;

const WEIGHT_EPSILON: f64 = 1e-9;

fn weights_match(left: f64, right: f64) -> bool {
    (left - right).abs() <= WEIGHT_EPSILON * left.abs().max(right.abs()).max(1.0)
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Station,
    Elevator,
    Aps,
    Ramp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetTypeParseError {
    Unknown,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Station => "station",
            Self::Elevator => "elevator",
            Self::Aps => "aps",
            Self::Ramp => "ramp",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = TargetTypeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "station" => Ok(Self::Station),
            "elevator" => Ok(Self::Elevator),
            "aps" => Ok(Self::Aps),
            "ramp" => Ok(Self::Ramp),
            _ => Err(TargetTypeParseError::Unknown),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Open,
    Hidden,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Hidden => "hidden",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "open" => Ok(Self::Open),
            "hidden" => Ok(Self::Hidden),
            other => Err(DomainError::invalid(format!(
                "unknown report status '{other}'"
            ))),
        }
    }
}

/// Cached vote block persisted on the report record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VoteCache {
    pub up_vote: u64,
    pub down_vote: u64,
    pub vote_count: u64,
    pub score: f64,
    pub raw_score: i64,
    pub weighted_score: f64,
    pub up_weight: f64,
    pub down_weight: f64,
}

impl VoteCache {
    pub fn validate(&self) -> DomainResult<()> {
        if self.vote_count != self.up_vote + self.down_vote {
            return Err(DomainError::invalid(
                "vote cache count does not equal up + down",
            ));
        }
        if self.raw_score != self.up_vote as i64 - self.down_vote as i64 {
            return Err(DomainError::invalid(
                "vote cache raw score does not equal up - down",
            ));
        }
        for (field, value) in [
            ("upWeight", self.up_weight),
            ("downWeight", self.down_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DomainError::invalid(format!(
                    "vote cache {field} must be a finite non-negative number"
                )));
            }
        }
        if !weights_match(self.weighted_score, self.up_weight - self.down_weight) {
            return Err(DomainError::invalid(
                "vote cache weighted score does not equal upWeight - downWeight",
            ));
        }
        if !weights_match(self.score, self.weighted_score) {
            return Err(DomainError::invalid(
                "vote cache score must mirror the weighted score",
            ));
        }
        Ok(())
    }

    /// Equality that tolerates float summation order.
    pub fn approx_eq(&self, other: &VoteCache) -> bool {
        self.up_vote == other.up_vote
            && self.down_vote == other.down_vote
            && self.vote_count == other.vote_count
            && self.raw_score == other.raw_score
            && weights_match(self.score, other.score)
            && weights_match(self.weighted_score, other.weighted_score)
            && weights_match(self.up_weight, other.up_weight)
            && weights_match(self.down_weight, other.down_weight)
    }
}

impl From<&VoteTotals> for VoteCache {
    fn from(totals: &VoteTotals) -> Self {
        Self {
            up_vote: totals.up_votes,
            down_vote: totals.down_votes,
            vote_count: totals.vote_count,
            score: totals.weighted_score,
            raw_score: totals.raw_score,
            weighted_score: totals.weighted_score,
            up_weight: totals.up_weight,
            down_weight: totals.down_weight,
        }
    }
}

/// Cached duplicate-flag block persisted on the report record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCache {
    pub flag_count: u64,
    pub weight_total: f64,
    pub top_candidate_report_id: String,
    pub top_candidate_count: u64,
    pub top_candidate_weight: f64,
}

impl DuplicateCache {
    pub fn validate(&self) -> DomainResult<()> {
        if !self.weight_total.is_finite() || self.weight_total < 0.0 {
            return Err(DomainError::invalid(
                "duplicate cache weightTotal must be a finite non-negative number",
            ));
        }
        if !self.top_candidate_weight.is_finite() || self.top_candidate_weight < 0.0 {
            return Err(DomainError::invalid(
                "duplicate cache topCandidateWeight must be a finite non-negative number",
            ));
        }
        if self.top_candidate_count > self.flag_count {
            return Err(DomainError::invalid(
                "duplicate cache top candidate count exceeds flag count",
            ));
        }
        if self.top_candidate_weight > self.weight_total + WEIGHT_EPSILON {
            return Err(DomainError::invalid(
                "duplicate cache top candidate weight exceeds weight total",
            ));
        }
        if self.top_candidate_report_id.is_empty()
            && (self.top_candidate_count > 0 || self.top_candidate_weight > 0.0)
        {
            return Err(DomainError::invalid(
                "duplicate cache carries candidate totals without a candidate id",
            ));
        }
        Ok(())
    }

    pub fn approx_eq(&self, other: &DuplicateCache) -> bool {
        self.flag_count == other.flag_count
            && self.top_candidate_report_id == other.top_candidate_report_id
            && self.top_candidate_count == other.top_candidate_count
            && weights_match(self.weight_total, other.weight_total)
            && weights_match(self.top_candidate_weight, other.top_candidate_weight)
    }
}

impl From<&DuplicateTotals> for DuplicateCache {
    fn from(totals: &DuplicateTotals) -> Self {
        Self {
            flag_count: totals.flag_count,
            weight_total: totals.weight_total,
            top_candidate_report_id: totals.top_candidate_report_id.clone(),
            top_candidate_count: totals.top_candidate_count,
            top_candidate_weight: totals.top_candidate_weight,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub report_id: String,
    pub target_type: TargetType,
    pub target_id: String,
    pub author_id: Option<String>,
    pub text: String,
    pub status: ReportStatus,
    pub votes: VoteCache,
    pub duplicate_flags: DuplicateCache,
    pub merged_into: Option<String>,
    pub merged_from: BTreeSet<String>,
}

impl Report {
    pub fn new(
        report_id: impl Into<String>,
        target_type: TargetType,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            report_id: report_id.into(),
            target_type,
            target_id: target_id.into(),
            author_id: None,
            text: String::new(),
            status: ReportStatus::Open,
            votes: VoteCache::default(),
            duplicate_flags: DuplicateCache::default(),
            merged_into: None,
            merged_from: BTreeSet::new(),
        }
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    pub fn same_target(&self, other: &Report) -> bool {
        self.target_type == other.target_type && self.target_id == other.target_id
    }

    pub fn is_merged(&self) -> bool {
        self.merged_into.is_some()
    }

    /// Votes and flags are only accepted while the report has not been
    /// absorbed into another one.
    pub fn ensure_accepts_signal(&self) -> DomainResult<()> {
        match &self.merged_into {
            Some(keep) => Err(DomainError::conflict(format!(
                "report '{}' was merged into '{keep}'",
                self.report_id
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_type_round_trips_through_str() {
        for target in [
            TargetType::Station,
            TargetType::Elevator,
            TargetType::Aps,
            TargetType::Ramp,
        ] {
            assert_eq!(target.as_str().parse::<TargetType>(), Ok(target));
        }
        assert!("bridge".parse::<TargetType>().is_err());
    }

    #[test]
    fn vote_cache_serializes_with_camel_case_keys() {
        let cache = VoteCache {
            up_vote: 1,
            down_vote: 1,
            vote_count: 2,
            score: -9.0,
            raw_score: 0,
            weighted_score: -9.0,
            up_weight: 1.0,
            down_weight: 10.0,
        };
        let value = serde_json::to_value(&cache).expect("serialize");
        assert_eq!(value["upVote"], 1);
        assert_eq!(value["weightedScore"], -9.0);
        assert!(cache.validate().is_ok());
    }

    #[test]
    fn vote_cache_rejects_inconsistent_counts() {
        let cache = VoteCache {
            up_vote: 2,
            down_vote: 0,
            vote_count: 3,
            ..VoteCache::default()
        };
        assert!(matches!(
            cache.validate(),
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn duplicate_cache_rejects_candidate_without_id() {
        let cache = DuplicateCache {
            flag_count: 1,
            weight_total: 5.0,
            top_candidate_report_id: String::new(),
            top_candidate_count: 1,
            top_candidate_weight: 5.0,
        };
        assert!(cache.validate().is_err());
    }

    #[test]
    fn merged_report_refuses_new_signal() {
        let mut report = Report::new("r2", TargetType::Ramp, "ramp-7");
        assert!(report.ensure_accepts_signal().is_ok());
        report.merged_into = Some("r1".to_string());
        assert!(matches!(
            report.ensure_accepts_signal(),
            Err(DomainError::Conflict(_))
        ));
    }
}
