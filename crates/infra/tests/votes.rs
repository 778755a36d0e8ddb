mod common;

use akses_domain::error::DomainError;
use akses_domain::ports::votes::VoteRepository;
use akses_domain::reports::VoteCache;
use akses_domain::votes::VoteValue;
use common::{core_for, fixture, seed_authored_report};

#[tokio::test]
async fn weighted_totals_follow_voter_reputation() {
    let (_, core) = fixture().await;

    core.cast_vote("R1", "user-1", VoteValue::Up).await.unwrap();
    let totals = core.get_vote_totals("R1").await.unwrap();
    assert_eq!(totals.up_votes, 1);
    assert_eq!(totals.down_votes, 0);
    assert_eq!(totals.raw_score, 1);
    assert_eq!(totals.weighted_score, 1.0);

    core.cast_vote("R1", "user-2", VoteValue::Down)
        .await
        .unwrap();
    let totals = core.get_vote_totals("R1").await.unwrap();
    assert_eq!(totals.up_votes, 1);
    assert_eq!(totals.down_votes, 1);
    assert_eq!(totals.raw_score, 0);
    assert_eq!(totals.weighted_score, -9.0);
}

#[tokio::test]
async fn low_reputation_votes_get_the_minimum_weight() {
    let (_, core) = fixture().await;
    let receipt = core.cast_vote("R1", "user-4", VoteValue::Up).await.unwrap();
    assert_eq!(receipt.weight, 1.0);
}

#[tokio::test]
async fn recasting_replaces_the_row_and_resnapshots_weight() {
    let (stores, core) = fixture().await;

    let first = core.cast_vote("R1", "user-3", VoteValue::Up).await.unwrap();
    assert_eq!(first.weight, 3.0);

    core.set_reputation("user-3", 7.0).await.unwrap();
    let second = core
        .cast_vote("R1", "user-3", VoteValue::Down)
        .await
        .unwrap();
    assert_eq!(second.weight, 7.0);

    let rows = stores.votes.list_by_report("R1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].vote, -1);
    assert_eq!(core.get_user_vote("R1", "user-3").await.unwrap(), -1);
}

#[tokio::test]
async fn concurrent_casts_keep_one_row_per_user() {
    let (stores, core) = fixture().await;

    let mut handles = Vec::new();
    for round in 0..16 {
        let core = core.clone();
        let value = if round % 2 == 0 {
            VoteValue::Up
        } else {
            VoteValue::Down
        };
        handles.push(tokio::spawn(async move {
            core.cast_vote("R1", "user-2", value).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("cast");
    }

    assert_eq!(stores.votes.len().await, 1);
    let totals = core.get_vote_totals("R1").await.unwrap();
    assert_eq!(totals.vote_count, 1);
}

#[tokio::test]
async fn removing_twice_is_a_no_op() {
    let (stores, core) = fixture().await;
    core.cast_vote("R1", "user-1", VoteValue::Up).await.unwrap();

    core.remove_vote("R1", "user-1").await.unwrap();
    core.remove_vote("R1", "user-1").await.unwrap();

    assert!(stores.votes.is_empty().await);
    assert_eq!(core.get_user_vote("R1", "user-1").await.unwrap(), 0);
    let report = stores.reports.get("R1").await.unwrap();
    assert_eq!(report.votes, VoteCache::default());
}

#[tokio::test]
async fn cached_block_matches_a_fresh_scan() {
    let (stores, core) = fixture().await;

    core.cast_vote("R1", "user-1", VoteValue::Up).await.unwrap();
    core.cast_vote("R1", "user-2", VoteValue::Down)
        .await
        .unwrap();
    core.cast_vote("R1", "user-3", VoteValue::Up).await.unwrap();
    core.remove_vote("R1", "user-2").await.unwrap();
    core.cast_vote("R1", "user-1", VoteValue::Down)
        .await
        .unwrap();

    let fresh = VoteCache::from(&core.get_vote_totals("R1").await.unwrap());
    let cached = stores.reports.get("R1").await.unwrap().votes;
    assert_eq!(cached, fresh);
    assert_eq!(cached.score, cached.weighted_score);
    assert_eq!(cached.weighted_score, 2.0);
}

#[tokio::test]
async fn aliases_resolve_to_the_canonical_id() {
    let (stores, core) = fixture().await;
    stores.reports.add_alias("legacy-17", "R1").await;

    let receipt = core
        .cast_vote("legacy-17", "user-1", VoteValue::Up)
        .await
        .unwrap();
    assert_eq!(receipt.report_id, "R1");
    assert_eq!(core.get_user_vote("R1", "user-1").await.unwrap(), 1);
}

#[tokio::test]
async fn missing_report_user_and_blank_ids_are_rejected() {
    let (_, core) = fixture().await;

    assert!(matches!(
        core.cast_vote("nope", "user-1", VoteValue::Up).await,
        Err(DomainError::NotFound(_))
    ));
    assert!(matches!(
        core.cast_vote("R1", "ghost", VoteValue::Up).await,
        Err(DomainError::NotFound(_))
    ));
    assert!(matches!(
        core.cast_vote("  ", "user-1", VoteValue::Up).await,
        Err(DomainError::InvalidArgument(_))
    ));
    assert!(matches!(
        VoteValue::try_from(2i64),
        Err(DomainError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn author_reputation_tracks_vote_changes() {
    let (stores, _) = fixture().await;
    seed_authored_report(&stores, "A1", "elev-12", "author-1").await;
    let core = core_for(&stores);

    core.cast_vote("A1", "user-1", VoteValue::Up).await.unwrap();
    assert_eq!(core.adjust_reputation("author-1", 0.0, None).await.unwrap(), 11.0);

    core.cast_vote("A1", "user-1", VoteValue::Down)
        .await
        .unwrap();
    assert_eq!(core.adjust_reputation("author-1", 0.0, None).await.unwrap(), 9.0);

    core.remove_vote("A1", "user-1").await.unwrap();
    assert_eq!(core.adjust_reputation("author-1", 0.0, None).await.unwrap(), 10.0);

    core.cast_vote("A1", "author-1", VoteValue::Up).await.unwrap();
    assert_eq!(core.adjust_reputation("author-1", 0.0, None).await.unwrap(), 10.0);
}

#[tokio::test]
async fn failed_author_adjustment_does_not_fail_the_vote() {
    let (stores, _) = fixture().await;
    seed_authored_report(&stores, "A2", "elev-12", "deleted-author").await;
    let core = core_for(&stores);

    let receipt = core.cast_vote("A2", "user-2", VoteValue::Up).await.unwrap();
    assert_eq!(receipt.weight, 10.0);
    assert_eq!(core.get_vote_totals("A2").await.unwrap().up_votes, 1);
}

#[tokio::test]
async fn reconcile_repairs_a_stale_cache_once() {
    let (stores, core) = fixture().await;
    core.cast_vote("R1", "user-2", VoteValue::Up).await.unwrap();

    let mut stale = stores.reports.get("R1").await.unwrap();
    stale.votes = VoteCache::default();
    stores.reports.upsert(stale).await;

    let outcome = core.reconcile_report("R1").await.unwrap();
    assert!(outcome.vote_drift);
    assert!(!outcome.duplicate_drift);
    assert_eq!(stores.reports.get("R1").await.unwrap().votes.weighted_score, 10.0);

    let again = core.reconcile_report("R1").await.unwrap();
    assert!(!again.drifted());
}
