mod common;

use akses_domain::duplicates::{CanonicalUpdate, UserFlag};
use akses_domain::error::DomainError;
use akses_domain::ports::duplicates::DuplicateFlagRepository;
use common::fixture;

fn set(report_id: &str) -> CanonicalUpdate {
    CanonicalUpdate::Set(report_id.to_string())
}

#[tokio::test]
async fn flag_totals_name_the_top_candidate() {
    let (stores, core) = fixture().await;
    stores.users.insert_user("user-5", 5.0).await;

    core.flag_duplicate("R1", "user-5", set("R2")).await.unwrap();

    let totals = core.get_duplicate_totals("R1").await.unwrap();
    assert_eq!(totals.flag_count, 1);
    assert_eq!(totals.weight_total, 5.0);
    assert_eq!(totals.top_candidate_report_id, "R2");
    assert_eq!(totals.top_candidate_count, 1);
    assert_eq!(totals.top_candidate_weight, 5.0);

    let cached = stores.reports.get("R1").await.unwrap().duplicate_flags;
    assert_eq!(cached.top_candidate_report_id, "R2");
    assert_eq!(cached.weight_total, 5.0);
}

#[tokio::test]
async fn canonical_id_is_tri_state() {
    let (_, core) = fixture().await;

    core.flag_duplicate("R1", "user-1", set("R9")).await.unwrap();
    core.flag_duplicate("R1", "user-1", CanonicalUpdate::Keep)
        .await
        .unwrap();
    assert_eq!(
        core.get_user_flag("R1", "user-1")
            .await
            .unwrap()
            .canonical_report_id,
        "R9"
    );

    core.flag_duplicate("R1", "user-1", CanonicalUpdate::from_input(Some("")))
        .await
        .unwrap();
    let flag = core.get_user_flag("R1", "user-1").await.unwrap();
    assert!(flag.flagged);
    assert_eq!(flag.canonical_report_id, "");

    core.flag_duplicate("R1", "user-1", set("R5")).await.unwrap();
    assert_eq!(
        core.get_user_flag("R1", "user-1")
            .await
            .unwrap()
            .canonical_report_id,
        "R5"
    );
}

#[tokio::test]
async fn flag_weight_is_frozen_at_first_insert() {
    let (stores, core) = fixture().await;

    core.flag_duplicate("R1", "user-3", set("R2")).await.unwrap();
    core.set_reputation("user-3", 50.0).await.unwrap();
    core.flag_duplicate("R1", "user-3", set("R5")).await.unwrap();

    let row = stores
        .flags
        .get("R1", "user-3")
        .await
        .unwrap()
        .expect("flag row");
    assert_eq!(row.weight, 3.0);
    assert_eq!(row.canonical_report_id, "R5");
    assert_eq!(core.get_duplicate_totals("R1").await.unwrap().weight_total, 3.0);
}

#[tokio::test]
async fn invalid_canonical_ids_are_rejected() {
    let (_, core) = fixture().await;

    for candidate in ["R1", "missing", "X1"] {
        assert!(
            matches!(
                core.flag_duplicate("R1", "user-1", set(candidate)).await,
                Err(DomainError::InvalidArgument(_))
            ),
            "candidate {candidate} should be rejected"
        );
    }
    assert!(!core.get_user_flag("R1", "user-1").await.unwrap().flagged);
}

#[tokio::test]
async fn removing_a_flag_twice_is_a_no_op() {
    let (stores, core) = fixture().await;
    core.flag_duplicate("R1", "user-2", set("R2")).await.unwrap();

    core.remove_flag("R1", "user-2").await.unwrap();
    core.remove_flag("R1", "user-2").await.unwrap();

    assert!(stores.flags.list_by_report("R1").await.unwrap().is_empty());
    let totals = core.get_duplicate_totals("R1").await.unwrap();
    assert_eq!(totals.flag_count, 0);
    assert_eq!(totals.top_candidate_report_id, "");
    assert_eq!(core.get_user_flag("R1", "user-2").await.unwrap(), UserFlag::default());
}

#[tokio::test]
async fn heavier_candidate_wins_over_more_frequent_one() {
    let (_, core) = fixture().await;

    core.flag_duplicate("R1", "user-1", set("R5")).await.unwrap();
    core.flag_duplicate("R1", "user-3", set("R5")).await.unwrap();
    core.flag_duplicate("R1", "user-2", set("R9")).await.unwrap();
    core.flag_duplicate("R1", "user-4", CanonicalUpdate::Keep)
        .await
        .unwrap();

    let totals = core.get_duplicate_totals("R1").await.unwrap();
    assert_eq!(totals.flag_count, 4);
    assert_eq!(totals.weight_total, 15.0);
    assert_eq!(totals.top_candidate_report_id, "R9");
    assert_eq!(totals.top_candidate_count, 1);
    assert_eq!(totals.top_candidate_weight, 10.0);
}

#[tokio::test]
async fn concurrent_flags_keep_one_row_per_user() {
    let (stores, core) = fixture().await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let core = core.clone();
        handles.push(tokio::spawn(async move {
            core.flag_duplicate("R1", "user-3", set("R2")).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("flag");
    }

    let rows = stores.flags.list_by_report("R1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].weight, 3.0);

    core.set_reputation("user-3", 50.0).await.unwrap();
    core.flag_duplicate("R1", "user-3", set("R9")).await.unwrap();
    let rows = stores.flags.list_by_report("R1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].weight, 3.0);
    assert_eq!(rows[0].canonical_report_id, "R9");

    let totals = core.get_duplicate_totals("R1").await.unwrap();
    assert_eq!(totals.flag_count, 1);
    assert_eq!(totals.weight_total, 3.0);
}
