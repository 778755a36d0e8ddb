mod common;

use akses_domain::error::DomainError;
use akses_domain::ports::users::UserLookup;
use common::fixture;

#[tokio::test]
async fn adjustments_clamp_to_the_soft_cap_and_zero() {
    let (stores, core) = fixture().await;

    assert_eq!(
        core.adjust_reputation("user-2", 5.0, Some(12.0)).await.unwrap(),
        12.0
    );
    assert_eq!(
        core.adjust_reputation("user-2", -50.0, Some(12.0)).await.unwrap(),
        0.0
    );
    assert_eq!(
        core.adjust_reputation("user-2", 1_000.0, None).await.unwrap(),
        1_000.0
    );
    assert_eq!(stores.users.get_reputation("user-2").await.unwrap(), 1_000.0);
}

#[tokio::test]
async fn concurrent_adjustments_are_not_lost() {
    let (stores, core) = fixture().await;
    core.set_reputation("user-1", 0.0).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..25 {
        let core = core.clone();
        handles.push(tokio::spawn(async move {
            core.adjust_reputation("user-1", 2.0, None).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("adjust");
    }
    assert_eq!(stores.users.get_reputation("user-1").await.unwrap(), 50.0);
}

#[tokio::test]
async fn invalid_reputation_input_is_rejected() {
    let (_, core) = fixture().await;

    assert!(matches!(
        core.set_reputation("user-1", -1.0).await,
        Err(DomainError::InvalidArgument(_))
    ));
    assert!(matches!(
        core.set_reputation("user-1", f64::NAN).await,
        Err(DomainError::InvalidArgument(_))
    ));
    assert!(matches!(
        core.adjust_reputation("user-1", f64::INFINITY, None).await,
        Err(DomainError::InvalidArgument(_))
    ));
    assert!(matches!(
        core.adjust_reputation("user-1", 1.0, Some(-3.0)).await,
        Err(DomainError::InvalidArgument(_))
    ));
    assert!(matches!(
        core.adjust_reputation("ghost", 1.0, None).await,
        Err(DomainError::NotFound(_))
    ));
}

#[tokio::test]
async fn set_reputation_feeds_the_next_vote_weight() {
    let (_, core) = fixture().await;
    assert_eq!(core.set_reputation("user-1", 6.5).await.unwrap(), 6.5);

    let receipt = core
        .cast_vote("R1", "user-1", akses_domain::votes::VoteValue::Up)
        .await
        .unwrap();
    assert_eq!(receipt.weight, 6.5);
}
