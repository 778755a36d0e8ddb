#![allow(dead_code)]

use akses_domain::policy::TrustPolicy;
use akses_domain::reports::{Report, TargetType};
use akses_domain::trust::TrustCore;
use akses_infra::bootstrap::MemoryStores;

pub async fn seed_report(stores: &MemoryStores, report_id: &str, target_id: &str) {
    stores
        .reports
        .upsert(Report::new(report_id, TargetType::Elevator, target_id))
        .await;
}

pub async fn seed_authored_report(
    stores: &MemoryStores,
    report_id: &str,
    target_id: &str,
    author_id: &str,
) {
    stores
        .reports
        .upsert(Report::new(report_id, TargetType::Elevator, target_id).with_author(author_id))
        .await;
}

pub fn core_for(stores: &MemoryStores) -> TrustCore {
    TrustCore::new(stores.ports(), TrustPolicy::default()).expect("trust core")
}

/// Reports R1, R2, R5 and R9 on one elevator, X1 on another, and users with
/// the reputations used across the suite.
pub async fn fixture() -> (MemoryStores, TrustCore) {
    let stores = MemoryStores::new();
    for report_id in ["R1", "R2", "R5", "R9"] {
        seed_report(&stores, report_id, "elev-12").await;
    }
    seed_report(&stores, "X1", "elev-99").await;
    for (user_id, reputation) in [
        ("user-1", 1.0),
        ("user-2", 10.0),
        ("user-3", 3.0),
        ("user-4", 0.2),
        ("author-1", 10.0),
    ] {
        stores.users.insert_user(user_id, reputation).await;
    }
    let core = core_for(&stores);
    (stores, core)
}
