use std::sync::Arc;

use akses_domain::ports::db::DbAdapter;
use akses_domain::trust::{TrustCore, TrustPorts};

use crate::config::AppConfig;
use crate::db::{DbConfig, SurrealAdapter};
use crate::repositories::{
    InMemoryDuplicateFlagRepository, InMemoryReportRepository, InMemoryUserRepository,
    InMemoryVoteRepository, SurrealDuplicateFlagRepository, SurrealReportRepository,
    SurrealUserRepository, SurrealVoteRepository,
};

/// In-memory backends sharing state, so callers can seed reports and users
/// and inspect ledgers after driving the core.
#[derive(Clone, Default)]
pub struct MemoryStores {
    pub reports: InMemoryReportRepository,
    pub users: InMemoryUserRepository,
    pub votes: InMemoryVoteRepository,
    pub flags: InMemoryDuplicateFlagRepository,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ports(&self) -> TrustPorts {
        TrustPorts {
            reports: Arc::new(self.reports.clone()),
            aggregate_writer: Arc::new(self.reports.clone()),
            merge_writer: Arc::new(self.reports.clone()),
            users: Arc::new(self.users.clone()),
            reputation: Arc::new(self.users.clone()),
            votes: Arc::new(self.votes.clone()),
            flags: Arc::new(self.flags.clone()),
        }
    }
}

pub fn surreal_ports(adapter: &SurrealAdapter) -> TrustPorts {
    let client = adapter.client();
    let limit = adapter.config().timeout;
    let reports = Arc::new(SurrealReportRepository::with_client(client.clone(), limit));
    let users = Arc::new(SurrealUserRepository::with_client(client.clone(), limit));
    TrustPorts {
        reports: reports.clone(),
        aggregate_writer: reports.clone(),
        merge_writer: reports,
        users: users.clone(),
        reputation: users,
        votes: Arc::new(SurrealVoteRepository::with_client(client.clone(), limit)),
        flags: Arc::new(SurrealDuplicateFlagRepository::with_client(client, limit)),
    }
}

/// Builds the core on the configured backend. The Surreal path connects and
/// ensures the ledger schema before any request is served.
pub async fn build_trust_core(config: &AppConfig) -> anyhow::Result<TrustCore> {
    let ports = if config.uses_surreal() {
        let adapter = SurrealAdapter::connect(DbConfig::from_app_config(config)).await?;
        adapter.health_check().await?;
        adapter.ensure_schema().await?;
        tracing::info!(backend = adapter.name(), "trust storage ready");
        surreal_ports(&adapter)
    } else {
        tracing::warn!("using in-memory trust storage; data is lost on restart");
        MemoryStores::new().ports()
    };
    Ok(TrustCore::new(ports, config.trust_policy())?)
}
