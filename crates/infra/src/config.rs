use akses_domain::policy::TrustPolicy;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub log_level: String,
    pub data_backend: String,
    pub surreal_endpoint: String,
    pub surreal_ns: String,
    pub surreal_db: String,
    pub surreal_user: String,
    pub surreal_pass: String,
    pub storage_timeout_ms: u64,
    /// Zero or negative disables the soft cap.
    pub reputation_max: f64,
    pub min_vote_weight: f64,
    pub author_vote_delta: f64,
    pub reconcile_interval_ms: u64,
    pub reconcile_batch: usize,
    pub reconcile_backoff_base_ms: u64,
    pub reconcile_backoff_max_ms: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("surreal_endpoint", "ws://127.0.0.1:8000")?
            .set_default("surreal_ns", "akses")?
            .set_default("surreal_db", "trust")?
            .set_default("surreal_user", "root")?
            .set_default("surreal_pass", "root")?
            .set_default("storage_timeout_ms", 5000)?
            .set_default("reputation_max", 100.0)?
            .set_default("min_vote_weight", 1.0)?
            .set_default("author_vote_delta", 1.0)?
            .set_default("reconcile_interval_ms", 60_000)?
            .set_default("reconcile_batch", 200)?
            .set_default("reconcile_backoff_base_ms", 1000)?
            .set_default("reconcile_backoff_max_ms", 60_000)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn uses_surreal(&self) -> bool {
        self.data_backend.eq_ignore_ascii_case("surreal")
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms.max(1))
    }

    pub fn trust_policy(&self) -> TrustPolicy {
        TrustPolicy {
            min_weight: self.min_vote_weight,
            reputation_max: (self.reputation_max > 0.0).then_some(self.reputation_max),
            author_vote_delta: self.author_vote_delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            app_env: "production".to_string(),
            log_level: "info".to_string(),
            data_backend: "Surreal".to_string(),
            surreal_endpoint: "ws://127.0.0.1:8000".to_string(),
            surreal_ns: "akses".to_string(),
            surreal_db: "trust".to_string(),
            surreal_user: "root".to_string(),
            surreal_pass: "root".to_string(),
            storage_timeout_ms: 0,
            reputation_max: 0.0,
            min_vote_weight: 1.0,
            author_vote_delta: 2.0,
            reconcile_interval_ms: 1000,
            reconcile_batch: 10,
            reconcile_backoff_base_ms: 100,
            reconcile_backoff_max_ms: 1000,
        }
    }

    #[test]
    fn non_positive_reputation_max_disables_cap() {
        let policy = config().trust_policy();
        assert_eq!(policy.reputation_max, None);
        assert_eq!(policy.author_vote_delta, 2.0);
    }

    #[test]
    fn backend_and_env_flags_are_case_insensitive() {
        let config = config();
        assert!(config.is_production());
        assert!(config.uses_surreal());
        assert_eq!(config.storage_timeout(), Duration::from_millis(1));
    }
}
