use akses_domain::DomainResult;
use akses_domain::error::DomainError;
use akses_domain::ports::BoxFuture;
use akses_domain::ports::db::{DbAdapter, DbError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::AppConfig;

/// Unique `(report_id, user_id)` indexes are what serialize concurrent vote
/// and flag upserts.
const SCHEMA: &str = "\
    DEFINE TABLE IF NOT EXISTS report SCHEMALESS; \
    DEFINE INDEX IF NOT EXISTS report_report_id ON TABLE report FIELDS report_id UNIQUE; \
    DEFINE TABLE IF NOT EXISTS report_alias SCHEMALESS; \
    DEFINE INDEX IF NOT EXISTS report_alias_alias ON TABLE report_alias FIELDS alias UNIQUE; \
    DEFINE TABLE IF NOT EXISTS app_user SCHEMALESS; \
    DEFINE TABLE IF NOT EXISTS report_vote SCHEMALESS; \
    DEFINE INDEX IF NOT EXISTS report_vote_report_user ON TABLE report_vote FIELDS report_id, user_id UNIQUE; \
    DEFINE INDEX IF NOT EXISTS report_vote_report ON TABLE report_vote FIELDS report_id; \
    DEFINE TABLE IF NOT EXISTS duplicate_flag SCHEMALESS; \
    DEFINE INDEX IF NOT EXISTS duplicate_flag_report_user ON TABLE duplicate_flag FIELDS report_id, user_id UNIQUE; \
    DEFINE INDEX IF NOT EXISTS duplicate_flag_report ON TABLE duplicate_flag FIELDS report_id;";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.surreal_endpoint.clone(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
            timeout: config.storage_timeout(),
        }
    }
}

/// Runs a storage call under the configured deadline. An elapsed deadline is
/// reported as `Transient` so callers can retry.
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> DomainResult<T>
where
    F: Future<Output = DomainResult<T>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(DomainError::Transient(format!(
            "{operation} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

#[derive(Clone)]
pub struct SurrealAdapter {
    config: DbConfig,
    client: Arc<Surreal<Client>>,
}

impl SurrealAdapter {
    pub async fn connect(config: DbConfig) -> Result<Self, DbError> {
        let db = Surreal::<Client>::init();
        let limit = config.timeout;
        let setup = async {
            db.connect::<Ws>(&config.endpoint).await?;
            db.signin(Root {
                username: config.username.clone(),
                password: config.password.clone(),
            })
            .await?;
            db.use_ns(&config.namespace)
                .use_db(&config.database)
                .await?;
            Ok::<(), surrealdb::Error>(())
        };
        timeout(limit, setup)
            .await
            .map_err(|_| DbError::Unavailable("surreal connect timed out".to_string()))?
            .map_err(|err| DbError::Unavailable(format!("surreal connect failed: {err}")))?;

        tracing::info!(
            endpoint = %config.endpoint,
            namespace = %config.namespace,
            database = %config.database,
            "connected to surreal"
        );
        Ok(Self {
            config,
            client: Arc::new(db),
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn client(&self) -> Arc<Surreal<Client>> {
        self.client.clone()
    }
}

impl DbAdapter for SurrealAdapter {
    fn name(&self) -> &'static str {
        "surrealdb"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        let endpoint = self.config.endpoint.clone();
        let limit = self.config.timeout;

        Box::pin(async move {
            let address = parse_socket_address(&endpoint)?;
            let connect = timeout(limit, TcpStream::connect(address))
                .await
                .map_err(|_| {
                    DbError::Unavailable("surreal endpoint connect timed out".to_string())
                })?;
            connect.map_err(|err| {
                DbError::Unavailable(format!("surreal endpoint connect failed: {err}"))
            })?;

            tracing::debug!(endpoint, "surreal health check succeeded");
            Ok(())
        })
    }

    fn ensure_schema(&self) -> BoxFuture<'_, Result<(), DbError>> {
        let client = self.client.clone();
        let limit = self.config.timeout;
        Box::pin(async move {
            let response = timeout(limit, client.query(SCHEMA))
                .await
                .map_err(|_| DbError::Unavailable("schema bootstrap timed out".to_string()))?
                .map_err(|err| DbError::Operation(format!("schema bootstrap failed: {err}")))?;
            response
                .check()
                .map_err(|err| DbError::Operation(format!("schema statement failed: {err}")))?;
            tracing::info!("ledger schema ensured");
            Ok(())
        })
    }
}

fn parse_socket_address(endpoint: &str) -> Result<String, DbError> {
    let normalized = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    };
    let parsed = Url::parse(&normalized).map_err(|err| {
        DbError::Unavailable(format!("invalid surreal endpoint '{endpoint}': {err}"))
    })?;

    let host = parsed.host_str().ok_or_else(|| {
        DbError::Unavailable(format!("missing surreal host in endpoint '{endpoint}'"))
    })?;
    let port = parsed.port_or_known_default().unwrap_or(8000);
    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_address_defaults_scheme_and_port() {
        assert_eq!(
            parse_socket_address("127.0.0.1:8000").expect("address"),
            "127.0.0.1:8000"
        );
        assert_eq!(
            parse_socket_address("wss://db.example.org").expect("address"),
            "db.example.org:443"
        );
    }

    #[tokio::test]
    async fn bounded_reports_elapsed_deadline_as_transient() {
        let result: DomainResult<()> = bounded(Duration::from_millis(5), "slow call", async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(DomainError::Transient(_))));
    }
}
