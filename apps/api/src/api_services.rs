use std::sync::Arc;

use allowgate_application::{AllowListClient, GrantAdmissionService, ensure_ledger_table};
use allowgate_core::AppError;
use allowgate_domain::ValidationChain;
use allowgate_infrastructure::{
    DEFAULT_LOCK_KEY_PREFIX, HttpAllowListGateway, PostgresGrantLedger, RedisPrincipalLock,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::api_config::ApiConfig;
use crate::state::AppState;

pub async fn connect_database(database_url: &str) -> Result<PgPool, AppError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

pub fn build_redis_client(redis_url: &str) -> Result<redis::Client, AppError> {
    redis::Client::open(redis_url)
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))
}

/// Wires adapters into the admission service and provisions the ledger table.
pub async fn build_state(config: &ApiConfig) -> Result<AppState, AppError> {
    let pool = connect_database(config.database_url.as_str()).await?;
    let ledger = Arc::new(PostgresGrantLedger::new(
        pool.clone(),
        config.ledger_table_name.clone(),
    )?);
    ensure_ledger_table(ledger.as_ref()).await;

    let gateway = Arc::new(HttpAllowListGateway::new(config.allow_list.clone())?);
    let mut admission_service = GrantAdmissionService::new(
        AllowListClient::new(gateway),
        ledger,
        ValidationChain::standard(),
    );

    let redis_client = config
        .redis_url
        .as_deref()
        .map(build_redis_client)
        .transpose()?;
    if let Some(client) = &redis_client {
        let holder_id = format!("allowgate-api:{}", uuid::Uuid::new_v4());
        info!(
            holder_id = %holder_id,
            lease_seconds = config.principal_lock_seconds,
            "principal lock enabled"
        );
        admission_service = admission_service.with_principal_lock(
            Arc::new(RedisPrincipalLock::new(
                client.clone(),
                DEFAULT_LOCK_KEY_PREFIX,
            )),
            holder_id,
            config.principal_lock_seconds,
        );
    }

    Ok(AppState {
        admission_service,
        ledger_pool: Some(pool),
        redis_client,
    })
}
