//! Allowgate expiry sweep worker.
//!
//! Runs the expiry sweep on a fixed interval, or once with the `once` argument.
//! Each cycle is followed by a reconciliation pass between allow-list and ledger.
//! Orphan repair needs two consecutive passes, so `once` only reports orphans.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use allowgate_application::{
    AllowListClient, ExpirySweepService, OrphanedRule, ReconciliationService,
    ensure_ledger_table,
};
use allowgate_core::{AppError, AppResult};
use allowgate_infrastructure::{
    DEFAULT_LEDGER_TABLE, HttpAllowListGateway, HttpAllowListGatewayConfig, PostgresGrantLedger,
    validate_table_name,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    ledger_table_name: String,
    allow_list: HttpAllowListGatewayConfig,
    sweep_interval_seconds: u64,
    reconcile_orphans: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let run_once = env::args().nth(1).as_deref() == Some("once");
    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let ledger = Arc::new(PostgresGrantLedger::new(
        pool,
        config.ledger_table_name.clone(),
    )?);
    ensure_ledger_table(ledger.as_ref()).await;

    let allow_list = AllowListClient::new(Arc::new(HttpAllowListGateway::new(
        config.allow_list.clone(),
    )?));
    let sweep_service = ExpirySweepService::new(allow_list.clone(), ledger.clone());
    let reconciliation_service = ReconciliationService::new(allow_list, ledger);

    info!(
        ledger_table = %config.ledger_table_name,
        allow_list_account = %config.allow_list.account_id,
        sweep_interval_seconds = config.sweep_interval_seconds,
        reconcile_orphans = config.reconcile_orphans,
        run_once,
        "allowgate-worker started"
    );

    if run_once {
        return run_cycle(
            &sweep_service,
            &reconciliation_service,
            config.reconcile_orphans,
            &[],
        )
        .await
        .map(|_| ());
    }

    let mut previous_orphans = Vec::new();
    loop {
        previous_orphans = match run_cycle(
            &sweep_service,
            &reconciliation_service,
            config.reconcile_orphans,
            &previous_orphans,
        )
        .await
        {
            Ok(orphans) => orphans,
            Err(error) => {
                warn!(error = %error, "sweep cycle failed");
                Vec::new()
            }
        };

        tokio::time::sleep(Duration::from_secs(config.sweep_interval_seconds)).await;
    }
}

async fn run_cycle(
    sweep_service: &ExpirySweepService,
    reconciliation_service: &ReconciliationService,
    reconcile_orphans: bool,
    previous_orphans: &[OrphanedRule],
) -> AppResult<Vec<OrphanedRule>> {
    let report = sweep_service.sweep().await?;
    if !report.revoked.is_empty() {
        info!(
            examined = report.examined,
            revoked = report.revoked.len(),
            "expired grants revoked"
        );
    }

    let reconciliation = reconciliation_service
        .reconcile(reconcile_orphans, previous_orphans)
        .await?;
    if !reconciliation.is_consistent() {
        warn!(
            orphaned_rules = reconciliation.orphaned_rules.len(),
            missing_rules = reconciliation.missing_rules.len(),
            removed_rules = reconciliation.removed_rules.len(),
            "allow-list and ledger disagree"
        );
    }

    Ok(reconciliation.orphaned_rules)
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let ledger_table_name = env::var("LEDGER_TABLE_NAME")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LEDGER_TABLE.to_owned());
        validate_table_name(ledger_table_name.as_str())?;

        let base_url = required_env("ALLOW_LIST_BASE_URL")?;
        let base_url = Url::parse(base_url.as_str()).map_err(|error| {
            AppError::Validation(format!("invalid ALLOW_LIST_BASE_URL '{base_url}': {error}"))
        })?;
        let allow_list = HttpAllowListGatewayConfig {
            base_url,
            account_id: required_env("ALLOW_LIST_ACCOUNT_ID")?,
            region: env::var("ALLOW_LIST_REGION").unwrap_or_else(|_| "us-east-1".to_owned()),
            bearer_token: env::var("ALLOW_LIST_TOKEN")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            timeout_seconds: parse_env_u64("ALLOW_LIST_TIMEOUT_SECONDS", 15)?,
        };

        let sweep_interval_seconds = parse_env_u64("SWEEP_INTERVAL_SECONDS", 300)?;
        if sweep_interval_seconds == 0 {
            return Err(AppError::Validation(
                "SWEEP_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let reconcile_orphans = parse_env_bool("RECONCILE_ORPHANS", false)?;

        Ok(Self {
            database_url,
            ledger_table_name,
            allow_list,
            sweep_interval_seconds,
            reconcile_orphans,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> AppResult<bool> {
    match env::var(name) {
        Ok(value) => parse_bool(value.as_str()).ok_or_else(|| {
            AppError::Validation(format!(
                "invalid {name} value '{value}': expected 'true' or 'false'"
            ))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") || value == "1" {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value == "0" {
        Some(false)
    } else {
        None
    }
}
