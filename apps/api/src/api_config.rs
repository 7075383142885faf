use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use allowgate_core::AppError;
use allowgate_infrastructure::{
    DEFAULT_LEDGER_TABLE, HttpAllowListGatewayConfig, validate_table_name,
};
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_ALLOW_LIST_REGION: &str = "us-east-1";
const DEFAULT_ALLOW_LIST_TIMEOUT_SECONDS: u64 = 15;
const DEFAULT_PRINCIPAL_LOCK_SECONDS: u32 = 30;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub database_url: String,
    pub ledger_table_name: String,
    pub allow_list: HttpAllowListGatewayConfig,
    pub redis_url: Option<String>,
    pub principal_lock_seconds: u32,
    pub api_host: String,
    pub api_port: u16,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let database_url = required_non_empty_env("DATABASE_URL")?;
        let ledger_table_name = ledger_table_name_from_env()?;
        let allow_list = allow_list_config_from_env()?;

        let redis_url = env::var("REDIS_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let principal_lock_seconds = env::var("PRINCIPAL_LOCK_SECONDS")
            .ok()
            .map(|value| {
                value
                    .parse::<u32>()
                    .ok()
                    .filter(|seconds| *seconds > 0)
                    .ok_or_else(|| {
                        AppError::Validation(format!(
                            "PRINCIPAL_LOCK_SECONDS must be a positive integer, got '{value}'"
                        ))
                    })
            })
            .transpose()?
            .unwrap_or(DEFAULT_PRINCIPAL_LOCK_SECONDS);

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        Ok(Self {
            database_url,
            ledger_table_name,
            allow_list,
            redis_url,
            principal_lock_seconds,
            api_host,
            api_port,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn ledger_table_name_from_env() -> Result<String, AppError> {
    let table_name = env::var("LEDGER_TABLE_NAME")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LEDGER_TABLE.to_owned());
    validate_table_name(table_name.as_str())?;

    Ok(table_name)
}

pub fn allow_list_config_from_env() -> Result<HttpAllowListGatewayConfig, AppError> {
    let base_url = required_non_empty_env("ALLOW_LIST_BASE_URL")?;
    let base_url = Url::parse(base_url.as_str()).map_err(|error| {
        AppError::Validation(format!("invalid ALLOW_LIST_BASE_URL '{base_url}': {error}"))
    })?;

    let timeout_seconds = match env::var("ALLOW_LIST_TIMEOUT_SECONDS") {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid ALLOW_LIST_TIMEOUT_SECONDS: {error}"))
        })?,
        Err(_) => DEFAULT_ALLOW_LIST_TIMEOUT_SECONDS,
    };

    Ok(HttpAllowListGatewayConfig {
        base_url,
        account_id: required_non_empty_env("ALLOW_LIST_ACCOUNT_ID")?,
        region: env::var("ALLOW_LIST_REGION")
            .unwrap_or_else(|_| DEFAULT_ALLOW_LIST_REGION.to_owned()),
        bearer_token: env::var("ALLOW_LIST_TOKEN")
            .ok()
            .filter(|value| !value.trim().is_empty()),
        timeout_seconds,
    })
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn required_non_empty_env(name: &str) -> Result<String, AppError> {
    let value = required_env(name)?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}
