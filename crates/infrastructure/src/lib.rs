//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_allow_list_gateway;
mod in_memory_allow_list_gateway;
mod in_memory_grant_ledger;
mod postgres_grant_ledger;
mod redis_principal_lock;

pub use http_allow_list_gateway::{HttpAllowListGateway, HttpAllowListGatewayConfig};
pub use in_memory_allow_list_gateway::InMemoryAllowListGateway;
pub use in_memory_grant_ledger::InMemoryGrantLedger;
pub use postgres_grant_ledger::{DEFAULT_LEDGER_TABLE, PostgresGrantLedger, validate_table_name};
pub use redis_principal_lock::{DEFAULT_LOCK_KEY_PREFIX, RedisPrincipalLock};
