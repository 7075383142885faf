use async_trait::async_trait;

use allowgate_core::{AppResult, Principal};
use allowgate_domain::GrantRecord;

/// Repository port for the durable grant ledger.
///
/// Rows are never deleted. Adapters report storage failures as `AppError::Ledger`.
#[async_trait]
pub trait GrantLedger: Send + Sync {
    /// Returns every unrevoked row for `principal`, across all result pages.
    async fn find_by_principal(&self, principal: &Principal) -> AppResult<Vec<GrantRecord>>;

    /// Returns every unrevoked row. Callers decide which are past expiry.
    async fn find_expired_active(&self) -> AppResult<Vec<GrantRecord>>;

    /// Idempotent write keyed by `(id, principal)`.
    async fn upsert(&self, record: &GrantRecord) -> AppResult<()>;

    /// Creates backing storage when missing. An existing table is not an error.
    async fn create_table_if_absent(&self) -> AppResult<()>;
}
