use tracing::{info, warn};

use crate::GrantLedger;

/// Best-effort ledger provisioning.
///
/// An existing table counts as success inside the adapter; every other
/// provisioning failure is logged and swallowed so callers can carry on.
pub async fn ensure_ledger_table(ledger: &dyn GrantLedger) -> bool {
    match ledger.create_table_if_absent().await {
        Ok(()) => {
            info!("grant ledger table is present");
            true
        }
        Err(error) => {
            warn!(error = %error, "grant ledger provisioning failed; continuing");
            false
        }
    }
}
