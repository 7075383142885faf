use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use allowgate_core::{AppResult, GrantId};

use crate::{AllowListClient, GrantLedger};


/// Summary of one sweep invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Unrevoked rows read from the ledger.
    pub examined: usize,
    /// Grants revoked by this sweep, in processing order.
    pub revoked: Vec<GrantId>,
}

/// Application service revoking grants past their expiry.
#[derive(Clone)]
pub struct ExpirySweepService {
    allow_list: AllowListClient,
    ledger: Arc<dyn GrantLedger>,
}

impl ExpirySweepService {
    /// Creates a new sweep service.
    #[must_use]
    pub fn new(allow_list: AllowListClient, ledger: Arc<dyn GrantLedger>) -> Self {
        Self { allow_list, ledger }
    }

    /// Sweeps at the current time.
    pub async fn sweep(&self) -> AppResult<SweepReport> {
        self.sweep_at(Utc::now().timestamp()).await
    }

    /// Revokes every unrevoked grant whose expiry is strictly before `now`.
    ///
    /// For each due grant the allow-list rule is removed first, then the ledger
    /// row is marked revoked. The first failure aborts the sweep; remaining
    /// grants are picked up by the next invocation.
    pub async fn sweep_at(&self, now: i64) -> AppResult<SweepReport> {
        let candidates = self.ledger.find_expired_active().await?;
        let mut report = SweepReport {
            examined: candidates.len(),
            revoked: Vec::new(),
        };

        for mut grant in candidates.into_iter().filter(|grant| grant.is_due(now)) {
            if let Err(error) = self
                .allow_list
                .apply_rules(&grant.address(), grant.principal(), true)
                .await
            {
                warn!(
                    grant_id = %grant.id(),
                    principal = %grant.principal(),
                    address = %grant.address(),
                    revoked_so_far = report.revoked.len(),
                    error = %error,
                    "sweep aborted on allow-list failure"
                );
                return Err(error);
            }

            grant.revoke()?;
            self.ledger.upsert(&grant).await?;
            info!(
                grant_id = %grant.id(),
                principal = %grant.principal(),
                address = %grant.address(),
                expires_at = grant.expires_at(),
                "grant revoked"
            );
            report.revoked.push(grant.id());
        }

        info!(
            examined = report.examined,
            revoked = report.revoked.len(),
            "expiry sweep completed"
        );
        Ok(report)
    }
}
