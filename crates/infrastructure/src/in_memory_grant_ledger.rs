use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use allowgate_application::GrantLedger;
use allowgate_core::{AppResult, GrantId, Principal};
use allowgate_domain::GrantRecord;

/// In-memory grant ledger for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryGrantLedger {
    records: RwLock<HashMap<(GrantId, String), GrantRecord>>,
}

impl InMemoryGrantLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored row, revoked ones included, ordered by expiry.
    pub async fn records(&self) -> Vec<GrantRecord> {
        let mut records: Vec<GrantRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|record| (record.expires_at(), record.id()));
        records
    }
}

#[async_trait]
impl GrantLedger for InMemoryGrantLedger {
    async fn find_by_principal(&self, principal: &Principal) -> AppResult<Vec<GrantRecord>> {
        let records = self.records.read().await;

        let mut values: Vec<GrantRecord> = records
            .values()
            .filter(|record| !record.is_revoked() && record.principal() == principal)
            .cloned()
            .collect();
        values.sort_by_key(GrantRecord::id);

        Ok(values)
    }

    async fn find_expired_active(&self) -> AppResult<Vec<GrantRecord>> {
        let records = self.records.read().await;

        let mut values: Vec<GrantRecord> = records
            .values()
            .filter(|record| !record.is_revoked())
            .cloned()
            .collect();
        values.sort_by_key(|record| (record.expires_at(), record.id()));

        Ok(values)
    }

    async fn upsert(&self, record: &GrantRecord) -> AppResult<()> {
        let key = (record.id(), record.principal().as_str().to_owned());
        let mut records = self.records.write().await;

        let revoked = record.is_revoked()
            || records
                .get(&key)
                .is_some_and(|stored| stored.is_revoked());
        records.insert(
            key,
            GrantRecord::from_parts(
                record.id(),
                record.principal().clone(),
                record.address(),
                record.expires_at(),
                revoked,
            ),
        );

        Ok(())
    }

    async fn create_table_if_absent(&self) -> AppResult<()> {
        Ok(())
    }
}
