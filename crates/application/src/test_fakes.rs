use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use allowgate_core::{AppError, AppResult, Principal};
use allowgate_domain::{AllowListRules, GrantRecord, HostAddress};

use crate::{AllowListGateway, AllowListPage, GrantLedger, PrincipalLease, PrincipalLock};

pub(crate) fn host(value: &str) -> HostAddress {
    match HostAddress::parse_dotted_quad(value) {
        Ok(address) => address,
        Err(error) => panic!("invalid fixture address '{value}': {error}"),
    }
}

pub(crate) fn principal(value: &str) -> Principal {
    match Principal::new(value) {
        Ok(principal) => principal,
        Err(error) => panic!("invalid fixture principal '{value}': {error}"),
    }
}

pub(crate) fn grant(name: &str, address: &str, expires_at: i64) -> GrantRecord {
    GrantRecord::from_parts(
        allowgate_core::GrantId::new(),
        principal(name),
        host(address),
        expires_at,
        false,
    )
}

#[derive(Default)]
pub(crate) struct FakeAllowListGateway {
    rules: Mutex<AllowListRules>,
    pages: Mutex<Option<Vec<AllowListPage>>>,
    requested_tokens: Mutex<Vec<Option<String>>>,
    enabled_flags: Mutex<Vec<bool>>,
    fail_describe: Mutex<bool>,
    fail_replace_from: Mutex<Option<usize>>,
}

impl FakeAllowListGateway {
    pub(crate) fn with_rules(rules: AllowListRules) -> Self {
        Self {
            rules: Mutex::new(rules),
            ..Self::default()
        }
    }

    pub(crate) fn paged(pages: Vec<AllowListPage>) -> Self {
        Self {
            pages: Mutex::new(Some(pages)),
            ..Self::default()
        }
    }

    pub(crate) async fn rules(&self) -> AllowListRules {
        self.rules.lock().await.clone()
    }

    pub(crate) async fn requested_tokens(&self) -> Vec<Option<String>> {
        self.requested_tokens.lock().await.clone()
    }

    pub(crate) async fn enabled_flags(&self) -> Vec<bool> {
        self.enabled_flags.lock().await.clone()
    }

    pub(crate) async fn replace_calls(&self) -> usize {
        self.enabled_flags.lock().await.len()
    }

    pub(crate) async fn fail_describe(&self, fail: bool) {
        *self.fail_describe.lock().await = fail;
    }

    pub(crate) async fn fail_replace(&self, fail: bool) {
        *self.fail_replace_from.lock().await = fail.then_some(0);
    }

    /// Fails every replace call whose zero-based index is at least `call_index`.
    pub(crate) async fn fail_replace_from(&self, call_index: usize) {
        *self.fail_replace_from.lock().await = Some(call_index);
    }
}

#[async_trait]
impl AllowListGateway for FakeAllowListGateway {
    async fn describe_page(&self, next_token: Option<&str>) -> AppResult<AllowListPage> {
        self.requested_tokens
            .lock()
            .await
            .push(next_token.map(ToOwned::to_owned));

        if *self.fail_describe.lock().await {
            return Err(AppError::AllowList("describe unavailable".to_owned()));
        }

        let pages = self.pages.lock().await;
        let Some(pages) = pages.as_ref() else {
            return Ok(AllowListPage {
                rules: self.rules.lock().await.clone(),
                next_token: None,
            });
        };

        let index = match next_token {
            None => 0,
            Some(token) => pages
                .iter()
                .position(|page| page.next_token.as_deref() == Some(token))
                .map(|position| position + 1)
                .ok_or_else(|| AppError::AllowList(format!("unknown token '{token}'")))?,
        };

        pages
            .get(index)
            .cloned()
            .ok_or_else(|| AppError::AllowList(format!("no page at index {index}")))
    }

    async fn replace(&self, rules: &AllowListRules, enabled: bool) -> AppResult<()> {
        let mut flags = self.enabled_flags.lock().await;
        let call_index = flags.len();
        flags.push(enabled);

        if let Some(fail_from) = *self.fail_replace_from.lock().await {
            if call_index >= fail_from {
                return Err(AppError::AllowList("replace rejected".to_owned()));
            }
        }

        *self.rules.lock().await = rules.clone();
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeGrantLedger {
    records: Mutex<Vec<GrantRecord>>,
    upsert_calls: Mutex<usize>,
    create_table_calls: Mutex<usize>,
    fail_upsert: Mutex<bool>,
    fail_create_table: Mutex<bool>,
}

impl FakeGrantLedger {
    pub(crate) fn with_records(records: Vec<GrantRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub(crate) async fn records(&self) -> Vec<GrantRecord> {
        self.records.lock().await.clone()
    }

    pub(crate) async fn active_for(&self, name: &str) -> Vec<GrantRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|record| record.principal().as_str() == name && !record.is_revoked())
            .cloned()
            .collect()
    }

    pub(crate) async fn upsert_calls(&self) -> usize {
        *self.upsert_calls.lock().await
    }

    pub(crate) async fn create_table_calls(&self) -> usize {
        *self.create_table_calls.lock().await
    }

    pub(crate) async fn fail_upsert(&self, fail: bool) {
        *self.fail_upsert.lock().await = fail;
    }

    pub(crate) async fn fail_create_table(&self, fail: bool) {
        *self.fail_create_table.lock().await = fail;
    }
}

#[async_trait]
impl GrantLedger for FakeGrantLedger {
    async fn find_by_principal(&self, principal: &Principal) -> AppResult<Vec<GrantRecord>> {
        Ok(self.active_for(principal.as_str()).await)
    }

    async fn find_expired_active(&self) -> AppResult<Vec<GrantRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| !record.is_revoked())
            .cloned()
            .collect())
    }

    async fn upsert(&self, record: &GrantRecord) -> AppResult<()> {
        *self.upsert_calls.lock().await += 1;
        if *self.fail_upsert.lock().await {
            return Err(AppError::Ledger("put rejected".to_owned()));
        }

        let mut records = self.records.lock().await;
        match records.iter_mut().find(|stored| {
            stored.id() == record.id() && stored.principal() == record.principal()
        }) {
            Some(stored) => *stored = record.clone(),
            None => records.push(record.clone()),
        }

        Ok(())
    }

    async fn create_table_if_absent(&self) -> AppResult<()> {
        *self.create_table_calls.lock().await += 1;
        if *self.fail_create_table.lock().await {
            return Err(AppError::Ledger("provisioning denied".to_owned()));
        }

        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakePrincipalLock {
    holders: Mutex<HashMap<String, String>>,
    releases: Mutex<usize>,
}

impl FakePrincipalLock {
    pub(crate) async fn hold(&self, name: &str, holder_id: &str) {
        self.holders
            .lock()
            .await
            .insert(name.to_owned(), holder_id.to_owned());
    }

    pub(crate) async fn is_held(&self, name: &str) -> bool {
        self.holders.lock().await.contains_key(name)
    }

    pub(crate) async fn releases(&self) -> usize {
        *self.releases.lock().await
    }
}

#[async_trait]
impl PrincipalLock for FakePrincipalLock {
    async fn try_acquire(
        &self,
        principal: &Principal,
        holder_id: &str,
        _lease_seconds: u32,
    ) -> AppResult<Option<PrincipalLease>> {
        let mut holders = self.holders.lock().await;
        if holders.contains_key(principal.as_str()) {
            return Ok(None);
        }

        holders.insert(principal.as_str().to_owned(), holder_id.to_owned());
        Ok(Some(PrincipalLease {
            principal: principal.clone(),
            token: format!("{holder_id}:token"),
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release(&self, lease: &PrincipalLease) -> AppResult<()> {
        *self.releases.lock().await += 1;
        self.holders.lock().await.remove(lease.principal.as_str());
        Ok(())
    }
}
