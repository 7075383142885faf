//! Drift detection between the allow-list and the grant ledger.
//!
//! The two stores cannot be written transactionally. A rule pushed to the
//! allow-list whose ledger write then failed never expires on its own; this
//! pass finds such rules and, when asked, removes them.
//!
//! An admission between its allow-list write and its ledger write looks
//! orphaned for that instant. Repair therefore only removes rules that were
//! already orphaned in the previous pass.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use allowgate_core::AppResult;
use allowgate_domain::GrantRecord;

use crate::{AllowListClient, GrantLedger};

/// Allow-list rule with no matching unrevoked ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrphanedRule {
    /// Rule address in CIDR form.
    pub address: String,
    /// Principal the rule is mapped to.
    pub principal: String,
}

/// Differences found by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Live rules the ledger does not know about.
    pub orphaned_rules: Vec<OrphanedRule>,
    /// Unexpired ledger rows whose rule is absent from the allow-list.
    pub missing_rules: Vec<GrantRecord>,
    /// Orphaned rules removed from the allow-list by this pass.
    pub removed_rules: Vec<OrphanedRule>,
}

impl ReconciliationReport {
    /// Returns whether both stores agree.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.orphaned_rules.is_empty() && self.missing_rules.is_empty()
    }
}

/// Application service comparing allow-list rules against the ledger.
#[derive(Clone)]
pub struct ReconciliationService {
    allow_list: AllowListClient,
    ledger: Arc<dyn GrantLedger>,
}

impl ReconciliationService {
    /// Creates a new reconciliation service.
    #[must_use]
    pub fn new(allow_list: AllowListClient, ledger: Arc<dyn GrantLedger>) -> Self {
        Self { allow_list, ledger }
    }

    /// Reconciles at the current time.
    pub async fn reconcile(
        &self,
        repair: bool,
        previous_orphans: &[OrphanedRule],
    ) -> AppResult<ReconciliationReport> {
        self.reconcile_at(Utc::now().timestamp(), repair, previous_orphans)
            .await
    }

    /// Diffs both stores. With `repair`, rules orphaned both now and in
    /// `previous_orphans` are dropped in one replace.
    ///
    /// Missing rules are only reported. Due grants are left to the sweeper.
    pub async fn reconcile_at(
        &self,
        now: i64,
        repair: bool,
        previous_orphans: &[OrphanedRule],
    ) -> AppResult<ReconciliationReport> {
        let active = self.ledger.find_expired_active().await?;
        let mut rules = self.allow_list.fetch_rules().await?;

        let known: HashSet<(String, String)> = active
            .iter()
            .map(|grant| {
                (
                    grant.address().as_cidr(),
                    grant.principal().as_str().to_owned(),
                )
            })
            .collect();

        let orphaned_rules: Vec<OrphanedRule> = rules
            .iter()
            .filter(|(address, principal)| {
                !known.contains(&((*address).to_owned(), (*principal).to_owned()))
            })
            .map(|(address, principal)| OrphanedRule {
                address: address.to_owned(),
                principal: principal.to_owned(),
            })
            .collect();

        let missing_rules: Vec<GrantRecord> = active
            .into_iter()
            .filter(|grant| !grant.is_due(now))
            .filter(|grant| {
                !rules.contains(
                    grant.address().as_cidr().as_str(),
                    grant.principal().as_str(),
                )
            })
            .collect();

        for orphan in &orphaned_rules {
            warn!(
                address = %orphan.address,
                principal = %orphan.principal,
                "allow-list rule has no active ledger row"
            );
        }
        for grant in &missing_rules {
            warn!(
                grant_id = %grant.id(),
                principal = %grant.principal(),
                address = %grant.address(),
                "active grant has no allow-list rule"
            );
        }

        let removed_rules: Vec<OrphanedRule> = if repair {
            orphaned_rules
                .iter()
                .filter(|orphan| previous_orphans.contains(orphan))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        if !removed_rules.is_empty() {
            for orphan in &removed_rules {
                rules.revoke(orphan.address.as_str(), orphan.principal.as_str());
            }
            self.allow_list.replace_rules(&rules).await?;
            info!(
                removed = removed_rules.len(),
                deferred = orphaned_rules.len() - removed_rules.len(),
                "orphaned allow-list rules removed"
            );
        }

        Ok(ReconciliationReport {
            orphaned_rules,
            missing_rules,
            removed_rules,
        })
    }
}
