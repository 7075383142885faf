use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use allowgate_core::{AppError, AppResult, Principal};
use allowgate_domain::{AllowListRules, HostAddress};

use crate::AllowListGateway;

/// Upper bound on pages followed in one snapshot.
const MAX_DESCRIBE_PAGES: usize = 1_000;

/// Rule set pushed by one [`AllowListClient::apply_rules`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedRules {
    /// Complete rule set now on the allow-list.
    pub rules: AllowListRules,
    /// Addresses whose rules were dropped by this call.
    pub dropped: Vec<String>,
}

/// Read-modify-replace wrapper around the allow-list gateway.
#[derive(Clone)]
pub struct AllowListClient {
    gateway: Arc<dyn AllowListGateway>,
}

impl AllowListClient {
    /// Creates a client over the provided gateway.
    #[must_use]
    pub fn new(gateway: Arc<dyn AllowListGateway>) -> Self {
        Self { gateway }
    }

    /// Reads every page and merges them into one snapshot.
    ///
    /// The snapshot is not atomic across pages.
    pub async fn fetch_rules(&self) -> AppResult<AllowListRules> {
        let mut rules = AllowListRules::new();
        let mut next_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        for _ in 0..MAX_DESCRIBE_PAGES {
            let page = self.gateway.describe_page(next_token.as_deref()).await?;
            rules.merge(page.rules);

            match page.next_token {
                Some(token) if !seen_tokens.insert(token.clone()) => {
                    return Err(AppError::AllowList(format!(
                        "allow-list pagination repeated token '{token}'"
                    )));
                }
                Some(token) => next_token = Some(token),
                None => return Ok(rules),
            }
        }

        Err(AppError::AllowList(format!(
            "allow-list pagination exceeded {MAX_DESCRIBE_PAGES} pages"
        )))
    }

    /// Grants or revokes one rule and pushes the resulting full rule set.
    ///
    /// Granting drops every other rule held by `principal` first. Revoking only
    /// drops the exact `(address, principal)` pair. Enforcement is left enabled.
    pub async fn apply_rules(
        &self,
        address: &HostAddress,
        principal: &Principal,
        remove: bool,
    ) -> AppResult<AppliedRules> {
        let mut rules = self.fetch_rules().await?;

        let dropped = if remove {
            let cidr = address.as_cidr();
            let removed = rules.revoke(cidr.as_str(), principal.as_str());
            info!(
                principal = %principal,
                address = %address,
                removed,
                "removing allow-list rule"
            );
            if removed { vec![cidr] } else { Vec::new() }
        } else {
            let replaced = rules.grant(address, principal);
            info!(
                principal = %principal,
                address = %address,
                replaced = ?replaced,
                "setting allow-list rule"
            );
            replaced
        };

        self.replace_rules(&rules).await?;
        Ok(AppliedRules { rules, dropped })
    }

    /// Pushes `rules` as the complete rule set with enforcement enabled.
    pub async fn replace_rules(&self, rules: &AllowListRules) -> AppResult<()> {
        self.gateway.replace(rules, true).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use allowgate_core::AppError;
    use allowgate_domain::AllowListRules;

    use crate::AllowListPage;
    use crate::test_fakes::{FakeAllowListGateway, host, principal};

    use super::AllowListClient;

    #[tokio::test]
    async fn fetch_rules_merges_all_pages() {
        let gateway = Arc::new(FakeAllowListGateway::paged(vec![
            AllowListPage {
                rules: AllowListRules::from_iter([("10.0.0.1/32", "alice")]),
                next_token: Some("page-2".to_owned()),
            },
            AllowListPage {
                rules: AllowListRules::from_iter([("10.0.0.2/32", "bob")]),
                next_token: None,
            },
        ]));
        let client = AllowListClient::new(gateway.clone());

        let rules = client.fetch_rules().await;

        assert!(matches!(rules, Ok(ref rules) if rules.len() == 2));
        assert_eq!(
            gateway.requested_tokens().await,
            vec![None, Some("page-2".to_owned())]
        );
    }

    #[tokio::test]
    async fn fetch_rules_rejects_looping_pagination() {
        let gateway = Arc::new(FakeAllowListGateway::paged(vec![
            AllowListPage {
                rules: AllowListRules::new(),
                next_token: Some("again".to_owned()),
            },
            AllowListPage {
                rules: AllowListRules::new(),
                next_token: Some("again".to_owned()),
            },
        ]));
        let client = AllowListClient::new(gateway);

        let result = client.fetch_rules().await;
        assert!(matches!(result, Err(AppError::AllowList(_))));
    }

    #[tokio::test]
    async fn apply_rules_never_replaces_after_describe_failure() {
        let gateway = Arc::new(FakeAllowListGateway::default());
        gateway.fail_describe(true).await;
        let client = AllowListClient::new(gateway.clone());

        let result = client
            .apply_rules(&host("10.0.0.1"), &principal("alice"), false)
            .await;

        assert!(matches!(result, Err(AppError::AllowList(_))));
        assert_eq!(gateway.replace_calls().await, 0);
    }

    #[tokio::test]
    async fn apply_rules_grant_replaces_principal_rule_and_enables() {
        let gateway = Arc::new(FakeAllowListGateway::with_rules(AllowListRules::from_iter([
            ("10.0.0.1/32", "alice"),
            ("10.0.0.9/32", "bob"),
        ])));
        let client = AllowListClient::new(gateway.clone());

        let result = client
            .apply_rules(&host("10.0.0.2"), &principal("alice"), false)
            .await;
        assert!(matches!(result, Ok(ref applied) if applied.dropped == vec!["10.0.0.1/32".to_owned()]));

        let rules = gateway.rules().await;
        assert!(rules.contains("10.0.0.2/32", "alice"));
        assert!(rules.principal_for("10.0.0.1/32").is_none());
        assert!(rules.contains("10.0.0.9/32", "bob"));
        assert_eq!(gateway.enabled_flags().await, vec![true]);
    }

    #[tokio::test]
    async fn apply_rules_remove_only_drops_exact_pair() {
        let gateway = Arc::new(FakeAllowListGateway::with_rules(AllowListRules::from_iter([
            ("10.0.0.1/32", "alice"),
            ("10.0.0.9/32", "bob"),
        ])));
        let client = AllowListClient::new(gateway.clone());

        let wrong_owner = client
            .apply_rules(&host("10.0.0.9"), &principal("alice"), true)
            .await;
        assert!(matches!(wrong_owner, Ok(ref applied) if applied.dropped.is_empty()));
        assert_eq!(gateway.rules().await.len(), 2);

        let exact = client
            .apply_rules(&host("10.0.0.1"), &principal("alice"), true)
            .await;
        assert!(matches!(exact, Ok(ref applied) if applied.dropped == vec!["10.0.0.1/32".to_owned()]));
        assert_eq!(
            gateway.rules().await,
            AllowListRules::from_iter([("10.0.0.9/32", "bob")])
        );
    }

    #[tokio::test]
    async fn apply_rules_surfaces_replace_failures() {
        let gateway = Arc::new(FakeAllowListGateway::default());
        gateway.fail_replace(true).await;
        let client = AllowListClient::new(gateway.clone());

        let result = client
            .apply_rules(&host("10.0.0.1"), &principal("alice"), false)
            .await;

        assert!(matches!(result, Err(AppError::AllowList(_))));
        assert!(gateway.rules().await.is_empty());
    }
}
