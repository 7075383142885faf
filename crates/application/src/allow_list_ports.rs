use async_trait::async_trait;

use allowgate_core::AppResult;
use allowgate_domain::AllowListRules;

/// One page of allow-list rules returned by the external service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowListPage {
    /// Rules on this page.
    pub rules: AllowListRules,
    /// Opaque continuation token; `None` on the last page.
    pub next_token: Option<String>,
}

/// Port for the external allow-list service.
///
/// The service only supports reading all rules and replacing the whole set.
/// Adapters report every transport or service failure as `AppError::AllowList`.
#[async_trait]
pub trait AllowListGateway: Send + Sync {
    /// Reads one page of rules, starting after `next_token` when given.
    async fn describe_page(&self, next_token: Option<&str>) -> AppResult<AllowListPage>;

    /// Overwrites the full rule set and toggles enforcement.
    async fn replace(&self, rules: &AllowListRules, enabled: bool) -> AppResult<()>;
}
