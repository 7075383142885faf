use async_trait::async_trait;
use tokio::sync::RwLock;

use allowgate_application::{AllowListGateway, AllowListPage};
use allowgate_core::{AppError, AppResult};
use allowgate_domain::AllowListRules;

#[derive(Debug, Default)]
struct AllowListState {
    rules: AllowListRules,
    enabled: bool,
}

/// In-memory allow-list for local runs and tests.
///
/// With a page size set, describe results are split into pages whose
/// continuation tokens are numeric offsets.
#[derive(Debug, Default)]
pub struct InMemoryAllowListGateway {
    state: RwLock<AllowListState>,
    page_size: Option<usize>,
}

impl InMemoryAllowListGateway {
    /// Creates an empty, disabled allow-list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an allow-list seeded with `rules`.
    #[must_use]
    pub fn with_rules(rules: AllowListRules) -> Self {
        Self {
            state: RwLock::new(AllowListState {
                rules,
                enabled: true,
            }),
            page_size: None,
        }
    }

    /// Splits describe results into pages of `page_size` rules.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Returns the current rule set.
    pub async fn rules(&self) -> AllowListRules {
        self.state.read().await.rules.clone()
    }

    /// Returns whether enforcement is enabled.
    pub async fn is_enabled(&self) -> bool {
        self.state.read().await.enabled
    }
}

#[async_trait]
impl AllowListGateway for InMemoryAllowListGateway {
    async fn describe_page(&self, next_token: Option<&str>) -> AppResult<AllowListPage> {
        let state = self.state.read().await;

        let Some(page_size) = self.page_size else {
            return Ok(AllowListPage {
                rules: state.rules.clone(),
                next_token: None,
            });
        };

        let offset = match next_token {
            Some(token) => token.parse::<usize>().map_err(|error| {
                AppError::AllowList(format!("invalid allow-list next_token '{token}': {error}"))
            })?,
            None => 0,
        };
        let rules: AllowListRules = state
            .rules
            .iter()
            .skip(offset)
            .take(page_size)
            .collect();
        let end = offset.saturating_add(page_size);

        Ok(AllowListPage {
            rules,
            next_token: (end < state.rules.len()).then(|| end.to_string()),
        })
    }

    async fn replace(&self, rules: &AllowListRules, enabled: bool) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.rules = rules.clone();
        state.enabled = enabled;
        Ok(())
    }
}
