//! HTTP adapter for the external IP allow-list service.
//!
//! The service exposes one resource per account:
//! `GET {base}/accounts/{account_id}/ip-restriction[?next_token=..]` reads a page
//! of rules and `PUT` on the same path replaces the whole rule set.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use url::Url;

use allowgate_application::{AllowListGateway, AllowListPage};
use allowgate_core::{AppError, AppResult};
use allowgate_domain::AllowListRules;


const REGION_HEADER: &str = "x-allowgate-region";

/// Connection settings for the allow-list service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpAllowListGatewayConfig {
    /// Service base URL.
    pub base_url: Url,
    /// Account whose allow-list is managed.
    pub account_id: String,
    /// Region the account lives in.
    pub region: String,
    /// Optional bearer token sent on every call.
    pub bearer_token: Option<String>,
    /// Per-request timeout.
    pub timeout_seconds: u64,
}

/// reqwest-backed implementation of the allow-list port.
#[derive(Clone)]
pub struct HttpAllowListGateway {
    http_client: reqwest::Client,
    endpoint: Url,
    region: String,
    bearer_token: Option<String>,
}

impl HttpAllowListGateway {
    /// Builds the gateway and its HTTP client.
    pub fn new(config: HttpAllowListGatewayConfig) -> AppResult<Self> {
        if config.account_id.trim().is_empty() {
            return Err(AppError::Validation(
                "allow-list account_id must not be empty".to_owned(),
            ));
        }

        let mut endpoint = config.base_url.clone();
        endpoint
            .path_segments_mut()
            .map_err(|()| {
                AppError::Validation(format!(
                    "allow-list base URL '{}' cannot carry a path",
                    config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["accounts", config.account_id.as_str(), "ip-restriction"]);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build allow-list HTTP client: {error}"))
            })?;

        Ok(Self {
            http_client,
            endpoint,
            region: config.region,
            bearer_token: config.bearer_token,
        })
    }

    /// Returns the resolved ip-restriction endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn decorate(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(REGION_HEADER, self.region.as_str());
        match &self.bearer_token {
            Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }
}

#[async_trait]
impl AllowListGateway for HttpAllowListGateway {
    async fn describe_page(&self, next_token: Option<&str>) -> AppResult<AllowListPage> {
        let mut url = self.endpoint.clone();
        if let Some(token) = next_token {
            url.query_pairs_mut().append_pair("next_token", token);
        }

        let response = self
            .decorate(self.http_client.get(url))
            .send()
            .await
            .map_err(|error| {
                AppError::AllowList(format!("failed to call allow-list describe: {error}"))
            })?;
        let response = ensure_success(response, "describe").await?;

        let body = response
            .json::<DescribeRestrictionResponse>()
            .await
            .map_err(|error| {
                AppError::AllowList(format!(
                    "failed to parse allow-list describe response body: {error}"
                ))
            })?;

        Ok(AllowListPage {
            rules: AllowListRules::from(body.ip_restriction_rule_map),
            next_token: body.next_token.filter(|token| !token.is_empty()),
        })
    }

    async fn replace(&self, rules: &AllowListRules, enabled: bool) -> AppResult<()> {
        let response = self
            .decorate(self.http_client.put(self.endpoint.clone()))
            .json(&ReplaceRestrictionRequest {
                ip_restriction_rule_map: rules,
                enabled,
            })
            .send()
            .await
            .map_err(|error| {
                AppError::AllowList(format!("failed to call allow-list replace: {error}"))
            })?;
        ensure_success(response, "replace").await?;

        Ok(())
    }
}

async fn ensure_success(
    response: reqwest::Response,
    operation: &str,
) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_owned());
    Err(AppError::AllowList(format!(
        "allow-list {operation} returned status {}: {body}",
        status.as_u16()
    )))
}

#[derive(Debug, Deserialize)]
struct DescribeRestrictionResponse {
    #[serde(default)]
    ip_restriction_rule_map: BTreeMap<String, String>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReplaceRestrictionRequest<'a> {
    ip_restriction_rule_map: &'a AllowListRules,
    enabled: bool,
}
