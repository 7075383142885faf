//! Admission of new grants and refresh of existing ones.
//!
//! The allow-list is always written before the ledger. When the ledger write
//! fails after a successful allow-list write, the principal keeps live access
//! with no ledger row to expire it; [`crate::ReconciliationService`] reports
//! such rules as orphaned.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use allowgate_core::{AppError, AppResult, Principal};
use allowgate_domain::{
    DurationCheck, GrantRecord, HostAddress, RequestParameters, ValidationChain,
};

use crate::{AllowListClient, GrantLedger, PrincipalLease, PrincipalLock, ensure_ledger_table};


/// Inbound access request, with parameters exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    /// Requested source address in dotted-quad form.
    pub address: String,
    /// Requesting principal name.
    pub principal: String,
    /// Grant length in whole hours, string encoded.
    pub duration: String,
}

/// Position of one admission in its lifecycle, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionStage {
    /// Request accepted for processing.
    Received,
    /// Validation chain passed.
    Validated,
    /// Allow-list rule written.
    AllowListUpdated,
    /// Ledger rows written.
    LedgerUpdated,
    /// Access granted.
    Granted,
    /// Validation chain rejected the request.
    Denied,
    /// A downstream call failed.
    Failed,
}

impl AdmissionStage {
    /// Returns a stable label for this stage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::AllowListUpdated => "allow_list_updated",
            Self::LedgerUpdated => "ledger_updated",
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Failed => "failed",
        }
    }
}

/// Details of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionReceipt {
    /// Ledger rows written by this admission.
    pub grants: Vec<GrantRecord>,
    /// `true` when a new row was created, `false` when existing rows were refreshed.
    pub created: bool,
    /// Allow-list addresses previously held by the principal and now dropped.
    pub replaced_addresses: Vec<String>,
}

/// Result of an admission that did not fail downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Access is live on the allow-list and recorded in the ledger.
    Granted(AdmissionReceipt),
    /// Validation rejected the request; nothing was written.
    Denied {
        /// Aggregated validation messages.
        messages: Vec<String>,
    },
}

impl AdmissionOutcome {
    /// Returns whether access was granted.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    /// Human-readable outcome returned to callers.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Granted(_) => "access granted".to_owned(),
            Self::Denied { messages } => denial_message(messages.join("\n").as_str()),
        }
    }
}

/// Formats the caller-facing reason for a refused admission.
#[must_use]
pub fn denial_message(reason: &str) -> String {
    format!("access NOT granted, reason: {reason}")
}

#[derive(Clone)]
struct LockSettings {
    lock: Arc<dyn PrincipalLock>,
    holder_id: String,
    lease_seconds: u32,
}

/// Application service admitting grants.
#[derive(Clone)]
pub struct GrantAdmissionService {
    allow_list: AllowListClient,
    ledger: Arc<dyn GrantLedger>,
    chain: Arc<ValidationChain>,
    provision_on_admit: bool,
    lock: Option<LockSettings>,
}

impl GrantAdmissionService {
    /// Creates a service with the given validation chain.
    #[must_use]
    pub fn new(
        allow_list: AllowListClient,
        ledger: Arc<dyn GrantLedger>,
        chain: ValidationChain,
    ) -> Self {
        Self {
            allow_list,
            ledger,
            chain: Arc::new(chain),
            provision_on_admit: true,
            lock: None,
        }
    }

    /// Serializes admissions per principal through `lock`.
    #[must_use]
    pub fn with_principal_lock(
        mut self,
        lock: Arc<dyn PrincipalLock>,
        holder_id: impl Into<String>,
        lease_seconds: u32,
    ) -> Self {
        self.lock = Some(LockSettings {
            lock,
            holder_id: holder_id.into(),
            lease_seconds: lease_seconds.max(1),
        });
        self
    }

    /// Toggles the best-effort table provisioning step run on every admission.
    #[must_use]
    pub fn with_provision_on_admit(mut self, provision_on_admit: bool) -> Self {
        self.provision_on_admit = provision_on_admit;
        self
    }

    /// Admits a request at the current time.
    pub async fn admit(&self, request: AccessRequest) -> AppResult<AdmissionOutcome> {
        self.admit_at(request, Utc::now().timestamp()).await
    }

    /// Admits a request, computing any new expiry from `now` (Unix seconds).
    pub async fn admit_at(&self, request: AccessRequest, now: i64) -> AppResult<AdmissionOutcome> {
        info!(
            principal = %request.principal,
            address = %request.address,
            stage = AdmissionStage::Received.as_str(),
            "access request received"
        );

        let parameters = RequestParameters {
            address: Some(request.address.clone()),
            principal: Some(request.principal.clone()),
            duration: Some(request.duration.clone()),
        };
        if let Err(messages) = self.chain.evaluate(&parameters) {
            warn!(
                principal = %request.principal,
                stage = AdmissionStage::Denied.as_str(),
                reasons = %messages.join("; "),
                "access request denied"
            );
            return Ok(AdmissionOutcome::Denied { messages });
        }

        let address = HostAddress::parse_dotted_quad(request.address.as_str())?;
        let principal = Principal::new(request.principal)?;
        let duration_hours = DurationCheck::parse_hours(request.duration.as_str())
            .ok_or_else(|| AppError::Validation("duration is invalid".to_owned()))?;
        info!(
            principal = %principal,
            address = %address,
            stage = AdmissionStage::Validated.as_str(),
            "access request validated"
        );

        if self.provision_on_admit {
            ensure_ledger_table(self.ledger.as_ref()).await;
        }

        let lease = self.acquire_lock(&principal).await?;
        let result = self
            .admit_validated(&principal, address, duration_hours, now)
            .await;
        if let Some(lease) = lease {
            self.release_lock(&lease).await;
        }

        match result {
            Ok(receipt) => {
                info!(
                    principal = %principal,
                    address = %address,
                    created = receipt.created,
                    stage = AdmissionStage::Granted.as_str(),
                    "access granted"
                );
                Ok(AdmissionOutcome::Granted(receipt))
            }
            Err(failure) => {
                error!(
                    principal = %principal,
                    address = %address,
                    error = %failure,
                    stage = AdmissionStage::Failed.as_str(),
                    "access admission failed"
                );
                Err(failure)
            }
        }
    }

    async fn admit_validated(
        &self,
        principal: &Principal,
        address: HostAddress,
        duration_hours: u32,
        now: i64,
    ) -> AppResult<AdmissionReceipt> {
        let replaced_addresses = self
            .allow_list
            .apply_rules(&address, principal, false)
            .await?
            .dropped;
        info!(
            principal = %principal,
            address = %address,
            stage = AdmissionStage::AllowListUpdated.as_str(),
            "allow-list updated"
        );

        let existing = self.ledger.find_by_principal(principal).await?;
        let receipt = if existing.is_empty() {
            let grant = GrantRecord::issue(principal.clone(), address, duration_hours, now)?;
            self.ledger.upsert(&grant).await?;
            info!(
                principal = %principal,
                grant_id = %grant.id(),
                expires_at = grant.expires_at(),
                stage = AdmissionStage::LedgerUpdated.as_str(),
                "grant recorded"
            );

            AdmissionReceipt {
                grants: vec![grant],
                created: true,
                replaced_addresses,
            }
        } else {
            let mut refreshed = Vec::with_capacity(existing.len());
            for mut grant in existing {
                grant.refresh_address(address)?;
                self.ledger.upsert(&grant).await?;
                info!(
                    principal = %principal,
                    grant_id = %grant.id(),
                    expires_at = grant.expires_at(),
                    stage = AdmissionStage::LedgerUpdated.as_str(),
                    "grant refreshed"
                );
                refreshed.push(grant);
            }

            AdmissionReceipt {
                grants: refreshed,
                created: false,
                replaced_addresses,
            }
        };

        Ok(receipt)
    }

    async fn acquire_lock(&self, principal: &Principal) -> AppResult<Option<PrincipalLease>> {
        let Some(settings) = &self.lock else {
            return Ok(None);
        };

        let lease = settings
            .lock
            .try_acquire(
                principal,
                settings.holder_id.as_str(),
                settings.lease_seconds,
            )
            .await?;

        match lease {
            Some(lease) => Ok(Some(lease)),
            None => Err(AppError::Conflict(format!(
                "another admission for '{principal}' is in progress"
            ))),
        }
    }

    async fn release_lock(&self, lease: &PrincipalLease) {
        let Some(settings) = &self.lock else {
            return;
        };

        if let Err(release_error) = settings.lock.release(lease).await {
            warn!(
                principal = %lease.principal,
                error = %release_error,
                "failed to release principal lock"
            );
        }
    }
}
