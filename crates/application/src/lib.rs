//! Application services and ports.

#![forbid(unsafe_code)]

mod allow_list_client;
mod allow_list_ports;
mod expiry_sweep_service;
mod grant_admission_service;
mod ledger_ports;
mod ledger_provisioning;
mod lock_ports;
mod reconciliation_service;

#[cfg(test)]
mod test_fakes;

pub use allow_list_client::{AllowListClient, AppliedRules};
pub use allow_list_ports::{AllowListGateway, AllowListPage};
pub use expiry_sweep_service::{ExpirySweepService, SweepReport};
pub use grant_admission_service::{
    AccessRequest, AdmissionOutcome, AdmissionReceipt, AdmissionStage, GrantAdmissionService,
    denial_message,
};
pub use ledger_ports::GrantLedger;
pub use ledger_provisioning::ensure_ledger_table;
pub use lock_ports::{PrincipalLease, PrincipalLock};
pub use reconciliation_service::{OrphanedRule, ReconciliationReport, ReconciliationService};
