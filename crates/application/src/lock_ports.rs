use async_trait::async_trait;

use allowgate_core::{AppResult, Principal};

/// Lease held on one principal by one admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalLease {
    /// Locked principal.
    pub principal: Principal,
    /// Token proving ownership of the lease.
    pub token: String,
    /// Holder that acquired the lease.
    pub holder_id: String,
}

/// Optional mutual exclusion scoped by principal.
#[async_trait]
pub trait PrincipalLock: Send + Sync {
    /// Attempts to lock `principal`; `None` when another holder owns it.
    async fn try_acquire(
        &self,
        principal: &Principal,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<PrincipalLease>>;

    /// Releases a lease if it is still owned by its token.
    async fn release(&self, lease: &PrincipalLease) -> AppResult<()>;
}
