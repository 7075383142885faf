use allowgate_core::{AppError, AppResult, GrantId, Principal};
use serde::{Deserialize, Serialize};

use crate::HostAddress;

/// Seconds in one hour of grant duration.
pub const SECONDS_PER_HOUR: i64 = 3_600;

/// Lifecycle position of one ledger row relative to a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    /// Not revoked and not yet past its expiry.
    Active,
    /// Not revoked but past its expiry; waiting for the sweeper.
    Due,
    /// Revoked. Terminal.
    Revoked,
}

impl GrantState {
    /// Returns a stable label for this state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Due => "due",
            Self::Revoked => "revoked",
        }
    }
}

/// One ledger row per (principal, address) pair ever granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    id: GrantId,
    principal: Principal,
    address: HostAddress,
    expires_at: i64,
    revoked: bool,
}

impl GrantRecord {
    /// Issues a fresh, unrevoked grant lasting `duration_hours` from `now`.
    pub fn issue(
        principal: Principal,
        address: HostAddress,
        duration_hours: u32,
        now: i64,
    ) -> AppResult<Self> {
        if duration_hours == 0 {
            return Err(AppError::Validation(
                "grant duration must be at least one hour".to_owned(),
            ));
        }

        let expires_at = i64::from(duration_hours)
            .checked_mul(SECONDS_PER_HOUR)
            .and_then(|seconds| now.checked_add(seconds))
            .ok_or_else(|| {
                AppError::Validation("grant duration exceeds supported range".to_owned())
            })?;

        Ok(Self {
            id: GrantId::new(),
            principal,
            address,
            expires_at,
            revoked: false,
        })
    }

    /// Rebuilds a record from persisted ledger values.
    #[must_use]
    pub fn from_parts(
        id: GrantId,
        principal: Principal,
        address: HostAddress,
        expires_at: i64,
        revoked: bool,
    ) -> Self {
        Self {
            id,
            principal,
            address,
            expires_at,
            revoked,
        }
    }

    /// Returns the immutable grant identifier.
    #[must_use]
    pub fn id(&self) -> GrantId {
        self.id
    }

    /// Returns the principal holding the grant.
    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Returns the granted host address.
    #[must_use]
    pub fn address(&self) -> HostAddress {
        self.address
    }

    /// Returns the expiry as seconds since the Unix epoch.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Returns whether the grant has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// Returns whether the grant is unrevoked and strictly past its expiry.
    #[must_use]
    pub fn is_due(&self, now: i64) -> bool {
        !self.revoked && self.expires_at < now
    }

    /// Classifies the record at `now`.
    #[must_use]
    pub fn state(&self, now: i64) -> GrantState {
        if self.revoked {
            GrantState::Revoked
        } else if self.expires_at < now {
            GrantState::Due
        } else {
            GrantState::Active
        }
    }

    /// Points an unrevoked grant at a new address. The expiry is left untouched.
    pub fn refresh_address(&mut self, address: HostAddress) -> AppResult<()> {
        if self.revoked {
            return Err(AppError::Conflict(format!(
                "grant '{}' is revoked and cannot be refreshed",
                self.id
            )));
        }

        self.address = address;
        Ok(())
    }

    /// Marks the grant revoked. Revocation happens once and is never undone.
    pub fn revoke(&mut self) -> AppResult<()> {
        if self.revoked {
            return Err(AppError::Conflict(format!(
                "grant '{}' is already revoked",
                self.id
            )));
        }

        self.revoked = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use allowgate_core::{AppError, Principal};

    use super::{GrantRecord, GrantState};
    use crate::HostAddress;

    fn alice_grant(duration_hours: u32, now: i64) -> GrantRecord {
        let principal = Principal::new("alice");
        let address = HostAddress::parse_dotted_quad("10.0.0.1");
        let (Ok(principal), Ok(address)) = (principal, address) else {
            panic!("fixture values must be valid");
        };

        match GrantRecord::issue(principal, address, duration_hours, now) {
            Ok(grant) => grant,
            Err(error) => panic!("failed to issue grant: {error}"),
        }
    }

    #[test]
    fn issue_computes_expiry_from_hours() {
        let grant = alice_grant(2, 1_000);
        assert_eq!(grant.expires_at(), 1_000 + 7_200);
        assert!(!grant.is_revoked());
        assert_eq!(grant.address().as_cidr(), "10.0.0.1/32");
    }

    #[test]
    fn issue_rejects_zero_duration() {
        let principal = Principal::new("alice");
        let address = HostAddress::parse_dotted_quad("10.0.0.1");
        let (Ok(principal), Ok(address)) = (principal, address) else {
            panic!("fixture values must be valid");
        };

        let result = GrantRecord::issue(principal, address, 0, 1_000);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn state_moves_from_active_to_due_to_revoked() {
        let mut grant = alice_grant(1, 0);
        assert_eq!(grant.state(3_600), GrantState::Active);
        assert!(!grant.is_due(3_600));
        assert_eq!(grant.state(3_601), GrantState::Due);
        assert!(grant.is_due(3_601));

        assert!(grant.revoke().is_ok());
        assert_eq!(grant.state(3_601), GrantState::Revoked);
        assert!(!grant.is_due(3_601));
    }

    #[test]
    fn revoke_is_one_way() {
        let mut grant = alice_grant(1, 0);
        assert!(grant.revoke().is_ok());
        assert!(matches!(grant.revoke(), Err(AppError::Conflict(_))));
        assert!(grant.is_revoked());
    }

    #[test]
    fn refresh_keeps_expiry() {
        let mut grant = alice_grant(1, 100);
        let Ok(next) = HostAddress::parse_dotted_quad("10.0.0.2") else {
            panic!("fixture value must be valid");
        };

        assert!(grant.refresh_address(next).is_ok());
        assert_eq!(grant.address(), next);
        assert_eq!(grant.expires_at(), 3_700);
    }

    #[test]
    fn refresh_rejects_revoked_grants() {
        let mut grant = alice_grant(1, 100);
        assert!(grant.revoke().is_ok());
        let Ok(next) = HostAddress::parse_dotted_quad("10.0.0.2") else {
            panic!("fixture value must be valid");
        };

        assert!(matches!(
            grant.refresh_address(next),
            Err(AppError::Conflict(_))
        ));
    }
}
