//! Redis-backed per-principal admission lock.

use async_trait::async_trait;
use redis::Script;

use allowgate_application::{PrincipalLease, PrincipalLock};
use allowgate_core::{AppError, AppResult, Principal};

/// Default key prefix for principal locks.
pub const DEFAULT_LOCK_KEY_PREFIX: &str = "allowgate:principal_lock";

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of the principal lock port.
#[derive(Clone)]
pub struct RedisPrincipalLock {
    client: redis::Client,
    key_prefix: String,
}

impl RedisPrincipalLock {
    /// Creates one lock adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, principal: &Principal) -> String {
        format!("{}:{}", self.key_prefix, principal.as_str())
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl PrincipalLock for RedisPrincipalLock {
    async fn try_acquire(
        &self,
        principal: &Principal,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<PrincipalLease>> {
        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "principal lock holder_id must not be empty".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "principal lock lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let key = self.key_for(principal);
        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let mut connection = self.connection().await?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(key.as_str())
            .arg(token.as_str())
            .arg("NX")
            .arg("EX")
            .arg(lease_seconds)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire principal lock: {error}"))
            })?;

        if reply.is_none() {
            return Ok(None);
        }

        Ok(Some(PrincipalLease {
            principal: principal.clone(),
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release(&self, lease: &PrincipalLease) -> AppResult<()> {
        let key = self.key_for(&lease.principal);
        let mut connection = self.connection().await?;

        Script::new(RELEASE_LOCK_SCRIPT)
            .key(key)
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release principal lock: {error}"))
            })?;

        Ok(())
    }
}
