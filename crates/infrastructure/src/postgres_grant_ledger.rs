//! PostgreSQL-backed grant ledger.
//!
//! One table, primary key `(id, principal)`, secondary index on
//! `(revoked, principal)`. `revoked` is stored as `0`/`1`.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use allowgate_application::GrantLedger;
use allowgate_core::{AppError, AppResult, GrantId, Principal};
use allowgate_domain::{GrantRecord, HostAddress};


/// Default ledger table name.
pub const DEFAULT_LEDGER_TABLE: &str = "access_grants";

const DEFAULT_PAGE_SIZE: i64 = 100;

/// PostgreSQL implementation of the grant ledger port.
#[derive(Clone)]
pub struct PostgresGrantLedger {
    pool: PgPool,
    table_name: String,
    page_size: i64,
}

impl PostgresGrantLedger {
    /// Creates a ledger over `table_name`, which must be a plain SQL identifier.
    pub fn new(pool: PgPool, table_name: impl Into<String>) -> AppResult<Self> {
        let table_name = table_name.into();
        validate_table_name(table_name.as_str())?;

        Ok(Self {
            pool,
            table_name,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Overrides the number of rows read per page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*` up to 63 bytes.
pub fn validate_table_name(value: &str) -> AppResult<()> {
    let mut bytes = value.bytes();
    let starts_well = bytes
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == b'_');
    let rest_ok = bytes.all(|byte| byte.is_ascii_alphanumeric() || byte == b'_');

    if !starts_well || !rest_ok || value.len() > 63 {
        return Err(AppError::Validation(format!(
            "ledger table name '{value}' must be a plain SQL identifier"
        )));
    }

    Ok(())
}

#[async_trait]
impl GrantLedger for PostgresGrantLedger {
    async fn find_by_principal(&self, principal: &Principal) -> AppResult<Vec<GrantRecord>> {
        let sql = format!(
            r#"
            SELECT id, principal, address, expires_at, revoked
            FROM {table}
            WHERE principal = $1
              AND revoked = 0
              AND ($2::UUID IS NULL OR id > $2)
            ORDER BY id
            LIMIT $3
            "#,
            table = self.table_name
        );

        let mut records = Vec::new();
        let mut last_id: Option<Uuid> = None;

        loop {
            let rows = sqlx::query_as::<_, GrantRow>(sql.as_str())
                .bind(principal.as_str())
                .bind(last_id)
                .bind(self.page_size)
                .fetch_all(&self.pool)
                .await
                .map_err(|error| {
                    AppError::Ledger(format!(
                        "failed to read grants for principal '{principal}': {error}"
                    ))
                })?;

            let page_len = rows.len();
            last_id = rows.last().map(|row| row.id);
            for row in rows {
                records.push(row.try_into_record()?);
            }

            if i64::try_from(page_len).unwrap_or(i64::MAX) < self.page_size {
                return Ok(records);
            }
        }
    }

    async fn find_expired_active(&self) -> AppResult<Vec<GrantRecord>> {
        let sql = format!(
            r#"
            SELECT id, principal, address, expires_at, revoked
            FROM {table}
            WHERE revoked = 0
            ORDER BY expires_at, id
            "#,
            table = self.table_name
        );

        sqlx::query_as::<_, GrantRow>(sql.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Ledger(format!("failed to read active grants: {error}")))?
            .into_iter()
            .map(GrantRow::try_into_record)
            .collect()
    }

    async fn upsert(&self, record: &GrantRecord) -> AppResult<()> {
        let sql = format!(
            r#"
            INSERT INTO {table} (id, principal, address, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id, principal) DO UPDATE
            SET address = EXCLUDED.address,
                expires_at = EXCLUDED.expires_at,
                revoked = GREATEST({table}.revoked, EXCLUDED.revoked)
            "#,
            table = self.table_name
        );

        sqlx::query(sql.as_str())
            .bind(record.id().as_uuid())
            .bind(record.principal().as_str())
            .bind(record.address().as_cidr())
            .bind(record.expires_at())
            .bind(i16::from(record.is_revoked()))
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Ledger(format!("failed to write grant '{}': {error}", record.id()))
            })?;

        Ok(())
    }

    async fn create_table_if_absent(&self) -> AppResult<()> {
        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id UUID NOT NULL,
                    principal TEXT NOT NULL,
                    address TEXT NOT NULL,
                    expires_at BIGINT NOT NULL,
                    revoked SMALLINT NOT NULL DEFAULT 0,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    PRIMARY KEY (id, principal)
                )
                "#,
                table = self.table_name
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_revoked_principal_idx ON {table} (revoked, principal)",
                table = self.table_name
            ),
        ];

        for statement in &statements {
            match sqlx::query(statement.as_str()).execute(&self.pool).await {
                Ok(_) => {}
                Err(error) if is_already_exists(&error) => {
                    info!(table = %self.table_name, "ledger table already exists");
                }
                Err(error) => {
                    return Err(AppError::Ledger(format!(
                        "failed to provision ledger table '{}': {error}",
                        self.table_name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Concurrent `IF NOT EXISTS` DDL can still race on the catalog.
fn is_already_exists(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|database_error| database_error.code())
        .is_some_and(|code| code == "42P07" || code == "23505")
}

#[derive(Debug, sqlx::FromRow)]
struct GrantRow {
    id: Uuid,
    principal: String,
    address: String,
    expires_at: i64,
    revoked: i16,
}

impl GrantRow {
    fn try_into_record(self) -> AppResult<GrantRecord> {
        let principal = Principal::new(self.principal).map_err(|error| {
            AppError::Ledger(format!("grant '{}' has invalid principal: {error}", self.id))
        })?;
        let address = HostAddress::parse_cidr(self.address.as_str()).map_err(|error| {
            AppError::Ledger(format!("grant '{}' has invalid address: {error}", self.id))
        })?;

        Ok(GrantRecord::from_parts(
            GrantId::from_uuid(self.id),
            principal,
            address,
            self.expires_at,
            self.revoked != 0,
        ))
    }
}
