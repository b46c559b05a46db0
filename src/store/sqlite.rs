//! SQLite-based storage implementation.
//!
//! The partial unique index `idx_one_primary_per_store` is what keeps two
//! racing verifications from both inserting a primary row.

use super::{
    AccountId, AttemptType, BankAccount, InsertOutcome, VerificationAttempt, VerificationLimits,
    VerificationStatus, VerificationStore,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

const ACCOUNT_COLUMNS: &str = "id, store_id, account_type, holder_name, account_number, \
     account_number_masked, account_number_encrypted, ifsc_code, bank_name, branch_name, \
     upi_id, is_primary, is_active, verification_status, is_verified, beneficiary_name, \
     verification_response, attempt_count, last_attempt_at, verified_at, \
     provider_validation_id, provider_contact_id, provider_fund_account_id, created_at, \
     updated_at";

const ATTEMPT_COLUMNS: &str = "id, store_id, attempt_type, bank_account_id, \
     provider_validation_id, provider_fund_account_id, status, response, metadata, created_at";

/// SQLite store implementing [`VerificationStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run database migrations.
    fn migrate(conn: &Connection) -> Result<()> {
        let current_version = Self::get_schema_version(conn)?;

        if current_version < SCHEMA_VERSION {
            info!(
                current = current_version,
                target = SCHEMA_VERSION,
                "Running database migrations"
            );

            if current_version < 1 {
                Self::migrate_v1(conn)?;
            }

            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;

            info!("Database migrations complete");
        }

        Ok(())
    }

    /// Current schema version (0 if no schema exists).
    fn get_schema_version(conn: &Connection) -> Result<i32> {
        let table_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )?;

        if !table_exists {
            return Ok(0);
        }

        Ok(conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0).map(|v| v.unwrap_or(0))
        })?)
    }

    /// Migration to version 1: initial schema.
    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS bank_accounts (
                id TEXT PRIMARY KEY,
                store_id TEXT NOT NULL,
                account_type TEXT NOT NULL,
                holder_name TEXT NOT NULL,
                account_number TEXT,
                account_number_masked TEXT,
                account_number_encrypted TEXT,
                ifsc_code TEXT,
                bank_name TEXT,
                branch_name TEXT,
                upi_id TEXT,
                is_primary INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                verification_status TEXT NOT NULL DEFAULT 'pending',
                is_verified INTEGER NOT NULL DEFAULT 0,
                beneficiary_name TEXT,
                verification_response TEXT,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_attempt_at TEXT,
                verified_at TEXT,
                provider_validation_id TEXT,
                provider_contact_id TEXT,
                provider_fund_account_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_bank_accounts_store ON bank_accounts(store_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_one_primary_per_store
                ON bank_accounts(store_id) WHERE is_primary = 1 AND is_active = 1;

            CREATE TABLE IF NOT EXISTS verification_attempts (
                id TEXT PRIMARY KEY,
                store_id TEXT NOT NULL,
                attempt_type TEXT NOT NULL,
                bank_account_id TEXT,
                provider_validation_id TEXT,
                provider_fund_account_id TEXT,
                status TEXT NOT NULL,
                response TEXT,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_attempts_store_time
                ON verification_attempts(store_id, created_at);

            CREATE TABLE IF NOT EXISTS verification_limits (
                store_id TEXT PRIMARY KEY,
                bank_attempts_today INTEGER NOT NULL DEFAULT 0,
                upi_attempts_today INTEGER NOT NULL DEFAULT 0,
                last_reset_date TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }
}

/// Fixed-width RFC 3339 so text comparison orders correctly.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn invalid_value(idx: usize, value: &str) -> rusqlite::Error {
    conversion_error(
        idx,
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unexpected value '{value}'"),
        ),
    )
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn get_opt_json(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn get_attempt_type(row: &Row<'_>, idx: usize) -> rusqlite::Result<AttemptType> {
    let raw: String = row.get(idx)?;
    AttemptType::parse(&raw).ok_or_else(|| invalid_value(idx, &raw))
}

fn get_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<VerificationStatus> {
    let raw: String = row.get(idx)?;
    VerificationStatus::parse(&raw).ok_or_else(|| invalid_value(idx, &raw))
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<BankAccount> {
    Ok(BankAccount {
        id: get_uuid(row, 0)?,
        store_id: row.get(1)?,
        account_type: get_attempt_type(row, 2)?,
        holder_name: row.get(3)?,
        account_number: row.get(4)?,
        account_number_masked: row.get(5)?,
        account_number_encrypted: row.get(6)?,
        ifsc_code: row.get(7)?,
        bank_name: row.get(8)?,
        branch_name: row.get(9)?,
        upi_id: row.get(10)?,
        is_primary: row.get(11)?,
        is_active: row.get(12)?,
        verification_status: get_status(row, 13)?,
        is_verified: row.get(14)?,
        beneficiary_name: row.get(15)?,
        verification_response: get_opt_json(row, 16)?,
        attempt_count: row.get(17)?,
        last_attempt_at: get_opt_ts(row, 18)?,
        verified_at: get_opt_ts(row, 19)?,
        provider_validation_id: row.get(20)?,
        provider_contact_id: row.get(21)?,
        provider_fund_account_id: row.get(22)?,
        created_at: get_ts(row, 23)?,
        updated_at: get_ts(row, 24)?,
    })
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<VerificationAttempt> {
    let bank_account_id: Option<String> = row.get(3)?;
    let metadata: String = row.get(8)?;
    Ok(VerificationAttempt {
        id: get_uuid(row, 0)?,
        store_id: row.get(1)?,
        attempt_type: get_attempt_type(row, 2)?,
        bank_account_id: bank_account_id
            .map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(3, e)))
            .transpose()?,
        provider_validation_id: row.get(4)?,
        provider_fund_account_id: row.get(5)?,
        status: get_status(row, 6)?,
        response: get_opt_json(row, 7)?,
        metadata: serde_json::from_str(&metadata).map_err(|e| conversion_error(8, e))?,
        created_at: get_ts(row, 9)?,
    })
}

fn limits_from_row(row: &Row<'_>) -> rusqlite::Result<VerificationLimits> {
    let date: String = row.get(3)?;
    Ok(VerificationLimits {
        store_id: row.get(0)?,
        bank_attempts_today: row.get(1)?,
        upi_attempts_today: row.get(2)?,
        last_reset_date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| conversion_error(3, e))?,
    })
}

fn json_text(value: Option<&serde_json::Value>) -> Option<String> {
    value.map(serde_json::Value::to_string)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[async_trait]
impl VerificationStore for SqliteStore {
    async fn get_account(&self, store_id: &str, id: AccountId) -> Result<Option<BankAccount>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM bank_accounts WHERE id = ?1 AND store_id = ?2");
        Ok(conn
            .query_row(&sql, params![id.to_string(), store_id], account_from_row)
            .optional()?)
    }

    async fn primary_account(&self, store_id: &str) -> Result<Option<BankAccount>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM bank_accounts \
             WHERE store_id = ?1 AND is_primary = 1 AND is_active = 1"
        );
        Ok(conn
            .query_row(&sql, params![store_id], account_from_row)
            .optional()?)
    }

    async fn count_active_accounts(&self, store_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM bank_accounts WHERE store_id = ?1 AND is_active = 1",
            params![store_id],
            |row| row.get(0),
        )?;
        usize::try_from(count).map_err(|e| Error::Database(e.to_string()))
    }

    async fn insert_account(&self, a: &BankAccount) -> Result<InsertOutcome> {
        let conn = self.conn.lock();
        let sql = format!(
            "INSERT INTO bank_accounts ({ACCOUNT_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
              ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)"
        );
        let result = conn.execute(
            &sql,
            params![
                a.id.to_string(),
                a.store_id,
                a.account_type.as_str(),
                a.holder_name,
                a.account_number,
                a.account_number_masked,
                a.account_number_encrypted,
                a.ifsc_code,
                a.bank_name,
                a.branch_name,
                a.upi_id,
                a.is_primary,
                a.is_active,
                a.verification_status.as_str(),
                a.is_verified,
                a.beneficiary_name,
                json_text(a.verification_response.as_ref()),
                a.attempt_count,
                a.last_attempt_at.as_ref().map(ts),
                a.verified_at.as_ref().map(ts),
                a.provider_validation_id,
                a.provider_contact_id,
                a.provider_fund_account_id,
                ts(&a.created_at),
                ts(&a.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::PrimaryConflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_verification(&self, a: &BankAccount) -> Result<Option<BankAccount>> {
        let conn = self.conn.lock();
        let sql = format!(
            "UPDATE bank_accounts SET account_type = ?2, holder_name = ?3, account_number = ?4, \
             account_number_masked = ?5, account_number_encrypted = ?6, ifsc_code = ?7, \
             bank_name = ?8, branch_name = ?9, upi_id = ?10, verification_status = ?11, \
             is_verified = ?12, beneficiary_name = ?13, verification_response = ?14, \
             attempt_count = attempt_count + 1, last_attempt_at = ?15, verified_at = ?16, \
             provider_validation_id = ?17, provider_contact_id = ?18, \
             provider_fund_account_id = ?19, updated_at = ?20 \
             WHERE id = ?1 AND store_id = ?21 \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        Ok(conn
            .query_row(
                &sql,
                params![
                    a.id.to_string(),
                    a.account_type.as_str(),
                    a.holder_name,
                    a.account_number,
                    a.account_number_masked,
                    a.account_number_encrypted,
                    a.ifsc_code,
                    a.bank_name,
                    a.branch_name,
                    a.upi_id,
                    a.verification_status.as_str(),
                    a.is_verified,
                    a.beneficiary_name,
                    json_text(a.verification_response.as_ref()),
                    a.last_attempt_at.as_ref().map(ts),
                    a.verified_at.as_ref().map(ts),
                    a.provider_validation_id,
                    a.provider_contact_id,
                    a.provider_fund_account_id,
                    ts(&a.updated_at),
                    a.store_id,
                ],
                account_from_row,
            )
            .optional()?)
    }

    async fn record_refresh(&self, a: &BankAccount, validation_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows_affected = conn.execute(
            "UPDATE bank_accounts SET verification_status = ?3, is_verified = ?4, \
             verified_at = ?5, beneficiary_name = ?6, verification_response = ?7, \
             updated_at = ?8 \
             WHERE id = ?1 AND store_id = ?2 AND provider_validation_id = ?9",
            params![
                a.id.to_string(),
                a.store_id,
                a.verification_status.as_str(),
                a.is_verified,
                a.verified_at.as_ref().map(ts),
                a.beneficiary_name,
                json_text(a.verification_response.as_ref()),
                ts(&a.updated_at),
                validation_id,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    async fn append_attempt(&self, attempt: &VerificationAttempt) -> Result<()> {
        let conn = self.conn.lock();
        let sql = format!(
            "INSERT INTO verification_attempts ({ATTEMPT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        );
        conn.execute(
            &sql,
            params![
                attempt.id.to_string(),
                attempt.store_id,
                attempt.attempt_type.as_str(),
                attempt.bank_account_id.map(|id| id.to_string()),
                attempt.provider_validation_id,
                attempt.provider_fund_account_id,
                attempt.status.as_str(),
                json_text(attempt.response.as_ref()),
                attempt.metadata.to_string(),
                ts(&attempt.created_at),
            ],
        )?;
        Ok(())
    }

    async fn list_attempts(
        &self,
        store_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VerificationAttempt>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM verification_attempts \
             WHERE store_id = ?1 AND created_at >= ?2 AND created_at < ?3 \
             ORDER BY created_at"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![store_id, ts(&from), ts(&to)], attempt_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn load_limits(&self, store_id: &str, today: NaiveDate) -> Result<VerificationLimits> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "INSERT INTO verification_limits \
                 (store_id, bank_attempts_today, upi_attempts_today, last_reset_date) \
             VALUES (?1, 0, 0, ?2) \
             ON CONFLICT(store_id) DO UPDATE SET \
                 bank_attempts_today = CASE WHEN last_reset_date = excluded.last_reset_date \
                     THEN bank_attempts_today ELSE 0 END, \
                 upi_attempts_today = CASE WHEN last_reset_date = excluded.last_reset_date \
                     THEN upi_attempts_today ELSE 0 END, \
                 last_reset_date = excluded.last_reset_date \
             RETURNING store_id, bank_attempts_today, upi_attempts_today, last_reset_date",
            params![store_id, today.to_string()],
            limits_from_row,
        )?)
    }

    async fn increment_attempts(
        &self,
        store_id: &str,
        attempt_type: AttemptType,
        today: NaiveDate,
    ) -> Result<VerificationLimits> {
        let (bank, upi) = match attempt_type {
            AttemptType::Bank => (1_u32, 0_u32),
            AttemptType::Upi => (0, 1),
        };
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "INSERT INTO verification_limits \
                 (store_id, bank_attempts_today, upi_attempts_today, last_reset_date) \
             VALUES (?1, ?3, ?4, ?2) \
             ON CONFLICT(store_id) DO UPDATE SET \
                 bank_attempts_today = excluded.bank_attempts_today + \
                     CASE WHEN last_reset_date = excluded.last_reset_date \
                     THEN bank_attempts_today ELSE 0 END, \
                 upi_attempts_today = excluded.upi_attempts_today + \
                     CASE WHEN last_reset_date = excluded.last_reset_date \
                     THEN upi_attempts_today ELSE 0 END, \
                 last_reset_date = excluded.last_reset_date \
             RETURNING store_id, bank_attempts_today, upi_attempts_today, last_reset_date",
            params![store_id, today.to_string(), bank, upi],
            limits_from_row,
        )?)
    }
}
