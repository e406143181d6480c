use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use uuid::Uuid;

use shared::domain::{
    HospitalId, Identity, IncidentReport, NewReport, ReportId, ReportStatus, Role, UserId,
};

const REPORT_COLUMNS: &str = "id, created_at, submitter_id, location, incident_type, persons_injured, consciousness_state, hospital_id, hospital_name, status";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub user_id: UserId,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl StoredAccount {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id,
            email: self.email.clone(),
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// Result of a conditional `pending -> decided` update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusTransition {
    Applied(IncidentReport),
    AlreadyDecided(IncidentReport),
    NotFound,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Returns `None` when the email is already registered.
    pub async fn create_account(
        &self,
        email: &str,
        username: &str,
        role: Role,
        password: &str,
    ) -> Result<Option<StoredAccount>> {
        let user_id = UserId::generate();
        let password_hash = hash_password(password)?;
        let created_at = Utc::now().trunc_subsecs(6);

        let row = sqlx::query(
            "INSERT INTO accounts (id, email, username, role, password_hash, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(email) DO NOTHING
             RETURNING id",
        )
        .bind(user_id.to_string())
        .bind(email.trim())
        .bind(username.trim())
        .bind(role.as_str())
        .bind(&password_hash)
        .bind(encode_timestamp(created_at))
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert account")?;

        Ok(row.map(|_| StoredAccount {
            user_id,
            email: email.trim().to_string(),
            username: username.trim().to_string(),
            role,
            created_at,
        }))
    }

    /// Returns the account only when both email and password match.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<StoredAccount>> {
        let row = sqlx::query(
            "SELECT id, email, username, role, created_at, password_hash
             FROM accounts WHERE email = ?",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let stored: String = row.try_get("password_hash")?;
        if !password_matches(&stored, password)? {
            return Ok(None);
        }
        account_from_row(&row).map(Some)
    }

    pub async fn load_account(&self, user_id: UserId) -> Result<Option<StoredAccount>> {
        let row = sqlx::query("SELECT id, email, username, role, created_at FROM accounts WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    pub async fn list_accounts(&self) -> Result<Vec<StoredAccount>> {
        let rows = sqlx::query(
            "SELECT id, email, username, role, created_at FROM accounts ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(account_from_row).collect()
    }

    /// Stores a new report as `pending`; id and timestamp are assigned here.
    pub async fn insert_report(&self, report: &NewReport) -> Result<IncidentReport> {
        let stored = IncidentReport {
            id: ReportId::generate(),
            created_at: Utc::now().trunc_subsecs(6),
            submitter_id: report.submitter_id,
            location: report.location.clone(),
            incident_type: report.incident_type.clone(),
            persons_injured: report.persons_injured.clone(),
            consciousness_state: report.consciousness_state.clone(),
            hospital_id: report.hospital_id,
            hospital_name: report.hospital_name.clone(),
            status: ReportStatus::Pending,
        };

        sqlx::query(
            "INSERT INTO incident_reports (id, created_at, submitter_id, location, incident_type, persons_injured, consciousness_state, hospital_id, hospital_name, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(stored.id.to_string())
        .bind(encode_timestamp(stored.created_at))
        .bind(stored.submitter_id.to_string())
        .bind(&stored.location)
        .bind(&stored.incident_type)
        .bind(stored.persons_injured.as_deref())
        .bind(&stored.consciousness_state)
        .bind(stored.hospital_id.to_string())
        .bind(&stored.hospital_name)
        .bind(stored.status.as_str())
        .execute(&self.pool)
        .await
        .context("failed to insert incident report")?;

        Ok(stored)
    }

    pub async fn load_report(&self, report_id: ReportId) -> Result<Option<IncidentReport>> {
        let row = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM incident_reports WHERE id = ?"
        ))
        .bind(report_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(report_from_row).transpose()
    }

    /// All reports, newest first.
    pub async fn list_reports(&self) -> Result<Vec<IncidentReport>> {
        let rows = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM incident_reports ORDER BY created_at DESC, seq DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(report_from_row).collect()
    }

    pub async fn latest_report_for_submitter(
        &self,
        submitter_id: UserId,
    ) -> Result<Option<IncidentReport>> {
        let row = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM incident_reports
             WHERE submitter_id = ?
             ORDER BY created_at DESC, seq DESC
             LIMIT 1"
        ))
        .bind(submitter_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(report_from_row).transpose()
    }

    /// Moves a pending report to a terminal status. The `status = 'pending'`
    /// guard makes the transition happen at most once per report.
    pub async fn transition_report_status(
        &self,
        report_id: ReportId,
        target: ReportStatus,
    ) -> Result<StatusTransition> {
        if !target.is_terminal() {
            return Err(anyhow!(
                "report status can only move to accepted or rejected, got {}",
                target.as_str()
            ));
        }

        let updated = sqlx::query(
            "UPDATE incident_reports SET status = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(target.as_str())
        .bind(report_id.to_string())
        .execute(&self.pool)
        .await
        .context("failed to update report status")?
        .rows_affected();

        let Some(report) = self.load_report(report_id).await? else {
            return Ok(StatusTransition::NotFound);
        };
        if updated == 0 {
            return Ok(StatusTransition::AlreadyDecided(report));
        }
        Ok(StatusTransition::Applied(report))
    }
}

/// Argon2id with a random salt, encoded as a PHC string.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|err| anyhow!("failed to encode password salt: {err}"))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

fn password_matches(stored: &str, password: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(stored).map_err(|err| anyhow!("stored password hash is invalid: {err}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

// Fixed-width RFC 3339 keeps lexicographic order equal to time order.
// Callers truncate to microseconds so values survive a round trip.
fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp '{raw}'"))?
        .with_timezone(&Utc))
}

fn account_from_row(row: &SqliteRow) -> Result<StoredAccount> {
    Ok(StoredAccount {
        user_id: row.try_get::<String, _>("id")?.parse()?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        role: row
            .try_get::<String, _>("role")?
            .parse()
            .map_err(|err: String| anyhow!(err))?,
        created_at: decode_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn report_from_row(row: &SqliteRow) -> Result<IncidentReport> {
    Ok(IncidentReport {
        id: row.try_get::<String, _>("id")?.parse()?,
        created_at: decode_timestamp(&row.try_get::<String, _>("created_at")?)?,
        submitter_id: row.try_get::<String, _>("submitter_id")?.parse()?,
        location: row.try_get("location")?,
        incident_type: row.try_get("incident_type")?,
        persons_injured: row.try_get("persons_injured")?,
        consciousness_state: row.try_get("consciousness_state")?,
        hospital_id: row.try_get::<String, _>("hospital_id")?.parse::<HospitalId>()?,
        hospital_name: row.try_get("hospital_name")?,
        status: row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(|err: String| anyhow!(err))?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
