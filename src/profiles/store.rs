//! Profile persistence backed by SQLite.
//!
//! # Schema
//! ```sql
//! CREATE TABLE profiles (
//!     user_id TEXT PRIMARY KEY,
//!     google_access_token TEXT,      -- Sealed (nonce || ciphertext, base64)
//!     google_refresh_token TEXT,     -- Sealed
//!     google_token_expires_at TEXT,  -- RFC 3339 timestamp
//!     google_linked INTEGER NOT NULL DEFAULT 0,
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL
//! );
//! ```
//!
//! # Thread Safety
//! - Connection is wrapped in Mutex for safe concurrent access
//! - SQLite itself is thread-safe with serialized mode

use super::{encryption, GoogleTokens};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Encrypted Google token storage, one row per user.
pub struct ProfileStore {
    conn: Mutex<Connection>,
    master_key: Vec<u8>,
}

impl ProfileStore {
    /// Creates or opens a profile store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file
    /// * `master_key` - Base64-encoded 32-byte encryption key
    pub fn new<P: AsRef<Path>>(db_path: P, master_key: &str) -> Result<Self> {
        let key_bytes = encryption::load_key(master_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open profile database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                google_access_token TEXT,
                google_refresh_token TEXT,
                google_token_expires_at TEXT,
                google_linked INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create profiles table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            master_key: key_bytes,
        })
    }

    /// Reads the Google token fields for a user.
    ///
    /// # Returns
    /// * `Ok(Some(GoogleTokens))` - Row found, tokens decrypted
    /// * `Ok(None)` - No profile row for this user
    /// * `Err` - If decryption or the database operation fails
    pub fn get(&self, user_id: &str) -> Result<Option<GoogleTokens>> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                r#"
                SELECT google_access_token, google_refresh_token,
                       google_token_expires_at, google_linked
                FROM profiles
                WHERE user_id = ?1
                "#,
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to read profile row")?;

        let Some((access_sealed, refresh_sealed, expires_at, linked)) = row else {
            return Ok(None);
        };

        let access_token = access_sealed
            .map(|sealed| encryption::open(&sealed, &self.master_key))
            .transpose()
            .context("Failed to decrypt access token")?;

        let refresh_token = refresh_sealed
            .map(|sealed| encryption::open(&sealed, &self.master_key))
            .transpose()
            .context("Failed to decrypt refresh token")?;

        let expires_at = expires_at
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
            .transpose()
            .context("Failed to parse token expiry timestamp")?;

        Ok(Some(GoogleTokens {
            access_token,
            refresh_token,
            expires_at,
            linked,
        }))
    }

    /// Provisions an empty profile row for a user.
    ///
    /// Normally user provisioning happens in the surrounding LMS when the
    /// account is created; this exists so the service can run against a
    /// fresh database. Existing rows are left untouched.
    pub fn create_profile(&self, user_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO profiles (user_id, created_at, updated_at)
                VALUES (?1, ?2, ?2)
                ON CONFLICT(user_id) DO NOTHING
                "#,
                params![user_id, now],
            )
            .context("Failed to create profile row")?;
        Ok(())
    }

    /// Writes the full token triple and marks the profile linked.
    ///
    /// Creates the profile row on first link; on repeat links the triple is
    /// replaced (upsert).
    pub fn store_link(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let access_sealed = encryption::seal(access_token, &self.master_key)
            .context("Failed to encrypt access token")?;
        let refresh_sealed = encryption::seal(refresh_token, &self.master_key)
            .context("Failed to encrypt refresh token")?;

        let now = Utc::now().to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO profiles (
                    user_id, google_access_token, google_refresh_token,
                    google_token_expires_at, google_linked, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
                ON CONFLICT(user_id) DO UPDATE SET
                    google_access_token = excluded.google_access_token,
                    google_refresh_token = excluded.google_refresh_token,
                    google_token_expires_at = excluded.google_token_expires_at,
                    google_linked = 1,
                    updated_at = excluded.updated_at
                "#,
                params![
                    user_id,
                    access_sealed,
                    refresh_sealed,
                    expires_at.to_rfc3339(),
                    now,
                ],
            )
            .context("Failed to store link tokens")?;

        Ok(())
    }

    /// Writes a rotated access token and its expiry.
    ///
    /// The refresh token and linked flag are left untouched (providers may
    /// omit a new refresh token on rotation). Errors if no profile row
    /// exists for the user.
    pub fn store_access_token(
        &self,
        user_id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let access_sealed = encryption::seal(access_token, &self.master_key)
            .context("Failed to encrypt access token")?;

        let updated = self
            .conn
            .lock()
            .unwrap()
            .execute(
                r#"
                UPDATE profiles
                SET google_access_token = ?2,
                    google_token_expires_at = ?3,
                    updated_at = ?4
                WHERE user_id = ?1
                "#,
                params![
                    user_id,
                    access_sealed,
                    expires_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to update access token")?;

        if updated == 0 {
            bail!("No profile row for user '{}'", user_id);
        }

        Ok(())
    }
}
