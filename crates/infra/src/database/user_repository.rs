//! SQLite-backed implementation of the UserStore port.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, instrument};

use calbridge_core::ports::{StoredCredentials, UserStore};
use calbridge_domain::{Result, UpstreamProfile, User};

use super::{datetime_from_ts, SqlitePool};
use crate::errors::InfraError;

const USER_COLUMNS: &str = "id, google_id, email, display_name, picture_url,
       access_token_enc, refresh_token_enc, token_expiry, created_at, updated_at";

pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn find_by(&self, column: &str, value: &str) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
        conn.query_row(&sql, params![value], map_user)
            .optional()
            .map_err(|e| InfraError::from(e).into())
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        google_id: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        picture_url: row.get(4)?,
        access_token_enc: row.get(5)?,
        refresh_token_enc: row.get(6)?,
        token_expiry: row.get::<_, Option<i64>>(7)?.map(datetime_from_ts),
        created_at: datetime_from_ts(row.get(8)?),
        updated_at: datetime_from_ts(row.get(9)?),
    })
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        self.find_by("id", user_id)
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        self.find_by("google_id", google_id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_by("email", email)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn insert(&self, user: &User) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO users (id, google_id, email, display_name, picture_url,
                                access_token_enc, refresh_token_enc, token_expiry,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user.id,
                user.google_id,
                user.email,
                user.display_name,
                user.picture_url,
                user.access_token_enc,
                user.refresh_token_enc,
                user.token_expiry.map(|t| t.timestamp()),
                user.created_at.timestamp(),
                user.updated_at.timestamp(),
            ],
        )
        .map_err(InfraError::from)?;

        debug!(user_id = %user.id, "user inserted");
        Ok(())
    }

    async fn update_profile(&self, user_id: &str, profile: &UpstreamProfile) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users
                SET google_id = ?1, display_name = ?2, picture_url = ?3, updated_at = ?4
              WHERE id = ?5",
            params![
                profile.google_id,
                profile.display_name,
                profile.picture_url,
                Utc::now().timestamp(),
                user_id,
            ],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    async fn store_credentials(
        &self,
        user_id: &str,
        credentials: &StoredCredentials,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        // COALESCE keeps the stored refresh token when none was reissued.
        conn.execute(
            "UPDATE users
                SET access_token_enc = ?1,
                    refresh_token_enc = COALESCE(?2, refresh_token_enc),
                    token_expiry = ?3,
                    updated_at = ?4
              WHERE id = ?5",
            params![
                credentials.access_token_enc,
                credentials.refresh_token_enc,
                credentials.expiry.timestamp(),
                Utc::now().timestamp(),
                user_id,
            ],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    async fn clear_credentials(&self, user_id: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users
                SET access_token_enc = NULL, refresh_token_enc = NULL,
                    token_expiry = NULL, updated_at = ?1
              WHERE id = ?2",
            params![Utc::now().timestamp(), user_id],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id FROM users").map_err(InfraError::from)?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(InfraError::from)?;
        Ok(ids)
    }
}
