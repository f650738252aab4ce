//! Admin principals and well-known settings: idempotent bootstrap helpers.

use tracing::info;

use crate::apps::CredentialStore;
use crate::error::{DataError, Result};
use crate::model::{AdminBootstrap, AdminSettings, AdminUser};
use crate::secrets::{generate_hex_token, hash_password};

/// Settings key holding the admin mount path.
pub const ADMIN_BASE_PATH_KEY: &str = "admin_base_path";
/// Settings key holding the admin session secret.
pub const ADMIN_SESSION_SECRET_KEY: &str = "admin_session_secret";

const GENERATED_PATH_BYTES: usize = 10;
const SESSION_SECRET_BYTES: usize = 32;
const GENERATED_PASSWORD_BYTES: usize = 12;
const WEAK_PATH_MIN_LEN: usize = 12;
const WEAK_PATH_WORDS: [&str; 4] = ["admin", "panel", "manage", "sys"];

const SELECT_SETTING: &str = r"SELECT value FROM admin_settings WHERE key = $1";

const INSERT_SETTING: &str = r"
    INSERT INTO admin_settings (key, value)
    VALUES ($1, $2)
    ON CONFLICT (key) DO NOTHING
";

const COUNT_ADMINS: &str = r"SELECT COUNT(*) FROM admin_users";

const INSERT_ADMIN: &str = r"
    INSERT INTO admin_users (username, password_hash)
    VALUES ($1, $2)
";

const SELECT_ADMIN: &str = r"
    SELECT id, username, password_hash FROM admin_users WHERE username = $1
";

const UPDATE_ADMIN_PASSWORD: &str = r"
    UPDATE admin_users SET password_hash = $2 WHERE username = $1
";

impl CredentialStore {
    /// Provision the admin mount path and session secret.
    ///
    /// Idempotent: existing values always win over caller-supplied ones.
    /// The result reports which values were generated and whether the mount
    /// path is guessable.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidAdminPath`] when a caller-supplied path
    /// fails normalization, or a database error.
    pub async fn ensure_admin_settings(
        &self,
        desired_path: Option<&str>,
        desired_secret: Option<&str>,
    ) -> Result<AdminSettings> {
        let existing_path = self.get_setting(ADMIN_BASE_PATH_KEY).await?;
        let (base_path, generated_path) = match existing_path {
            Some(path) => (path, false),
            None => {
                let (path, generated) = match desired_path {
                    Some(desired) => (normalize_base_path(desired)?, false),
                    None => (format!("/{}", generate_hex_token(GENERATED_PATH_BYTES)), true),
                };
                self.put_setting(ADMIN_BASE_PATH_KEY, &path).await?;
                (path, generated)
            }
        };

        let existing_secret = self.get_setting(ADMIN_SESSION_SECRET_KEY).await?;
        let (session_secret, generated_secret) = match existing_secret {
            Some(secret) => (secret, false),
            None => {
                let (secret, generated) = desired_secret.map_or_else(
                    || (generate_hex_token(SESSION_SECRET_BYTES), true),
                    |secret| (secret.to_string(), false),
                );
                self.put_setting(ADMIN_SESSION_SECRET_KEY, &secret).await?;
                (secret, generated)
            }
        };

        let weak_path = is_weak_path(&base_path);
        Ok(AdminSettings {
            base_path,
            session_secret,
            generated_path,
            generated_secret,
            weak_path,
        })
    }

    /// Seed the first admin user.
    ///
    /// Idempotent: inserts exactly one row iff none exists. A missing
    /// password is generated and reported back exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing or the insert fails.
    pub async fn ensure_admin_user(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> Result<AdminBootstrap> {
        let count = sqlx::query_scalar::<_, i64>(COUNT_ADMINS)
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(AdminBootstrap {
                created: false,
                username: username.to_string(),
                generated_password: None,
            });
        }

        let (password, generated_password) = password.map_or_else(
            || {
                let generated = generate_hex_token(GENERATED_PASSWORD_BYTES);
                (generated.clone(), Some(generated))
            },
            |supplied| (supplied.to_string(), None),
        );
        let password_hash = hash_password(&password)?;
        sqlx::query(INSERT_ADMIN)
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        info!(username, "seeded bootstrap admin user");
        Ok(AdminBootstrap {
            created: true,
            username: username.to_string(),
            generated_password,
        })
    }

    /// Fetch an admin principal by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_admin_by_username(&self, username: &str) -> Result<Option<AdminUser>> {
        Ok(sqlx::query_as::<_, AdminUser>(SELECT_ADMIN)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Replace an admin password with a freshly derived hash.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing or the update fails.
    pub async fn update_admin_password(&self, username: &str, password: &str) -> Result<bool> {
        let password_hash = hash_password(password)?;
        let result = sqlx::query(UPDATE_ADMIN_PASSWORD)
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(sqlx::query_scalar::<_, String>(SELECT_SETTING)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(INSERT_SETTING)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Normalize a caller-supplied admin mount path.
///
/// # Errors
///
/// Returns [`DataError::InvalidAdminPath`] for empty or whitespace-bearing
/// paths.
pub fn normalize_base_path(path: &str) -> Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(DataError::InvalidAdminPath {
            reason: "must not be empty",
        });
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(DataError::InvalidAdminPath {
            reason: "must not contain whitespace",
        });
    }
    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    if normalized == "/" {
        return Err(DataError::InvalidAdminPath {
            reason: "must not be the root path",
        });
    }
    Ok(normalized)
}

/// Whether an admin mount path is guessable.
///
/// Measured on the path without its leading slash: fewer than twelve
/// characters, or any stock admin word, marks it weak.
#[must_use]
pub fn is_weak_path(path: &str) -> bool {
    let bare = path.trim_start_matches('/').to_ascii_lowercase();
    bare.len() < WEAK_PATH_MIN_LEN || WEAK_PATH_WORDS.iter().any(|word| bare.contains(word))
}
