//! Credential storage and the access-request approval workflow.

use super::{
    errors::{AuthError, AuthResult},
    models::{AccessRequest, Credential, RequestStatus, UserId, UserSummary},
};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

/// Subject lookup used by token verification
#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Whether a credential with this id still exists
    async fn user_exists(&self, user_id: &str) -> AuthResult<bool>;
}

/// SQLite-backed user store
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
    pepper: String,
    argon2: Argon2<'static>,
}

impl UserStore {
    /// Create a user store with default Argon2id parameters
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    /// * `pepper` - Server-side pepper appended to every password before hashing
    pub fn new(pool: SqlitePool, pepper: String) -> Self {
        Self {
            pool,
            pepper,
            argon2: Argon2::default(),
        }
    }

    /// Create a user store with explicit Argon2id cost parameters
    ///
    /// Verification reads the parameters back from each stored hash, so
    /// credentials created with other parameters keep working.
    pub fn with_params(pool: SqlitePool, pepper: String, params: Params) -> Self {
        Self {
            pool,
            pepper,
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Check an email/password pair
    ///
    /// Returns `None` both for unknown emails and for wrong passwords.
    pub async fn validate(&self, email: &str, password: &str) -> AuthResult<Option<Credential>> {
        let Some(credential) = self.find_by_email(email).await? else {
            return Ok(None);
        };

        if self.verify_password(password, &credential.password_hash) {
            Ok(Some(credential))
        } else {
            Ok(None)
        }
    }

    /// Create a credential directly (admin path)
    ///
    /// # Errors
    ///
    /// * `AuthError::Validation` - Malformed email or empty password
    /// * `AuthError::DuplicateEmail` - Email already exists
    pub async fn create(&self, email: &str, password: &str, name: &str) -> AuthResult<Credential> {
        validate_email(email)?;
        validate_password(password)?;

        if self.find_by_email(email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let (password_hash, salt) = self.hash_password(password)?;
        let credential = Credential {
            id: new_id("user"),
            email: email.to_string(),
            password_hash,
            salt,
        };

        insert_credential(&self.pool, &credential).await?;
        log::info!("Created user {} <{}> {}", credential.id, email, name);
        Ok(credential)
    }

    /// Delete a credential
    pub async fn delete(&self, user_id: &str) -> AuthResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("User"));
        }
        log::info!("Deleted user {}", user_id);
        Ok(())
    }

    /// Replace a user's password, generating a fresh salt
    pub async fn set_password(&self, user_id: &str, password: &str) -> AuthResult<()> {
        validate_password(password)?;
        let (password_hash, salt) = self.hash_password(password)?;

        let result = sqlx::query("UPDATE users SET password_hash = ?, salt = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(&salt)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("User"));
        }
        log::info!("Password reset for user {}", user_id);
        Ok(())
    }

    /// List all credentials without secrets
    pub async fn list(&self) -> AuthResult<Vec<UserSummary>> {
        let rows = sqlx::query("SELECT id, email FROM users ORDER BY email")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| UserSummary {
                id: row.get("id"),
                email: row.get("email"),
            })
            .collect())
    }

    /// Email for a user id, if the user exists
    pub async fn email_of(&self, user_id: &str) -> AuthResult<Option<String>> {
        Ok(sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// User id registered for an email, if any
    pub async fn id_of(&self, email: &str) -> AuthResult<Option<UserId>> {
        Ok(sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// File a self-service signup
    ///
    /// # Errors
    ///
    /// * `AuthError::Validation` - Malformed email or empty password
    /// * `AuthError::DuplicateEmail` - Email is already a credential or has a pending request
    pub async fn request_access(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> AuthResult<AccessRequest> {
        validate_email(email)?;
        validate_password(password)?;

        if self.find_by_email(email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let pending = sqlx::query("SELECT id FROM user_requests WHERE email = ? AND status = ?")
            .bind(email)
            .bind(RequestStatus::Pending.as_str())
            .fetch_optional(&self.pool)
            .await?;
        if pending.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let (password_hash, salt) = self.hash_password(password)?;
        let request = AccessRequest {
            id: new_id("req"),
            email: email.to_string(),
            password_hash,
            salt,
            name: name.to_string(),
            requested_at: Utc::now(),
            status: RequestStatus::Pending,
        };

        sqlx::query(
            r#"
            INSERT INTO user_requests (id, email, password_hash, salt, name, requested_at, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.id)
        .bind(&request.email)
        .bind(&request.password_hash)
        .bind(&request.salt)
        .bind(&request.name)
        .bind(request.requested_at)
        .bind(request.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(duplicate_email_on_conflict)?;

        log::info!("Access requested for {} ({})", email, request.id);
        Ok(request)
    }

    /// Pending access requests, oldest first
    pub async fn pending_requests(&self) -> AuthResult<Vec<AccessRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, password_hash, salt, name, requested_at, status
            FROM user_requests
            WHERE status = ?
            ORDER BY requested_at
            "#,
        )
        .bind(RequestStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(access_request_from_row).collect()
    }

    /// Look up a single access request regardless of status
    pub async fn find_request(&self, request_id: &str) -> AuthResult<Option<AccessRequest>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, salt, name, requested_at, status
            FROM user_requests
            WHERE id = ?
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(access_request_from_row).transpose()
    }

    /// Approve a pending request, creating a credential from its stored hash
    ///
    /// # Errors
    ///
    /// * `AuthError::NotFound` - No such request
    /// * `AuthError::AlreadyProcessed` - Request is no longer pending
    /// * `AuthError::DuplicateEmail` - A credential with the email appeared meanwhile
    pub async fn approve(&self, request_id: &str) -> AuthResult<Credential> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, salt, name, requested_at, status
            FROM user_requests
            WHERE id = ?
            "#,
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AuthError::NotFound("Request"))?;

        let request = access_request_from_row(&row)?;
        if request.status != RequestStatus::Pending {
            return Err(AuthError::AlreadyProcessed);
        }

        let credential = Credential {
            id: new_id("user"),
            email: request.email.clone(),
            password_hash: request.password_hash,
            salt: request.salt,
        };
        insert_credential(&mut *tx, &credential).await?;

        sqlx::query("UPDATE user_requests SET status = ? WHERE id = ?")
            .bind(RequestStatus::Approved.as_str())
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        log::info!("Approved access request {} for {}", request_id, credential.email);
        Ok(credential)
    }

    /// Reject a pending request
    pub async fn reject(&self, request_id: &str) -> AuthResult<()> {
        let request = self
            .find_request(request_id)
            .await?
            .ok_or(AuthError::NotFound("Request"))?;

        if request.status != RequestStatus::Pending {
            return Err(AuthError::AlreadyProcessed);
        }

        // Guarded on status so a concurrent approve cannot be overwritten.
        let result = sqlx::query("UPDATE user_requests SET status = ? WHERE id = ? AND status = ?")
            .bind(RequestStatus::Rejected.as_str())
            .bind(request_id)
            .bind(RequestStatus::Pending.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::AlreadyProcessed);
        }
        log::info!("Rejected access request {}", request_id);
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Credential>> {
        let row = sqlx::query("SELECT id, email, password_hash, salt FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Credential {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            salt: row.get("salt"),
        }))
    }

    /// Hash password with Argon2id + pepper, returning `(phc_hash, salt)`
    fn hash_password(&self, password: &str) -> AuthResult<(String, String)> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string();

        Ok((hash, salt.as_str().to_string()))
    }

    /// Verify password against hash; the comparison is constant-time
    fn verify_password(&self, password: &str, hash: &str) -> bool {
        let peppered = format!("{}{}", password, self.pepper);
        let Ok(parsed_hash) = PasswordHash::new(hash) else {
            log::warn!("Stored password hash is not a valid PHC string");
            return false;
        };

        self.argon2
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

#[async_trait]
impl UserLookup for UserStore {
    async fn user_exists(&self, user_id: &str) -> AuthResult<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

async fn insert_credential<'e, E>(executor: E, credential: &Credential) -> AuthResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query("INSERT INTO users (id, email, password_hash, salt) VALUES (?, ?, ?, ?)")
        .bind(&credential.id)
        .bind(&credential.email)
        .bind(&credential.password_hash)
        .bind(&credential.salt)
        .execute(executor)
        .await
        .map_err(duplicate_email_on_conflict)?;
    Ok(())
}

/// Unique-index violations on `email` surface as `DuplicateEmail`
fn duplicate_email_on_conflict(e: sqlx::Error) -> AuthError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => AuthError::DuplicateEmail,
        other => AuthError::Database(other),
    }
}

fn access_request_from_row(row: &SqliteRow) -> AuthResult<AccessRequest> {
    let status: String = row.get("status");
    let status = RequestStatus::parse(&status).ok_or_else(|| {
        AuthError::Database(sqlx::Error::Decode(
            format!("unknown request status '{status}'").into(),
        ))
    })?;

    Ok(AccessRequest {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        salt: row.get("salt"),
        name: row.get("name"),
        requested_at: row.get::<DateTime<Utc>, _>("requested_at"),
        status,
    })
}

fn new_id(prefix: &str) -> UserId {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Validate email format
pub fn validate_email(email: &str) -> AuthResult<()> {
    let invalid = || AuthError::Validation(format!("invalid email address '{email}'"));

    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }

    Ok(())
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.is_empty() {
        return Err(AuthError::Validation("password must not be empty".to_string()));
    }
    Ok(())
}
