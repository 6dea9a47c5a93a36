//! Authentication: access tokens, session tracking and credential storage.
//!
//! This module implements:
//! - Argon2id password hashing with a stored per-credential salt and optional pepper
//! - HS256 access tokens (15-minute expiry) with a 60-second verification cache
//! - An in-memory session ledger with idle sweeps
//! - Self-service access requests approved or rejected by an admin
//!
//! ## Example
//!
//! ```no_run
//! use pi_cockpit::auth::{SessionRegistry, TokenService, UserStore};
//! use pi_cockpit::db::Database;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&Default::default()).await?;
//!     let users = Arc::new(UserStore::new(db.pool().clone(), String::new()));
//!     let tokens = TokenService::new(users.clone(), "a_secret_of_at_least_thirty_two_chars");
//!     let sessions = SessionRegistry::new();
//!
//!     if let Some(credential) = users.validate("user1@example.com", "1").await? {
//!         let token = tokens.issue(&credential.id)?;
//!         sessions.create(&credential.id, &token).await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod models;
pub mod sessions;
pub mod token;
pub mod users;

pub use errors::{AuthError, AuthResult};
pub use models::{
    AccessRequest, AccessTokenClaims, Credential, RequestStatus, Session, UserId, UserSummary,
};
pub use sessions::SessionRegistry;
pub use token::TokenService;
pub use users::{UserLookup, UserStore};
