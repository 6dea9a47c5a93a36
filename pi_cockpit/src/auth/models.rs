//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// User ID type
pub type UserId = String;

/// Stored credential. Never serialized to clients.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
}

/// Public view of a credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
}

impl From<&Credential> for UserSummary {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id.clone(),
            email: credential.email.clone(),
        }
    }
}

/// Lifecycle of a self-service signup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pending self-service signup awaiting admin approval
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub id: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub salt: String,
    pub name: String,
    pub requested_at: DateTime<Utc>,
    pub status: RequestStatus,
}

/// JWT claims for access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    #[serde(rename = "urn:app:userid")]
    pub sub: UserId, // User ID
    pub iat: i64,    // Issued at timestamp
    pub exp: i64,    // Expiration timestamp
}

/// Server-side record of an active login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: UserId,
    #[serde(skip_serializing)]
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}
