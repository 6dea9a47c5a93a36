//! In-memory ledger of active logins.
//!
//! The registry never validates tokens. Callers verify through the token
//! service first and pass the verified subject along.

use super::models::{Session, UserId};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Sessions idle longer than this are swept
pub const SESSION_IDLE_TIMEOUT_SECS: i64 = 15 * 60;

/// Tracks active sessions keyed by token
pub struct SessionRegistry {
    sessions: RwLock<Vec<Session>>,
    idle_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
            idle_timeout: Duration::seconds(SESSION_IDLE_TIMEOUT_SECS),
        }
    }

    /// Record a new login, then sweep idle sessions
    pub async fn create(&self, user_id: &str, token: &str) -> Session {
        let session = {
            let mut sessions = self.sessions.write().await;
            let session = new_session(user_id, token);
            sessions.push(session.clone());
            session
        };

        log::info!("Session {} created for user {}", session.id, user_id);
        self.sweep_expired().await;
        session
    }

    /// Refresh `last_activity` for the session holding `token`
    ///
    /// When no session matches and `user_id` is given, a session is created
    /// for it. This recovers sessions lost on restart while the token is still
    /// valid; `user_id` must come from a verified token.
    ///
    /// # Returns
    ///
    /// * `Option<Session>` - The touched or recovered session
    pub async fn touch(&self, token: &str, user_id: Option<&str>) -> Option<Session> {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.iter_mut().find(|s| s.token == token) {
            session.last_activity = Utc::now();
            return Some(session.clone());
        }

        let user_id = user_id?;
        let session = new_session(user_id, token);
        sessions.push(session.clone());
        log::info!("Session {} recovered for user {}", session.id, user_id);
        Some(session)
    }

    /// Remove the session holding `token`
    ///
    /// # Returns
    ///
    /// * `bool` - Whether a session was removed
    pub async fn remove(&self, token: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|s| s.token != token);
        before != sessions.len()
    }

    /// Remove every session of a user, returning their tokens
    pub async fn remove_for_user(&self, user_id: &str) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let mut removed = Vec::new();
        sessions.retain(|s| {
            if s.user_id == user_id {
                removed.push(s.token.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Snapshot of all live sessions
    pub async fn list(&self) -> Vec<Session> {
        self.sessions.read().await.clone()
    }

    /// Drop every session
    ///
    /// Tokens stay verifiable; clear the token cache as well for immediate effect.
    pub async fn revoke_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        log::warn!("Revoked all {} session(s)", count);
        count
    }

    /// Remove sessions idle longer than the timeout
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Sweep relative to an explicit clock reading
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let idle_timeout = self.idle_timeout;
        sessions.retain(|s| now - s.last_activity <= idle_timeout);

        let swept = before - sessions.len();
        if swept > 0 {
            log::debug!("Swept {} expired session(s)", swept);
        }
        swept
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    #[cfg(test)]
    async fn insert_raw(&self, session: Session) {
        self.sessions.write().await.push(session);
    }
}

fn new_session(user_id: &str, token: &str) -> Session {
    let now = Utc::now();
    Session {
        id: format!("session_{}", Uuid::new_v4().simple()),
        user_id: UserId::from(user_id),
        token: token.to_string(),
        created_at: now,
        last_activity: now,
    }
}
