//! Short-lived signed access tokens with a verification cache.

use super::{
    errors::{AuthError, AuthResult},
    models::AccessTokenClaims,
    users::UserLookup,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// Token lifetime (15 minutes)
pub const TOKEN_LIFETIME_SECS: i64 = 15 * 60;

/// How long a successful verification is reused without re-decoding
pub const VERIFY_CACHE_TTL_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedVerification {
    claims: AccessTokenClaims,
    cache_expiry: i64,
}

/// Issues and verifies access tokens
pub struct TokenService {
    users: Arc<dyn UserLookup>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_lifetime: Duration,
    cache_ttl: Duration,
    cache: RwLock<HashMap<String, CachedVerification>>,
}

impl TokenService {
    /// Create a new token service
    ///
    /// # Arguments
    ///
    /// * `users` - Lookup used to confirm the token subject still exists
    /// * `jwt_secret` - Secret key for HS256 signing
    pub fn new(users: Arc<dyn UserLookup>, jwt_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            users,
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
            token_lifetime: Duration::seconds(TOKEN_LIFETIME_SECS),
            cache_ttl: Duration::seconds(VERIFY_CACHE_TTL_SECS),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Token lifetime in seconds, used for the cookie `Max-Age`
    pub fn token_lifetime_secs(&self) -> i64 {
        self.token_lifetime.num_seconds()
    }

    /// Issue a token for a user
    ///
    /// # Returns
    ///
    /// * `AuthResult<String>` - Signed token expiring 15 minutes from now
    pub fn issue(&self, user_id: &str) -> AuthResult<String> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.token_lifetime).timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &AccessTokenClaims) -> AuthResult<String> {
        Ok(encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding_key,
        )?)
    }

    /// Verify a token
    ///
    /// A cached verification is reused only while both the cache entry and
    /// the token itself are unexpired.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidToken` - Bad signature, expired, missing subject or unknown user
    pub async fn verify(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let now = Utc::now().timestamp();

        if let Some(cached) = self.cache.read().await.get(token)
            && cached.cache_expiry > now
            && cached.claims.exp > now
        {
            return Ok(cached.claims.clone());
        }

        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                log::debug!("Token rejected: {}", e);
                AuthError::InvalidToken
            })?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(AuthError::InvalidToken);
        }

        if !self.users.user_exists(&claims.sub).await? {
            log::debug!("Token subject {} no longer exists", claims.sub);
            self.invalidate(token).await;
            return Err(AuthError::InvalidToken);
        }

        let mut cache = self.cache.write().await;
        cache.retain(|_, entry| entry.cache_expiry > now && entry.claims.exp > now);
        cache.insert(
            token.to_string(),
            CachedVerification {
                claims: claims.clone(),
                cache_expiry: now + self.cache_ttl.num_seconds(),
            },
        );

        Ok(claims)
    }

    /// Drop any cached verification for a token
    pub async fn invalidate(&self, token: &str) {
        self.cache.write().await.remove(token);
    }

    /// Drop cached verifications for several tokens at once
    pub async fn invalidate_all<I, S>(&self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cache = self.cache.write().await;
        for token in tokens {
            cache.remove(token.as_ref());
        }
    }

    /// Clear every cached verification
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        let count = cache.len();
        cache.clear();
        log::info!("Cleared {} cached token verification(s)", count);
    }

    /// Number of cached verifications
    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Whether a token currently has a cache entry
    pub async fn has_cached(&self, token: &str) -> bool {
        self.cache.read().await.contains_key(token)
    }

    /// Sign claims as-is. Test helper for tokens with arbitrary timestamps.
    #[doc(hidden)]
    pub fn sign_claims(&self, claims: &AccessTokenClaims) -> AuthResult<String> {
        self.sign(claims)
    }
}
