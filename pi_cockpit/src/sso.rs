//! Optional single sign-on application token.
//!
//! The server only talks to the identity provider when SSO is configured.
//! Without configuration no provider is constructed at all, and callers see
//! `None` instead of a provider.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Scope requested for the application token
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum SsoError {
    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Identity provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Client-credentials settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoConfig {
    pub client_id: String,
    pub tenant_id: String,
    pub client_secret: String,
    /// Authority base such as `https://login.microsoftonline.com/`
    pub cloud_instance: String,
}

impl SsoConfig {
    /// Token endpoint derived from the cloud instance and tenant
    pub fn token_url(&self) -> String {
        let base = self.cloud_instance.trim_end_matches('/');
        format!("{}/{}/oauth2/v2.0/token", base, self.tenant_id)
    }
}

/// Source of an application access token
#[async_trait]
pub trait SsoProvider: Send + Sync {
    /// Current application token, if one was acquired
    async fn app_token(&self) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OAuth2 client-credentials provider
pub struct ClientCredentialsSso {
    config: SsoConfig,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl ClientCredentialsSso {
    pub fn new(config: SsoConfig) -> Result<Self, SsoError> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            config,
            http,
            token: RwLock::new(None),
        })
    }

    /// Build the provider and try to acquire a token once
    ///
    /// A failed acquisition is logged; the provider is still returned and
    /// reports no token.
    pub async fn connect(config: SsoConfig) -> Result<Self, SsoError> {
        let provider = Self::new(config)?;
        match provider.acquire().await {
            Ok(()) => log::info!("SSO application token acquired"),
            Err(e) => log::error!("Failed to acquire SSO application token: {}", e),
        }
        Ok(provider)
    }

    /// Request a fresh application token
    pub async fn acquire(&self) -> Result<(), SsoError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http
            .post(self.config.token_url())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SsoError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        *self.token.write().await = Some(token.access_token);
        Ok(())
    }
}

#[async_trait]
impl SsoProvider for ClientCredentialsSso {
    async fn app_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }
}
