//! Service-account authentication for the remote store.
//!
//! [`TokenCache`] holds the single access token of a process and only goes
//! back to its [`TokenSource`] once the cached token is about to expire.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::StoreError;

pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Cached tokens are refreshed this long before they actually expire.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Service-account credentials.
#[derive(Clone)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
}

impl ServiceAccount {
    /// Build credentials from environment-style values, where the PEM key has
    /// its newlines escaped as `\n`.
    pub fn from_escaped(client_email: impl Into<String>, private_key: &str) -> Self {
        ServiceAccount {
            client_email: client_email.into(),
            private_key: private_key.replace("\\n", "\n"),
        }
    }
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// A bearer token and the instant it stops being valid.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Something that can mint a fresh access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, StoreError>;
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// OAuth2 JWT-bearer flow: sign an RS256 assertion with the service-account
/// key and exchange it for an access token.
pub struct JwtTokenSource {
    account: ServiceAccount,
    http: reqwest::Client,
    token_url: String,
    scope: String,
}

impl JwtTokenSource {
    pub fn new(account: ServiceAccount, http: reqwest::Client) -> Self {
        JwtTokenSource {
            account,
            http,
            token_url: TOKEN_URL.to_string(),
            scope: DRIVE_SCOPE.to_string(),
        }
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, StoreError> {
        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes()).map_err(|e| {
            StoreError::Auth {
                reason: format!("invalid private key: {e}"),
            }
        })?;
        let claims = Claims {
            iss: &self.account.client_email,
            scope: &self.scope,
            aud: &self.token_url,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(|e| {
            StoreError::Auth {
                reason: format!("failed to sign assertion: {e}"),
            }
        })
    }
}

#[async_trait]
impl TokenSource for JwtTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, StoreError> {
        let now = Utc::now();
        let assertion = self.assertion(now)?;
        let response = self
            .http
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Auth {
                reason: format!("token endpoint returned {status}: {body}"),
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(AccessToken {
            token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}

/// Authentication state of a [`TokenCache`].
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated {
        token: String,
        expires_at: DateTime<Utc>,
    },
}

/// Process-wide access token cache.
pub struct TokenCache<S> {
    source: S,
    state: Mutex<AuthState>,
}

impl<S: TokenSource> TokenCache<S> {
    pub fn new(source: S) -> Self {
        TokenCache {
            source,
            state: Mutex::new(AuthState::Unauthenticated),
        }
    }

    /// Current token, fetching a new one when none is cached or the cached
    /// one expires within the skew window.
    ///
    /// Concurrent callers wait on the same fetch instead of each starting one.
    pub async fn token(&self) -> Result<String, StoreError> {
        let mut state = self.state.lock().await;
        if let AuthState::Authenticated { token, expires_at } = &*state {
            if Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) < *expires_at {
                return Ok(token.clone());
            }
            log::debug!("Access token expired at {expires_at}, refreshing");
        }

        *state = AuthState::Authenticating;
        match self.source.fetch_token().await {
            Ok(fresh) => {
                log::info!("Authenticated with remote store, token valid until {}", fresh.expires_at);
                *state = AuthState::Authenticated {
                    token: fresh.token.clone(),
                    expires_at: fresh.expires_at,
                };
                Ok(fresh.token)
            }
            Err(e) => {
                *state = AuthState::Unauthenticated;
                Err(e)
            }
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn state(&self) -> AuthState {
        self.state.lock().await.clone()
    }
}
