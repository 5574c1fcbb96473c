//! Google Drive credentials.
//!
//! A `TokenProvider` produces bearer tokens; `DriveSession` caches the current
//! one and swaps it out when it expires or the API rejects it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::DriveSettings;
use crate::http_client::HttpClient;
use crate::sources::SourceError;

/// OAuth scope requested for Drive access.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// A bearer token and when it stops working.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    /// None for tokens with unknown lifetime.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn expiring_in(token: impl Into<String>, seconds: i64) -> Self {
        Self {
            token: token.into(),
            expires_at: Some(Utc::now() + Duration::seconds(seconds)),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| now + Duration::seconds(EXPIRY_MARGIN_SECS) >= at)
    }
}

/// Source of Drive access tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn acquire(&self) -> Result<AccessToken, SourceError>;
}

/// A pre-issued token. It cannot be refreshed.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn acquire(&self) -> Result<AccessToken, SourceError> {
        Ok(AccessToken::new(self.0.clone()))
    }
}

/// OAuth2 refresh-token grant.
pub struct RefreshTokenProvider {
    http: HttpClient,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

impl RefreshTokenProvider {
    pub fn new(
        http: HttpClient,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for RefreshTokenProvider {
    async fn acquire(&self) -> Result<AccessToken, SourceError> {
        debug!("Requesting Drive access token from {}", self.token_url);
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
            ("scope", DRIVE_READONLY_SCOPE),
        ];

        let response = self
            .http
            .post_form(&self.token_url, &form)
            .await
            .map_err(|e| SourceError::Auth(format!("token request failed: {}", e)))?;

        if !response.is_success() {
            let status = response.status;
            let body = response.error_snippet().await;
            return Err(SourceError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Auth(format!("invalid token response: {}", e)))?;

        Ok(match token.expires_in {
            Some(secs) => AccessToken::expiring_in(token.access_token, secs),
            None => AccessToken::new(token.access_token),
        })
    }
}

/// Pick a token provider from settings: refresh credentials first, then a
/// static token.
pub fn provider_from_settings(
    settings: &DriveSettings,
    http: HttpClient,
) -> Result<Arc<dyn TokenProvider>, SourceError> {
    if let (Some(id), Some(secret), Some(refresh)) = (
        &settings.client_id,
        &settings.client_secret,
        &settings.refresh_token,
    ) {
        return Ok(Arc::new(RefreshTokenProvider::new(
            http,
            settings.token_url.clone(),
            id.clone(),
            secret.clone(),
            refresh.clone(),
        )));
    }

    if let Some(token) = &settings.access_token {
        return Ok(Arc::new(StaticToken::new(token.clone())));
    }

    Err(SourceError::Auth(
        "no Drive credentials: set GOOGLE_DRIVE_TOKEN, or GOOGLE_CLIENT_ID, \
         GOOGLE_CLIENT_SECRET and GOOGLE_REFRESH_TOKEN"
            .to_string(),
    ))
}

/// Current Drive credential, shared by listing and downloads.
pub struct DriveSession {
    provider: Arc<dyn TokenProvider>,
    current: Mutex<Option<AccessToken>>,
}

impl DriveSession {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            current: Mutex::new(None),
        }
    }

    /// Make sure a usable token is held.
    pub async fn authenticate(&self) -> Result<(), SourceError> {
        self.token().await.map(|_| ())
    }

    /// Current token, acquiring a new one when missing or expired.
    pub async fn token(&self) -> Result<String, SourceError> {
        let mut current = self.current.lock().await;
        match current.as_ref() {
            Some(token) if !token.is_expired_at(Utc::now()) => Ok(token.token.clone()),
            _ => {
                let token = self.provider.acquire().await?;
                info!("Acquired Drive access token");
                let value = token.token.clone();
                *current = Some(token);
                Ok(value)
            }
        }
    }

    /// Drop the held token and acquire a fresh one.
    pub async fn refresh(&self) -> Result<String, SourceError> {
        let mut current = self.current.lock().await;
        let token = self.provider.acquire().await?;
        debug!("Re-acquired Drive access token");
        let value = token.token.clone();
        *current = Some(token);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SequenceProvider {
        calls: AtomicUsize,
        lifetime_secs: i64,
    }

    #[async_trait]
    impl TokenProvider for SequenceProvider {
        async fn acquire(&self) -> Result<AccessToken, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AccessToken::expiring_in(format!("token-{}", n), self.lifetime_secs))
        }
    }

    fn session(lifetime_secs: i64) -> (DriveSession, Arc<SequenceProvider>) {
        let provider = Arc::new(SequenceProvider {
            calls: AtomicUsize::new(0),
            lifetime_secs,
        });
        (DriveSession::new(provider.clone()), provider)
    }

    #[tokio::test]
    async fn test_token_is_cached_until_expiry() {
        let (session, provider) = session(3600);
        assert_eq!(session.token().await.unwrap(), "token-1");
        assert_eq!(session.token().await.unwrap(), "token-1");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_token_is_reacquired() {
        // Inside the expiry margin counts as expired.
        let (session, provider) = session(30);
        assert_eq!(session.token().await.unwrap(), "token-1");
        assert_eq!(session.token().await.unwrap(), "token-2");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_replaces_token() {
        let (session, _) = session(3600);
        session.authenticate().await.unwrap();
        assert_eq!(session.refresh().await.unwrap(), "token-2");
        assert_eq!(session.token().await.unwrap(), "token-2");
    }

    #[test]
    fn test_static_token_never_expires() {
        let token = AccessToken::new("abc");
        assert!(!token.is_expired_at(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn test_provider_selection() {
        let http = HttpClient::builder("drive", std::time::Duration::from_secs(5))
            .build()
            .unwrap();

        let mut settings = DriveSettings::default();
        assert!(matches!(
            provider_from_settings(&settings, http.clone()),
            Err(SourceError::Auth(_))
        ));

        settings.access_token = Some("static".to_string());
        assert!(provider_from_settings(&settings, http).is_ok());
    }
}
