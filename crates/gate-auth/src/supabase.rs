//! Supabase (GoTrue) implementation of `SessionSource`.
//!
//! The session is persisted as JSON under `StorageKeys::SESSION` in the
//! same durable store the gate uses, so it survives the federated
//! redirect and any reload. Every sign-in, refresh, and sign-out is
//! broadcast on the change feed.

use crate::{AuthError, AuthResult, FederatedRedirect, Session, SessionSource, SessionUser};
use async_trait::async_trait;
use chrono::Utc;
use gate_storage::{PersistentKv, StorageKeys};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

const CHANGE_FEED_CAPACITY: usize = 16;

/// Token response shared by `/verify` and `/token`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    user_metadata: HashMap<String, serde_json::Value>,
}

impl From<UserResponse> for SessionUser {
    fn from(user: UserResponse) -> Self {
        SessionUser {
            id: user.id,
            email: user.email.filter(|email| !email.is_empty()),
            phone: user.phone.filter(|phone| !phone.is_empty()),
            user_metadata: user.user_metadata,
        }
    }
}

/// GoTrue error bodies come in a few shapes depending on the endpoint.
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorResponse {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
    }
}

#[derive(Debug, Serialize)]
struct OtpRequest<'a> {
    phone: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    phone: &'a str,
    token: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Session source backed by the Supabase Auth REST API.
pub struct SupabaseSessionSource {
    http_client: Client,
    supabase_url: String,
    publishable_key: String,
    site_url: String,
    provider: String,
    storage: Arc<dyn PersistentKv>,
    changes: broadcast::Sender<Option<Session>>,
}

impl SupabaseSessionSource {
    /// Create a new session source.
    ///
    /// # Arguments
    /// * `supabase_url` - Project URL (e.g. `https://xyz.supabase.co`)
    /// * `publishable_key` - Public API key
    /// * `site_url` - Public origin federated sign-ins return to
    /// * `provider` - Federated provider name (e.g. `google`)
    /// * `storage` - Durable store for the session
    pub fn new(
        supabase_url: impl Into<String>,
        publishable_key: impl Into<String>,
        site_url: impl Into<String>,
        provider: impl Into<String>,
        storage: Arc<dyn PersistentKv>,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            http_client: Client::new(),
            supabase_url: supabase_url.into().trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
            site_url: site_url.into().trim_end_matches('/').to_string(),
            provider: provider.into(),
            storage,
            changes,
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path)
    }

    /// Authorization URL for a federated sign-in returning to `return_path`.
    pub fn authorize_url(&self, return_path: &str) -> AuthResult<Url> {
        let redirect_to = format!("{}{}", self.site_url, return_path);
        Url::parse(&redirect_to)?;

        let mut url = Url::parse(&self.auth_url("authorize"))?;
        url.query_pairs_mut()
            .append_pair("provider", &self.provider)
            .append_pair("redirect_to", &redirect_to);
        Ok(url)
    }

    /// Finish a federated sign-in from the URL the provider sent the browser
    /// back to. Tokens are read from the fragment, falling back to the query.
    pub async fn complete_federated_sign_in(&self, callback_url: &str) -> AuthResult<Session> {
        let url = Url::parse(callback_url)?;
        let mut params: HashMap<String, String> = url
            .fragment()
            .map(|fragment| {
                url::form_urlencoded::parse(fragment.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        if !params.contains_key("access_token") && !params.contains_key("error") {
            params = url.query_pairs().into_owned().collect();
        }

        if let Some(error) = params.get("error") {
            let description = params
                .get("error_description")
                .cloned()
                .unwrap_or_else(|| error.clone());
            warn!(error = %error, "Federated sign-in returned an error");
            return Err(AuthError::Provider(description));
        }

        let access_token = params
            .get("access_token")
            .cloned()
            .ok_or_else(|| AuthError::OAuth("Callback is missing access_token".to_string()))?;
        let refresh_token = params.get("refresh_token").cloned();
        let expires_at = params
            .get("expires_at")
            .and_then(|value| value.parse::<i64>().ok())
            .or_else(|| {
                params
                    .get("expires_in")
                    .and_then(|value| value.parse::<i64>().ok())
                    .map(|expires_in| Utc::now().timestamp() + expires_in)
            });

        let user = self.fetch_user(&access_token).await?;
        let session = Session {
            access_token,
            refresh_token,
            expires_at,
            user: user.into(),
        };

        info!(user_id = %session.user.id, "Federated sign-in completed");
        self.store_and_broadcast(Some(session.clone()))?;
        Ok(session)
    }

    async fn fetch_user(&self, access_token: &str) -> AuthResult<UserResponse> {
        let response = self
            .http_client
            .get(self.auth_url("user"))
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = Self::error_message(response).await;
            warn!(status = %status, "User lookup failed");
            return Err(AuthError::SessionInvalid(message));
        }

        Ok(response.json().await?)
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(ErrorResponse::into_message)
            .unwrap_or_else(|| format!("HTTP {}", status))
    }

    fn session_from_tokens(data: TokenResponse) -> Session {
        let expires_at = data.expires_at.or_else(|| {
            data.expires_in
                .map(|expires_in| Utc::now().timestamp() + expires_in)
        });
        Session {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
            expires_at,
            user: data.user.into(),
        }
    }

    fn read_stored_session(&self) -> AuthResult<Option<Session>> {
        let raw = match self.storage.get(StorageKeys::SESSION)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "Discarding malformed stored session");
                self.storage.remove(StorageKeys::SESSION)?;
                Ok(None)
            }
        }
    }

    fn store_and_broadcast(&self, session: Option<Session>) -> AuthResult<()> {
        match &session {
            Some(session) => {
                let json = serde_json::to_string(session)?;
                self.storage.set(StorageKeys::SESSION, &json)?;
            }
            None => {
                self.storage.remove(StorageKeys::SESSION)?;
            }
        }

        // No receivers is fine: nobody is listening yet.
        let _ = self.changes.send(session);
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<Session> {
        let response = self
            .http_client
            .post(self.auth_url("token?grant_type=refresh_token"))
            .header("apikey", &self.publishable_key)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            let message = Self::error_message(response).await;
            return Err(AuthError::TokenRefresh(message));
        }

        let data: TokenResponse = response.json().await?;
        Ok(Self::session_from_tokens(data))
    }
}

#[async_trait]
impl SessionSource for SupabaseSessionSource {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        let session = match self.read_stored_session()? {
            Some(session) => session,
            None => return Ok(None),
        };

        if !session.is_expired() {
            return Ok(Some(session));
        }

        let refresh_token = match session.refresh_token.as_deref() {
            Some(token) => token,
            None => {
                info!(user_id = %session.user.id, "Stored session expired without refresh token");
                self.storage.remove(StorageKeys::SESSION)?;
                return Ok(None);
            }
        };

        debug!(user_id = %session.user.id, "Stored session expired, refreshing");
        match self.refresh(refresh_token).await {
            Ok(refreshed) => {
                info!(user_id = %refreshed.user.id, "Session refreshed");
                self.store_and_broadcast(Some(refreshed.clone()))?;
                Ok(Some(refreshed))
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                warn!(error = %e, "Session refresh rejected, clearing session");
                self.storage.remove(StorageKeys::SESSION)?;
                Ok(None)
            }
        }
    }

    fn on_change(&self) -> broadcast::Receiver<Option<Session>> {
        self.changes.subscribe()
    }

    async fn sign_in_with_phone(&self, phone: &str) -> AuthResult<()> {
        let response = self
            .http_client
            .post(self.auth_url("otp"))
            .header("apikey", &self.publishable_key)
            .json(&OtpRequest { phone })
            .send()
            .await?;

        if !response.status().is_success() {
            let message = Self::error_message(response).await;
            return Err(AuthError::Provider(message));
        }

        debug!("One-time code sent");
        Ok(())
    }

    async fn verify_code(&self, phone: &str, code: &str) -> AuthResult<()> {
        let response = self
            .http_client
            .post(self.auth_url("verify"))
            .header("apikey", &self.publishable_key)
            .json(&VerifyRequest {
                phone,
                token: code,
                kind: "sms",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let message = Self::error_message(response).await;
            return Err(AuthError::Provider(message));
        }

        let data: TokenResponse = response.json().await?;
        let session = Self::session_from_tokens(data);
        info!(user_id = %session.user.id, "Phone verification succeeded");

        self.store_and_broadcast(Some(session))
    }

    async fn sign_in_with_federated_provider(
        &self,
        return_path: &str,
    ) -> AuthResult<FederatedRedirect> {
        let url = self.authorize_url(return_path)?;
        info!(provider = %self.provider, "Starting federated sign-in");
        Ok(FederatedRedirect { url: url.into() })
    }

    async fn sign_out(&self) -> AuthResult<()> {
        if let Some(session) = self.read_stored_session()? {
            let result = self
                .http_client
                .post(self.auth_url("logout"))
                .header("apikey", &self.publishable_key)
                .header("Authorization", format!("Bearer {}", session.access_token))
                .send()
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
            }
        }

        self.store_and_broadcast(None)?;
        info!("Signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_storage::MemoryStorage;

    fn create_source() -> (SupabaseSessionSource, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let source = SupabaseSessionSource::new(
            "https://test.supabase.co/",
            "test-publishable-key",
            "https://app.example.com/",
            "google",
            storage.clone(),
        );
        (source, storage)
    }

    fn stored_session(expires_at: Option<i64>) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: None,
            expires_at,
            user: SessionUser {
                id: "user-1".to_string(),
                email: Some("a@example.com".to_string()),
                phone: None,
                user_metadata: HashMap::new(),
            },
        }
    }

    #[test]
    fn test_authorize_url() {
        let (source, _) = create_source();
        let url = source.authorize_url("/auth/callback").unwrap();

        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("provider").map(String::as_str), Some("google"));
        assert_eq!(
            pairs.get("redirect_to").map(String::as_str),
            Some("https://app.example.com/auth/callback")
        );
    }

    #[tokio::test]
    async fn test_federated_sign_in_returns_redirect() {
        let (source, _) = create_source();
        let redirect = source
            .sign_in_with_federated_provider("/auth/callback")
            .await
            .unwrap();
        assert!(redirect.url.starts_with("https://test.supabase.co/auth/v1/authorize?"));
    }

    #[tokio::test]
    async fn test_get_session_reads_stored_session() {
        let (source, storage) = create_source();
        let session = stored_session(Some(Utc::now().timestamp() + 3600));
        storage
            .set(StorageKeys::SESSION, &serde_json::to_string(&session).unwrap())
            .unwrap();

        assert_eq!(source.get_session().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_get_session_discards_malformed_session() {
        let (source, storage) = create_source();
        storage.set(StorageKeys::SESSION, "{broken").unwrap();

        assert!(source.get_session().await.unwrap().is_none());
        assert!(!storage.has(StorageKeys::SESSION).unwrap());
    }

    #[tokio::test]
    async fn test_expired_session_without_refresh_token_is_cleared() {
        let (source, storage) = create_source();
        let session = stored_session(Some(Utc::now().timestamp() - 60));
        storage
            .set(StorageKeys::SESSION, &serde_json::to_string(&session).unwrap())
            .unwrap();

        assert!(source.get_session().await.unwrap().is_none());
        assert!(!storage.has(StorageKeys::SESSION).unwrap());
    }

    #[tokio::test]
    async fn test_callback_error_is_reported_inline() {
        let (source, _) = create_source();
        let err = source
            .complete_federated_sign_in(
                "https://app.example.com/auth/callback#error=access_denied&error_description=User+cancelled",
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "User cancelled");
    }

    #[tokio::test]
    async fn test_callback_without_token_is_rejected() {
        let (source, _) = create_source();
        let err = source
            .complete_federated_sign_in("https://app.example.com/auth/callback")
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::OAuth(_)));
    }

    #[test]
    fn test_error_response_message_precedence() {
        let body: ErrorResponse =
            serde_json::from_str(r#"{"code":400,"msg":"Token has expired or is invalid"}"#)
                .unwrap();
        assert_eq!(
            body.into_message().as_deref(),
            Some("Token has expired or is invalid")
        );

        let body: ErrorResponse = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Invalid Refresh Token"}"#,
        )
        .unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Invalid Refresh Token"));
    }

    #[test]
    fn test_session_from_tokens_computes_expiry() {
        let data: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":3600,
                "user":{"id":"u","email":"","phone":"60123456789",
                        "user_metadata":{"full_name":"Aminah"}}}"#,
        )
        .unwrap();

        let before = Utc::now().timestamp();
        let session = SupabaseSessionSource::session_from_tokens(data);
        let expires_at = session.expires_at.unwrap();

        assert!(expires_at >= before + 3600 && expires_at <= before + 3601);
        assert!(session.user.email.is_none());
        assert_eq!(session.user.phone.as_deref(), Some("60123456789"));
        assert_eq!(session.display_name(), Some("Aminah"));
    }

    #[tokio::test]
    async fn test_sign_out_without_session_broadcasts_none() {
        let (source, storage) = create_source();
        let mut changes = source.on_change();

        source.sign_out().await.unwrap();

        assert_eq!(changes.recv().await.unwrap(), None);
        assert!(!storage.has(StorageKeys::SESSION).unwrap());
    }
}
