//! Profile sync: pushes locally collected profile data to the backend once
//! the user has authenticated.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use gate_storage::{ActionStore, StorageKeys};
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, error};
use url::Url;

const SYNC_PATH: &str = "api/v1/profile/sync/";

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Snapshot of the profile data held locally.
///
/// Every field is optional; absent fields are not serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileSyncPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grades: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorblind: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disability: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_signals: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
}

impl ProfileSyncPayload {
    /// Collect whatever parses from local storage plus the typed name and
    /// school. Unreadable pieces are skipped.
    pub fn collect(actions: &ActionStore, name: &str, school: &str) -> Self {
        let mut payload = Self {
            grades: actions
                .read_json(StorageKeys::GRADES)
                .filter(Value::is_object),
            student_signals: actions
                .read_json(StorageKeys::QUIZ_SIGNALS)
                .filter(|signals| !signals.is_null()),
            name: non_blank(name),
            school: non_blank(school),
            ..Self::default()
        };

        if let Some(Value::Object(profile)) = actions.read_json(StorageKeys::PROFILE) {
            let flag = |key: &str| profile.get(key).filter(|v| is_truthy(v)).cloned();
            payload.gender = flag("gender");
            payload.nationality = flag("nationality");
            payload.colorblind = flag("colorblind");
            payload.disability = flag("disability");
        }

        payload
    }

    /// Returns true if there is nothing to send.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Backend that accepts profile data for the signed-in user.
#[async_trait]
pub trait ProfileSyncClient: Send + Sync {
    async fn sync(&self, payload: &ProfileSyncPayload, token: &str) -> SyncResult<()>;
}

/// `ProfileSyncClient` over the backend REST API.
#[derive(Clone, Debug)]
pub struct HttpProfileSyncClient {
    http_client: reqwest::Client,
    endpoint: Url,
}

impl HttpProfileSyncClient {
    /// Create a client for the backend at `api_url`.
    pub fn new(api_url: &Url) -> SyncResult<Self> {
        let mut base = api_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Ok(Self {
            http_client: reqwest::Client::new(),
            endpoint: base.join(SYNC_PATH)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ProfileSyncClient for HttpProfileSyncClient {
    async fn sync(&self, payload: &ProfileSyncPayload, token: &str) -> SyncResult<()> {
        debug!(endpoint = %self.endpoint, "Syncing profile");

        let response = self
            .http_client
            .put(self.endpoint.clone())
            .header("Authorization", format!("Bearer {}", token))
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            error!(status, body_summary = %body_summary, "Profile sync rejected");
            return Err(SyncError::Rejected {
                status,
                body_summary,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_storage::{MemoryStorage, PersistentKv};
    use serde_json::json;
    use std::sync::Arc;

    fn create_store() -> ActionStore {
        ActionStore::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_collect_reads_local_data() {
        let actions = create_store();
        let storage = actions.storage();
        storage
            .set(StorageKeys::GRADES, r#"{"bm":"A","math":"B+"}"#)
            .unwrap();
        storage
            .set(
                StorageKeys::PROFILE,
                r#"{"gender":"female","nationality":"malaysian","colorblind":false,"disability":true}"#,
            )
            .unwrap();
        storage
            .set(StorageKeys::QUIZ_SIGNALS, r#"{"hands_on":3}"#)
            .unwrap();

        let payload = ProfileSyncPayload::collect(&actions, "  Aminah ", "SMK Seri");

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "grades": {"bm": "A", "math": "B+"},
                "gender": "female",
                "nationality": "malaysian",
                "disability": true,
                "student_signals": {"hands_on": 3},
                "name": "Aminah",
                "school": "SMK Seri"
            })
        );
    }

    #[test]
    fn test_collect_skips_unparseable_pieces() {
        let actions = create_store();
        let storage = actions.storage();
        storage.set(StorageKeys::GRADES, "{broken").unwrap();
        storage.set(StorageKeys::PROFILE, r#"{"gender":"male"}"#).unwrap();

        let payload = ProfileSyncPayload::collect(&actions, "", "   ");

        assert!(payload.grades.is_none());
        assert_eq!(payload.gender, Some(json!("male")));
        assert!(payload.name.is_none());
        assert!(payload.school.is_none());
        assert!(storage.has(StorageKeys::GRADES).unwrap());
    }

    #[test]
    fn test_empty_payload_serializes_to_empty_object() {
        let payload = ProfileSyncPayload::collect(&create_store(), "", "");
        assert!(payload.is_empty());
        assert_eq!(serde_json::to_string(&payload).unwrap(), "{}");
    }

    #[test]
    fn test_endpoint_joins_api_url() {
        let client = HttpProfileSyncClient::new(&Url::parse("https://api.example.com").unwrap())
            .unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://api.example.com/api/v1/profile/sync/"
        );

        let client =
            HttpProfileSyncClient::new(&Url::parse("https://example.com/backend").unwrap())
                .unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://example.com/backend/api/v1/profile/sync/"
        );
    }

    #[test]
    fn test_summarize_response_body_hides_content() {
        let summary = summarize_response_body("secret detail");
        assert!(summary.starts_with("len=13,digest="));
        assert!(!summary.contains("secret"));
    }
}
