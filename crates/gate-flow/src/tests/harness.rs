//! Test harness for gate scenarios.
//!
//! Provides:
//! - MockSessionSource: records provider calls and fails on demand
//! - ScriptedSyncClient: records sync payloads, can fail or run a hook
//!   while the sync is in flight
//! - RecordingNavigator: records pushes and redirects
//! - TestHarness: wires them to a shared `AuthSession`, `GateController`
//!   and in-memory storage

use crate::{
    GateController, GateDeps, GateSettings, GateStateMachine, Navigator, ProfileSyncClient,
    ProfileSyncPayload, SyncError, SyncResult,
};
use async_trait::async_trait;
use gate_auth::{
    AuthError, AuthResult, AuthSession, FederatedRedirect, Session, SessionSource, SessionUser,
};
use gate_storage::{ActionStore, MemoryStorage, PersistentKv, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub const FEDERATED_URL: &str = "https://idp.example.com/authorize";

/// A call made against the mock provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    SendCode(String),
    VerifyCode { phone: String, code: String },
    Federated(String),
    SignOut,
}

/// Provider double. Every operation succeeds unless an error is queued.
pub struct MockSessionSource {
    calls: Mutex<Vec<SourceCall>>,
    phone_error: Mutex<Option<String>>,
    verify_error: Mutex<Option<String>>,
    federated_error: Mutex<Option<String>>,
    changes: broadcast::Sender<Option<Session>>,
}

impl MockSessionSource {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            calls: Mutex::new(Vec::new()),
            phone_error: Mutex::new(None),
            verify_error: Mutex::new(None),
            federated_error: Mutex::new(None),
            changes,
        }
    }

    pub fn fail_send_code(&self, message: &str) {
        *self.phone_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_verify(&self, message: &str) {
        *self.verify_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_federated(&self, message: &str) {
        *self.federated_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: SourceCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_error(slot: &Mutex<Option<String>>) -> AuthResult<()> {
        match slot.lock().unwrap().take() {
            Some(message) => Err(AuthError::Provider(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionSource for MockSessionSource {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        Ok(None)
    }

    fn on_change(&self) -> broadcast::Receiver<Option<Session>> {
        self.changes.subscribe()
    }

    async fn sign_in_with_phone(&self, phone: &str) -> AuthResult<()> {
        self.record(SourceCall::SendCode(phone.to_string()));
        Self::take_error(&self.phone_error)
    }

    async fn verify_code(&self, phone: &str, code: &str) -> AuthResult<()> {
        self.record(SourceCall::VerifyCode {
            phone: phone.to_string(),
            code: code.to_string(),
        });
        Self::take_error(&self.verify_error)
    }

    async fn sign_in_with_federated_provider(
        &self,
        return_path: &str,
    ) -> AuthResult<FederatedRedirect> {
        self.record(SourceCall::Federated(return_path.to_string()));
        Self::take_error(&self.federated_error)?;
        Ok(FederatedRedirect {
            url: FEDERATED_URL.to_string(),
        })
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.record(SourceCall::SignOut);
        Ok(())
    }
}

type SyncHook = Box<dyn Fn() + Send + Sync>;

/// Profile sync double.
pub struct ScriptedSyncClient {
    calls: Mutex<Vec<(ProfileSyncPayload, String)>>,
    fail: AtomicBool,
    during_sync: Mutex<Option<SyncHook>>,
}

impl ScriptedSyncClient {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            during_sync: Mutex::new(None),
        }
    }

    /// Make every sync fail with a 500.
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Run `hook` while the next sync is in flight.
    pub fn during_sync(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.during_sync.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<(ProfileSyncPayload, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProfileSyncClient for ScriptedSyncClient {
    async fn sync(&self, payload: &ProfileSyncPayload, token: &str) -> SyncResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((payload.clone(), token.to_string()));

        let hook = self.during_sync.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        tokio::task::yield_now().await;

        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Rejected {
                status: 500,
                body_summary: "len=0,digest=0000000000000000".to_string(),
            });
        }
        Ok(())
    }
}

/// Navigator double.
#[derive(Default)]
pub struct RecordingNavigator {
    pushes: Mutex<Vec<String>>,
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn push(&self, path: &str) {
        self.pushes.lock().unwrap().push(path.to_string());
    }

    fn redirect(&self, url: &str) {
        self.redirects.lock().unwrap().push(url.to_string());
    }
}

/// Storage whose writes fail, for exercising the inline storage error.
#[derive(Default)]
pub struct ReadOnlyStorage {
    inner: MemoryStorage,
}

impl PersistentKv for ReadOnlyStorage {
    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Backend("quota exceeded".to_string()))
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        self.inner.remove(key)
    }
}

/// Build a session for `user_id` with optional provider display name.
pub fn session(user_id: &str, full_name: Option<&str>) -> Session {
    let mut user_metadata = HashMap::new();
    if let Some(name) = full_name {
        user_metadata.insert("full_name".to_string(), serde_json::json!(name));
    }
    Session {
        access_token: format!("token-{}", user_id),
        refresh_token: None,
        expires_at: None,
        user: SessionUser {
            id: user_id.to_string(),
            email: None,
            phone: None,
            user_metadata,
        },
    }
}

/// One page lifetime: shared session state, controller, and collaborators
/// over a storage backend that may outlive it.
pub struct TestHarness {
    pub auth: Arc<AuthSession>,
    pub controller: Arc<GateController>,
    pub source: Arc<MockSessionSource>,
    pub storage: Arc<dyn PersistentKv>,
    pub actions: ActionStore,
    pub sync: Arc<ScriptedSyncClient>,
    pub navigator: Arc<RecordingNavigator>,
}

impl TestHarness {
    /// Fresh page over fresh storage, session still loading.
    pub fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    /// Fresh page over existing storage (a reload).
    pub fn with_storage(storage: Arc<dyn PersistentKv>) -> Self {
        let actions = ActionStore::new(storage.clone());
        Self {
            auth: Arc::new(AuthSession::new()),
            controller: Arc::new(GateController::new(actions.clone())),
            source: Arc::new(MockSessionSource::new()),
            storage,
            actions,
            sync: Arc::new(ScriptedSyncClient::new()),
            navigator: Arc::new(RecordingNavigator::default()),
        }
    }

    /// Page whose startup fetch found no session.
    pub fn signed_out() -> Self {
        let harness = Self::new();
        harness.auth.finish_loading(None);
        harness
    }

    /// Page whose startup fetch found a session.
    pub fn signed_in() -> Self {
        let harness = Self::new();
        harness.auth.finish_loading(Some(session("user-1", None)));
        harness
    }

    pub fn deps(&self) -> GateDeps {
        GateDeps {
            auth: self.auth.clone(),
            controller: self.controller.clone(),
            source: self.source.clone(),
            actions: self.actions.clone(),
            sync: self.sync.clone(),
            navigator: self.navigator.clone(),
            settings: GateSettings::default(),
        }
    }

    pub fn machine(&self) -> GateStateMachine {
        GateStateMachine::new(self.deps())
    }

    /// Deliver a sign-in change event.
    pub fn sign_in(&self) {
        self.auth.apply_change(Some(session("user-1", None)));
    }

    /// Deliver a sign-in change event carrying a provider display name.
    pub fn sign_in_as(&self, full_name: &str) {
        self.auth
            .apply_change(Some(session("user-1", Some(full_name))));
    }

    /// Deliver a sign-out change event.
    pub fn sign_out(&self) {
        self.auth.apply_change(None);
    }
}
