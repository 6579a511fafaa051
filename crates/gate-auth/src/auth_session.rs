//! Process-wide reactive session state.
//!
//! `AuthSession` is constructed once per process and shared by reference.
//! It holds the latest session reported by a `SessionSource` and notifies
//! listeners synchronously whenever it changes. It never navigates or
//! persists anything itself.
//!
//! Startup order matters: create the `AuthSession`, subscribe every
//! dependent, then `attach` the source. Until the first fetch resolves,
//! `is_loading()` is true and authentication is unknown.

use crate::{Session, SessionSource};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A session change delivered to listeners.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub session: Option<Session>,
    /// True only for the result of the startup fetch.
    pub initial: bool,
}

/// Listener callback for session changes.
pub type SessionCallback = Arc<dyn Fn(&SessionUpdate) + Send + Sync>;

type ListenerList = Mutex<Vec<(u64, SessionCallback)>>;

struct SessionState {
    current: Option<Session>,
    loading: bool,
}

/// Shared session state.
pub struct AuthSession {
    state: Mutex<SessionState>,
    listeners: Arc<ListenerList>,
    next_listener_id: AtomicU64,
}

/// Handle returned by `AuthSession::subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    /// Detach the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().unwrap().retain(|(id, _)| *id != self.id);
        }
    }
}

impl AuthSession {
    /// Create an empty session state in the loading phase.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState {
                current: None,
                loading: true,
            }),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// Current session, if signed in.
    pub fn current(&self) -> Option<Session> {
        self.state.lock().unwrap().current.clone()
    }

    /// Bearer token of the current session.
    pub fn token(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .current
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    /// Whether a session is present.
    pub fn is_authenticated(&self) -> bool {
        self.state.lock().unwrap().current.is_some()
    }

    /// Whether the startup fetch is still outstanding.
    pub fn is_loading(&self) -> bool {
        self.state.lock().unwrap().loading
    }

    /// Register a listener for session changes.
    pub fn subscribe(&self, callback: SessionCallback) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().push((id, callback));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Record the result of the startup fetch and leave the loading phase.
    pub fn finish_loading(&self, session: Option<Session>) {
        self.replace(session, true);
    }

    /// Apply a session change event.
    pub fn apply_change(&self, session: Option<Session>) {
        self.replace(session, false);
    }

    fn replace(&self, session: Option<Session>, initial: bool) {
        {
            let mut state = self.state.lock().unwrap();
            state.current = session.clone();
            state.loading = false;
        }

        debug!(
            authenticated = session.is_some(),
            initial = initial,
            "Session state updated"
        );

        // Listeners may subscribe or unsubscribe from inside the callback,
        // so the list lock is not held while calling them.
        let listeners: Vec<SessionCallback> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        let update = SessionUpdate { session, initial };
        for listener in listeners {
            listener(&update);
        }
    }

    /// Connect to a session source: subscribe to its change feed, fetch the
    /// current session once, then forward every change for as long as this
    /// `AuthSession` is alive.
    ///
    /// The feed is subscribed before the fetch so that a change racing the
    /// fetch is applied after it rather than lost.
    pub async fn attach(self: &Arc<Self>, source: Arc<dyn SessionSource>) -> JoinHandle<()> {
        let mut changes = source.on_change();

        match source.get_session().await {
            Ok(session) => {
                info!(authenticated = session.is_some(), "Initial session resolved");
                self.finish_loading(session);
            }
            Err(e) => {
                warn!(error = %e, "Initial session fetch failed, treating as signed out");
                self.finish_loading(None);
            }
        }

        let auth: Weak<AuthSession> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(session) => match auth.upgrade() {
                        Some(auth) => auth.apply_change(session),
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Session change feed lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Session change feed closed");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuthError, AuthResult, FederatedRedirect, SessionUser};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::broadcast;

    fn session(user_id: &str) -> Session {
        Session {
            access_token: format!("token-{}", user_id),
            refresh_token: None,
            expires_at: None,
            user: SessionUser {
                id: user_id.to_string(),
                email: None,
                phone: None,
                user_metadata: HashMap::new(),
            },
        }
    }

    struct FeedSource {
        initial: Option<Session>,
        fail_fetch: bool,
        changes: broadcast::Sender<Option<Session>>,
    }

    #[async_trait]
    impl SessionSource for FeedSource {
        async fn get_session(&self) -> AuthResult<Option<Session>> {
            if self.fail_fetch {
                return Err(AuthError::NotLoggedIn);
            }
            Ok(self.initial.clone())
        }

        fn on_change(&self) -> broadcast::Receiver<Option<Session>> {
            self.changes.subscribe()
        }

        async fn sign_in_with_phone(&self, _phone: &str) -> AuthResult<()> {
            Ok(())
        }

        async fn verify_code(&self, _phone: &str, _code: &str) -> AuthResult<()> {
            Ok(())
        }

        async fn sign_in_with_federated_provider(
            &self,
            return_path: &str,
        ) -> AuthResult<FederatedRedirect> {
            Ok(FederatedRedirect {
                url: format!("https://idp.example.com/?return={}", return_path),
            })
        }

        async fn sign_out(&self) -> AuthResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_new_is_loading_and_signed_out() {
        let auth = AuthSession::new();
        assert!(auth.is_loading());
        assert!(!auth.is_authenticated());
        assert!(auth.token().is_none());
    }

    #[test]
    fn test_finish_loading_sets_session() {
        let auth = AuthSession::new();
        auth.finish_loading(Some(session("u1")));

        assert!(!auth.is_loading());
        assert!(auth.is_authenticated());
        assert_eq!(auth.token().as_deref(), Some("token-u1"));
        assert_eq!(auth.current().unwrap().user.id, "u1");
    }

    #[test]
    fn test_listeners_see_initial_flag() {
        let auth = AuthSession::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = auth.subscribe(Arc::new(move |update: &SessionUpdate| {
            seen_clone
                .lock()
                .unwrap()
                .push((update.initial, update.session.is_some()));
        }));

        auth.finish_loading(None);
        auth.apply_change(Some(session("u1")));
        auth.apply_change(None);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(true, false), (false, true), (false, false)]
        );
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let auth = AuthSession::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let sub = auth.subscribe(Arc::new(move |_: &SessionUpdate| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        auth.apply_change(Some(session("u1")));
        sub.unsubscribe();
        auth.apply_change(None);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_state_is_updated_before_listeners_run() {
        let auth = Arc::new(AuthSession::new());
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = observed.clone();
        let auth_clone = Arc::downgrade(&auth);
        let _sub = auth.subscribe(Arc::new(move |_: &SessionUpdate| {
            let token = auth_clone.upgrade().and_then(|auth| auth.token());
            *observed_clone.lock().unwrap() = token;
        }));

        auth.apply_change(Some(session("u2")));
        assert_eq!(observed.lock().unwrap().as_deref(), Some("token-u2"));
    }

    #[tokio::test]
    async fn test_attach_fetches_then_forwards_changes() {
        let (changes, _) = broadcast::channel(16);
        let source = Arc::new(FeedSource {
            initial: Some(session("u1")),
            fail_fetch: false,
            changes: changes.clone(),
        });

        let auth = Arc::new(AuthSession::new());
        let _task = auth.attach(source).await;
        assert!(!auth.is_loading());
        assert_eq!(auth.current().unwrap().user.id, "u1");

        changes.send(None).unwrap();
        for _ in 0..50 {
            if !auth.is_authenticated() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!auth.is_authenticated());
    }

    #[tokio::test]
    async fn test_attach_fetch_failure_resolves_signed_out() {
        let (changes, _) = broadcast::channel(16);
        let source = Arc::new(FeedSource {
            initial: Some(session("u1")),
            fail_fetch: true,
            changes,
        });

        let auth = Arc::new(AuthSession::new());
        let _task = auth.attach(source).await;
        assert!(!auth.is_loading());
        assert!(!auth.is_authenticated());
    }
}
