//! Gate requests and the controller that owns the active one.

use gate_storage::{ActionStore, GateReason, PendingAction, ResumeAction, ResumeKind};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Why the gate is open and what it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRequest {
    pub reason: GateReason,
    #[serde(default, rename = "subjectId", skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

impl GateRequest {
    pub fn new(reason: GateReason, subject_id: Option<String>) -> Self {
        Self { reason, subject_id }
    }

    /// The record persisted ahead of a federated redirect.
    pub fn pending_action(&self) -> PendingAction {
        PendingAction {
            reason: self.reason,
            subject_id: self.subject_id.clone(),
        }
    }

    /// Follow-up for the originating page once the gate completes.
    ///
    /// `save` needs a subject; `report` is always resumed; `quiz` navigates
    /// instead.
    pub fn resume_action(&self) -> Option<ResumeAction> {
        match self.reason {
            GateReason::Save => self.subject_id.as_ref().map(|subject_id| ResumeAction {
                action: ResumeKind::Save,
                subject_id: Some(subject_id.clone()),
            }),
            GateReason::Report => Some(ResumeAction {
                action: ResumeKind::Report,
                subject_id: self.subject_id.clone(),
            }),
            GateReason::Quiz => None,
        }
    }
}

impl From<PendingAction> for GateRequest {
    fn from(action: PendingAction) -> Self {
        Self {
            reason: action.reason,
            subject_id: action.subject_id,
        }
    }
}

/// Controller notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateNotice {
    /// A request became active, replacing any previous one
    Requested(GateRequest),
    /// The user closed the gate without finishing
    Dismissed,
    /// The gate finished its flow
    Completed,
}

/// Listener callback for controller notifications.
pub type GateListener = Arc<dyn Fn(&GateNotice) + Send + Sync>;

/// Owns the single active gate request.
///
/// Any collaborator may call `request`; the last call wins. The controller
/// does no I/O beyond removing the pending action on dismissal.
pub struct GateController {
    active: Mutex<Option<GateRequest>>,
    listeners: Mutex<Vec<GateListener>>,
    actions: ActionStore,
}

impl GateController {
    pub fn new(actions: ActionStore) -> Self {
        Self {
            active: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            actions,
        }
    }

    /// Open the gate for `reason`, replacing any active request.
    pub fn request(&self, reason: GateReason, subject_id: Option<String>) {
        let request = GateRequest::new(reason, subject_id);
        let replaced = self.active.lock().unwrap().replace(request.clone());

        if let Some(previous) = replaced.filter(|previous| *previous != request) {
            debug!(previous = %previous.reason, reason = %request.reason, "Replacing gate request");
        }
        info!(
            reason = %request.reason,
            has_subject = request.subject_id.is_some(),
            "Gate requested"
        );

        self.notify(&GateNotice::Requested(request));
    }

    /// Close the gate without completing and forget the pending action.
    pub fn dismiss(&self) {
        self.active.lock().unwrap().take();

        if let Err(e) = self.actions.clear_pending_action() {
            warn!(error = %e, "Failed to clear pending auth action on dismiss");
        }
        info!("Gate dismissed");

        self.notify(&GateNotice::Dismissed);
    }

    /// Clear the active request after a successful flow.
    pub fn complete(&self) {
        self.active.lock().unwrap().take();
        self.notify(&GateNotice::Completed);
    }

    /// The active request, if the gate is open.
    pub fn active(&self) -> Option<GateRequest> {
        self.active.lock().unwrap().clone()
    }

    /// Register a listener. Listeners live as long as the controller.
    pub fn subscribe(&self, listener: GateListener) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn notify(&self, notice: &GateNotice) {
        let listeners: Vec<GateListener> = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener(notice);
        }
    }
}
