//! Typed access to the gate's persisted records.
//!
//! Two records cross process restarts:
//! - `pendingAuthAction`: why the gate was opened, written right before the
//!   user is sent to a federated identity provider
//! - `resumeAction`: what the originating page should do once the gate has
//!   closed successfully
//!
//! Reads never fail. A missing record, a storage error, or a value that does
//! not parse all come back as `None`; malformed records are removed so they
//! cannot be replayed later.

use crate::{PersistentKv, StorageKeys, StorageResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Why the gate was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateReason {
    /// Taking the interest quiz
    Quiz,
    /// Saving an item to the user's list
    Save,
    /// Generating a report
    Report,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::Quiz => "quiz",
            GateReason::Save => "save",
            GateReason::Report => "report",
        }
    }
}

impl std::fmt::Display for GateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GateReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quiz" => Ok(GateReason::Quiz),
            "save" => Ok(GateReason::Save),
            "report" => Ok(GateReason::Report),
            other => Err(format!("Unknown gate reason: {}", other)),
        }
    }
}

/// Gate intent that must survive a full-page redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredPendingAction")]
pub struct PendingAction {
    pub reason: GateReason,
    /// Item the action applies to. Older records call this `courseId`.
    #[serde(rename = "subjectId", skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

// `subjectId` wins over the legacy `courseId` when both are present.
#[derive(Deserialize)]
struct StoredPendingAction {
    reason: GateReason,
    #[serde(default, rename = "subjectId")]
    subject_id: Option<String>,
    #[serde(default, rename = "courseId")]
    course_id: Option<String>,
}

impl From<StoredPendingAction> for PendingAction {
    fn from(record: StoredPendingAction) -> Self {
        Self {
            reason: record.reason,
            subject_id: record.subject_id.or(record.course_id),
        }
    }
}

/// Page-side follow-up once the gate closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeKind {
    Save,
    Report,
}

/// Deferred action for the originating page to perform and clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredResumeAction")]
pub struct ResumeAction {
    pub action: ResumeKind,
    #[serde(rename = "subjectId", skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

#[derive(Deserialize)]
struct StoredResumeAction {
    action: ResumeKind,
    #[serde(default, rename = "subjectId")]
    subject_id: Option<String>,
    #[serde(default, rename = "courseId")]
    course_id: Option<String>,
}

impl From<StoredResumeAction> for ResumeAction {
    fn from(record: StoredResumeAction) -> Self {
        Self {
            action: record.action,
            subject_id: record.subject_id.or(record.course_id),
        }
    }
}

/// High-level API over a `PersistentKv` for the gate's records.
#[derive(Clone)]
pub struct ActionStore {
    storage: Arc<dyn PersistentKv>,
}

impl ActionStore {
    /// Create a new action store over the given backend
    pub fn new(storage: Arc<dyn PersistentKv>) -> Self {
        Self { storage }
    }

    /// The underlying backend.
    pub fn storage(&self) -> &Arc<dyn PersistentKv> {
        &self.storage
    }

    // ==========================================
    // Pending action
    // ==========================================

    /// Persist the gate intent ahead of an external redirect.
    pub fn write_pending_action(&self, action: &PendingAction) -> StorageResult<()> {
        let json = serde_json::to_string(action)?;
        self.storage.set(StorageKeys::PENDING_AUTH_ACTION, &json)?;
        debug!(reason = %action.reason, "Stored pending auth action");
        Ok(())
    }

    /// Read the pending action without consuming it.
    pub fn read_pending_action(&self) -> Option<PendingAction> {
        self.read_record(StorageKeys::PENDING_AUTH_ACTION)
    }

    /// Remove the pending action. Returns true if one was stored.
    pub fn clear_pending_action(&self) -> StorageResult<bool> {
        self.storage.remove(StorageKeys::PENDING_AUTH_ACTION)
    }

    // ==========================================
    // Resume action
    // ==========================================

    /// Persist the follow-up for the originating page.
    pub fn write_resume_action(&self, action: &ResumeAction) -> StorageResult<()> {
        let json = serde_json::to_string(action)?;
        self.storage.set(StorageKeys::RESUME_ACTION, &json)?;
        debug!(action = ?action.action, "Stored resume action");
        Ok(())
    }

    /// Read the resume action without consuming it.
    pub fn peek_resume_action(&self) -> Option<ResumeAction> {
        self.read_record(StorageKeys::RESUME_ACTION)
    }

    /// Read and clear the resume action. Pages call this once after mount.
    pub fn take_resume_action(&self) -> Option<ResumeAction> {
        let action = self.read_record(StorageKeys::RESUME_ACTION)?;
        if let Err(e) = self.storage.remove(StorageKeys::RESUME_ACTION) {
            warn!(error = %e, "Failed to clear resume action after reading it");
        }
        Some(action)
    }

    // ==========================================
    // Local profile inputs
    // ==========================================

    /// Read an arbitrary JSON value written by another part of the app.
    ///
    /// Unlike the gate's own records, foreign values are left in place when
    /// they fail to parse.
    pub fn read_json(&self, key: &str) -> Option<serde_json::Value> {
        let raw = self.read_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key = %key, error = %e, "Ignoring unparseable local value");
                None
            }
        }
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage read failed, treating as absent");
                None
            }
        }
    }

    fn read_record<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding malformed persisted record");
                if let Err(e) = self.storage.remove(key) {
                    warn!(key = %key, error = %e, "Failed to remove malformed record");
                }
                None
            }
        }
    }
}
