//! Storage key constants.

/// Keys used by the gate and the pages around it.
pub struct StorageKeys;

impl StorageKeys {
    /// Gate intent saved before a federated redirect (JSON)
    pub const PENDING_AUTH_ACTION: &'static str = "pendingAuthAction";

    /// Deferred page action written when the gate completes (JSON)
    pub const RESUME_ACTION: &'static str = "resumeAction";

    /// Identity provider session (JSON)
    pub const SESSION: &'static str = "session";

    /// Subject grades entered before sign-in (JSON object)
    pub const GRADES: &'static str = "grades";

    /// Demographic flags entered before sign-in (JSON object)
    pub const PROFILE: &'static str = "profile";

    /// Interest signals computed by the quiz (JSON object)
    pub const QUIZ_SIGNALS: &'static str = "quizSignals";
}
