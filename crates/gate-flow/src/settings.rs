//! Gate settings derived from configuration.

use gate_config::{
    Config, DEFAULT_COUNTRY_CODE, DEFAULT_FEDERATED_RETURN_PATH, DEFAULT_QUIZ_PATH,
};

/// Paths and defaults the state machine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSettings {
    /// Where a completed `quiz` gate navigates.
    pub quiz_path: String,
    /// Where the identity provider returns after a federated sign-in.
    pub federated_return_path: String,
    /// Calling code for numbers typed without one.
    pub default_country_code: String,
}

impl GateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            quiz_path: config.quiz_path.clone(),
            federated_return_path: config.federated_return_path.clone(),
            default_country_code: config.default_country_code.clone(),
        }
    }
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            quiz_path: DEFAULT_QUIZ_PATH.to_string(),
            federated_return_path: DEFAULT_FEDERATED_RETURN_PATH.to_string(),
            default_country_code: DEFAULT_COUNTRY_CODE.to_string(),
        }
    }
}
