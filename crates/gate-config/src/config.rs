//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use url::Url;

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://project.supabase.co",
};

/// Default Supabase publishable key (can be overridden at compile time via SUPABASE_PUBLISHABLE_KEY env var).
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SUPABASE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "publishable-key",
};

/// Default backend API base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default public site origin, used to build federated return URLs.
pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Page the quiz gate navigates to on completion.
pub const DEFAULT_QUIZ_PATH: &str = "/quiz";

/// Path the identity provider sends the browser back to.
pub const DEFAULT_FEDERATED_RETURN_PATH: &str = "/auth/callback";

/// Federated identity provider name.
pub const DEFAULT_FEDERATED_PROVIDER: &str = "google";

/// Country calling code applied to numbers entered without one.
pub const DEFAULT_COUNTRY_CODE: &str = "60";

const ENV_LOG_LEVEL: &str = "AUTHGATE_LOG_LEVEL";
const ENV_API_URL: &str = "AUTHGATE_API_URL";
const ENV_SITE_URL: &str = "AUTHGATE_SITE_URL";
const ENV_SUPABASE_URL: &str = "AUTHGATE_SUPABASE_URL";
const ENV_SUPABASE_PUBLISHABLE_KEY: &str = "AUTHGATE_SUPABASE_PUBLISHABLE_KEY";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Supabase project URL.
    pub supabase_url: String,
    /// Supabase publishable API key (public, safe to expose).
    pub supabase_publishable_key: String,
    /// Backend API base URL (profile sync).
    pub api_url: String,
    /// Public site origin.
    pub site_url: String,
    /// Quiz page path.
    pub quiz_path: String,
    /// Return path after a federated sign-in.
    pub federated_return_path: String,
    /// Federated identity provider.
    pub federated_provider: String,
    /// Country calling code for bare phone numbers (digits only).
    pub default_country_code: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            supabase_url: DEFAULT_SUPABASE_URL.to_string(),
            supabase_publishable_key: DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            quiz_path: DEFAULT_QUIZ_PATH.to_string(),
            federated_return_path: DEFAULT_FEDERATED_RETURN_PATH.to_string(),
            federated_provider: DEFAULT_FEDERATED_PROVIDER.to_string(),
            default_country_code: DEFAULT_COUNTRY_CODE.to_string(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        debug!(
            path = %config_path.display(),
            from_file = config_path.exists(),
            api_url = %config.api_url,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let path = paths.config_file();
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Config(e.to_string()))?;
        std::fs::write(&path, content).map_err(|source| CoreError::Write { path, source })?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log_level = value;
        }
        if let Some(value) = lookup(ENV_API_URL) {
            self.api_url = value;
        }
        if let Some(value) = lookup(ENV_SITE_URL) {
            self.site_url = value;
        }
        if let Some(value) = lookup(ENV_SUPABASE_URL) {
            self.supabase_url = value;
        }
        if let Some(value) = lookup(ENV_SUPABASE_PUBLISHABLE_KEY) {
            self.supabase_publishable_key = value;
        }
    }

    /// Check the values that the gate cannot work without.
    pub fn validate(&self) -> CoreResult<()> {
        self.supabase_url()?;
        self.api_url()?;
        self.site_url()?;

        if !self.quiz_path.starts_with('/') || !self.federated_return_path.starts_with('/') {
            return Err(CoreError::Config(
                "quiz_path and federated_return_path must be absolute paths".to_string(),
            ));
        }

        if self.default_country_code.is_empty()
            || !self.default_country_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(CoreError::Config(format!(
                "default_country_code must be digits, got {:?}",
                self.default_country_code
            )));
        }

        Ok(())
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }

    /// Get the backend API URL as a parsed URL.
    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(CoreError::from)
    }

    /// Get the site origin as a parsed URL.
    pub fn site_url(&self) -> CoreResult<Url> {
        Url::parse(&self.site_url).map_err(CoreError::from)
    }
}
