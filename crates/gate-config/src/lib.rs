//! Configuration, file system paths, and logging for authgate.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_URL, DEFAULT_COUNTRY_CODE, DEFAULT_FEDERATED_PROVIDER,
    DEFAULT_FEDERATED_RETURN_PATH, DEFAULT_LOG_LEVEL, DEFAULT_QUIZ_PATH, DEFAULT_SITE_URL,
    DEFAULT_SUPABASE_PUBLISHABLE_KEY, DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_with, LogConfig};
pub use paths::Paths;
