//! Authentication session layer for authgate.
//!
//! This crate provides:
//! - `Session`, the identity provider's view of a signed-in user
//! - `SessionSource`, the seam over the identity provider (phone OTP,
//!   federated redirect, change feed)
//! - `SupabaseSessionSource`, a GoTrue REST implementation with durable
//!   session persistence
//! - `AuthSession`, process-wide reactive session state shared by the gate

mod auth_session;
mod error;
mod session;
mod source;
mod supabase;

pub use auth_session::{AuthSession, SessionCallback, SessionUpdate, Subscription};
pub use error::{AuthError, AuthResult};
pub use session::{Session, SessionUser};
pub use source::{FederatedRedirect, SessionSource};
pub use supabase::SupabaseSessionSource;
