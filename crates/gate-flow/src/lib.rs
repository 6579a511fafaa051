//! Authentication gate for authgate.
//!
//! Certain actions (taking the quiz, saving an item, generating a report)
//! require a signed-in user with a completed profile. This crate provides:
//! - `GateController`: holds the single active `GateRequest`
//! - `GateStateMachine`: walks the user through login, one-time code, and
//!   profile completion, surviving a full-page federated redirect through
//!   the persisted pending action
//! - `ProfileSyncClient`: pushes locally collected profile data upstream
//! - `Navigator`: the seam for in-app navigation and external redirects

mod controller;
mod error;
mod gate_fsm;
mod machine;
mod navigator;
mod phone;
mod profile_sync;
mod settings;

#[cfg(test)]
mod tests;

pub use controller::{GateController, GateListener, GateNotice, GateRequest};
pub use error::{GateError, GateResult, SyncError, SyncResult};
pub use gate_fsm::{GateMachine, GateMachineInput, GateMachineState, GateStep};
pub use machine::{GateDeps, GateStateMachine, GateView};
pub use navigator::Navigator;
pub use phone::{normalize_code, normalize_phone};
pub use profile_sync::{HttpProfileSyncClient, ProfileSyncClient, ProfileSyncPayload};
pub use settings::GateSettings;
