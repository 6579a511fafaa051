//! Scenario tests for the auth gate.
//!
//! - `harness.rs`   - Mock provider, scripted sync client, recording navigator
//! - `scenarios.rs` - Opening, phone sign-in, profile completion, dismissal,
//!                    session changes while open
//! - `redirect.rs`  - Federated sign-in across a full-page redirect

pub(crate) mod harness;
