//! Gate step machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!                  ┌──────────┐
//!                  │  Closed  │ (initial)
//!                  └────┬─────┘
//!   OpenUnknown         │ OpenSignedOut            OpenSignedIn
//!        ▼              ▼                               ▼
//! ┌─────────────────┐  SignedOut  ┌─────────┐  SignedIn  ┌─────────┐
//! │ AwaitingSession │ ──────────► │  Login  │ ─────────► │ Profile │
//! └─────────────────┘             └──┬──────┘            └──┬──────┘
//!        │ SignedIn                  │ CodeSent   ▲         │ Submit
//!        └──────────► Profile        ▼            │ Back    ▼
//!                                 ┌─────────┐ ────┘      Closed
//!                                 │   Otp   │ SignedIn ──► Profile
//!                                 └─────────┘
//! ```
//!
//! Every open step accepts `Dismiss` back to `Closed`; `Profile` returns to
//! `Login` on `SignedOut`.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub gate_machine(Closed)

    Closed => {
        OpenSignedOut => Login,
        OpenSignedIn => Profile,
        // Session fetch still outstanding
        OpenUnknown => AwaitingSession
    },
    AwaitingSession => {
        SignedOut => Login,
        SignedIn => Profile,
        Dismiss => Closed
    },
    Login => {
        CodeSent => Otp,
        SignedIn => Profile,
        Dismiss => Closed
    },
    Otp => {
        // Verification alone never advances; the session event does
        SignedIn => Profile,
        Back => Login,
        Dismiss => Closed
    },
    Profile => {
        SignedOut => Login,
        Submit => Closed,
        Dismiss => Closed
    }
}

pub use gate_machine::Input as GateMachineInput;
pub use gate_machine::State as GateMachineState;
pub use gate_machine::StateMachine as GateMachine;

/// Gate step for renderers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStep {
    Closed,
    AwaitingSession,
    Login,
    Otp,
    Profile,
}

impl GateStep {
    /// Returns true while the gate is shown.
    pub fn is_open(&self) -> bool {
        !matches!(self, GateStep::Closed)
    }
}

impl From<&GateMachineState> for GateStep {
    fn from(state: &GateMachineState) -> Self {
        match state {
            GateMachineState::Closed => GateStep::Closed,
            GateMachineState::AwaitingSession => GateStep::AwaitingSession,
            GateMachineState::Login => GateStep::Login,
            GateMachineState::Otp => GateStep::Otp,
            GateMachineState::Profile => GateStep::Profile,
        }
    }
}
