//! The gate state machine.
//!
//! `GateStateMachine` is owned by one task. Controller notifications and
//! session updates arrive from other contexts and are queued; the owner
//! drains the queue with `process_events()`, which every user-input method
//! also does before it returns and after each await point.
//!
//! Work started before an await is abandoned if the gate was reopened or
//! dismissed while waiting: every open and close bumps a generation counter
//! and async methods compare it before applying their result.

use crate::controller::{GateController, GateNotice, GateRequest};
use crate::error::{GateError, GateResult};
use crate::gate_fsm::{GateMachine, GateMachineInput, GateStep};
use crate::navigator::Navigator;
use crate::phone::{normalize_code, normalize_phone};
use crate::profile_sync::{ProfileSyncClient, ProfileSyncPayload};
use crate::settings::GateSettings;
use gate_auth::{AuthSession, Session, SessionSource, SessionUpdate, Subscription};
use gate_storage::{ActionStore, GateReason};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

const PHONE_REQUIRED: &str = "Enter your phone number.";
const CODE_INVALID: &str = "Enter the 6-digit code we sent you.";
const SESSION_LOST: &str = "Your session has ended. Please sign in again.";
const STORAGE_UNAVAILABLE: &str = "Could not start sign-in. Please try again.";

/// Collaborators the gate works with.
#[derive(Clone)]
pub struct GateDeps {
    pub auth: Arc<AuthSession>,
    pub controller: Arc<GateController>,
    pub source: Arc<dyn SessionSource>,
    pub actions: ActionStore,
    pub sync: Arc<dyn ProfileSyncClient>,
    pub navigator: Arc<dyn Navigator>,
    pub settings: GateSettings,
}

/// Queued input for the machine.
#[derive(Debug, Clone)]
enum GateEvent {
    Requested(GateRequest),
    Dismissed,
    SessionLoaded(Option<Session>),
    SessionChanged(Option<Session>),
}

#[derive(Default)]
struct EventQueue {
    events: Mutex<VecDeque<GateEvent>>,
    notify: Notify,
}

impl EventQueue {
    fn push(&self, event: GateEvent) {
        self.events.lock().unwrap().push_back(event);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<GateEvent> {
        self.events.lock().unwrap().pop_front()
    }

    fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct GateForm {
    phone: String,
    code: String,
    name: String,
    school: String,
}

/// Everything a renderer needs to draw the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateView {
    pub step: GateStep,
    pub reason: Option<GateReason>,
    pub subject_id: Option<String>,
    /// Inline error message
    pub error: Option<String>,
    /// An operation is in flight
    pub busy: bool,
    pub name: String,
    pub school: String,
    pub phone: String,
}

/// Drives one gate through login, code entry, and profile completion.
pub struct GateStateMachine {
    deps: GateDeps,
    fsm: GateMachine,
    queue: Arc<EventQueue>,
    _session_subscription: Subscription,
    request: Option<GateRequest>,
    form: GateForm,
    error: Option<String>,
    busy: bool,
    generation: u64,
}

impl GateStateMachine {
    /// Create the machine and subscribe it to the controller and session.
    ///
    /// If the session has already resolved, or a request is already active,
    /// matching events are queued so the first `process_events()` catches up.
    pub fn new(deps: GateDeps) -> Self {
        let queue = Arc::new(EventQueue::default());

        let session_queue = Arc::downgrade(&queue);
        let session_subscription = deps.auth.subscribe(Arc::new(move |update: &SessionUpdate| {
            if let Some(queue) = session_queue.upgrade() {
                let session = update.session.clone();
                queue.push(if update.initial {
                    GateEvent::SessionLoaded(session)
                } else {
                    GateEvent::SessionChanged(session)
                });
            }
        }));

        let controller_queue = Arc::downgrade(&queue);
        deps.controller.subscribe(Arc::new(move |notice: &GateNotice| {
            let Some(queue) = controller_queue.upgrade() else {
                return;
            };
            match notice {
                GateNotice::Requested(request) => queue.push(GateEvent::Requested(request.clone())),
                GateNotice::Dismissed => queue.push(GateEvent::Dismissed),
                GateNotice::Completed => {}
            }
        }));

        if !deps.auth.is_loading() {
            queue.push(GateEvent::SessionLoaded(deps.auth.current()));
        }
        if let Some(request) = deps.controller.active() {
            queue.push(GateEvent::Requested(request));
        }

        Self {
            deps,
            fsm: GateMachine::new(),
            queue,
            _session_subscription: session_subscription,
            request: None,
            form: GateForm::default(),
            error: None,
            busy: false,
            generation: 0,
        }
    }

    /// Current step.
    pub fn step(&self) -> GateStep {
        GateStep::from(self.fsm.state())
    }

    /// The request the gate is open for.
    pub fn request(&self) -> Option<&GateRequest> {
        self.request.as_ref()
    }

    /// Snapshot for rendering.
    pub fn view(&self) -> GateView {
        GateView {
            step: self.step(),
            reason: self.request.as_ref().map(|request| request.reason),
            subject_id: self
                .request
                .as_ref()
                .and_then(|request| request.subject_id.clone()),
            error: self.error.clone(),
            busy: self.busy,
            name: self.form.name.clone(),
            school: self.form.school.clone(),
            phone: self.form.phone.clone(),
        }
    }

    /// Apply every queued event.
    pub fn process_events(&mut self) {
        while let Some(event) = self.queue.pop() {
            self.handle(event);
        }
    }

    /// Wait until an event is queued, then process. May return without a
    /// visible change.
    pub async fn wait_for_events(&mut self) {
        if self.queue.is_empty() {
            self.queue.notify.notified().await;
        }
        self.process_events();
    }

    // ==========================================
    // User input
    // ==========================================

    /// Send a one-time code to `phone`.
    pub async fn submit_phone(&mut self, phone: &str) -> GateResult<()> {
        if !self.begin(GateStep::Login)? {
            return Ok(());
        }

        self.form.phone = phone.trim().to_string();
        let normalized = match normalize_phone(phone, &self.deps.settings.default_country_code) {
            Some(normalized) => normalized,
            None => {
                self.error = Some(PHONE_REQUIRED.to_string());
                return Ok(());
            }
        };

        self.error = None;
        self.busy = true;
        let generation = self.generation;
        let source = self.deps.source.clone();
        let result = source.sign_in_with_phone(&normalized).await;

        self.process_events();
        if !self.is_current(generation, GateStep::Login) {
            return Ok(());
        }
        self.busy = false;

        match result {
            Ok(()) => {
                self.form.phone = normalized;
                self.form.code.clear();
                self.transition(&GateMachineInput::CodeSent)?;
            }
            Err(e) => {
                warn!(error = %e, "Sending one-time code failed");
                self.error = Some(e.to_string());
            }
        }
        Ok(())
    }

    /// Verify the code sent to the phone. Success does not advance the gate:
    /// the session change that follows does.
    pub async fn submit_code(&mut self, code: &str) -> GateResult<()> {
        if !self.begin(GateStep::Otp)? {
            return Ok(());
        }

        let code = match normalize_code(code) {
            Some(code) => code,
            None => {
                self.error = Some(CODE_INVALID.to_string());
                return Ok(());
            }
        };

        self.form.code = code.clone();
        self.error = None;
        self.busy = true;
        let generation = self.generation;
        let source = self.deps.source.clone();
        let phone = self.form.phone.clone();
        let result = source.verify_code(&phone, &code).await;

        self.process_events();
        if !self.is_current(generation, GateStep::Otp) {
            return Ok(());
        }
        self.busy = false;

        if let Err(e) = result {
            warn!(error = %e, "Code verification failed");
            self.error = Some(e.to_string());
        }
        Ok(())
    }

    /// Return from code entry to phone entry.
    pub fn back(&mut self) -> GateResult<()> {
        if !self.begin(GateStep::Otp)? {
            return Ok(());
        }

        self.transition(&GateMachineInput::Back)?;
        self.form.code.clear();
        self.error = None;
        self.busy = false;
        Ok(())
    }

    /// Start a federated sign-in. The request is persisted first so it
    /// survives the page being unloaded; the gate then stays busy in `login`
    /// until the browser leaves.
    pub async fn sign_in_with_federated(&mut self) -> GateResult<()> {
        if !self.begin(GateStep::Login)? {
            return Ok(());
        }
        let request = self.request.clone().ok_or(GateError::NoActiveRequest)?;

        if let Err(e) = self.deps.actions.write_pending_action(&request.pending_action()) {
            warn!(error = %e, "Could not persist pending auth action");
            self.error = Some(STORAGE_UNAVAILABLE.to_string());
            return Ok(());
        }

        self.error = None;
        self.busy = true;
        let generation = self.generation;
        let source = self.deps.source.clone();
        let return_path = self.deps.settings.federated_return_path.clone();
        let result = source.sign_in_with_federated_provider(&return_path).await;

        self.process_events();
        if !self.is_current(generation, GateStep::Login) {
            return Ok(());
        }

        match result {
            Ok(redirect) => {
                info!(reason = %request.reason, "Redirecting to identity provider");
                self.deps.navigator.redirect(&redirect.url);
            }
            Err(e) => {
                warn!(error = %e, "Federated sign-in failed to start");
                self.busy = false;
                self.error = Some(e.to_string());
            }
        }
        Ok(())
    }

    pub fn set_name(&mut self, name: &str) {
        self.form.name = name.to_string();
    }

    pub fn set_school(&mut self, school: &str) {
        self.form.school = school.to_string();
    }

    /// Finish the gate: sync the profile, leave a resume action for the
    /// page, and close.
    pub async fn submit_profile(&mut self) -> GateResult<()> {
        if !self.begin(GateStep::Profile)? {
            return Ok(());
        }
        let request = self.request.clone().ok_or(GateError::NoActiveRequest)?;

        let token = match self.deps.auth.token() {
            Some(token) => token,
            None => {
                self.session_lost();
                return Ok(());
            }
        };

        self.error = None;
        self.busy = true;
        let generation = self.generation;
        let payload =
            ProfileSyncPayload::collect(&self.deps.actions, &self.form.name, &self.form.school);
        let sync = self.deps.sync.clone();
        if let Err(e) = sync.sync(&payload, &token).await {
            warn!(error = %e, "Profile sync failed, continuing");
        }

        self.process_events();
        if !self.is_current(generation, GateStep::Profile) {
            return Ok(());
        }

        if let Some(resume) = request.resume_action() {
            if let Err(e) = self.deps.actions.write_resume_action(&resume) {
                warn!(error = %e, "Failed to store resume action");
            }
        }
        if let Err(e) = self.deps.actions.clear_pending_action() {
            warn!(error = %e, "Failed to clear pending auth action");
        }

        self.transition(&GateMachineInput::Submit)?;
        self.reset(None);
        info!(reason = %request.reason, "Gate completed");
        self.deps.controller.complete();

        if request.reason == GateReason::Quiz {
            self.deps.navigator.push(&self.deps.settings.quiz_path);
        }

        self.process_events();
        Ok(())
    }

    /// Close the gate without completing.
    pub fn dismiss(&mut self) {
        self.deps.controller.dismiss();
        self.process_events();
    }

    // ==========================================
    // Event handling
    // ==========================================

    fn handle(&mut self, event: GateEvent) {
        debug!(step = ?self.step(), event = event_name(&event), "Gate event");
        match event {
            GateEvent::Requested(request) => self.open(request),
            GateEvent::Dismissed => self.close_dismissed(),
            GateEvent::SessionLoaded(session) | GateEvent::SessionChanged(session) => {
                self.on_session(session)
            }
        }
    }

    fn open(&mut self, request: GateRequest) {
        if let Some(pending) = self.deps.actions.read_pending_action() {
            if pending != request.pending_action() {
                debug!(stale = %pending.reason, "Dropping pending action for a previous request");
                if let Err(e) = self.deps.actions.clear_pending_action() {
                    warn!(error = %e, "Failed to clear stale pending auth action");
                }
            }
        }

        self.reset(Some(request.clone()));

        let input = if self.deps.auth.is_loading() {
            GateMachineInput::OpenUnknown
        } else if self.deps.auth.is_authenticated() {
            GateMachineInput::OpenSignedIn
        } else {
            GateMachineInput::OpenSignedOut
        };
        self.apply(input);
        if self.step() == GateStep::Profile {
            self.prefill_name();
        }

        info!(reason = %request.reason, step = ?self.step(), "Gate opened");
    }

    fn close_dismissed(&mut self) {
        if self.step().is_open() {
            self.apply(GateMachineInput::Dismiss);
        }
        self.reset(None);
    }

    fn on_session(&mut self, session: Option<Session>) {
        let signed_in = session.is_some();
        match self.step() {
            GateStep::Closed => {
                if signed_in && self.deps.controller.active().is_none() {
                    self.replay_pending_action();
                }
            }
            GateStep::AwaitingSession => {
                if signed_in {
                    self.enter_profile();
                } else {
                    self.apply(GateMachineInput::SignedOut);
                }
            }
            GateStep::Login | GateStep::Otp => {
                if signed_in {
                    self.busy = false;
                    self.error = None;
                    self.enter_profile();
                }
            }
            GateStep::Profile => {
                if !signed_in {
                    self.session_lost();
                }
            }
        }
    }

    fn replay_pending_action(&mut self) {
        if let Some(pending) = self.deps.actions.read_pending_action() {
            info!(reason = %pending.reason, "Resuming gate from pending auth action");
            self.deps.controller.request(pending.reason, pending.subject_id);
        }
    }

    fn enter_profile(&mut self) {
        self.apply(GateMachineInput::SignedIn);
        self.prefill_name();
    }

    fn session_lost(&mut self) {
        info!("Session lost while completing profile");
        self.apply(GateMachineInput::SignedOut);
        self.busy = false;
        self.form.code.clear();
        self.error = Some(SESSION_LOST.to_string());
    }

    fn prefill_name(&mut self) {
        if !self.form.name.trim().is_empty() {
            return;
        }
        if let Some(name) = self
            .deps
            .auth
            .current()
            .as_ref()
            .and_then(|session| session.display_name())
        {
            self.form.name = name.to_string();
        }
    }

    // ==========================================
    // Helpers
    // ==========================================

    /// Start a new generation with a fresh form.
    fn reset(&mut self, request: Option<GateRequest>) {
        self.generation += 1;
        if request.is_some() {
            self.fsm = GateMachine::new();
        }
        self.request = request;
        self.form = GateForm::default();
        self.error = None;
        self.busy = false;
    }

    fn is_current(&self, generation: u64, step: GateStep) -> bool {
        self.generation == generation && self.step() == step
    }

    /// Drain queued events before acting on user input from `expected`.
    ///
    /// Returns false when the queued events moved the gate away from
    /// `expected`: the input was made against a screen that is gone and is
    /// dropped. Fails only if the gate was not in `expected` to begin with.
    fn begin(&mut self, expected: GateStep) -> GateResult<bool> {
        let before = self.step();
        self.process_events();

        let actual = self.step();
        if actual == expected {
            return Ok(true);
        }
        if before == expected {
            debug!(expected = ?expected, actual = ?actual, "Input overtaken by queued events");
            return Ok(false);
        }
        Err(GateError::UnexpectedStep { expected, actual })
    }

    fn apply(&mut self, input: GateMachineInput) {
        if let Err(e) = self.transition(&input) {
            warn!(error = %e, "Ignoring gate input");
        }
    }

    fn transition(&mut self, input: &GateMachineInput) -> GateResult<GateStep> {
        let old_step = self.step();

        self.fsm.consume(input).map_err(|_| {
            GateError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                self.fsm.state()
            ))
        })?;

        let new_step = self.step();
        if old_step != new_step {
            debug!(old_step = ?old_step, new_step = ?new_step, "Gate step transition");
        }
        Ok(new_step)
    }
}

fn event_name(event: &GateEvent) -> &'static str {
    match event {
        GateEvent::Requested(_) => "requested",
        GateEvent::Dismissed => "dismissed",
        GateEvent::SessionLoaded(_) => "session_loaded",
        GateEvent::SessionChanged(_) => "session_changed",
    }
}
