//! Verification orchestrator.
//!
//! Owns the single interactive verification lifecycle. State machine:
//! `Closed → Checking → {Enrolling | Reverifying} → Closed`. On a terminal
//! success the gate replays everything it holds through the gated request
//! path; on a user-driven decline the gate rejects everything with one
//! shared reason. Session state is created when the dialog opens and
//! discarded entirely when it closes; nothing survives a close.
//!
//! The flow is driven from a single UI task (`&mut self` methods), which is
//! what makes "cancel cannot race an in-flight submit" structural rather
//! than a lock discipline. `busy` exists so the view can disable its cancel
//! affordance and resist dismissal while a confirm call is in flight.

use console_client::{ClientError, ConsoleGate, GatedClient};
use tracing::debug;

use crate::auth::{AuthService, EnrollmentChallenge};

/// Verification codes are exactly this many ASCII digits.
pub const CODE_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Closed,
    Checking,
    Enrolling,
    Reverifying,
}

/// Ephemeral dialog state; lives exactly as long as the dialog is open.
#[derive(Debug)]
pub struct FlowSession {
    mode: FlowState,
    challenge: Option<EnrollmentChallenge>,
    code: String,
    busy: bool,
    error: Option<String>,
}

impl FlowSession {
    fn new() -> Self {
        Self {
            mode: FlowState::Checking,
            challenge: None,
            code: String::new(),
            busy: false,
            error: None,
        }
    }

    #[must_use]
    pub fn mode(&self) -> FlowState {
        self.mode
    }

    #[must_use]
    pub fn challenge(&self) -> Option<&EnrollmentChallenge> {
        self.challenge.as_ref()
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn busy(&self) -> bool {
        self.busy
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// UI-facing controller for the step-up verification dialog.
pub struct VerificationFlow<A> {
    auth: A,
    client: GatedClient,
    gate: ConsoleGate,
    session: Option<FlowSession>,
}

impl<A: AuthService> VerificationFlow<A> {
    #[must_use]
    pub fn new(auth: A, client: GatedClient) -> Self {
        let gate = client.gate().clone();
        Self {
            auth,
            client,
            gate,
            session: None,
        }
    }

    #[must_use]
    pub fn gate(&self) -> &ConsoleGate {
        &self.gate
    }

    #[must_use]
    pub fn state(&self) -> FlowState {
        self.session
            .as_ref()
            .map_or(FlowState::Closed, FlowSession::mode)
    }

    #[must_use]
    pub fn session(&self) -> Option<&FlowSession> {
        self.session.as_ref()
    }

    /// Open the dialog in response to a gate notification.
    ///
    /// Idempotent: at most one session exists no matter how many
    /// notifications or parked operations arrive. A notification that finds
    /// the ledger empty by observation time is ignored quietly. Opening
    /// clears all prior session state.
    pub async fn open(&mut self) {
        if self.session.is_some() {
            return;
        }
        if !self.gate.has_pending() {
            return;
        }
        debug!("opening step-up verification session");
        self.session = Some(FlowSession::new());
        self.check_enrollment().await;
    }

    /// Catch up after attaching to a gate that may already hold requests.
    ///
    /// Subscribing never fires retroactively for an already non-empty
    /// ledger; the orchestrator compensates with this one explicit check at
    /// attach time.
    pub async fn catch_up(&mut self) {
        self.open().await;
    }

    /// User-driven retry of the last failed query. No automatic retry or
    /// backoff anywhere in this flow.
    pub async fn retry(&mut self) {
        match self.state() {
            FlowState::Checking => self.check_enrollment().await,
            FlowState::Enrolling
                if self
                    .session
                    .as_ref()
                    .is_some_and(|session| session.challenge.is_none()) =>
            {
                self.fetch_challenge().await;
            }
            _ => {}
        }
    }

    /// Record user code input. Ignored while a submit is in flight.
    pub fn set_code(&mut self, input: &str) {
        if let Some(session) = &mut self.session
            && !session.busy
        {
            session.code = input.trim().to_string();
        }
    }

    /// Submit the entered code to the service operation the current mode
    /// calls for, then settle the gate on success.
    ///
    /// The 6-digit shape is enforced before any service call; the service
    /// remains the source of truth. A rejected code leaves the dialog in the
    /// same mode with an inline error and the code cleared for re-entry.
    /// Retries are unlimited here; rate limiting is the service's job.
    pub async fn submit(&mut self) {
        let (mode, code) = match &mut self.session {
            Some(session)
                if !session.busy
                    && matches!(session.mode, FlowState::Enrolling | FlowState::Reverifying) =>
            {
                if !is_valid_code(&session.code) {
                    session.error = Some(format!(
                        "enter the {CODE_LENGTH}-digit code from your authenticator"
                    ));
                    session.code.clear();
                    return;
                }
                session.busy = true;
                session.error = None;
                (session.mode, session.code.clone())
            }
            _ => return,
        };

        let outcome = match mode {
            FlowState::Enrolling => self.auth.confirm_enrollment(&code).await,
            _ => self.auth.verify_step_up(&code).await,
        };

        match outcome {
            Ok(()) => {
                debug!("step-up verification succeeded, replaying parked requests");
                let client = self.client.clone();
                self.gate.resolve_all(move |descriptor| {
                    let client = client.clone();
                    async move { client.execute(descriptor).await }
                });
                self.session = None;
            }
            Err(err) => {
                if let Some(session) = &mut self.session {
                    session.error = Some(err.to_string());
                    session.code.clear();
                    session.busy = false;
                }
            }
        }
    }

    /// Decline verification: reject every parked operation with one shared
    /// reason and close.
    ///
    /// Refused while a submit is in flight (the dialog resists dismissal)
    /// and refused mid-enrollment, where discarding in-progress setup needs
    /// the explicit [`VerificationFlow::abandon_enrollment`] acknowledgment.
    pub fn cancel(&mut self) -> bool {
        match &self.session {
            Some(session) if !session.busy && session.mode != FlowState::Enrolling => {
                self.close_rejecting();
                true
            }
            _ => false,
        }
    }

    /// Explicitly acknowledged cancel from an in-progress enrollment.
    pub fn abandon_enrollment(&mut self) -> bool {
        match &self.session {
            Some(session) if !session.busy && session.mode == FlowState::Enrolling => {
                self.close_rejecting();
                true
            }
            _ => false,
        }
    }

    async fn check_enrollment(&mut self) {
        match self.auth.enrollment_status().await {
            Ok(status) if status.enrolled => {
                if let Some(session) = &mut self.session {
                    session.mode = FlowState::Reverifying;
                    session.error = None;
                }
            }
            Ok(_) => {
                if let Some(session) = &mut self.session {
                    session.mode = FlowState::Enrolling;
                    session.error = None;
                }
                self.fetch_challenge().await;
            }
            Err(err) => {
                // Stay in Checking; the user decides when to retry.
                if let Some(session) = &mut self.session {
                    session.error = Some(err.to_string());
                }
            }
        }
    }

    async fn fetch_challenge(&mut self) {
        match self.auth.begin_enrollment().await {
            Ok(challenge) => {
                if let Some(session) = &mut self.session {
                    session.challenge = Some(challenge);
                    session.error = None;
                }
            }
            Err(err) => {
                if let Some(session) = &mut self.session {
                    session.error = Some(err.to_string());
                }
            }
        }
    }

    fn close_rejecting(&mut self) {
        debug!("step-up verification declined, rejecting parked requests");
        self.gate.reject_all(ClientError::Declined);
        self.session = None;
    }
}

fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::EnrollmentStatus;
    use console_client::{ConsoleTarget, ConsoleTransport, RequestDescriptor};
    use secrecy::SecretString;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted collaborator; results are consumed call by call.
    #[derive(Default)]
    struct ScriptedAuth {
        status: Mutex<VecDeque<Result<EnrollmentStatus, ClientError>>>,
        begin: Mutex<VecDeque<Result<EnrollmentChallenge, ClientError>>>,
        confirm: Mutex<VecDeque<Result<(), ClientError>>>,
        verify: Mutex<VecDeque<Result<(), ClientError>>>,
        status_calls: AtomicUsize,
        begin_calls: AtomicUsize,
        confirm_calls: AtomicUsize,
        verify_calls: AtomicUsize,
    }

    impl ScriptedAuth {
        fn enrolled() -> Arc<Self> {
            let auth = Self::default();
            auth.status
                .lock()
                .unwrap()
                .push_back(Ok(EnrollmentStatus { enrolled: true }));
            Arc::new(auth)
        }

        fn not_enrolled() -> Arc<Self> {
            let auth = Self::default();
            auth.status
                .lock()
                .unwrap()
                .push_back(Ok(EnrollmentStatus { enrolled: false }));
            auth.begin.lock().unwrap().push_back(Ok(test_challenge()));
            Arc::new(auth)
        }
    }

    fn test_challenge() -> EnrollmentChallenge {
        EnrollmentChallenge::new(
            SecretString::from("JBSWY3DPEHPK3PXP".to_string()),
            "otpauth://totp/console:user?secret=JBSWY3DPEHPK3PXP".to_string(),
        )
    }

    fn service_error() -> ClientError {
        ClientError::Network("unable to reach the server".to_string())
    }

    impl AuthService for Arc<ScriptedAuth> {
        async fn enrollment_status(&self) -> Result<EnrollmentStatus, ClientError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.status
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(service_error()))
        }

        async fn begin_enrollment(&self) -> Result<EnrollmentChallenge, ClientError> {
            self.begin_calls.fetch_add(1, Ordering::SeqCst);
            self.begin
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(service_error()))
        }

        async fn confirm_enrollment(&self, _code: &str) -> Result<(), ClientError> {
            self.confirm_calls.fetch_add(1, Ordering::SeqCst);
            self.confirm
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(service_error()))
        }

        async fn verify_step_up(&self, _code: &str) -> Result<(), ClientError> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            self.verify
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(service_error()))
        }
    }

    /// Client against a dead port; flow tests only exercise it for replays,
    /// where any settlement (even a network error) is what matters.
    fn dead_client() -> GatedClient {
        let target = ConsoleTarget::parse("http://127.0.0.1:9").unwrap();
        let transport = ConsoleTransport::new("elevation-flow-test/0.1", target).unwrap();
        GatedClient::new(transport, ConsoleGate::new())
    }

    fn flow_with(auth: Arc<ScriptedAuth>) -> VerificationFlow<Arc<ScriptedAuth>> {
        VerificationFlow::new(auth, dead_client())
    }

    fn park(flow: &VerificationFlow<Arc<ScriptedAuth>>) -> elevation_gate::PendingRequest<serde_json::Value, ClientError> {
        flow.gate().enqueue(RequestDescriptor::get("/v1/users"))
    }

    #[tokio::test]
    async fn open_without_pending_work_is_a_quiet_no_op() {
        let auth = ScriptedAuth::enrolled();
        let mut flow = flow_with(Arc::clone(&auth));

        flow.open().await;

        assert_eq!(flow.state(), FlowState::Closed);
        assert_eq!(auth.status_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn open_branches_to_reverifying_when_enrolled() {
        let auth = ScriptedAuth::enrolled();
        let mut flow = flow_with(Arc::clone(&auth));
        let _parked = park(&flow);

        flow.open().await;

        assert_eq!(flow.state(), FlowState::Reverifying);
        assert!(flow.session().unwrap().error().is_none());
    }

    #[tokio::test]
    async fn open_branches_to_enrolling_and_fetches_the_challenge() {
        let auth = ScriptedAuth::not_enrolled();
        let mut flow = flow_with(Arc::clone(&auth));
        let _parked = park(&flow);

        flow.open().await;

        assert_eq!(flow.state(), FlowState::Enrolling);
        assert!(flow.session().unwrap().challenge().is_some());
        assert_eq!(auth.begin_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn open_is_idempotent_while_a_session_exists() {
        let auth = ScriptedAuth::enrolled();
        let mut flow = flow_with(Arc::clone(&auth));
        let _parked = park(&flow);

        flow.open().await;
        flow.open().await;

        assert_eq!(auth.status_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_failure_stays_checking_until_the_user_retries() {
        let auth = Arc::new(ScriptedAuth::default());
        auth.status.lock().unwrap().push_back(Err(service_error()));
        auth.status
            .lock()
            .unwrap()
            .push_back(Ok(EnrollmentStatus { enrolled: true }));
        let mut flow = flow_with(Arc::clone(&auth));
        let _parked = park(&flow);

        flow.open().await;
        assert_eq!(flow.state(), FlowState::Checking);
        assert!(flow.session().unwrap().error().is_some());

        flow.retry().await;
        assert_eq!(flow.state(), FlowState::Reverifying);
        assert!(flow.session().unwrap().error().is_none());
    }

    #[tokio::test]
    async fn failed_challenge_fetch_can_be_retried_in_place() {
        let auth = Arc::new(ScriptedAuth::default());
        auth.status
            .lock()
            .unwrap()
            .push_back(Ok(EnrollmentStatus { enrolled: false }));
        auth.begin.lock().unwrap().push_back(Err(service_error()));
        auth.begin.lock().unwrap().push_back(Ok(test_challenge()));
        let mut flow = flow_with(Arc::clone(&auth));
        let _parked = park(&flow);

        flow.open().await;
        assert_eq!(flow.state(), FlowState::Enrolling);
        assert!(flow.session().unwrap().challenge().is_none());
        assert!(flow.session().unwrap().error().is_some());

        flow.retry().await;
        assert!(flow.session().unwrap().challenge().is_some());
        assert_eq!(auth.begin_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_codes_never_reach_the_service() {
        let auth = ScriptedAuth::enrolled();
        let mut flow = flow_with(Arc::clone(&auth));
        let _parked = park(&flow);
        flow.open().await;

        for bad in ["", "123", "1234567", "12a456", "12 456"] {
            flow.set_code(bad);
            flow.submit().await;
            assert_eq!(flow.state(), FlowState::Reverifying);
            assert!(flow.session().unwrap().error().is_some());
            assert_eq!(flow.session().unwrap().code(), "");
        }
        assert_eq!(auth.verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_code_clears_for_reentry_and_allows_retry() {
        let auth = ScriptedAuth::enrolled();
        auth.verify.lock().unwrap().push_back(Err(ClientError::Http {
            status: 400,
            message: "invalid_code".to_string(),
        }));
        auth.verify.lock().unwrap().push_back(Ok(()));
        let mut flow = flow_with(Arc::clone(&auth));
        let parked = park(&flow);

        flow.open().await;
        flow.set_code("000000");
        flow.submit().await;

        assert_eq!(flow.state(), FlowState::Reverifying);
        let session = flow.session().unwrap();
        assert!(session.error().unwrap().contains("invalid_code"));
        assert_eq!(session.code(), "");
        assert!(!session.busy());

        flow.set_code("123456");
        flow.submit().await;
        assert_eq!(flow.state(), FlowState::Closed);

        // Settled via replay (here: a network error from the dead port);
        // what matters is that nothing stays pending forever.
        assert!(parked.await.is_err());
        assert!(!flow.gate().has_pending());
    }

    #[tokio::test]
    async fn successful_enrollment_confirm_resolves_and_closes() {
        let auth = ScriptedAuth::not_enrolled();
        auth.confirm.lock().unwrap().push_back(Ok(()));
        let mut flow = flow_with(Arc::clone(&auth));
        let parked = park(&flow);

        flow.open().await;
        flow.set_code("123456");
        flow.submit().await;

        assert_eq!(flow.state(), FlowState::Closed);
        assert!(flow.session().is_none());
        assert_eq!(auth.confirm_calls.load(Ordering::SeqCst), 1);
        assert!(parked.await.is_err());
    }

    #[tokio::test]
    async fn cancel_rejects_every_parked_caller_with_declined() {
        let auth = ScriptedAuth::enrolled();
        let mut flow = flow_with(Arc::clone(&auth));
        let first = park(&flow);
        let second = park(&flow);

        flow.open().await;
        assert!(flow.cancel());

        assert_eq!(flow.state(), FlowState::Closed);
        assert_eq!(first.await.unwrap_err(), ClientError::Declined);
        assert_eq!(second.await.unwrap_err(), ClientError::Declined);
    }

    #[tokio::test]
    async fn cancelling_mid_enrollment_requires_acknowledgment() {
        let auth = ScriptedAuth::not_enrolled();
        let mut flow = flow_with(Arc::clone(&auth));
        let parked = park(&flow);

        flow.open().await;
        assert_eq!(flow.state(), FlowState::Enrolling);
        assert!(!flow.cancel());
        assert_eq!(flow.state(), FlowState::Enrolling);

        assert!(flow.abandon_enrollment());
        assert_eq!(flow.state(), FlowState::Closed);
        assert_eq!(parked.await.unwrap_err(), ClientError::Declined);
    }

    #[tokio::test]
    async fn cancel_while_closed_is_refused() {
        let auth = ScriptedAuth::enrolled();
        let mut flow = flow_with(auth);
        assert!(!flow.cancel());
        assert!(!flow.abandon_enrollment());
    }
}
