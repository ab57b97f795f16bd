//! Step-up interception policy.
//!
//! Sits between callers and the transport. A response classified as
//! "step-up required" never reaches the caller as an error: the original
//! descriptor is parked in the gate and the caller keeps awaiting the same
//! future, which settles once a verification session resolves or rejects
//! the ledger. Every other outcome passes through unchanged.

use elevation_gate::Gate;
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::debug;

use crate::descriptor::RequestDescriptor;
use crate::errors::ClientError;
use crate::transport::{ApiResponse, ConsoleTransport};

/// Gate instantiation used across the console.
pub type ConsoleGate = Gate<RequestDescriptor, Value, ClientError>;

/// Error code the authentication service puts on 401 responses that require
/// a fresh elevated proof rather than a new login.
pub const STEP_UP_SIGNAL: &str = "step_up_required";

static CONSOLE_GATE: OnceCell<ConsoleGate> = OnceCell::new();

/// Process-wide gate handle.
///
/// Parked operations must correlate to one verification prompt no matter
/// where in the application they originate, so the ledger is a singleton.
/// Tests construct their own [`ConsoleGate`] instead.
pub fn console_gate() -> ConsoleGate {
    CONSOLE_GATE.get_or_init(ConsoleGate::new).clone()
}

/// True iff the response means the session lacks a fresh elevated proof.
#[must_use]
pub fn requires_step_up(response: &ApiResponse) -> bool {
    response.status == http::StatusCode::UNAUTHORIZED
        && response.body.get("error").and_then(Value::as_str) == Some(STEP_UP_SIGNAL)
}

/// Transport wrapper that parks step-up failures instead of surfacing them.
#[derive(Debug, Clone)]
pub struct GatedClient {
    transport: ConsoleTransport,
    gate: ConsoleGate,
}

impl GatedClient {
    #[must_use]
    pub fn new(transport: ConsoleTransport, gate: ConsoleGate) -> Self {
        Self { transport, gate }
    }

    #[must_use]
    pub fn gate(&self) -> &ConsoleGate {
        &self.gate
    }

    #[must_use]
    pub fn transport(&self) -> &ConsoleTransport {
        &self.transport
    }

    /// Execute a descriptor, parking it if the session needs step-up.
    ///
    /// Transparent to the caller: the future resolves with the response body
    /// either immediately or after a later replay, and the caller never sees
    /// a distinct "parked" state. Re-entrant: a replayed request that fails
    /// step-up again (an elevation consumed by a race) is parked again and
    /// joins the next verification cycle.
    ///
    /// # Errors
    /// Propagates transport errors and non-step-up HTTP failures unchanged;
    /// parked requests fail with the verification outcome
    /// (`ClientError::Declined` when the user cancels).
    pub async fn execute(&self, descriptor: RequestDescriptor) -> Result<Value, ClientError> {
        let response = self.transport.send(&descriptor).await?;
        if requires_step_up(&response) {
            debug!(path = descriptor.path(), "parking request pending step-up");
            return self.gate.enqueue(descriptor).await;
        }
        response.into_result()
    }
}
