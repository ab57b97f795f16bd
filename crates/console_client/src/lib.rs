//! # Console Client (transport + step-up interception)
//!
//! Request plumbing for the Altigi admin console. Every data operation goes
//! through a [`GatedClient`], which classifies failures before the caller
//! sees them:
//!
//! - Ordinary successes and failures pass through unchanged.
//! - A response carrying the step-up signal (HTTP 401 with
//!   `error = "step_up_required"`) parks the original request descriptor in
//!   the process-wide [`ConsoleGate`]. The caller's future stays pending and
//!   settles later with the verification outcome; from the caller's point
//!   of view the same logical request simply took longer.
//!
//! Descriptors are immutable and serializable ([`RequestDescriptor`]), so a
//! parked request can be re-issued byte-for-byte once the session holds a
//! fresh elevated proof. The interception is re-entrant: a replay that hits
//! the step-up signal again is parked again and joins the next cycle.
//!
//! The verification flow itself lives in the `elevation_flow` crate; this
//! crate owns only classification, parking, and transport.

pub mod descriptor;
pub mod errors;
pub mod gated;
pub mod resources;
pub mod transport;

pub use descriptor::RequestDescriptor;
pub use errors::ClientError;
pub use gated::{ConsoleGate, GatedClient, STEP_UP_SIGNAL, console_gate, requires_step_up};
pub use resources::{ListParams, ResourceClient};
pub use transport::{ApiResponse, ConsoleTarget, ConsoleTransport};

/// Default user agent for console transports.
pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
