//! # Elevation Flow (step-up verification orchestrator)
//!
//! Drives the one interactive verification session that settles everything
//! the gate is holding. The gate notifies on the empty→non-empty edge; the
//! orchestrator opens once per outage, decides enrollment vs. re-verification
//! by asking the authentication service, collects a 6-digit code, and on a
//! terminal outcome either replays every parked request through the gated
//! request path or rejects them all with the user-declined reason.
//!
//! Wiring from an application's UI task:
//!
//! ```no_run
//! use console_client::{
//!     APP_USER_AGENT, ConsoleTarget, ConsoleTransport, GatedClient, console_gate,
//! };
//! use elevation_flow::{HttpAuthService, VerificationFlow, pending_signal};
//!
//! # async fn run() -> Result<(), console_client::ClientError> {
//! let target = ConsoleTarget::parse("https://console.example.com")?;
//! let transport = ConsoleTransport::new(APP_USER_AGENT, target)?;
//! let client = GatedClient::new(transport.clone(), console_gate());
//! let mut flow = VerificationFlow::new(HttpAuthService::new(transport), client);
//!
//! let (_subscription, mut signals) = pending_signal(flow.gate());
//! // Requests may have parked before we subscribed; the gate never
//! // re-notifies retroactively, so check once by hand.
//! flow.catch_up().await;
//! while signals.recv().await.is_some() {
//!     flow.open().await;
//!     // ...render `flow.session()`, forward set_code/submit/cancel events.
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod flow;
pub mod signal;

pub use auth::{AuthService, EnrollmentChallenge, EnrollmentStatus, HttpAuthService};
pub use flow::{CODE_LENGTH, FlowSession, FlowState, VerificationFlow};
pub use signal::pending_signal;
