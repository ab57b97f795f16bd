use elevation_gate::Abandoned;
use thiserror::Error;

/// Request errors surfaced to console callers.
///
/// Variants are cloneable with owned messages so a single verification
/// outcome can settle many parked callers with the same reason.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("response error: {0}")]
    Parse(String),
    #[error("request error: {0}")]
    Serialization(String),
    /// The user declined step-up verification. Distinct from a service
    /// failure so callers can special-case "user said no".
    #[error("step-up verification declined")]
    Declined,
    #[error("request abandoned before step-up verification settled")]
    Abandoned,
}

impl From<Abandoned> for ClientError {
    fn from(_: Abandoned) -> Self {
        Self::Abandoned
    }
}

impl ClientError {
    /// True iff the error is the user-declined verification outcome.
    #[must_use]
    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined)
    }
}
