//! Gate-notification adapter.
//!
//! The gate notifies subscribers synchronously; UI tasks want an awaitable
//! stream instead. This adapter forwards each empty→non-empty edge into an
//! unbounded channel the orchestrator's driving task can `recv` on.

use console_client::ConsoleGate;
use elevation_gate::Subscription;
use tokio::sync::mpsc;

/// Subscribe to a gate and receive one `()` per empty→non-empty edge.
///
/// Dropping the returned [`Subscription`] stops the signals. The receiver
/// side should re-check [`ConsoleGate::has_pending`] on every signal: a
/// signal without pending work by observation time is legal and must be
/// ignored quietly.
#[must_use]
pub fn pending_signal(gate: &ConsoleGate) -> (Subscription, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = gate.subscribe(move || {
        // Receiver may be gone during shutdown; nothing to do then.
        let _ = tx.send(());
    });
    (subscription, rx)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use console_client::{ClientError, RequestDescriptor};
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test]
    async fn one_signal_per_outage_regardless_of_burst_size() {
        let gate = ConsoleGate::new();
        let (_subscription, mut signals) = pending_signal(&gate);

        let _first = gate.enqueue(RequestDescriptor::get("/v1/users"));
        let _second = gate.enqueue(RequestDescriptor::get("/v1/orgs"));
        let _third = gate.enqueue(RequestDescriptor::get("/v1/keys"));

        assert_eq!(signals.try_recv(), Ok(()));
        assert_eq!(signals.try_recv(), Err(TryRecvError::Empty));

        // A settled ledger re-arms the edge.
        gate.reject_all(ClientError::Declined);
        let _again = gate.enqueue(RequestDescriptor::get("/v1/users"));
        assert_eq!(signals.try_recv(), Ok(()));
    }

    #[tokio::test]
    async fn dropping_the_subscription_stops_signals() {
        let gate = ConsoleGate::new();
        let (subscription, mut signals) = pending_signal(&gate);
        drop(subscription);

        let _parked = gate.enqueue(RequestDescriptor::get("/v1/users"));
        assert_eq!(signals.try_recv(), Err(TryRecvError::Disconnected));
    }
}
