use axum::extract::ws::Message;
use tokio::sync::mpsc::error::TrySendError;

use super::ConnectionRegistry;
use crate::positions::Position;

/// What happened to one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Viewers that accepted the frame into their queue.
    pub delivered: usize,
    /// Viewers dropped because they could not accept it.
    pub pruned: usize,
}

/// Push one fix to every registered viewer.
///
/// The frame is serialized once and offered to each viewer's queue without
/// waiting. A viewer whose queue is closed (writer gone) or full (peer too
/// slow) is treated as dead and removed; the rest of the fan-out carries on.
/// Nothing is retried.
pub fn broadcast_position(registry: &ConnectionRegistry, position: &Position) -> BroadcastOutcome {
    let text = match serde_json::to_string(position) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize position");
            return BroadcastOutcome::default();
        }
    };
    let msg = Message::Text(text.into());

    let report = registry.visit_and_prune(|viewer| match viewer.try_send(msg.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(
                connection_id = viewer.id(),
                peer = ?viewer.peer(),
                "Viewer queue full, dropping connection"
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::warn!(
                connection_id = viewer.id(),
                peer = ?viewer.peer(),
                "Viewer connection closed, dropping"
            );
            false
        }
    });

    let outcome = BroadcastOutcome {
        delivered: report.retained,
        pruned: report.pruned.len(),
    };
    tracing::debug!(
        delivered = outcome.delivered,
        pruned = outcome.pruned,
        "Broadcast position"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::Viewer;
    use tokio::sync::mpsc;

    fn fix(latitude: f64) -> Position {
        Position {
            latitude,
            longitude: 13.405,
            timestamp: 1_700_000_000,
        }
    }

    fn connect(registry: &ConnectionRegistry, capacity: usize) -> (u64, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        let id = registry.next_id();
        registry.register(Viewer::new(id, None, tx));
        (id, rx)
    }

    fn received(rx: &mut mpsc::Receiver<Message>) -> Option<Position> {
        match rx.try_recv().ok()? {
            Message::Text(text) => Some(serde_json::from_str(text.as_str()).unwrap()),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn empty_registry() {
        let registry = ConnectionRegistry::new();
        assert_eq!(
            broadcast_position(&registry, &fix(1.0)),
            BroadcastOutcome::default()
        );
    }

    #[test]
    fn frame_is_position_json() {
        let registry = ConnectionRegistry::new();
        let (_id, mut rx) = connect(&registry, 4);

        broadcast_position(&registry, &fix(52.52));

        match rx.try_recv().unwrap() {
            Message::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(
                    value,
                    serde_json::json!({
                        "latitude": 52.52,
                        "longitude": 13.405,
                        "timestamp": 1_700_000_000,
                    })
                );
            }
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn dead_viewer_is_pruned_and_others_still_receive() {
        let registry = ConnectionRegistry::new();
        let (a_id, mut rx_a) = connect(&registry, 4);
        let (b_id, mut rx_b) = connect(&registry, 4);

        let outcome = broadcast_position(&registry, &fix(1.0));
        assert_eq!(outcome, BroadcastOutcome { delivered: 2, pruned: 0 });
        assert_eq!(received(&mut rx_a), Some(fix(1.0)));
        assert_eq!(received(&mut rx_b), Some(fix(1.0)));

        // Viewer A's writer goes away.
        drop(rx_a);

        let outcome = broadcast_position(&registry, &fix(2.0));
        assert_eq!(outcome, BroadcastOutcome { delivered: 1, pruned: 1 });
        assert_eq!(received(&mut rx_b), Some(fix(2.0)));
        assert!(!registry.contains(a_id));
        assert!(registry.contains(b_id));
        assert_eq!(registry.len(), 1);

        // A stays out of later broadcasts.
        let outcome = broadcast_position(&registry, &fix(3.0));
        assert_eq!(outcome, BroadcastOutcome { delivered: 1, pruned: 0 });
    }

    #[test]
    fn slow_viewer_is_pruned() {
        let registry = ConnectionRegistry::new();
        let (slow_id, mut slow_rx) = connect(&registry, 1);
        let (_fast_id, mut fast_rx) = connect(&registry, 4);

        broadcast_position(&registry, &fix(1.0));
        assert_eq!(received(&mut fast_rx), Some(fix(1.0)));

        // Slow viewer never drained its one slot.
        let outcome = broadcast_position(&registry, &fix(2.0));
        assert_eq!(outcome, BroadcastOutcome { delivered: 1, pruned: 1 });
        assert!(!registry.contains(slow_id));
        assert_eq!(received(&mut fast_rx), Some(fix(2.0)));

        // The frame queued before pruning is still there; nothing after it.
        assert_eq!(received(&mut slow_rx), Some(fix(1.0)));
        assert_eq!(received(&mut slow_rx), None);
    }

    #[test]
    fn no_delivery_after_deregistration() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry, 4);

        broadcast_position(&registry, &fix(1.0));
        registry.deregister(id);
        broadcast_position(&registry, &fix(2.0));

        assert_eq!(received(&mut rx), Some(fix(1.0)));
        assert_eq!(received(&mut rx), None);
    }

    #[test]
    fn late_registration_only_sees_later_broadcasts() {
        let registry = ConnectionRegistry::new();
        let (_early, mut early_rx) = connect(&registry, 4);

        broadcast_position(&registry, &fix(1.0));
        let (_late, mut late_rx) = connect(&registry, 4);
        broadcast_position(&registry, &fix(2.0));

        assert_eq!(received(&mut early_rx), Some(fix(1.0)));
        assert_eq!(received(&mut early_rx), Some(fix(2.0)));
        assert_eq!(received(&mut late_rx), Some(fix(2.0)));
        assert_eq!(received(&mut late_rx), None);
    }
}
