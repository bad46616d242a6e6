//! Real-time fan-out of review state changes.
//!
//! Messages are serialized to JSON and pushed onto a `tokio::sync::broadcast`
//! channel. Delivery is fire-and-forget: sending with no subscribers is fine
//! and slow subscribers simply lag.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::fsm::ReviewState;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum NotifyMessage {
    StateChanged {
        review_id: String,
        old_state: ReviewState,
        new_state: ReviewState,
    },
    ReviewerFailed {
        review_id: String,
        error: String,
    },
}

impl NotifyMessage {
    pub fn review_id(&self) -> &str {
        match self {
            Self::StateChanged { review_id, .. } | Self::ReviewerFailed { review_id, .. } => {
                review_id
            }
        }
    }
}

#[derive(Clone)]
pub struct StateNotifier {
    tx: broadcast::Sender<String>,
}

impl Default for StateNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StateNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn state_changed(&self, review_id: &str, old_state: ReviewState, new_state: ReviewState) {
        broadcast_message(
            &self.tx,
            &NotifyMessage::StateChanged {
                review_id: review_id.to_string(),
                old_state,
                new_state,
            },
        );
    }

    pub fn reviewer_failed(&self, review_id: &str, error: &str) {
        broadcast_message(
            &self.tx,
            &NotifyMessage::ReviewerFailed {
                review_id: review_id.to_string(),
                error: error.to_string(),
            },
        );
    }
}

/// Serialize and broadcast a message to all subscribers.
/// Returns silently even if nobody is listening.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &NotifyMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = tx.send(json); // Ignore error if no receivers
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize notification");
        }
    }
}
