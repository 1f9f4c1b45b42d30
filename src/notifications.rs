//! Expiry notifications for exhausted timers.
//!
//! Desktop popups and sounds live outside this crate; this subscriber
//! reports model events through the log.

use crate::event::ModelEvent;
use std::sync::mpsc::Receiver;
use tracing::{info, trace, warn};

/// Summary and body of the message shown when a mode runs out.
pub fn exhaustion_message(mode: &str) -> (String, String) {
    (
        format!("{} Time Exhausted", mode),
        format!("You have used all allotted time for {}", mode.to_lowercase()),
    )
}

/// Logs events until every sender is gone.
pub fn run_notifier(events: Receiver<ModelEvent>) {
    for event in events {
        match &event {
            ModelEvent::NotifyTick { mode } => {
                let (summary, body) = exhaustion_message(mode);
                warn!("{}: {}", summary, body);
            }
            ModelEvent::ModeChanged { .. } => info!("Mode changed to {}", event.mode()),
            ModelEvent::ModeUpdated { .. } => trace!("Mode updated: {}", event.mode()),
        }
    }
}
