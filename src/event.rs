//! Domain events emitted by the timer model.

use std::sync::mpsc::{self, Receiver, Sender};

/// Change notifications for views, notifiers and controllers.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// A mode's used or total time changed.
    ModeUpdated { mode: String },
    /// The user selected a different mode (or re-selected the same one).
    ModeChanged { mode: String },
    /// A mode's allotment is exhausted and deserves the user's attention.
    NotifyTick { mode: String },
}

impl ModelEvent {
    /// Name of the mode the event refers to.
    pub fn mode(&self) -> &str {
        match self {
            Self::ModeUpdated { mode } | Self::ModeChanged { mode } | Self::NotifyTick { mode } => {
                mode
            }
        }
    }
}

/// Fan-out of model events to any number of subscribers.
///
/// Each subscriber gets its own channel. Subscribers which dropped their
/// receiver are pruned on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<ModelEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber and returns its receiving end.
    pub fn subscribe(&mut self) -> Receiver<ModelEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Sends the event to every live subscriber.
    pub fn emit(&mut self, event: ModelEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
