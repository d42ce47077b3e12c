use std::sync::{
    mpsc::{self, Receiver, Sender},
    Mutex,
};

use crate::SpecializationEvent;

/// Trait for consuming specialization events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SpecializationEvent);
}

/// Channel-based event sink.
///
/// The receiver end can be drained by any consumer (metrics exporter,
/// test harness, etc.).
pub struct ChannelSink {
    sender: Mutex<Sender<SpecializationEvent>>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<SpecializationEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: SpecializationEvent) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(event);
        }
    }
}

/// No-op event sink.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: SpecializationEvent) {}
}

/// Collector sink that stores all events for inspection.
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<SpecializationEvent>>,
}

impl CollectorSink {
    pub fn events(&self) -> Vec<SpecializationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events for one identity key, in emission order.
    pub fn events_for(&self, key: &str) -> Vec<SpecializationEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.key() == key)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectorSink {
    fn emit(&self, event: SpecializationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
