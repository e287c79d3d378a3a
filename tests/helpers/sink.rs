use covenant::errors::ConsentError;
use covenant::publisher::{ConsentLifecycleEvent, EventSink};
use std::sync::Mutex;

/// Event sink that records published lifecycle events for assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ConsentLifecycleEvent>>,
}

impl RecordingSink {
    pub fn published(&self) -> Vec<ConsentLifecycleEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn publish(
        &self,
        _stream_name: &str,
        _stream_version: &str,
        event: &ConsentLifecycleEvent,
    ) -> Result<(), ConsentError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
