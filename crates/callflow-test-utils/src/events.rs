use async_trait::async_trait;
use callflow_core::{
    events::EventSink, models::EndCallNotification, telephony::EndCallNotifier, AppError,
    AppResult,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    pub event: String,
    pub distinct_id: String,
    pub properties: Value,
}

#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<CapturedEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| e.event == event).count()
    }

    pub fn last(&self, event: &str) -> Option<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .rev()
            .find(|e| e.event == event)
            .cloned()
    }
}

impl EventSink for RecordingEventSink {
    fn capture(&self, event: &str, distinct_id: &str, properties: Value) {
        self.events.lock().push(CapturedEvent {
            event: event.to_string(),
            distinct_id: distinct_id.to_string(),
            properties,
        });
    }
}

/// End-call notifier that records deliveries
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, EndCallNotification)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail after recording it
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn sent(&self) -> Vec<(String, EndCallNotification)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EndCallNotifier for RecordingNotifier {
    async fn notify(&self, url: &str, payload: &EndCallNotification) -> AppResult<()> {
        self.sent.lock().push((url.to_string(), payload.clone()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Provider(format!("{} unreachable", url)));
        }
        Ok(())
    }
}
