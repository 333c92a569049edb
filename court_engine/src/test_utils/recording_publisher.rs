use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
    Mutex,
};

use serde_json::Value;

use crate::notifications::{NotificationPublisher, PublishError};

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub channel: String,
    pub event_name: String,
    pub payload: Value,
}

/// A notification transport that remembers everything it was asked to send.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    messages: Arc<Mutex<Vec<Published>>>,
    broken: Arc<AtomicBool>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// While broken, every publish fails and nothing is recorded
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<Published> {
        self.messages.lock().unwrap().clone()
    }

    pub fn on_channel(&self, channel: &str) -> Vec<Published> {
        self.messages().into_iter().filter(|m| m.channel == channel).collect()
    }

    /// Polls until a message named `event_name` shows up on `channel`, for up to a second.
    pub async fn wait_for(&self, channel: &str, event_name: &str) -> Option<Published> {
        for _ in 0..100 {
            if let Some(m) = self.on_channel(channel).into_iter().find(|m| m.event_name == event_name) {
                return Some(m);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        None
    }
}

impl NotificationPublisher for RecordingPublisher {
    fn publish(&self, channel: &str, event_name: &str, payload: Value) -> Result<(), PublishError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(PublishError::Transport("recording publisher is broken".into()));
        }
        let message = Published { channel: channel.to_string(), event_name: event_name.to_string(), payload };
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}
