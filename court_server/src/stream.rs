//! In-process notification transport and the server-sent-event stream built on it.
//!
//! The [`BroadcastPublisher`] is what the engine's notification router publishes to. Every connected client holds a
//! receiver on the same broadcast channel and only forwards the frames addressed to its own channels.
use std::{convert::Infallible, sync::Arc, time::Duration};

use bytes::Bytes;
use court_engine::{
    db_types::{Actor, Role},
    notifications::{customer_channel, vendor_channel},
    NotificationPublisher,
    PublishError,
};
use futures::{future::ready, stream, Stream, StreamExt};
use log::*;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<Arc<Notification>>,
}

impl BroadcastPublisher {
    /// Slow clients that fall more than `capacity` notifications behind skip the ones they missed.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Notification>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationPublisher for BroadcastPublisher {
    fn publish(&self, channel: &str, event_name: &str, payload: Value) -> Result<(), PublishError> {
        let notification =
            Notification { channel: channel.to_string(), event: event_name.to_string(), payload };
        self.sender.send(Arc::new(notification)).map(|_| ()).map_err(|_| PublishError::NoSubscribers(channel.into()))
    }
}

/// The channels a caller may listen to on the stream.
pub fn channels_for(actor: &Actor) -> Vec<String> {
    match actor.role {
        Role::Customer => vec![customer_channel(&actor.user_id)],
        Role::Vendor => vec![vendor_channel(&actor.user_id)],
        Role::Admin | Role::System => vec![],
    }
}

/// A `text/event-stream` body carrying the notifications for `channels`. It ends once `lifetime` has passed, or when
/// actix drops it because the client went away.
pub fn notification_stream(
    receiver: broadcast::Receiver<Arc<Notification>>,
    channels: Vec<String>,
    lifetime: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    let opening = stream::once(ready(Ok(Bytes::from_static(b": connected\n\n"))));
    let frames = BroadcastStream::new(receiver).filter_map(move |item| {
        let frame = match item {
            Ok(n) if channels.contains(&n.channel) => sse_frame(&n).map(Ok),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                warn!("📣️ A stream client fell behind and missed {missed} notification(s)");
                None
            },
        };
        ready(frame)
    });
    opening.chain(frames).take_until(tokio::time::sleep(lifetime))
}

fn sse_frame(notification: &Notification) -> Option<Bytes> {
    match serde_json::to_string(notification) {
        Ok(data) => Some(Bytes::from(format!("event: {}\ndata: {data}\n\n", notification.event))),
        Err(e) => {
            error!("📣️ Could not serialize {} for {}. {e}", notification.event, notification.channel);
            None
        },
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn publishing_without_listeners_is_reported() {
        let publisher = BroadcastPublisher::new(4);
        let result = publisher.publish("vendor:dosa-hut", "order:new", json!({}));
        assert!(matches!(result, Err(PublishError::NoSubscribers(c)) if c == "vendor:dosa-hut"));
    }

    #[test]
    fn callers_listen_on_their_own_channel() {
        assert_eq!(channels_for(&Actor::customer("asha", "c1")), vec!["customer:asha"]);
        assert_eq!(channels_for(&Actor::vendor("dosa-hut", "c1")), vec!["vendor:dosa-hut"]);
        assert!(channels_for(&Actor::admin("root", "c1")).is_empty());
    }

    #[tokio::test]
    async fn stream_carries_only_the_callers_channels_and_ends() {
        let publisher = BroadcastPublisher::new(16);
        let stream =
            notification_stream(publisher.subscribe(), vec!["customer:asha".into()], Duration::from_millis(200));
        publisher.publish("customer:asha", "order:status_changed", json!({ "order_id": 1 })).unwrap();
        publisher.publish("vendor:dosa-hut", "order:new", json!({ "order_id": 2 })).unwrap();
        publisher.publish("customer:ravi", "order:paid", json!({ "order_id": 3 })).unwrap();

        let frames: Vec<Bytes> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Bytes::from_static(b": connected\n\n"));
        let text = String::from_utf8(frames[1].to_vec()).unwrap();
        assert!(text.starts_with("event: order:status_changed\ndata: "));
        assert!(text.contains(r#""order_id":1"#));
        assert!(text.ends_with("\n\n"));
    }
}
