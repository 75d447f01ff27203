//! In-process event bus backed by a tokio broadcast channel.
//!
//! Default wiring for single-process deployments and the demo binary:
//! every subscriber receives every published event for its topics,
//! at-least-once within the process. A lagging subscriber observes a
//! transport error item rather than silently missing events.

use courtside_core::event::SerializedEvent;
use courtside_core::event_bus::{EventBus, EventBusError, EventStream};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast;

/// Broadcast-channel event bus.
#[derive(Clone, Debug)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<(String, SerializedEvent)>,
}

impl BroadcastEventBus {
    /// Creates a bus buffering up to `capacity` in-flight events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        // No subscribers is fine: events remain in the store for replay
        let _ = self.sender.send((topic.to_string(), event.clone()));
        Box::pin(async { Ok(()) })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();
        let receiver = self.sender.subscribe();

        let stream: EventStream = Box::pin(futures::stream::unfold(
            (receiver, topics),
            |(mut receiver, topics)| async move {
                loop {
                    match receiver.recv().await {
                        Ok((topic, event)) if topics.iter().any(|t| *t == topic) => {
                            return Some((Ok(event), (receiver, topics)));
                        },
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            return Some((
                                Err(EventBusError::TransportError(format!(
                                    "subscriber lagged, {missed} events dropped"
                                ))),
                                (receiver, topics),
                            ));
                        },
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        ));

        Box::pin(async move { Ok(stream) })
    }
}
