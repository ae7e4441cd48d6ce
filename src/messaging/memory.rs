use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{ChannelError, EventChannel, PublishOptions, Publishing};

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub options: PublishOptions,
    pub message: Publishing,
}

/// Channel that keeps every message it is handed. Can be told to fail.
#[derive(Default)]
pub struct InMemoryChannel {
    published: Mutex<Vec<PublishedMessage>>,
    failing: AtomicBool,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EventChannel for InMemoryChannel {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: PublishOptions,
        message: Publishing,
    ) -> Result<(), ChannelError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::Send("in-memory channel rejecting messages".to_string()));
        }

        tracing::debug!(exchange, routing_key, bytes = message.body.len(), "Recorded message");

        self.published.lock().await.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            options,
            message,
        });
        Ok(())
    }
}
