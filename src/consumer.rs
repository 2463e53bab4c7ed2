//! Message consumer contract.
//!
//! Broker clients implement [`Consumer`]; application code supplies a
//! [`Handler`] that is invoked once per delivered [`Message`]. No broker
//! protocol lives in this crate.

use crate::context::Context;
use crate::error::ConsumerError;
use chrono::{DateTime, Utc};
use std::future::Future;

/// A record delivered by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the record was consumed from
    pub topic: String,
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    /// Broker-assigned timestamp, when the broker provides one
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, value: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            value,
            timestamp: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Decode the payload as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ConsumerError> {
        serde_json::from_slice(&self.value)
            .map_err(|e| ConsumerError::handler(&self.topic, self.offset, e.to_string()))
    }
}

/// Processes one message at a time.
pub trait Handler: Send + Sync {
    fn handle(
        &self,
        ctx: &Context,
        message: &Message,
    ) -> impl Future<Output = Result<(), ConsumerError>> + Send;
}

/// Any `Fn(&Context, &Message) -> impl Future<Output = Result<(), ConsumerError>>`
/// is a handler.
impl<F, Fut> Handler for F
where
    F: Fn(&Context, &Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ConsumerError>> + Send,
{
    fn handle(
        &self,
        ctx: &Context,
        message: &Message,
    ) -> impl Future<Output = Result<(), ConsumerError>> + Send {
        self(ctx, message)
    }
}

/// A message source bound to a broker.
pub trait Consumer: Send + Sync {
    /// Deliver messages from `topic` to `handler` until the context expires,
    /// the consumer is closed, or the handler fails.
    fn consume<H: Handler>(
        &self,
        ctx: &Context,
        topic: &str,
        handler: H,
    ) -> impl Future<Output = Result<(), ConsumerError>> + Send;

    /// Release the broker connection. Pending `consume` calls return.
    fn close(&self) -> impl Future<Output = Result<(), ConsumerError>> + Send;
}
