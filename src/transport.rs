//! Chat-transport boundary types
//!
//! The chat protocol itself (room membership, encryption, login) is an
//! external collaborator. This module defines the seam the core is built
//! against: the inbound event shape, the outbound delivery sink, and the
//! relay glue that guarantees exactly one response per inbound message.

use crate::dispatch::{Dispatcher, OutboundResult};
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// Message type the core acts on; everything else is ignored
pub const TEXT_MSGTYPE: &str = "text";

/// Typed body of an inbound room event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    /// Protocol message type ("text", "image", "notice", ...)
    pub msgtype: String,
    /// Plain-text body
    pub body: String,
}

impl MessageContent {
    /// Creates a text content body
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            msgtype: TEXT_MSGTYPE.to_string(),
            body: body.into(),
        }
    }
}

/// One inbound room event as delivered by the transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport-assigned event identifier
    pub event_id: String,
    /// Room the event arrived in
    pub room_id: String,
    /// Sender identity
    pub sender: String,
    /// Typed message body
    pub content: MessageContent,
    /// Protocol thread root, when the message was sent inside a thread
    #[serde(default)]
    pub thread_root: Option<String>,
}

impl InboundMessage {
    /// Convenience constructor for an unthreaded text message
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::transport::InboundMessage;
    ///
    /// let msg = InboundMessage::text("!r1", "@alice", "hello");
    /// assert!(msg.is_text());
    /// assert_eq!(msg.room_id, "!r1");
    /// ```
    pub fn text(room_id: impl Into<String>, sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            sender: sender.into(),
            content: MessageContent::text(body),
            thread_root: None,
        }
    }

    /// Whether this event carries a text body the core should act on
    pub fn is_text(&self) -> bool {
        self.content.msgtype == TEXT_MSGTYPE
    }
}

/// Outbound side of the transport seam
///
/// Fire-and-forget from the core's perspective: delivery failures are
/// logged by the caller, never retried.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Send a regular text message into a room
    async fn send_text(&self, room_id: &str, body: &str) -> Result<()>;

    /// Send a notice (bot-status) message into a room
    async fn send_notice(&self, room_id: &str, body: &str) -> Result<()>;
}

/// Dispatch one inbound event and deliver its outcome
///
/// The conversation always receives exactly one response per inbound
/// text message: the generated reply as a text message, or a short
/// non-technical apology as a notice. Suppressed events produce nothing.
/// Delivery failures are logged and not retried.
pub async fn relay_event(dispatcher: &Dispatcher, sink: &dyn DeliverySink, event: &InboundMessage) {
    match dispatcher.handle(event).await {
        OutboundResult::Suppressed => {}
        OutboundResult::Text(body) => {
            if let Err(e) = sink.send_text(&event.room_id, &body).await {
                tracing::warn!("Failed to deliver reply to {}: {}", event.room_id, e);
            }
        }
        OutboundResult::Failure { kind, .. } => {
            if let Err(e) = sink.send_notice(&event.room_id, kind.user_notice()).await {
                tracing::warn!("Failed to deliver notice to {}: {}", event.room_id, e);
            }
        }
    }
}

/// Drive the dispatcher from a stream of inbound events until it ends
///
/// Events are dispatched strictly in stream order, which satisfies the
/// per-conversation ordering requirement by construction. A transport
/// that dispatches concurrently instead must preserve arrival order per
/// conversation key; the dispatcher's per-key locks handle the rest.
pub async fn run_relay_loop<S>(dispatcher: &Dispatcher, sink: &dyn DeliverySink, events: S)
where
    S: Stream<Item = InboundMessage>,
{
    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
        relay_event(dispatcher, sink, &event).await;
    }
    tracing::info!("Inbound event stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_constructor() {
        let msg = InboundMessage::text("!r1", "@alice", "hello");
        assert_eq!(msg.content.msgtype, "text");
        assert_eq!(msg.content.body, "hello");
        assert!(msg.thread_root.is_none());
        assert!(!msg.event_id.is_empty());
    }

    #[test]
    fn test_is_text() {
        let mut msg = InboundMessage::text("!r1", "@alice", "hello");
        assert!(msg.is_text());

        msg.content.msgtype = "image".to_string();
        assert!(!msg.is_text());
    }

    #[test]
    fn test_inbound_deserialization_without_thread() {
        let json = r#"{
            "event_id": "$e1",
            "room_id": "!r1",
            "sender": "@alice",
            "content": {"msgtype": "text", "body": "hi"}
        }"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert!(msg.thread_root.is_none());
        assert!(msg.is_text());
    }
}
