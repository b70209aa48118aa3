//! Boundary to the hosting conversational framework
//!
//! The host delivers inbound messages, owns the reply channel, persists
//! session state between turns, and signals cancellation through a
//! `CancellationToken`. The core only sees these seams.

use async_trait::async_trait;

/// An inbound user message delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Host-side conversation identifier.
    pub conversation_id: String,
    /// The utterance text.
    pub text: String,
}

impl InboundMessage {
    pub fn new(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            text: text.into(),
        }
    }
}

/// Reply channel supplied by the hosting framework.
#[async_trait]
pub trait DialogHost: Send + Sync {
    /// Post a reply into the conversation.
    async fn post_reply(&self, text: &str) -> anyhow::Result<()>;
}
