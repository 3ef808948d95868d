pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A message received from the chat platform
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Stable id of the underlying message, shared by every stream that delivers it
    pub id: String,
    pub chat_id: String,
    /// Chat title, when the platform exposes one
    pub chat_name: Option<String>,
    pub sender_id: String,
    /// Name reported alongside the message, if any
    pub sender_name: Option<String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub is_group: bool,
    /// Sent by the account the gateway runs as
    pub from_self: bool,
}

/// A native poll vote
#[derive(Debug, Clone)]
pub struct VoteEvent {
    /// Id of the poll message being voted on
    pub parent_message_id: Option<String>,
    pub voter_id: String,
    /// Labels of the selected options; unnamed options are `None`
    pub selected_options: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contact {
    /// The name the user chose to display
    pub display_name: Option<String>,
    /// The registered account name
    pub name: Option<String>,
}

/// Single-choice poll to post in a chat
#[derive(Debug, Clone, PartialEq)]
pub struct PollRequest {
    pub question: String,
    pub options: Vec<String>,
}

/// Capabilities the gateway needs from a chat session.
///
/// Send operations return the platform id of the message they produced, in the
/// same format as [`InboundEvent::id`], so the gateway can recognise its own
/// messages when they come back.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Toggle the "typing" indicator for a chat.
    async fn set_composing(&self, chat_id: &str, composing: bool) -> Result<()>;

    async fn contact(&self, user_id: &str) -> Result<Contact>;

    /// Reply to `event`, threaded on the original message.
    async fn send_reply(&self, event: &InboundEvent, text: &str) -> Result<Option<String>>;

    async fn send_poll(&self, chat_id: &str, poll: &PollRequest) -> Result<Option<String>>;

    /// Display name of the account the session runs as, once known.
    fn own_display_name(&self) -> Option<String>;

    fn is_connected(&self) -> bool;
}
