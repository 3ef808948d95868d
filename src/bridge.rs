use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::backend::{
    self, BackendClient, BackendResponse, FailureKind, MessageWebhook, PollCreatedWebhook,
};
use crate::dedup::DedupSet;
use crate::platform::{ChatSession, Contact, InboundEvent, PollRequest};
use crate::router::preview;

/// Name used when nobody better is known.
pub const PLACEHOLDER_NAME: &str = "Membre";

/// What the backend asked the gateway to do
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    /// Threaded reply to the originating message
    Reply { text: String },
    /// Single-choice poll in the originating chat
    Poll {
        question: String,
        options: Vec<String>,
        poll_id: Option<String>,
    },
}

impl OutboundAction {
    /// A poll wins over reply text when the backend sends both.
    pub fn from_response(response: BackendResponse) -> Option<Self> {
        if let Some(poll) = response.poll {
            if !poll.question.trim().is_empty() && !poll.options.is_empty() {
                return Some(OutboundAction::Poll {
                    question: poll.question,
                    options: poll.options,
                    poll_id: poll.poll_id.filter(|id| !id.is_empty()),
                });
            }
            warn!("Backend sent an incomplete poll, ignoring it");
        }

        response
            .reply
            .filter(|text| !text.is_empty())
            .map(|text| OutboundAction::Reply { text })
    }
}

/// Preferred display name, then registered name, then the placeholder.
pub fn contact_display_name(contact: &Contact) -> String {
    contact
        .display_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .or_else(|| contact.name.as_deref().filter(|n| !n.is_empty()))
        .unwrap_or(PLACEHOLDER_NAME)
        .to_string()
}

/// Forwards qualifying messages to the backend and carries out its answer
pub struct Bridge {
    backend: Arc<BackendClient>,
    session: Arc<dyn ChatSession>,
    dedup: Arc<DedupSet>,
}

impl Bridge {
    pub fn new(
        backend: Arc<BackendClient>,
        session: Arc<dyn ChatSession>,
        dedup: Arc<DedupSet>,
    ) -> Self {
        Self {
            backend,
            session,
            dedup,
        }
    }

    /// Process one event end to end. Errors are logged, never returned.
    pub async fn handle(&self, event: &InboundEvent) {
        if let Err(e) = self.forward(event).await {
            error!("Error processing message {} in {}: {:#}", event.id, event.chat_id, e);
            match backend::classify(&e) {
                FailureKind::Unreachable => {
                    error!("Backend not reachable at {}", self.backend.base_url());
                }
                FailureKind::TimedOut => {
                    error!("Backend did not answer in time");
                }
                FailureKind::Other => {}
            }
        }
    }

    async fn forward(&self, event: &InboundEvent) -> Result<()> {
        self.session.set_composing(&event.chat_id, true).await.ok();

        let sender_name = self.sender_name(event).await;
        info!("Processing: {}: {}", sender_name, preview(&event.body, 80));

        let request = MessageWebhook {
            from_: event.chat_id.clone(),
            sender: event.sender_id.clone(),
            sender_name,
            body: event.body.clone(),
            timestamp: event.timestamp.timestamp(),
            is_direct: !event.is_group,
        };
        let response = self.backend.forward_message(&request).await;

        self.session.set_composing(&event.chat_id, false).await.ok();

        match OutboundAction::from_response(response?) {
            Some(action) => self.execute(event, action).await,
            None => {
                debug!("No action for message {}", event.id);
                Ok(())
            }
        }
    }

    async fn sender_name(&self, event: &InboundEvent) -> String {
        match self.session.contact(&event.sender_id).await {
            Ok(contact) => contact_display_name(&contact),
            Err(e) => {
                // Our own messages have no resolvable contact.
                debug!("Contact lookup failed for {}: {:#}", event.sender_id, e);
                event
                    .sender_name
                    .clone()
                    .or_else(|| self.session.own_display_name())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| PLACEHOLDER_NAME.to_string())
            }
        }
    }

    async fn execute(&self, event: &InboundEvent, action: OutboundAction) -> Result<()> {
        match action {
            OutboundAction::Poll {
                question,
                options,
                poll_id,
            } => {
                let poll = PollRequest { question, options };
                let sent_id = self
                    .session
                    .send_poll(&event.chat_id, &poll)
                    .await
                    .context("Failed to send poll")?;

                let Some(sent_id) = sent_id else {
                    return Ok(());
                };
                self.dedup.register(&sent_id);

                if let Some(poll_id) = poll_id {
                    self.link_poll(poll_id, sent_id).await;
                }
            }
            OutboundAction::Reply { text } => {
                let sent_id = self
                    .session
                    .send_reply(event, &text)
                    .await
                    .context("Failed to send reply")?;
                if let Some(sent_id) = sent_id {
                    self.dedup.register(&sent_id);
                }
            }
        }
        Ok(())
    }

    async fn link_poll(&self, poll_id: String, message_id: String) {
        let link = PollCreatedWebhook {
            poll_id,
            wa_message_id: message_id,
        };
        match self.backend.link_poll(&link).await {
            Ok(()) => info!("Linked poll {} to message {}", link.poll_id, link.wa_message_id),
            Err(e) => error!("Failed to link poll {}: {:#}", link.poll_id, e),
        }
    }
}
