use std::sync::Arc;

use tracing::{debug, error, info};

use crate::backend::{BackendClient, PollVoteWebhook};
use crate::bridge::{contact_display_name, PLACEHOLDER_NAME};
use crate::platform::{ChatSession, VoteEvent};

/// Forwards native poll votes to the backend
pub struct VoteRelay {
    backend: Arc<BackendClient>,
    session: Arc<dyn ChatSession>,
}

impl VoteRelay {
    pub fn new(backend: Arc<BackendClient>, session: Arc<dyn ChatSession>) -> Self {
        Self { backend, session }
    }

    /// Returns true if the vote was accepted by the backend.
    pub async fn relay(&self, vote: VoteEvent) -> bool {
        let selected: Vec<String> = vote
            .selected_options
            .into_iter()
            .flatten()
            .filter(|label| !label.is_empty())
            .collect();
        if selected.is_empty() {
            debug!("Ignoring vote from {} with no named options", vote.voter_id);
            return false;
        }

        let Some(parent_id) = vote.parent_message_id else {
            debug!("Ignoring vote from {} without a poll message", vote.voter_id);
            return false;
        };

        // Voters never fall back to our own name.
        let voter_name = match self.session.contact(&vote.voter_id).await {
            Ok(contact) => contact_display_name(&contact),
            Err(_) => PLACEHOLDER_NAME.to_string(),
        };

        let request = PollVoteWebhook {
            wa_message_id: parent_id,
            voter: vote.voter_id,
            voter_name,
            selected_options: selected,
        };

        match self.backend.forward_vote(&request).await {
            Ok(()) => {
                info!(
                    "Poll vote forwarded: {} -> {}",
                    request.voter_name,
                    request.selected_options.join(", ")
                );
                true
            }
            Err(e) => {
                error!("Failed to forward poll vote: {:#}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::test_support::FakeSession;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn relay(server: &MockServer, session: Arc<FakeSession>) -> VoteRelay {
        let config = GatewayConfig {
            bot_url: server.uri(),
            webhook_secret: Some("s3cret".to_string()),
            ..GatewayConfig::default()
        };
        VoteRelay::new(Arc::new(BackendClient::new(&config)), session)
    }

    fn vote(parent: Option<&str>, options: Vec<Option<&str>>) -> VoteEvent {
        VoteEvent {
            parent_message_id: parent.map(str::to_string),
            voter_id: "42".to_string(),
            selected_options: options
                .into_iter()
                .map(|o| o.map(str::to_string))
                .collect(),
        }
    }

    async fn server_expecting_votes(count: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/poll-vote"))
            .respond_with(ResponseTemplate::new(200))
            .expect(count)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_forwards_named_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/poll-vote"))
            .and(wiremock::matchers::header("X-Webhook-Secret", "s3cret"))
            .and(body_json(serde_json::json!({
                "wa_message_id": "-100123:77",
                "voter": "42",
                "voter_name": "Alice",
                "selected_options": ["Pizza"]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = Arc::new(FakeSession::new().with_contact("42", "Alice", None));
        let relay = relay(&server, session);
        let accepted = relay
            .relay(vote(Some("-100123:77"), vec![Some("Pizza"), Some(""), None]))
            .await;
        assert!(accepted);
    }

    #[tokio::test]
    async fn test_no_selected_options_is_dropped() {
        let server = server_expecting_votes(0).await;
        let relay = relay(&server, Arc::new(FakeSession::new()));

        assert!(!relay.relay(vote(Some("-100123:77"), vec![])).await);
        assert!(!relay.relay(vote(Some("-100123:77"), vec![None, Some("")])).await);
    }

    #[tokio::test]
    async fn test_missing_parent_is_dropped() {
        let server = server_expecting_votes(0).await;
        let relay = relay(&server, Arc::new(FakeSession::new()));

        assert!(!relay.relay(vote(None, vec![Some("Pizza")])).await);
    }

    #[tokio::test]
    async fn test_unknown_voter_gets_placeholder_not_own_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/poll-vote"))
            .and(wiremock::matchers::body_partial_json(
                serde_json::json!({"voter_name": PLACEHOLDER_NAME}),
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = Arc::new(FakeSession::new().with_own_name("Regelebot"));
        let relay = relay(&server, session);
        assert!(relay.relay(vote(Some("-100123:77"), vec![Some("Sushi")])).await);
    }

    #[tokio::test]
    async fn test_backend_failure_is_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/poll-vote"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let relay = relay(&server, Arc::new(FakeSession::new()));
        assert!(!relay.relay(vote(Some("-100123:77"), vec![Some("Pizza")])).await);
    }
}
