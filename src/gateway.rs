use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::backend::BackendClient;
use crate::bridge::Bridge;
use crate::config::GatewayConfig;
use crate::dedup::DedupSet;
use crate::guard::InFlight;
use crate::platform::{ChatSession, InboundEvent, VoteEvent};
use crate::router::{Route, Router};
use crate::vote::VoteRelay;

/// Entry point for platform events.
///
/// Messages go through dedup, the router and the per-chat guard before a
/// processing task is spawned. Votes skip all three.
pub struct Gateway {
    router: Router,
    dedup: Arc<DedupSet>,
    in_flight: InFlight,
    bridge: Arc<Bridge>,
    votes: Arc<VoteRelay>,
}

impl Gateway {
    pub fn new(config: &GatewayConfig, session: Arc<dyn ChatSession>) -> Self {
        let backend = Arc::new(BackendClient::new(config));
        let dedup = Arc::new(DedupSet::new(config.dedup_capacity));

        Self {
            router: Router::new(config.chat_ids.iter().cloned(), &config.bot_name),
            bridge: Arc::new(Bridge::new(backend.clone(), session.clone(), dedup.clone())),
            votes: Arc::new(VoteRelay::new(backend, session)),
            dedup,
            in_flight: InFlight::new(),
        }
    }

    pub fn is_discovery(&self) -> bool {
        self.router.is_discovery()
    }

    pub fn subscribed_chats(&self) -> Vec<&str> {
        self.router.subscribed()
    }

    /// Handle one message event from any stream.
    ///
    /// Returns the processing task if one was started. The guard is taken
    /// before the task is spawned and released when it finishes, whatever
    /// the outcome.
    pub fn dispatch(&self, event: InboundEvent, stream: &str) -> Option<JoinHandle<()>> {
        if self.dedup.seen(&event.id) {
            debug!("[{}] duplicate message {}", stream, event.id);
            return None;
        }

        match self.router.route(&event) {
            Route::Forward => {}
            route => {
                debug!("[{}] message {} not forwarded: {:?}", stream, event.id, route);
                return None;
            }
        }

        let Some(permit) = self.in_flight.try_enter(&event.chat_id) else {
            debug!(
                "[{}] chat {} busy, skipping message {}",
                stream, event.chat_id, event.id
            );
            return None;
        };

        let bridge = self.bridge.clone();
        Some(tokio::spawn(async move {
            bridge.handle(&event).await;
            debug!("Chat {} released", permit.chat_id());
        }))
    }

    /// Handle a poll vote in the background.
    pub fn dispatch_vote(&self, vote: VoteEvent) -> JoinHandle<()> {
        let votes = self.votes.clone();
        tokio::spawn(async move {
            votes.relay(vote).await;
        })
    }

    #[cfg(test)]
    pub fn dedup(&self) -> &DedupSet {
        &self.dedup
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }
}
