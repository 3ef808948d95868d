use std::collections::HashSet;

use tracing::info;

use crate::platform::InboundEvent;

pub const COMMAND_PREFIX: &str = "/";

/// Alias the bot always answers to in groups, whatever its configured name.
pub const DEFAULT_ALIAS: &str = "regelebot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// No chats configured; the event was only reported
    Discovery,
    NotSubscribed,
    /// Group message without a command or mention
    NotAddressed,
    Forward,
}

/// Decides which inbound events reach the backend
pub struct Router {
    subscribed: HashSet<String>,
    bot_name: String,
}

impl Router {
    pub fn new(subscribed: impl IntoIterator<Item = String>, bot_name: &str) -> Self {
        Self {
            subscribed: subscribed.into_iter().collect(),
            bot_name: bot_name.to_lowercase(),
        }
    }

    pub fn is_discovery(&self) -> bool {
        self.subscribed.is_empty()
    }

    /// Subscribed chat ids, sorted.
    pub fn subscribed(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.subscribed.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn route(&self, event: &InboundEvent) -> Route {
        if self.is_discovery() {
            report_chat(event);
            return Route::Discovery;
        }

        if !self.subscribed.contains(&event.chat_id) {
            return Route::NotSubscribed;
        }

        // Direct chats get everything, including our own messages.
        if !event.is_group {
            return Route::Forward;
        }

        if self.is_addressed(&event.body) {
            Route::Forward
        } else {
            Route::NotAddressed
        }
    }

    fn is_addressed(&self, body: &str) -> bool {
        if body.starts_with(COMMAND_PREFIX) {
            return true;
        }
        let lower = body.to_lowercase();
        lower.contains(&format!("@{}", self.bot_name))
            || lower.contains(&format!("@{}", DEFAULT_ALIAS))
    }
}

fn report_chat(event: &InboundEvent) {
    info!(
        "chat={} is_group={} chat_name={:?} from_self={} body={:?}",
        event.chat_id,
        event.is_group,
        event.chat_name.as_deref().unwrap_or(""),
        event.from_self,
        preview(&event.body, 50)
    );
    info!(
        "*** Chat detected: {} ({}) ***",
        event.chat_id,
        if event.is_group { "group" } else { "direct" }
    );
    if let Some(name) = event.chat_name.as_deref().filter(|n| !n.is_empty()) {
        info!("*** Name: {} ***", name);
    }
    info!("-> Add CHAT_IDS={} to your environment", event.chat_id);
}

/// Truncate `text` to at most `max_chars` characters.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
