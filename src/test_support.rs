use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::platform::{ChatSession, Contact, InboundEvent, PollRequest};

pub fn inbound(chat_id: &str, id: &str, body: &str, is_group: bool) -> InboundEvent {
    InboundEvent {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        chat_name: None,
        sender_id: "42".to_string(),
        sender_name: None,
        body: body.to_string(),
        timestamp: Utc::now(),
        is_group,
        from_self: false,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Composing(String, bool),
    /// (event id replied to, text)
    Reply(String, String),
    Poll(String, PollRequest),
}

/// Records every outbound call; send ids are `<chat>:<n>` starting at 1000.
pub struct FakeSession {
    contacts: HashMap<String, Contact>,
    own_name: Option<String>,
    fail_sends: bool,
    connected: AtomicBool,
    next_id: AtomicU64,
    calls: Mutex<Vec<SessionCall>>,
    sent: Mutex<Vec<String>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            contacts: HashMap::new(),
            own_name: None,
            fail_sends: false,
            connected: AtomicBool::new(true),
            next_id: AtomicU64::new(1000),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_contact(mut self, user_id: &str, display_name: &str, name: Option<&str>) -> Self {
        self.contacts.insert(
            user_id.to_string(),
            Contact {
                display_name: Some(display_name.to_string()),
                name: name.map(str::to_string),
            },
        );
        self
    }

    pub fn with_own_name(mut self, name: &str) -> Self {
        self.own_name = Some(name.to_string());
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_sent_id(&self) -> Option<String> {
        self.sent.lock().unwrap().last().cloned()
    }

    fn record(&self, call: SessionCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn send(&self, chat_id: &str) -> Result<Option<String>> {
        if self.fail_sends {
            anyhow::bail!("send failed");
        }
        let id = format!("{}:{}", chat_id, self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sent.lock().unwrap().push(id.clone());
        Ok(Some(id))
    }
}

#[async_trait]
impl ChatSession for FakeSession {
    async fn set_composing(&self, chat_id: &str, composing: bool) -> Result<()> {
        self.record(SessionCall::Composing(chat_id.to_string(), composing));
        Ok(())
    }

    async fn contact(&self, user_id: &str) -> Result<Contact> {
        self.contacts
            .get(user_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown contact {}", user_id))
    }

    async fn send_reply(&self, event: &InboundEvent, text: &str) -> Result<Option<String>> {
        if !self.fail_sends {
            self.record(SessionCall::Reply(event.id.clone(), text.to_string()));
        }
        self.send(&event.chat_id)
    }

    async fn send_poll(&self, chat_id: &str, poll: &PollRequest) -> Result<Option<String>> {
        if !self.fail_sends {
            self.record(SessionCall::Poll(chat_id.to_string(), poll.clone()));
        }
        self.send(chat_id)
    }

    fn own_display_name(&self) -> Option<String> {
        self.own_name.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
