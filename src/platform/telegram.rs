use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::{SendMessageSetters, SendPollSetters};
use teloxide::prelude::*;
use teloxide::types::{
    Chat, ChatAction, ChatId, InputPollOption, MaybeAnonymousUser, MessageId, PollAnswer,
    ReplyParameters, User, UserId,
};
use tracing::{debug, error, info, warn};

use crate::gateway::Gateway;
use crate::platform::{ChatSession, Contact, InboundEvent, PollRequest, VoteEvent};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const MAX_TRACKED_POLLS: usize = 1000;
const MAX_TRACKED_CONTACTS: usize = 1000;

/// Telegram's limit is 4096 characters per message.
const MAX_MESSAGE_LEN: usize = 4000;

/// Gateway message id: `<chat id>:<message id>`, unique across chats.
pub fn message_key(chat_id: ChatId, message_id: MessageId) -> String {
    format!("{}:{}", chat_id.0, message_id.0)
}

fn parse_message_key(key: &str) -> Option<(ChatId, MessageId)> {
    let (chat, id) = key.rsplit_once(':')?;
    Some((ChatId(chat.parse().ok()?), MessageId(id.parse().ok()?)))
}

fn parse_chat_id(chat_id: &str) -> Result<ChatId> {
    chat_id
        .parse::<i64>()
        .map(ChatId)
        .with_context(|| format!("Invalid Telegram chat id: {}", chat_id))
}

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

fn contact_from_user(user: &User) -> Contact {
    Contact {
        display_name: Some(user.full_name()),
        name: user.username.clone(),
    }
}

/// Anonymous admins vote as their chat.
fn contact_from_chat(chat: &Chat) -> Contact {
    Contact {
        display_name: chat.title().map(str::to_string),
        name: chat.username().map(str::to_string),
    }
}

struct Account {
    id: UserId,
    name: String,
}

struct SentPoll {
    message_key: String,
    options: Vec<String>,
}

/// Map that forgets its oldest entry once it grows past `capacity`.
struct BoundedMap<V> {
    capacity: usize,
    entries: HashMap<String, V>,
    order: VecDeque<String>,
}

impl<V> BoundedMap<V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn insert(&mut self, key: String, value: V) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        if self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }
}

/// Telegram implementation of [`ChatSession`]
pub struct TelegramSession {
    bot: Bot,
    account: Mutex<Option<Account>>,
    connected: AtomicBool,
    /// Users seen in updates, for display name lookups
    contacts: Mutex<BoundedMap<Contact>>,
    /// Polls we sent, by Telegram poll id
    polls: Mutex<BoundedMap<SentPoll>>,
}

impl TelegramSession {
    pub fn new(bot_token: &str) -> Self {
        Self {
            bot: Bot::new(bot_token),
            account: Mutex::new(None),
            connected: AtomicBool::new(false),
            contacts: Mutex::new(BoundedMap::new(MAX_TRACKED_CONTACTS)),
            polls: Mutex::new(BoundedMap::new(MAX_TRACKED_POLLS)),
        }
    }

    fn own_id(&self) -> Option<UserId> {
        let account = self.account.lock().unwrap_or_else(|e| e.into_inner());
        account.as_ref().map(|a| a.id)
    }

    fn remember(&self, id: String, contact: Contact) {
        let mut contacts = self.contacts.lock().unwrap_or_else(|e| e.into_inner());
        contacts.insert(id, contact);
    }

    fn remember_user(&self, user: &User) {
        self.remember(user.id.0.to_string(), contact_from_user(user));
    }

    fn track_poll(&self, poll_id: String, message_key: String, options: Vec<String>) {
        let mut polls = self.polls.lock().unwrap_or_else(|e| e.into_inner());
        polls.insert(poll_id, SentPoll { message_key, options });
    }

    /// Map a Telegram message to a gateway event.
    pub fn inbound_event(&self, msg: &Message) -> InboundEvent {
        let body = msg.text().or_else(|| msg.caption()).unwrap_or_default();
        let own_id = self.own_id();

        let (sender_id, sender_name, from_self) = match msg.from.as_ref() {
            Some(user) => {
                self.remember_user(user);
                (
                    user.id.0.to_string(),
                    Some(user.full_name()),
                    own_id == Some(user.id),
                )
            }
            // Channel posts and anonymous admins have no user.
            None => (msg.chat.id.0.to_string(), None, false),
        };

        InboundEvent {
            id: message_key(msg.chat.id, msg.id),
            chat_id: msg.chat.id.0.to_string(),
            chat_name: msg
                .chat
                .title()
                .or_else(|| msg.chat.username())
                .map(str::to_string),
            sender_id,
            sender_name,
            body: body.to_string(),
            timestamp: msg.date,
            is_group: !msg.chat.is_private(),
            from_self,
        }
    }

    /// Map a poll answer to a vote, resolving labels from the polls we sent.
    pub fn vote_event(&self, answer: &PollAnswer) -> VoteEvent {
        let (voter_id, contact) = match &answer.voter {
            MaybeAnonymousUser::User(user) => (user.id.0.to_string(), contact_from_user(user)),
            MaybeAnonymousUser::Chat(chat) => (chat.id.0.to_string(), contact_from_chat(chat)),
        };
        self.remember(voter_id.clone(), contact);

        let polls = self.polls.lock().unwrap_or_else(|e| e.into_inner());
        let vote = match polls.get(&answer.poll_id.0) {
            Some(sent) => VoteEvent {
                parent_message_id: Some(sent.message_key.clone()),
                voter_id,
                selected_options: answer
                    .option_ids
                    .iter()
                    .map(|&i| sent.options.get(usize::from(i)).cloned())
                    .collect(),
            },
            None => {
                debug!("Answer for unknown poll {}", answer.poll_id.0);
                VoteEvent {
                    parent_message_id: None,
                    voter_id,
                    selected_options: answer.option_ids.iter().map(|_| None).collect(),
                }
            }
        };
        vote
    }
}

/// Telegram poll id of a sent poll message.
fn sent_poll_id(msg: &Message) -> Option<String> {
    msg.poll().map(|poll| poll.id.0.clone())
}

#[async_trait]
impl ChatSession for TelegramSession {
    async fn set_composing(&self, chat_id: &str, composing: bool) -> Result<()> {
        // Telegram clears the indicator by itself once we send.
        if !composing {
            return Ok(());
        }
        self.bot
            .send_chat_action(parse_chat_id(chat_id)?, ChatAction::Typing)
            .await
            .context("Failed to send typing indicator")?;
        Ok(())
    }

    async fn contact(&self, user_id: &str) -> Result<Contact> {
        let contacts = self.contacts.lock().unwrap_or_else(|e| e.into_inner());
        contacts
            .get(user_id)
            .cloned()
            .with_context(|| format!("Unknown contact: {}", user_id))
    }

    async fn send_reply(&self, event: &InboundEvent, text: &str) -> Result<Option<String>> {
        let (chat_id, message_id) = parse_message_key(&event.id)
            .with_context(|| format!("Invalid message id: {}", event.id))?;

        let mut first = None;
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let request = self.bot.send_message(chat_id, chunk);
            let sent = if first.is_none() {
                request
                    .reply_parameters(ReplyParameters::new(message_id))
                    .await
            } else {
                request.await
            }
            .context("Failed to send reply")?;

            if first.is_none() {
                first = Some(message_key(sent.chat.id, sent.id));
            }
        }
        Ok(first)
    }

    async fn send_poll(&self, chat_id: &str, poll: &PollRequest) -> Result<Option<String>> {
        let options: Vec<InputPollOption> = poll
            .options
            .iter()
            .map(|o| InputPollOption::new(o.clone()))
            .collect();

        let sent = self
            .bot
            .send_poll(parse_chat_id(chat_id)?, poll.question.clone(), options)
            .is_anonymous(false)
            .allows_multiple_answers(false)
            .await
            .context("Failed to send poll")?;

        let key = message_key(sent.chat.id, sent.id);
        match sent_poll_id(&sent) {
            Some(poll_id) => self.track_poll(poll_id, key.clone(), poll.options.clone()),
            None => warn!("Sent poll {} has no poll id, votes will be ignored", key),
        }
        Ok(Some(key))
    }

    fn own_display_name(&self) -> Option<String> {
        let account = self.account.lock().unwrap_or_else(|e| e.into_inner());
        account.as_ref().map(|a| a.name.clone())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Run the Telegram session, reconnecting whenever it drops.
pub async fn run(gateway: Arc<Gateway>, session: Arc<TelegramSession>) {
    loop {
        if let Err(e) = connect_and_dispatch(gateway.clone(), session.clone()).await {
            error!("Telegram session error: {:#}", e);
        }
        session.connected.store(false, Ordering::SeqCst);

        info!("Disconnected, reconnecting in {}s...", RECONNECT_DELAY.as_secs());
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn connect_and_dispatch(gateway: Arc<Gateway>, session: Arc<TelegramSession>) -> Result<()> {
    let me = session
        .bot
        .get_me()
        .await
        .context("Failed to authenticate with Telegram")?;
    info!("Authenticated as {} ({})", me.user.full_name(), me.user.id.0);

    {
        let mut account = session.account.lock().unwrap_or_else(|e| e.into_inner());
        *account = Some(Account {
            id: me.user.id,
            name: me.user.full_name(),
        });
    }
    session.connected.store(true, Ordering::SeqCst);

    info!("Telegram connected and ready");
    if gateway.is_discovery() {
        info!("CHAT_IDS is not set.");
        info!("Send a message in a chat to see its id in the logs.");
    } else {
        info!("Active chats: {}", gateway.subscribed_chats().join(", "));
    }

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_edited_message().endpoint(handle_edited_message))
        .branch(Update::filter_poll_answer().endpoint(handle_poll_answer));

    Dispatcher::builder(session.bot.clone(), handler)
        .dependencies(dptree::deps![gateway, session.clone()])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    warn!("Telegram dispatcher stopped");
    Ok(())
}

async fn handle_message(
    msg: Message,
    gateway: Arc<Gateway>,
    session: Arc<TelegramSession>,
) -> ResponseResult<()> {
    gateway.dispatch(session.inbound_event(&msg), "message");
    Ok(())
}

async fn handle_edited_message(
    msg: Message,
    gateway: Arc<Gateway>,
    session: Arc<TelegramSession>,
) -> ResponseResult<()> {
    gateway.dispatch(session.inbound_event(&msg), "edited_message");
    Ok(())
}

async fn handle_poll_answer(
    answer: PollAnswer,
    gateway: Arc<Gateway>,
    session: Arc<TelegramSession>,
) -> ResponseResult<()> {
    gateway.dispatch_vote(session.vote_event(&answer));
    Ok(())
}
