use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Chats that currently have a processing task.
///
/// A rejected entry is dropped by the caller, never queued.
#[derive(Clone, Default)]
pub struct InFlight {
    chats: Arc<Mutex<HashSet<String>>>,
}

/// Busy mark for one chat. Released on drop.
pub struct InFlightPermit {
    chat_id: String,
    in_flight: InFlight,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `chat_id` busy. Returns `None` if a task already holds it.
    pub fn try_enter(&self, chat_id: &str) -> Option<InFlightPermit> {
        let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        if !chats.insert(chat_id.to_string()) {
            return None;
        }
        Some(InFlightPermit {
            chat_id: chat_id.to_string(),
            in_flight: self.clone(),
        })
    }

    /// Clear the mark for `chat_id`. Only the permit holding it calls this.
    fn leave(&self, chat_id: &str) {
        let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        chats.remove(chat_id);
    }

    #[cfg(test)]
    pub fn is_busy(&self, chat_id: &str) -> bool {
        let chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        chats.contains(chat_id)
    }
}

impl InFlightPermit {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.in_flight.leave(&self.chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_entry_is_rejected_while_held() {
        let in_flight = InFlight::new();
        let permit = in_flight.try_enter("chat-1");
        assert!(permit.is_some());
        assert!(in_flight.try_enter("chat-1").is_none());
        assert!(in_flight.is_busy("chat-1"));
    }

    #[test]
    fn test_chats_are_independent() {
        let in_flight = InFlight::new();
        let _a = in_flight.try_enter("chat-a").unwrap();
        assert!(in_flight.try_enter("chat-b").is_some());
    }

    #[test]
    fn test_drop_releases() {
        let in_flight = InFlight::new();
        {
            let permit = in_flight.try_enter("chat-1").unwrap();
            assert_eq!(permit.chat_id(), "chat-1");
        }
        assert!(!in_flight.is_busy("chat-1"));
        assert!(in_flight.try_enter("chat-1").is_some());
    }

    #[test]
    fn test_mark_is_held_until_permit_drops() {
        let in_flight = InFlight::new();
        let first = in_flight.try_enter("chat-1").unwrap();
        let clone = in_flight.clone();
        assert!(clone.try_enter("chat-1").is_none());

        drop(first);
        let second = clone.try_enter("chat-1").unwrap();
        assert!(in_flight.try_enter("chat-1").is_none());
        drop(second);
        assert!(!in_flight.is_busy("chat-1"));
    }

    #[test]
    fn test_released_when_task_panics() {
        let in_flight = InFlight::new();
        let cloned = in_flight.clone();
        let result = std::thread::spawn(move || {
            let _permit = cloned.try_enter("chat-1").unwrap();
            panic!("processing failed");
        })
        .join();

        assert!(result.is_err());
        assert!(!in_flight.is_busy("chat-1"));
    }
}
