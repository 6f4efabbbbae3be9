//! In-memory message history of a room.

use std::collections::HashMap;

use murmur_protocol::Message;

/// What [`MessageLog::upsert`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// The id was new; the message was appended.
    Inserted,
    /// A message with the same id was replaced where it stood.
    Replaced,
}

/// A room's messages in display order, indexed by id.
///
/// Hydrated once from the store when the room activates and then kept in
/// step with it: every change is applied here first and written through
/// afterwards. Messages are never removed.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    index: HashMap<String, usize>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `message`, or replaces the message with the same id in
    /// place so its position in the history does not change.
    pub fn upsert(&mut self, message: Message) -> Upserted {
        match self.index.get(&message.id) {
            Some(&pos) => {
                self.messages[pos] = message;
                Upserted::Replaced
            }
            None => {
                self.index.insert(message.id.clone(), self.messages.len());
                self.messages.push(message);
                Upserted::Inserted
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.index.get(id).map(|&pos| &self.messages[pos])
    }

    /// The history in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// A copy of the history for a joining peer.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<Vec<Message>> for MessageLog {
    fn from(messages: Vec<Message>) -> Self {
        let mut log = Self::new();
        for message in messages {
            log.upsert(message);
        }
        log
    }
}
