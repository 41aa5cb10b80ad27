//! Topic bucket
//!
//! A `Topic` holds the connections subscribed to one template's comment feed
//! and the counter that orders its snapshots.
//!
//! Concurrency note: each bucket sits behind its own mutex inside the hub;
//! callers must hold it when touching the subscriber map.

use std::collections::HashMap;
use std::sync::Arc;

use super::connection::{Connection, ConnectionId};

pub type TopicId = i64;

#[derive(Debug)]
pub struct Topic {
    pub id: TopicId,
    pub subscribers: HashMap<ConnectionId, Arc<Connection>>,
    last_ticket: u64,
}

impl Topic {
    pub fn new(id: TopicId) -> Self {
        Self {
            id,
            subscribers: HashMap::new(),
            last_ticket: 0,
        }
    }

    /// Add a connection. Re-adding the same connection is a no-op.
    pub fn subscribe(&mut self, connection: Arc<Connection>) {
        self.subscribers
            .entry(connection.id.clone())
            .or_insert(connection);
    }

    /// Remove a connection; returns whether it was present.
    pub fn unsubscribe(&mut self, id: &ConnectionId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    /// Reserve the ticket for the next snapshot fetched for this topic.
    /// Tickets are taken before the fetch suspends, so they follow call order.
    pub fn next_ticket(&mut self) -> u64 {
        self.last_ticket += 1;
        self.last_ticket
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
