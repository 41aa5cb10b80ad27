//! Hub engine
//!
//! The hub keeps, per template, the set of connections watching its comment
//! feed and pushes a freshly fetched snapshot to them:
//! - once to a new subscriber, right after it registers
//! - to every open subscriber whenever the write path reports a change
//!
//! Concurrency and usage notes:
//! - Each topic bucket has its own mutex, so unrelated topics never contend.
//!   The bucket index is a `DashMap`; its shard lock is only held while a
//!   bucket is created or pruned.
//! - No lock is held across the snapshot fetch. Only registry mutations and
//!   the non-blocking fan-out loop run under the bucket lock.
//! - Sends go through unbounded per-connection channels, so a slow socket
//!   never stalls the loop for the other subscribers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connection::{Connection, ConnectionId};
use super::message::CommentUpdate;
use super::topic::{Topic, TopicId};
use crate::auth::Principal;
use crate::persistence::SnapshotStore;
use crate::utils::error::HubError;

/// Returned by `subscribe`; identifies where a connection was registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub topic_id: TopicId,
    pub connection_id: ConnectionId,
}

pub struct Hub {
    topics: DashMap<TopicId, Arc<Mutex<Topic>>>,
    memberships: DashMap<ConnectionId, TopicId>,
    store: Arc<dyn SnapshotStore>,
}

fn lock(bucket: &Mutex<Topic>) -> MutexGuard<'_, Topic> {
    bucket.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Parse the raw `templateId` query value. Topic ids are positive integers.
pub fn parse_topic(raw: Option<&str>) -> Result<TopicId, HubError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    match raw.parse::<TopicId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(HubError::InvalidTopic(raw.to_string())),
    }
}

impl Hub {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            topics: DashMap::new(),
            memberships: DashMap::new(),
            store,
        }
    }

    /// Register `connection` under `topic_id`, then send it the current
    /// snapshot. The snapshot goes to this connection only.
    ///
    /// A failed fetch is logged and leaves the connection subscribed; it will
    /// catch up on the next change.
    pub async fn subscribe(
        &self,
        topic_id: TopicId,
        connection: Arc<Connection>,
        principal: Option<&Principal>,
    ) -> SubscriptionHandle {
        if let Some(previous) = self.topic_of(&connection.id)
            && previous != topic_id
        {
            self.unsubscribe(&connection);
        }

        let ticket = {
            let bucket = self
                .topics
                .entry(topic_id)
                .or_insert_with(|| Arc::new(Mutex::new(Topic::new(topic_id))));
            let mut topic = lock(&bucket);
            topic.subscribe(connection.clone());
            self.memberships.insert(connection.id.clone(), topic_id);
            topic.next_ticket()
        };

        info!(
            connection = %connection.id,
            topic = topic_id,
            user = principal.map(|p| p.user_id.as_str()).unwrap_or("anonymous"),
            "subscribed"
        );

        let handle = SubscriptionHandle {
            topic_id,
            connection_id: connection.id.clone(),
        };

        let msg = match self.fetch_update(topic_id).await {
            Ok(msg) => msg,
            Err(e) => {
                warn!(topic = topic_id, error = %e, "initial snapshot unavailable");
                return handle;
            }
        };

        if let Err(e) = connection.deliver(ticket, msg) {
            debug!(error = %e, "initial snapshot not delivered");
            self.unsubscribe(&connection);
        }

        handle
    }

    /// Remove `connection` from whichever topic holds it. Safe to call any
    /// number of times; returns whether anything was removed.
    pub fn unsubscribe(&self, connection: &Connection) -> bool {
        let Some((_, topic_id)) = self.memberships.remove(&connection.id) else {
            return false;
        };

        let removed = match self.bucket(topic_id) {
            Some(bucket) => lock(&bucket).unsubscribe(&connection.id),
            None => false,
        };
        self.prune(topic_id);

        if removed {
            debug!(connection = %connection.id, topic = topic_id, "unsubscribed");
        }
        removed
    }

    /// Schedule a broadcast of `topic_id`'s current snapshot and return
    /// immediately. Failures are logged by the spawned task.
    pub fn notify_changed(self: &Arc<Self>, topic_id: TopicId) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            match hub.broadcast(topic_id).await {
                Ok(delivered) => debug!(topic = topic_id, delivered, "snapshot broadcast"),
                Err(e) => warn!(topic = topic_id, error = %e, "broadcast skipped"),
            }
        })
    }

    /// Fetch the snapshot once and fan it out to every open subscriber of
    /// `topic_id`. Returns the number of connections it was queued for.
    ///
    /// Subscribers that are closing, closed or fail to accept the send are
    /// dropped from the registry; the rest still receive the snapshot.
    pub async fn broadcast(&self, topic_id: TopicId) -> Result<usize, HubError> {
        let Some(bucket) = self.bucket(topic_id) else {
            return Ok(0);
        };
        let ticket = {
            let mut topic = lock(&bucket);
            if topic.is_empty() {
                return Ok(0);
            }
            topic.next_ticket()
        };

        let msg = self.fetch_update(topic_id).await?;

        let mut delivered = 0;
        let stale: Vec<ConnectionId> = {
            let mut topic = lock(&bucket);
            let mut stale = Vec::new();
            for (id, connection) in &topic.subscribers {
                if !connection.is_open() {
                    stale.push(id.clone());
                    continue;
                }
                match connection.deliver(ticket, msg.clone()) {
                    Ok(true) => delivered += 1,
                    Ok(false) => debug!(connection = %id, "newer snapshot already sent"),
                    Err(e) => {
                        warn!(error = %e, "dropping subscriber");
                        stale.push(id.clone());
                    }
                }
            }
            for id in &stale {
                topic.unsubscribe(id);
            }
            stale
        };

        for id in &stale {
            self.memberships.remove_if(id, |_, t| *t == topic_id);
        }
        if !stale.is_empty() {
            self.prune(topic_id);
        }

        Ok(delivered)
    }

    pub fn subscriber_count(&self, topic_id: TopicId) -> usize {
        self.bucket(topic_id)
            .map(|bucket| lock(&bucket).subscribers.len())
            .unwrap_or(0)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Topic a connection is currently subscribed to, if any.
    pub fn topic_of(&self, connection_id: &ConnectionId) -> Option<TopicId> {
        self.memberships.get(connection_id).map(|t| *t)
    }

    fn bucket(&self, topic_id: TopicId) -> Option<Arc<Mutex<Topic>>> {
        self.topics.get(&topic_id).map(|bucket| Arc::clone(&bucket))
    }

    // Drop the bucket if it is empty. Runs under the shard lock, like bucket
    // creation in `subscribe`, so a concurrent subscriber is never orphaned.
    fn prune(&self, topic_id: TopicId) {
        self.topics
            .remove_if(&topic_id, |_, bucket| lock(bucket).is_empty());
    }

    async fn fetch_update(&self, topic_id: TopicId) -> Result<tungstenite::Message, HubError> {
        let comments = self
            .store
            .comments(topic_id)
            .await
            .map_err(|source| HubError::SnapshotFetch { topic_id, source })?;
        CommentUpdate::new(topic_id, comments).to_ws_message()
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("topics", &self.topics.len())
            .field("connections", &self.memberships.len())
            .finish()
    }
}
