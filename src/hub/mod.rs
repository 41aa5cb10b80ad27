//! livefeed hub
//!
//! The topic broadcast hub: it keeps per-template comment feeds live for
//! every connected WebSocket client.
//!
//! Public types:
//! - `Hub`: registry of subscriptions plus the snapshot fan-out.
//! - `Connection`: the hub's handle on one subscriber.
//! - `CommentUpdate`: the message every subscriber receives.

pub mod connection;
pub mod engine;
pub mod message;
pub mod topic;

pub use connection::{Connection, ConnectionId, ConnectionState};
pub use engine::{Hub, SubscriptionHandle, parse_topic};
pub use message::CommentUpdate;
pub use topic::{Topic, TopicId};
