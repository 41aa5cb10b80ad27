//! The `transport` module exposes the comment feed over WebSockets.
//!
//! It owns the `/comments` endpoint: the upgrade handshake, query parsing,
//! the close codes sent to rejected clients, and the per-connection reader
//! and writer tasks that bridge a socket to the hub.

pub mod message;
pub mod websocket;

#[cfg(test)]
mod tests;

pub use message::{FeedQuery, INVALID_TOKEN, TEMPLATE_ID_REQUIRED};
pub use websocket::{serve, start_websocket_server};
