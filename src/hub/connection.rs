//! Connection handle
//!
//! `Connection` is the hub's view of one subscriber: an id, the sending side
//! of the per-connection channel drained by the transport's writer task, and
//! a lifecycle state. The hub never owns the socket itself.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;
use uuid::Uuid;

use crate::utils::error::HubError;

pub type ConnectionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl From<u8> for ConnectionState {
    fn from(v: u8) -> Self {
        match v {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    sender: UnboundedSender<WsMessage>,
    state: AtomicU8,
    // Highest snapshot ticket handed to the sender. Held while sending so two
    // racing snapshots can never reach the channel out of order.
    delivered: Mutex<u64>,
}

impl Connection {
    /// Create a new open connection around the channel drained by the socket
    /// writer.
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            state: AtomicU8::new(ConnectionState::Open as u8),
            delivered: Mutex::new(0),
        }
    }

    /// Current state. A connection whose writer has gone away reads as
    /// `Closed` even before anyone called `mark_closed`.
    pub fn state(&self) -> ConnectionState {
        if self.sender.is_closed() {
            return ConnectionState::Closed;
        }
        self.state.load(Ordering::Acquire).into()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Queue a frame for this connection. Fails without blocking if the
    /// connection is no longer open.
    pub fn send(&self, msg: WsMessage) -> Result<(), HubError> {
        if !self.is_open() {
            return Err(self.send_failure());
        }
        self.sender.send(msg).map_err(|_| {
            self.mark_closed();
            self.send_failure()
        })
    }

    /// Send a snapshot carrying `ticket` unless a newer one was already sent.
    /// Returns whether the snapshot was queued.
    pub(crate) fn deliver(&self, ticket: u64, msg: WsMessage) -> Result<bool, HubError> {
        let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
        if ticket <= *delivered {
            return Ok(false);
        }
        self.send(msg)?;
        *delivered = ticket;
        Ok(true)
    }

    /// Start an application-level close: queue a close frame and move to
    /// `Closing`. The transport finishes the handshake.
    pub fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        if self.sender.send(WsMessage::Close(Some(frame))).is_err() {
            debug!(connection = %self.id, code, "close frame not sent, writer gone");
        }
        let _ = self.state.compare_exchange(
            ConnectionState::Open as u8,
            ConnectionState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn send_failure(&self) -> HubError {
        HubError::SendFailure {
            connection_id: self.id.clone(),
        }
    }
}
