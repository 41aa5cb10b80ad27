//! Change bus
//!
//! A payload-free "a write happened" signal. Producers are the write paths
//! of the platform; the consumer is the refresh scheduler. Signals carry no
//! identity, so several of them arriving before the consumer looks are worth
//! exactly as much as one. A lagging receiver therefore loses nothing that
//! matters, it simply sees one coalesced signal.

use tokio::sync::broadcast::{self, Receiver, Sender};

#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: Sender<()>,
}

impl ChangeBus {
    /// Create a bus buffering up to `capacity` undelivered signals per
    /// receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Record that a write was committed. Never blocks and never fails; with
    /// no receiver attached the signal is simply dropped.
    pub fn signal_changed(&self) {
        let _ = self.sender.send(());
    }

    pub fn subscribe(&self) -> Receiver<()> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(64)
    }
}
