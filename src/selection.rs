use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one file selection. Only the latest ticket is current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTicket {
    epoch: u64,
    key: String,
}

/// Tracks which file a session is previewing so late results can be dropped.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    epoch: AtomicU64,
    current: Mutex<Option<SelectionTicket>>,
}

impl SelectionTracker {
    pub fn select(&self, key: &str) -> SelectionTicket {
        let mut current = self.current.lock();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = SelectionTicket {
            epoch,
            key: key.to_string(),
        };
        *current = Some(ticket.clone());
        ticket
    }

    pub fn is_current(&self, ticket: &SelectionTicket) -> bool {
        self.current.lock().as_ref() == Some(ticket)
    }

    /// Pass `value` through only if `ticket` is still the latest selection.
    pub fn accept<T>(&self, ticket: &SelectionTicket, value: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(value)
        } else {
            tracing::debug!("Dropping stale preview for {}", ticket.key);
            None
        }
    }
}
