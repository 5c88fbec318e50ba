use locus_common::VerificationEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub type ListenerId = u64;

pub type VerificationListener = Arc<dyn Fn(&VerificationEvent) + Send + Sync>;

/// Progress subscribers. Listeners are called outside the lock, in
/// subscription order, so they may unsubscribe from inside a callback.
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, VerificationListener)>>,
}

impl ListenerSet {
    pub fn subscribe(&self, listener: VerificationListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit(&self, event: &VerificationEvent) {
        let listeners: Vec<VerificationListener> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}
