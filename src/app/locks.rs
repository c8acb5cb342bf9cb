use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Per-photo advisory locks for this process.
///
/// Entries are weak so a lock disappears once nobody holds or awaits it.
#[derive(Clone, Default)]
pub struct PhotoLocks {
    entries: Arc<Mutex<HashMap<Uuid, Weak<tokio::sync::Mutex<()>>>>>,
}

impl PhotoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, photo_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.retain(|_, entry| entry.strong_count() > 0);
            match entries.get(&photo_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    entries.insert(photo_id, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|entry| entry.strong_count() > 0).count()
    }
}
