use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async locks keyed by event id.
///
/// Operations on different events never contend. An entry is dropped once
/// no task holds or waits for it.
#[derive(Debug, Default)]
pub struct EventLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

pub struct EventGuard<'a> {
    event_id: i64,
    owner: &'a EventLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl EventLocks {
    pub async fn lock(&self, event_id: i64) -> EventGuard<'_> {
        let lock = self
            .locks
            .lock()
            .entry(event_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        EventGuard {
            event_id,
            owner: self,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Drop for EventGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock();
        // release before counting references
        drop(self.guard.take());
        if let Some(lock) = locks.get(&self.event_id) {
            // only the map holds it
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.event_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn per_event() {
        let locks = Arc::new(EventLocks::default());
        let g1 = locks.lock(1).await;
        // a different event is not blocked
        let g2 = tokio::time::timeout(Duration::from_millis(50), locks.lock(2)).await;
        assert!(g2.is_ok());
        drop(g2);

        // the same event waits
        let res = tokio::time::timeout(Duration::from_millis(50), locks.lock(1)).await;
        assert!(res.is_err());
        drop(g1);
        let res = tokio::time::timeout(Duration::from_millis(50), locks.lock(1)).await;
        assert!(res.is_ok());
        drop(res);
        assert_eq!(locks.len(), 0);
    }
}
