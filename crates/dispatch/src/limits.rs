//! Per-user dispatcher slots.
//!
//! Each user maps to a `Semaphore(limit)`.  A dispatcher holds one owned
//! permit for its whole life; dropping the permit frees the slot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use rf_domain::error::{Error, Result};

pub struct DispatcherLimiter {
    limit: usize,
    slots: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl DispatcherLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Take a slot for `user_id` without waiting.
    ///
    /// Fails with [`Error::ResourceLimitExceeded`] when every slot is held;
    /// existing holders are unaffected.
    pub fn try_acquire(&self, user_id: &str) -> Result<OwnedSemaphorePermit> {
        let sem = {
            let mut slots = self.slots.lock();
            slots
                .entry(user_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(self.limit)))
                .clone()
        };

        sem.try_acquire_owned()
            .map_err(|_| Error::ResourceLimitExceeded {
                user_id: user_id.to_owned(),
                active: self.limit,
                limit: self.limit,
            })
    }

    /// Slots currently held by `user_id`.
    pub fn active_for_user(&self, user_id: &str) -> usize {
        self.slots
            .lock()
            .get(user_id)
            .map(|sem| self.limit - sem.available_permits())
            .unwrap_or(0)
    }

    /// Number of users with a tracked semaphore.
    pub fn user_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Forget users that hold no slots.
    pub fn prune_idle(&self) {
        let mut slots = self.slots.lock();
        slots.retain(|_, sem| sem.available_permits() < self.limit);
    }
}
