//! Exclusive reservation for the single AI speech connection.
//!
//! Only one AI speech connection may exist at a time. The slot is an atomic
//! flag; acquiring it hands back an RAII [`SlotGuard`] that the connection
//! holds until it reaches `Closed` or `Error`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use super::base::{RealtimeError, RealtimeResult};

#[derive(Debug, Default)]
pub struct SessionSlot {
    occupied: AtomicBool,
}

impl SessionSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reserve the slot, failing immediately if another connection holds it.
    pub fn try_acquire(self: &Arc<Self>) -> RealtimeResult<SlotGuard> {
        self.occupied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RealtimeError::SessionActive)?;

        let guard = SlotGuard {
            slot: Arc::clone(self),
            id: Uuid::new_v4(),
        };
        tracing::debug!(slot_id = %guard.id, "AI speech slot acquired");
        Ok(guard)
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }
}

/// Holds the slot; dropping it releases the reservation.
#[derive(Debug)]
pub struct SlotGuard {
    slot: Arc<SessionSlot>,
    id: Uuid,
}

impl SlotGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slot.occupied.store(false, Ordering::Release);
        tracing::debug!(slot_id = %self.id, "AI speech slot released");
    }
}
