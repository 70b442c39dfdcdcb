use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::EntityId;

/// Smallest identifier ever handed out; keeps ids visually distinct from small counters.
pub const MIN_ID: i64 = 1_000_000;

/// Upper bound (exclusive) so ids survive a round-trip through JSON numbers.
pub const MAX_ID: i64 = 1 << 53;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier space exhausted")]
    Exhausted,
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Result<EntityId, IdError>;
}

/// Random ids in `[MIN_ID, MAX_ID)`, drawn from v4 UUID entropy.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> Result<EntityId, IdError> {
        let entropy = (Uuid::new_v4().as_u128() & u128::from(u64::MAX)) as u64;
        let span = (MAX_ID - MIN_ID) as u64;
        Ok(MIN_ID + (entropy % span) as i64)
    }
}

/// Deterministic ids for tests: `start`, `start + 1`, ... up to `ceiling` inclusive.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicI64,
    ceiling: i64,
}

impl SequentialIdGenerator {
    pub fn new(start: i64) -> Self {
        Self::with_ceiling(start, i64::MAX)
    }

    pub fn with_ceiling(start: i64, ceiling: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
            ceiling,
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> Result<EntityId, IdError> {
        let ceiling = self.ceiling;
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| (id <= ceiling).then(|| id.saturating_add(1)))
            .map_err(|_| IdError::Exhausted)
    }
}
