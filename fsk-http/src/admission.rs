use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Suggested client back-off returned with every rejection.
pub const RETRY_AFTER_SECONDS: u64 = 5;

/// Bounds logical concurrency with a fixed permit pool. Acquisition never
/// waits: when the pool is empty the caller is rejected immediately.
#[derive(Clone, Debug)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Permission to process one request. Returned to the pool on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overloaded {
    pub in_flight: usize,
    pub retry_after_seconds: u64,
}

impl std::fmt::Display for Overloaded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "service overloaded with {} in-flight requests; retry after {}s",
            self.in_flight, self.retry_after_seconds
        )
    }
}

impl std::error::Error for Overloaded {}

impl AdmissionController {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }

    pub fn try_acquire(&self) -> Result<AdmissionPermit, Overloaded> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(AdmissionPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => Err(Overloaded {
                in_flight: self.in_flight(),
                retry_after_seconds: RETRY_AFTER_SECONDS,
            }),
        }
    }
}
