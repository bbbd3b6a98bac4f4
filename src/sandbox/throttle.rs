use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, warn};

use crate::sandbox::Failure;

/// Process-wide bound on simultaneous executions.
///
/// Cloning shares the same slots. Callers beyond the limit wait for a slot;
/// when `max_waiters` is set and that many callers are already waiting, new
/// callers are turned away with an `Overloaded` failure instead of queuing.
#[derive(Clone)]
pub struct Throttle {
    semaphore: Arc<Semaphore>,
    waiters: Arc<AtomicUsize>,
    limit: usize,
    max_waiters: Option<usize>,
}

/// A held execution slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
}

/// Uncounts a waiter when its acquire future finishes or is dropped.
struct WaiterGuard {
    waiters: Arc<AtomicUsize>,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.waiters.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Throttle {
    pub fn new(limit: usize, max_waiters: Option<usize>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            waiters: Arc::new(AtomicUsize::new(0)),
            limit,
            max_waiters,
        }
    }

    /// Acquire a slot, waiting if all of them are in use.
    ///
    /// Cancel-safe: dropping the returned future before it resolves leaves no
    /// waiter behind.
    pub async fn acquire(&self) -> Result<ThrottlePermit, Failure> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => return Ok(ThrottlePermit { _permit: permit }),
            Err(TryAcquireError::Closed) => {
                return Err(Failure::internal("execution throttle is closed"))
            }
            Err(TryAcquireError::NoPermits) => {}
        }

        let _guard = self.register_waiter()?;
        debug!(
            waiting = self.waiting(),
            limit = self.limit,
            "All execution slots busy, waiting"
        );

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Failure::internal(format!("Failed to acquire execution slot: {}", e)))?;

        Ok(ThrottlePermit { _permit: permit })
    }

    fn register_waiter(&self) -> Result<WaiterGuard, Failure> {
        let previous = self.waiters.fetch_add(1, Ordering::AcqRel);
        let guard = WaiterGuard {
            waiters: self.waiters.clone(),
        };

        if let Some(max) = self.max_waiters {
            if previous >= max {
                warn!(
                    waiting = previous,
                    max_waiters = max,
                    "Execution queue is full, rejecting request"
                );
                return Err(Failure::overloaded(format!(
                    "all {} execution slots are busy and {} requests are already waiting",
                    self.limit, previous
                )));
            }
        }

        Ok(guard)
    }

    /// Configured number of slots.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Callers currently waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::FailureKind;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permits_are_released_on_drop() {
        let throttle = Throttle::new(2, None);
        assert_eq!(throttle.available(), 2);

        let first = throttle.acquire().await.unwrap();
        let second = throttle.acquire().await.unwrap();
        assert_eq!(throttle.available(), 0);

        drop(first);
        assert_eq!(throttle.available(), 1);
        drop(second);
        assert_eq!(throttle.available(), 2);
    }

    #[tokio::test]
    async fn test_waiter_gets_slot_after_release() {
        let throttle = Throttle::new(1, None);
        let held = throttle.acquire().await.unwrap();

        let waiter = {
            let throttle = throttle.clone();
            tokio::spawn(async move { throttle.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(throttle.waiting(), 1);
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
        assert_eq!(throttle.waiting(), 0);
        assert_eq!(throttle.available(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_is_overloaded() {
        let throttle = Throttle::new(1, Some(1));
        let _held = throttle.acquire().await.unwrap();

        let queued = {
            let throttle = throttle.clone();
            tokio::spawn(async move { throttle.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(throttle.waiting(), 1);

        let err = throttle.acquire().await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Overloaded);
        // The rejected caller is not left counted as a waiter
        assert_eq!(throttle.waiting(), 1);

        queued.abort();
    }

    #[tokio::test]
    async fn test_zero_waiters_rejects_immediately() {
        let throttle = Throttle::new(1, Some(0));
        let _held = throttle.acquire().await.unwrap();

        let err = throttle.acquire().await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Overloaded);
        assert_eq!(throttle.waiting(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_is_uncounted() {
        let throttle = Throttle::new(1, Some(4));
        let held = throttle.acquire().await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(50), throttle.acquire()).await;
        assert!(result.is_err());
        assert_eq!(throttle.waiting(), 0);

        drop(held);
        assert!(throttle.acquire().await.is_ok());
    }
}
