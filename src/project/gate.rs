//! Admission control for outbound forge requests

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

/// A counting gate bounding the number of simultaneous forge requests.
///
/// Callers suspend in [`ConcurrencyGate::enter`] until a slot frees up.
/// Release order follows the underlying semaphore; no priority is given.
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Semaphore,
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// A held slot; dropping it lets the next caller through
#[derive(Debug)]
pub struct GatePass<'a> {
    gate: &'a ConcurrencyGate,
    _permit: SemaphorePermit<'a>,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Wait for a free slot.
    ///
    /// Fails only once the gate has been closed.
    pub async fn enter(&self) -> Result<GatePass<'_>, AcquireError> {
        let permit = self.semaphore.acquire().await?;
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(in_flight, Ordering::SeqCst);
        Ok(GatePass {
            gate: self,
            _permit: permit,
        })
    }

    /// Reject all waiting and future callers
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of passes currently held
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of passes ever held at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        // Runs before the permit field is dropped, so in_flight never exceeds capacity
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::time::Duration;

    #[tokio::test]
    async fn enter_never_exceeds_capacity_under_load() {
        let gate = ConcurrencyGate::new(5);

        let calls = (0..50).map(|_| async {
            let _pass = gate.enter().await.unwrap();
            assert!(gate.in_flight() <= gate.capacity());
            tokio::time::sleep(Duration::from_millis(5)).await;
        });
        join_all(calls).await;

        assert_eq!(gate.peak(), 5);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn dropping_pass_frees_slot() {
        let gate = ConcurrencyGate::new(1);

        let pass = gate.enter().await.unwrap();
        assert_eq!(gate.in_flight(), 1);
        drop(pass);

        let _second = gate.enter().await.unwrap();
        assert_eq!(gate.in_flight(), 1);
        assert_eq!(gate.peak(), 1);
    }

    #[tokio::test]
    async fn enter_fails_after_close() {
        let gate = ConcurrencyGate::new(2);

        gate.close();

        assert!(gate.is_closed());
        assert!(gate.enter().await.is_err());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        assert_eq!(ConcurrencyGate::new(0).capacity(), 1);
    }
}
