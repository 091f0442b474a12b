//! Credit-based flow control
//!
//! The controller grants two kinds of credits: command credits, returned by
//! Command Complete and Command Status events, and ACL buffer credits, returned
//! by Number Of Completed Packets events. Both are modelled with [`CreditPool`].
//! [`TxBuffers`] charges ACL credits to a single connection so they can be
//! recovered when that connection goes away.

use crate::error::HciError;
use log::{trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct PoolState {
    available: usize,
    capacity: usize,
    closed: bool,
}

/// A bounded, blocking pool of credits
///
/// Releases are clamped so the pool never holds more than its capacity.
#[derive(Debug)]
pub struct CreditPool {
    name: &'static str,
    state: Mutex<PoolState>,
    ready: Condvar,
}

impl CreditPool {
    /// Create a pool that can hold `capacity` credits, `initial` of them available
    pub fn new(name: &'static str, capacity: usize, initial: usize) -> Self {
        Self {
            name,
            state: Mutex::new(PoolState {
                available: initial.min(capacity),
                capacity,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take one credit, blocking until one is available
    pub fn acquire(&self) -> Result<(), HciError> {
        self.acquire_unless(|| false)
    }

    /// Take one credit, blocking until one is available or `cancelled` returns true
    ///
    /// `cancelled` is checked each time the pool is woken, see [`CreditPool::wake_all`].
    pub fn acquire_unless<F: Fn() -> bool>(&self, cancelled: F) -> Result<(), HciError> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(HciError::Aborted);
            }
            if cancelled() {
                return Err(HciError::Aborted);
            }
            if state.available > 0 {
                state.available -= 1;
                return Ok(());
            }
            trace!("{}: waiting for a credit", self.name);
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take one credit, giving up after `timeout`
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<bool, HciError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(HciError::Aborted);
            }
            if state.available > 0 {
                state.available -= 1;
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Take one credit if one is available right now
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        if state.closed || state.available == 0 {
            return false;
        }
        state.available -= 1;
        true
    }

    /// Return up to `count` credits, returning how many were accepted
    pub fn release(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }

        let mut state = self.lock();
        let room = state.capacity - state.available;
        let accepted = count.min(room);
        state.available += accepted;
        drop(state);

        if accepted < count {
            warn!(
                "{}: {} credits returned beyond capacity, ignored",
                self.name,
                count - accepted
            );
        }
        if accepted > 0 {
            self.ready.notify_all();
        }
        accepted
    }

    /// Change the capacity, keeping credits that are currently taken accounted for
    pub fn resize(&self, capacity: usize) {
        let mut state = self.lock();
        let in_use = state.capacity - state.available;
        state.capacity = capacity;
        state.available = capacity.saturating_sub(in_use);
        drop(state);
        self.ready.notify_all();
    }

    /// Wake every blocked acquirer so it re-checks its cancellation condition
    pub fn wake_all(&self) {
        let _state = self.lock();
        self.ready.notify_all();
    }

    /// Fail every current and future acquire with [`HciError::Aborted`]
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn available(&self) -> usize {
        self.lock().available
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }
}

#[derive(Debug, Default)]
struct TxState {
    in_flight: usize,
    returned: usize,
}

/// ACL buffers charged to one connection
///
/// Every packet sent on the connection holds one credit of the shared ACL pool
/// until the controller reports it completed. Buffers still charged when the
/// connection closes are released back to the shared pool.
#[derive(Debug)]
pub struct TxBuffers {
    handle: u16,
    pool: Arc<CreditPool>,
    state: Mutex<TxState>,
    closed: AtomicBool,
}

impl TxBuffers {
    pub fn new(handle: u16, pool: Arc<CreditPool>) -> Self {
        Self {
            handle,
            pool,
            state: Mutex::new(TxState::default()),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Charge one buffer to this connection, blocking until the controller has room
    pub fn acquire(&self) -> Result<(), HciError> {
        self.pool
            .acquire_unless(|| self.closed.load(Ordering::Acquire))
            .map_err(|err| match err {
                HciError::Aborted if self.is_closed() => HciError::Disconnected(self.handle),
                other => other,
            })?;

        let mut state = self.lock();
        if self.is_closed() {
            drop(state);
            self.pool.release(1);
            return Err(HciError::Disconnected(self.handle));
        }
        state.in_flight += 1;
        Ok(())
    }

    /// Release `count` acknowledged buffers back to the shared pool
    ///
    /// Returns the number released, which is less than `count` only if the
    /// controller acknowledged more packets than were in flight.
    pub fn free(&self, count: usize) -> usize {
        let mut state = self.lock();
        let freed = count.min(state.in_flight);
        state.in_flight -= freed;
        state.returned += freed;
        drop(state);

        if freed < count {
            warn!(
                "conn {:04X}: controller completed {} packets but only {} were in flight",
                self.handle, count, freed
            );
        }
        self.pool.release(freed);
        freed
    }

    /// Give back the buffer charged for a packet that never reached the controller
    pub fn release_unsent(&self) {
        let mut state = self.lock();
        if state.in_flight == 0 {
            return;
        }
        state.in_flight -= 1;
        drop(state);
        self.pool.release(1);
    }

    /// Release everything still charged and refuse further sends
    pub fn free_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let mut state = self.lock();
        let freed = state.in_flight;
        state.in_flight = 0;
        drop(state);

        if freed > 0 {
            trace!("conn {:04X}: recycling {} unacknowledged buffers", self.handle, freed);
            self.pool.release(freed);
        }
        self.pool.wake_all();
        freed
    }

    /// Buffers sent but not yet acknowledged
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Buffers acknowledged by the controller over the connection's lifetime
    pub fn returned(&self) -> usize {
        self.lock().returned
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
