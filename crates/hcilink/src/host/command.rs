//! Pending command registry
//!
//! A command sent to the controller is answered out of band by a Command
//! Complete or Command Status event carrying the same opcode. The registry
//! holds one slot per opcode with a one-shot signal that the matching event
//! fulfills.

use crate::error::HciError;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// How the controller answered a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Command Complete, with the command's return parameters
    Returned(Vec<u8>),
    /// Command Status: accepted (status 0) or rejected, no return parameters
    Status(u8),
}

impl Completion {
    /// Turn the answer into the sender's result
    ///
    /// A successful status yields no value; a failed status is an error.
    pub fn into_result(self, opcode: u16) -> Result<Option<Vec<u8>>, HciError> {
        match self {
            Completion::Returned(params) => Ok(Some(params)),
            Completion::Status(0) => Ok(None),
            Completion::Status(status) => Err(HciError::CommandFailed { opcode, status }),
        }
    }
}

/// The receiving end of a registered command
#[derive(Debug)]
pub struct CommandSignal {
    opcode: u16,
    id: u64,
    rx: Receiver<Completion>,
}

impl CommandSignal {
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    /// Block until the command is answered
    pub fn wait(&self) -> Result<Completion, HciError> {
        self.rx.recv().map_err(|_| HciError::Aborted)
    }

    /// Block until the command is answered or `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Completion, HciError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => HciError::CommandTimeout(self.opcode),
            RecvTimeoutError::Disconnected => HciError::Aborted,
        })
    }

    /// Check for an answer without blocking
    pub fn try_wait(&self) -> Result<Option<Completion>, HciError> {
        match self.rx.try_recv() {
            Ok(completion) => Ok(Some(completion)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(HciError::Aborted),
        }
    }
}

#[derive(Debug)]
struct Pending {
    id: u64,
    done: SyncSender<Completion>,
}

#[derive(Debug, Default)]
struct RegistryState {
    pending: HashMap<u16, Pending>,
    closed: bool,
}

/// Commands waiting for their completion event, one per opcode
#[derive(Debug, Default)]
pub struct CommandRegistry {
    state: Mutex<RegistryState>,
    freed: Condvar,
    next_id: AtomicU64,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a slot for `opcode`
    ///
    /// Fails if a command with the same opcode is still waiting.
    pub fn register(&self, opcode: u16) -> Result<CommandSignal, HciError> {
        let mut state = self.lock();
        if state.closed {
            return Err(HciError::Aborted);
        }
        if state.pending.contains_key(&opcode) {
            return Err(HciError::CommandInFlight(opcode));
        }
        Ok(self.open_slot(&mut state, opcode))
    }

    /// Open a slot for `opcode`, waiting for a command with the same opcode to finish
    ///
    /// With a `deadline`, gives up with [`HciError::CommandTimeout`] once it passes.
    pub fn register_wait(
        &self,
        opcode: u16,
        deadline: Option<Instant>,
    ) -> Result<CommandSignal, HciError> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(HciError::Aborted);
            }
            if !state.pending.contains_key(&opcode) {
                return Ok(self.open_slot(&mut state, opcode));
            }

            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(HciError::CommandTimeout(opcode));
                    }
                    self.freed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.freed.wait(state).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn open_slot(&self, state: &mut RegistryState, opcode: u16) -> CommandSignal {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (done, rx) = mpsc::sync_channel(1);
        state.pending.insert(opcode, Pending { id, done });
        CommandSignal { opcode, id, rx }
    }

    /// Fulfill and remove the slot for `opcode`
    ///
    /// Returns false if nothing was waiting on `opcode`.
    pub fn complete(&self, opcode: u16, completion: Completion) -> bool {
        let Some(pending) = self.lock().pending.remove(&opcode) else {
            return false;
        };
        self.freed.notify_all();

        // The channel has room for exactly one value and this is the only send
        if pending.done.try_send(completion).is_err() {
            debug!("cmd {:04X}: sender stopped waiting", opcode);
        }
        true
    }

    /// Drop the slot owned by `signal`, if it is still registered
    pub fn cancel(&self, signal: &CommandSignal) -> bool {
        let mut state = self.lock();
        match state.pending.get(&signal.opcode) {
            Some(pending) if pending.id == signal.id => {
                state.pending.remove(&signal.opcode);
                self.freed.notify_all();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, opcode: u16) -> bool {
        self.lock().pending.contains_key(&opcode)
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail every waiting command and refuse new registrations
    pub fn abort_all(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.pending.clear();
        self.freed.notify_all();
    }
}
