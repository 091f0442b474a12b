//! Live connections and the table that owns them
//!
//! Connection handles are assigned by the controller and reused after a
//! disconnection, so a handle only identifies a connection while it is in the
//! [`ConnectionTable`].

use crate::error::HciError;
use crate::gap::{AddressType, BdAddr, Role};
use crate::hci::event::{ConnectionParameters, LeConnectionComplete};
use crate::hci::packet::{AclFlags, AclPacket};
use crate::hci::transport::PacketSink;
use crate::host::credit::{CreditPool, TxBuffers};
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Reported by the controller, not yet handed to an acceptor
    Pending,
    /// Accepted by the upper layer
    Established,
    /// Torn down; terminal
    Disconnected { reason: u8 },
}

#[derive(Debug)]
struct Inbound {
    queue: VecDeque<AclPacket>,
    state: LinkState,
}

/// One LE link to a peer
pub struct Connection {
    handle: u16,
    role: Role,
    peer_address_type: AddressType,
    peer_address: BdAddr,
    parameters: Mutex<ConnectionParameters>,
    tx: TxBuffers,
    inbound: Mutex<Inbound>,
    readable: Condvar,
    rx_depth: usize,
    acl_mtu: usize,
    sink: Arc<dyn PacketSink>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &format_args!("{:04X}", self.handle))
            .field("role", &self.role)
            .field("peer_address", &format_args!("{}", self.peer_address))
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    pub(crate) fn new(
        event: &LeConnectionComplete,
        sink: Arc<dyn PacketSink>,
        acl_pool: Arc<CreditPool>,
        acl_mtu: usize,
        rx_depth: usize,
    ) -> Self {
        Self {
            handle: event.connection_handle,
            role: event.role,
            peer_address_type: event.peer_address_type,
            peer_address: event.peer_address,
            parameters: Mutex::new(event.parameters),
            tx: TxBuffers::new(event.connection_handle, acl_pool),
            inbound: Mutex::new(Inbound {
                queue: VecDeque::new(),
                state: LinkState::Pending,
            }),
            readable: Condvar::new(),
            rx_depth: rx_depth.max(1),
            acl_mtu: acl_mtu.max(1),
            sink,
        }
    }

    fn inbound(&self) -> MutexGuard<'_, Inbound> {
        self.inbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handle(&self) -> u16 {
        self.handle
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_address(&self) -> BdAddr {
        self.peer_address
    }

    pub fn peer_address_type(&self) -> AddressType {
        self.peer_address_type
    }

    pub fn parameters(&self) -> ConnectionParameters {
        *self.parameters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_parameters(&self, parameters: ConnectionParameters) {
        *self.parameters.lock().unwrap_or_else(PoisonError::into_inner) = parameters;
    }

    pub fn state(&self) -> LinkState {
        self.inbound().state
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self.state(), LinkState::Disconnected { .. })
    }

    /// Buffers this connection holds in the controller
    pub fn tx_buffers(&self) -> &TxBuffers {
        &self.tx
    }

    pub(crate) fn mark_established(&self) {
        let mut inbound = self.inbound();
        if inbound.state == LinkState::Pending {
            inbound.state = LinkState::Established;
        }
    }

    /// Entry point for inbound data addressed to this connection
    pub fn handle_packet(&self, packet: AclPacket) {
        let mut inbound = self.inbound();
        if let LinkState::Disconnected { .. } = inbound.state {
            return;
        }
        if inbound.queue.len() >= self.rx_depth {
            warn!("conn {:04X}: receive queue full, dropping oldest packet", self.handle);
            inbound.queue.pop_front();
        }
        inbound.queue.push_back(packet);
        drop(inbound);
        self.readable.notify_one();
    }

    /// Wait for the next inbound packet
    ///
    /// Packets queued before a disconnection are still delivered; after that
    /// this returns [`HciError::Disconnected`].
    pub fn recv(&self) -> Result<AclPacket, HciError> {
        let mut inbound = self.inbound();
        loop {
            if let Some(packet) = inbound.queue.pop_front() {
                return Ok(packet);
            }
            if let LinkState::Disconnected { .. } = inbound.state {
                return Err(HciError::Disconnected(self.handle));
            }
            inbound = self
                .readable
                .wait(inbound)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wait up to `timeout` for the next inbound packet
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<AclPacket>, HciError> {
        let deadline = Instant::now() + timeout;
        let mut inbound = self.inbound();
        loop {
            if let Some(packet) = inbound.queue.pop_front() {
                return Ok(Some(packet));
            }
            if let LinkState::Disconnected { .. } = inbound.state {
                return Err(HciError::Disconnected(self.handle));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            inbound = self
                .readable
                .wait_timeout(inbound, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Send a higher layer message, fragmented to the controller's ACL MTU
    ///
    /// Each fragment takes one controller buffer; this blocks while the
    /// controller has none free.
    pub fn send(&self, data: &[u8]) -> Result<(), HciError> {
        if !self.is_connected() {
            return Err(HciError::Disconnected(self.handle));
        }

        for (index, chunk) in data.chunks(self.acl_mtu).enumerate() {
            let flags = if index == 0 {
                AclFlags::empty()
            } else {
                AclFlags::CONTINUATION
            };
            let packet = AclPacket::new(self.handle, flags, chunk.to_vec()).to_packet()?;

            self.tx.acquire()?;
            if let Err(err) = self.sink.write_packet(&packet) {
                self.tx.release_unsent();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Tear the connection down after the controller reported it gone
    pub(crate) fn disconnect(&self, reason: u8) {
        let mut inbound = self.inbound();
        inbound.state = LinkState::Disconnected { reason };
        drop(inbound);

        let recycled = self.tx.free_all();
        debug!(
            "conn {:04X}: disconnected (reason {:02X}), {} buffers recycled",
            self.handle, reason, recycled
        );
        self.readable.notify_all();
    }
}

/// Map from live connection handle to its connection
#[derive(Debug, Default)]
pub struct ConnectionTable {
    conns: RwLock<HashMap<u16, Arc<Connection>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a connection and insert it under one lock, returning any connection
    /// previously stored for the same handle
    pub fn insert_with<F>(&self, handle: u16, build: F) -> (Arc<Connection>, Option<Arc<Connection>>)
    where
        F: FnOnce() -> Connection,
    {
        let mut conns = self.conns.write().unwrap_or_else(PoisonError::into_inner);
        let conn = Arc::new(build());
        let previous = conns.insert(handle, conn.clone());
        (conn, previous)
    }

    pub fn get(&self, handle: u16) -> Option<Arc<Connection>> {
        self.conns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }

    /// Look up and delete `handle` in one step
    pub fn remove(&self, handle: u16) -> Option<Arc<Connection>> {
        self.conns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
    }

    pub fn contains(&self, handle: u16) -> bool {
        self.conns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&handle)
    }

    pub fn handles(&self) -> Vec<u16> {
        let mut handles: Vec<u16> = self
            .conns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        handles.sort_unstable();
        handles
    }

    pub fn len(&self) -> usize {
        self.conns.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every connection
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.conns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, conn)| conn)
            .collect()
    }
}
