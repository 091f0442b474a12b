//! Host-side event correlation and flow control
//!
//! The [`Host`] sits between a controller transport and the upper layers:
//! - routes inbound events to handlers, each on its own thread
//! - matches command completions to the commands that caused them
//! - tracks the lifecycle of connections
//! - enforces the controller's command and ACL buffer credits

pub mod command;
pub mod connection;
pub mod credit;
pub mod dispatch;
mod handlers;
pub mod stats;


pub use self::command::{CommandRegistry, CommandSignal, Completion};
pub use self::connection::{Connection, ConnectionTable, LinkState};
pub use self::credit::{CreditPool, TxBuffers};
pub use self::dispatch::{Dispatcher, EventHandler, EventTable};
pub use self::stats::{HostStats, HostStatsSnapshot};

use crate::config::HostConfig;
use crate::error::{HciError, HciResult};
use crate::hci::constants::*;
use crate::hci::event::AdvertisingReport;
use crate::hci::packet::HciCommand;
use crate::hci::transport::{PacketSink, PacketSource};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback receiving every decoded advertising report
pub type AdvertisingSink = Arc<dyn Fn(&AdvertisingReport<'_>) + Send + Sync>;

/// State shared by the host and its event handlers
pub(crate) struct HostShared {
    config: HostConfig,
    sink: Arc<dyn PacketSink>,
    commands: CommandRegistry,
    command_credits: CreditPool,
    acl_credits: Arc<CreditPool>,
    acl_mtu: AtomicUsize,
    connections: ConnectionTable,
    acceptor: Sender<Arc<Connection>>,
    advertising_sink: RwLock<Option<AdvertisingSink>>,
    stats: Arc<HostStats>,
}

impl HostShared {
    /// Send a command and wait for the controller's answer
    ///
    /// Fails with [`HciError::CommandInFlight`] if a command with the same
    /// opcode is still waiting.
    fn send(&self, command: &HciCommand) -> HciResult<Option<Vec<u8>>> {
        self.send_with(command, false)
    }

    /// Like `send`, but queues behind a command with the same opcode instead of failing
    fn send_queued(&self, command: &HciCommand) -> HciResult<Option<Vec<u8>>> {
        self.send_with(command, true)
    }

    fn send_with(&self, command: &HciCommand, queue: bool) -> HciResult<Option<Vec<u8>>> {
        let opcode = command.opcode();
        let packet = command.to_packet()?;
        let deadline = self.config.command_timeout.map(|t| Instant::now() + t);

        // The credit comes first so a sender blocked on the controller does
        // not hold the opcode's slot.
        match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if !self.command_credits.acquire_timeout(left)? {
                    return Err(HciError::CommandTimeout(opcode));
                }
            }
            None => self.command_credits.acquire()?,
        }

        let registered = if queue {
            self.commands.register_wait(opcode, deadline)
        } else {
            self.commands.register(opcode)
        };
        let signal = match registered {
            Ok(signal) => signal,
            Err(err) => {
                self.command_credits.release(1);
                return Err(err);
            }
        };

        if let Err(err) = self.sink.write_packet(&packet) {
            self.commands.cancel(&signal);
            self.command_credits.release(1);
            return Err(err);
        }
        self.stats.command_sent();
        trace!("cmd {:04X}: sent [{}]", opcode, hex::encode_upper(&packet));

        let completion = match deadline {
            Some(deadline) => {
                signal.wait_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => signal.wait(),
        };
        match completion {
            Ok(completion) => completion.into_result(opcode),
            Err(err) => {
                self.commands.cancel(&signal);
                Err(err)
            }
        }
    }

    /// Send a command without waiting; the outcome is only logged
    ///
    /// Commands sharing an opcode are sent one after the other.
    fn send_async(self: &Arc<Self>, command: HciCommand) {
        let host = Arc::clone(self);
        let opcode = command.opcode();
        let spawned = thread::Builder::new()
            .name(format!("hci-cmd-{:04x}", opcode))
            .spawn(move || match host.send_queued(&command) {
                Ok(_) => trace!("cmd {:04X}: done", opcode),
                Err(err) => warn!("cmd {:04X}: {}", opcode, err),
            });
        if let Err(err) = spawned {
            warn!("cmd {:04X}: failed to spawn sender: {}", opcode, err);
        }
    }

    fn advertising_sink(&self) -> Option<AdvertisingSink> {
        self.advertising_sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// One session with one controller
pub struct Host {
    shared: Arc<HostShared>,
    events: Arc<Dispatcher>,
    le_events: Arc<Dispatcher>,
    incoming: Mutex<Receiver<Arc<Connection>>>,
    running: AtomicBool,
}

impl Host {
    /// Create a host writing to `sink`, with the default handlers installed
    pub fn new(sink: Arc<dyn PacketSink>, config: HostConfig) -> Self {
        let stats = Arc::new(HostStats::default());
        let (acceptor, incoming) = mpsc::channel();

        let shared = Arc::new(HostShared {
            command_credits: CreditPool::new(
                "cmd",
                config.max_outstanding_commands,
                config.initial_command_credits,
            ),
            acl_credits: Arc::new(CreditPool::new("acl", config.acl_buffers, config.acl_buffers)),
            acl_mtu: AtomicUsize::new(config.acl_mtu),
            commands: CommandRegistry::new(),
            connections: ConnectionTable::new(),
            advertising_sink: RwLock::new(None),
            stats: stats.clone(),
            acceptor,
            sink,
            config,
        });

        let host = Self {
            shared,
            events: Arc::new(Dispatcher::new("hci", stats.clone())),
            le_events: Arc::new(Dispatcher::new("le", stats)),
            incoming: Mutex::new(incoming),
            running: AtomicBool::new(true),
        };
        host.install_default_handlers();
        host
    }

    fn install_default_handlers(&self) {
        let shared = &self.shared;

        let s = shared.clone();
        self.events
            .register(EVT_CMD_COMPLETE, move |b| handlers::command_complete(&s, b));
        let s = shared.clone();
        self.events
            .register(EVT_CMD_STATUS, move |b| handlers::command_status(&s, b));
        let s = shared.clone();
        self.events
            .register(EVT_DISCONN_COMPLETE, move |b| handlers::disconnection_complete(&s, b));
        let s = shared.clone();
        self.events.register(EVT_NUM_COMP_PKTS, move |b| {
            handlers::number_of_completed_packets(&s, b)
        });
        let le = self.le_events.clone();
        self.events.register(EVT_LE_META_EVENT, move |b| {
            le.dispatch_inline(b);
        });

        let s = shared.clone();
        self.le_events.register(EVT_LE_CONN_COMPLETE, move |b| {
            handlers::le_connection_complete(&s, b)
        });
        let s = shared.clone();
        self.le_events.register(EVT_LE_CONN_UPDATE_COMPLETE, move |b| {
            handlers::le_connection_update_complete(&s, b)
        });
        let s = shared.clone();
        self.le_events
            .register(EVT_LE_LTK_REQUEST, move |b| handlers::le_long_term_key_request(&s, b));
        let s = shared.clone();
        self.le_events.register(EVT_LE_ADVERTISING_REPORT, move |b| {
            handlers::le_advertising_report(&s, b)
        });
    }

    /// Install a handler for a top-level event code, returning the one it replaces
    pub fn set_handler<F>(&self, code: u8, handler: F) -> Option<EventHandler>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.events.register(code, handler)
    }

    pub fn handler(&self, code: u8) -> Option<EventHandler> {
        self.events.table().lookup(code)
    }

    /// Install a handler for an LE meta sub-event code, returning the one it replaces
    ///
    /// The handler receives the whole LE meta payload, sub-event code first.
    pub fn set_le_handler<F>(&self, code: u8, handler: F) -> Option<EventHandler>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.le_events.register(code, handler)
    }

    pub fn le_handler(&self, code: u8) -> Option<EventHandler> {
        self.le_events.table().lookup(code)
    }

    pub fn events(&self) -> &Dispatcher {
        &self.events
    }

    pub fn le_events(&self) -> &Dispatcher {
        &self.le_events
    }

    /// Route one H4 frame from the transport
    ///
    /// Events are dispatched to their handler thread, whose handle is returned.
    /// ACL data is routed to its connection on the calling thread.
    pub fn handle_packet(&self, frame: &[u8]) -> Option<JoinHandle<()>> {
        let (&packet_type, packet) = frame.split_first()?;
        match packet_type {
            HCI_EVENT_PKT => self.events.dispatch(packet),
            HCI_ACL_PKT => {
                handlers::acl_data(&self.shared, packet);
                None
            }
            other => {
                debug!("hci: ignoring packet type {:02X}", other);
                None
            }
        }
    }

    /// Read frames from `source` until the host is shut down or the source fails
    pub fn run<S: PacketSource + ?Sized>(&self, source: &S) -> HciResult<()> {
        let mut buf = vec![0u8; HCI_MAX_FRAME_SIZE];
        while self.running.load(Ordering::Acquire) {
            let n = source.read_packet(&mut buf)?;
            if n > 0 {
                self.handle_packet(&buf[..n]);
            }
        }
        Ok(())
    }

    /// Reset the controller and size the ACL pool from its buffer report
    pub fn init(&self) -> HciResult<()> {
        self.send(&HciCommand::Reset)?;

        let params = self.send(&HciCommand::LeReadBufferSize)?.unwrap_or_default();
        if params.len() < 4 {
            return Err(HciError::InvalidParamLength(params.len()));
        }
        if params[0] != 0 {
            return Err(HciError::CommandFailed {
                opcode: opcode(OGF_LE, OCF_LE_READ_BUFFER_SIZE),
                status: params[0],
            });
        }

        let mtu = LittleEndian::read_u16(&params[1..3]) as usize;
        let buffers = params[3] as usize;
        if mtu == 0 || buffers == 0 {
            info!("hci: controller shares ACL buffers with BR/EDR, keeping configured sizes");
            return Ok(());
        }

        self.shared.acl_mtu.store(mtu, Ordering::Relaxed);
        self.shared.acl_credits.resize(buffers);
        info!("hci: {} ACL buffers of {} bytes", buffers, mtu);
        Ok(())
    }

    /// Send a command and block until the controller answers
    ///
    /// Returns the return parameters of a Command Complete, or `None` when the
    /// controller answered with a successful Command Status.
    pub fn send(&self, command: &HciCommand) -> HciResult<Option<Vec<u8>>> {
        self.shared.send(command)
    }

    /// Send a command on a background thread without waiting for the answer
    pub fn send_async(&self, command: HciCommand) {
        self.shared.send_async(command)
    }

    /// Ask the controller to drop a connection
    ///
    /// The connection leaves the table when the Disconnection Complete event
    /// arrives.
    pub fn disconnect(&self, handle: u16, reason: u8) -> HciResult<()> {
        if !self.shared.connections.contains(handle) {
            return Err(HciError::UnknownHandle(handle));
        }
        self.send(&HciCommand::Disconnect { handle, reason })?;
        Ok(())
    }

    /// Wait for the next new connection
    pub fn accept(&self) -> HciResult<Arc<Connection>> {
        let incoming = self.incoming.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let conn = incoming.recv().map_err(|_| HciError::Aborted)?;
            if conn.is_connected() {
                conn.mark_established();
                return Ok(conn);
            }
        }
    }

    /// Wait up to `timeout` for the next new connection
    pub fn accept_timeout(&self, timeout: Duration) -> HciResult<Option<Arc<Connection>>> {
        let incoming = self.incoming.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match incoming.recv_timeout(timeout) {
                Ok(conn) if conn.is_connected() => {
                    conn.mark_established();
                    return Ok(Some(conn));
                }
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(HciError::Aborted),
            }
        }
    }

    pub fn connection(&self, handle: u16) -> Option<Arc<Connection>> {
        self.shared.connections.get(handle)
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.shared.connections
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.shared.commands
    }

    pub fn command_credits(&self) -> &CreditPool {
        &self.shared.command_credits
    }

    pub fn acl_credits(&self) -> &CreditPool {
        &self.shared.acl_credits
    }

    pub fn acl_mtu(&self) -> usize {
        self.shared.acl_mtu.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &HostConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> HostStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Receive every advertising report decoded from now on
    pub fn set_advertising_sink<F>(&self, sink: F)
    where
        F: Fn(&AdvertisingReport<'_>) + Send + Sync + 'static,
    {
        *self
            .shared
            .advertising_sink
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(sink));
    }

    /// Stop the reader, fail pending commands and tear down every connection
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.commands.abort_all();
        self.shared.command_credits.close();
        for conn in self.shared.connections.drain() {
            conn.disconnect(HCI_REMOTE_USER_TERMINATED);
        }
        self.shared.acl_credits.close();
        debug!("hci: host shut down");
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.shutdown();
    }
}
