//! Event dispatch tables
//!
//! A [`Dispatcher`] maps event codes to handlers. The host keeps two: one for
//! top-level HCI events, and one for LE meta sub-events reached through the
//! LE meta handler.

use crate::hci::packet::HciEvent;
use crate::host::stats::HostStats;
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

/// Reaction to one event, called with the event parameters
pub type EventHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Registry of handlers keyed by event code
#[derive(Default)]
pub struct EventTable {
    handlers: RwLock<HashMap<u8, EventHandler>>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `code`, returning the handler it replaces
    pub fn register(&self, code: u8, handler: EventHandler) -> Option<EventHandler> {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code, handler)
    }

    pub fn unregister(&self, code: u8) -> Option<EventHandler> {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&code)
    }

    pub fn lookup(&self, code: u8) -> Option<EventHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&code)
            .cloned()
    }

    pub fn codes(&self) -> Vec<u8> {
        let mut codes: Vec<u8> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        codes.sort_unstable();
        codes
    }
}

/// Validates inbound events and routes them to their handlers
pub struct Dispatcher {
    name: &'static str,
    table: EventTable,
    stats: Arc<HostStats>,
}

impl Dispatcher {
    pub fn new(name: &'static str, stats: Arc<HostStats>) -> Self {
        Self {
            name,
            table: EventTable::new(),
            stats,
        }
    }

    pub fn register<F>(&self, code: u8, handler: F) -> Option<EventHandler>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.table.register(code, Arc::new(handler))
    }

    pub fn table(&self) -> &EventTable {
        &self.table
    }

    /// Route a framed event packet (code, length, parameters) to its handler
    ///
    /// The handler runs on its own thread; the returned handle may be joined
    /// but the dispatch path never waits on it. A length mismatch is reported
    /// and the parameters actually received are dispatched anyway.
    pub fn dispatch(&self, packet: &[u8]) -> Option<JoinHandle<()>> {
        let Some(event) = HciEvent::parse(packet) else {
            warn!("{}: truncated event packet: [{}]", self.name, hex::encode_upper(packet));
            self.stats.framing_error();
            return None;
        };

        if !event.is_well_framed() {
            warn!(
                "{}: corrupt event packet, declared {} bytes, got {}: [{}]",
                self.name,
                event.parameter_total_length,
                event.parameters.len(),
                hex::encode_upper(packet)
            );
            self.stats.framing_error();
        }

        let code = event.event_code;
        let Some(handler) = self.table.lookup(code) else {
            info!("{}: unsupported event packet: [{}]", self.name, hex::encode_upper(packet));
            self.stats.unsupported_event();
            return None;
        };

        self.stats.event_dispatched();
        let params = event.parameters;
        match thread::Builder::new()
            .name(format!("{}-evt-{:02x}", self.name, code))
            .spawn(move || handler(&params))
        {
            Ok(join) => Some(join),
            Err(err) => {
                error!("{}: failed to spawn handler for event {:02X}: {}", self.name, code, err);
                None
            }
        }
    }

    /// Route an unframed sub-event, whose first byte is the code, on the calling thread
    ///
    /// Returns true if a handler ran.
    pub fn dispatch_inline(&self, params: &[u8]) -> bool {
        let Some(&code) = params.first() else {
            warn!("{}: empty sub-event packet", self.name);
            self.stats.framing_error();
            return false;
        };

        match self.table.lookup(code) {
            Some(handler) => {
                self.stats.event_dispatched();
                handler(params);
                true
            }
            None => {
                info!("{}: unsupported sub-event: [{}]", self.name, hex::encode_upper(params));
                self.stats.unsupported_event();
                false
            }
        }
    }
}
