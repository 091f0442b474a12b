//! Counters for conditions the host absorbs instead of failing

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct HostStats {
    events_dispatched: AtomicU64,
    framing_errors: AtomicU64,
    decode_failures: AtomicU64,
    unsupported_events: AtomicU64,
    correlation_misses: AtomicU64,
    unknown_handles: AtomicU64,
    dropped_acl_packets: AtomicU64,
    commands_sent: AtomicU64,
}

/// A point-in-time copy of [`HostStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostStatsSnapshot {
    pub events_dispatched: u64,
    /// Packets whose declared length disagreed with the bytes received
    pub framing_errors: u64,
    pub decode_failures: u64,
    /// Events and LE sub-events with no registered handler
    pub unsupported_events: u64,
    /// Completions for opcodes nobody was waiting on
    pub correlation_misses: u64,
    /// Disconnections and completed-packet reports for handles not in the table
    pub unknown_handles: u64,
    /// Inbound data for connections that no longer exist
    pub dropped_acl_packets: u64,
    pub commands_sent: u64,
}

macro_rules! counters {
    ($($name:ident => $inc:ident),* $(,)?) => {
        impl HostStats {
            $(
                pub(crate) fn $inc(&self) {
                    self.$name.fetch_add(1, Ordering::Relaxed);
                }
            )*

            pub fn snapshot(&self) -> HostStatsSnapshot {
                HostStatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters! {
    events_dispatched => event_dispatched,
    framing_errors => framing_error,
    decode_failures => decode_failure,
    unsupported_events => unsupported_event,
    correlation_misses => correlation_miss,
    unknown_handles => unknown_handle,
    dropped_acl_packets => dropped_acl_packet,
    commands_sent => command_sent,
}
