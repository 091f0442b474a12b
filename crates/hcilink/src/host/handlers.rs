//! Default event handlers
//!
//! Each handler decodes one event type and applies it to the shared host
//! state. A payload that fails to decode is dropped without side effects.

use crate::config::CompletedPacketsPolicy;
use crate::hci::constants::HCI_OPCODE_NOP;
use crate::hci::event::*;
use crate::hci::packet::{AclPacket, HciCommand};
use crate::host::command::Completion;
use crate::host::connection::Connection;
use crate::host::HostShared;
use log::{debug, error, info, trace, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;

macro_rules! decode_or_drop {
    ($host:expr, $ty:ty, $data:expr) => {
        match <$ty>::parse($data) {
            Ok(event) => event,
            Err(err) => {
                trace!("dropping malformed {}: {}", stringify!($ty), err);
                $host.stats.decode_failure();
                return;
            }
        }
    };
}

pub(crate) fn command_complete(host: &HostShared, data: &[u8]) {
    let event = decode_or_drop!(host, CommandComplete, data);

    host.command_credits
        .release(event.num_hci_command_packets as usize);
    if event.opcode == HCI_OPCODE_NOP {
        return;
    }

    let opcode = event.opcode;
    if !host
        .commands
        .complete(opcode, Completion::Returned(event.return_parameters))
    {
        error!("event: can't find the cmd {:04X} for CommandComplete", opcode);
        host.stats.correlation_miss();
    }
}

pub(crate) fn command_status(host: &HostShared, data: &[u8]) {
    let event = decode_or_drop!(host, CommandStatus, data);

    host.command_credits
        .release(event.num_hci_command_packets as usize);
    if event.opcode == HCI_OPCODE_NOP {
        return;
    }

    if !host
        .commands
        .complete(event.opcode, Completion::Status(event.status))
    {
        error!("event: can't find the cmd {:04X} for CommandStatus", event.opcode);
        host.stats.correlation_miss();
    }
}

pub(crate) fn le_connection_complete(host: &HostShared, data: &[u8]) {
    let event = decode_or_drop!(host, LeConnectionComplete, data);

    if event.status != 0 {
        info!(
            "conns: connection to {} failed with status {:02X}",
            event.peer_address, event.status
        );
        return;
    }

    let handle = event.connection_handle;
    let (conn, previous) = host.connections.insert_with(handle, || {
        Connection::new(
            &event,
            host.sink.clone(),
            host.acl_credits.clone(),
            host.acl_mtu.load(Ordering::Relaxed),
            host.config.rx_queue_depth,
        )
    });
    if let Some(stale) = previous {
        warn!("conns: handle {:04X} reused before its disconnection", handle);
        stale.disconnect(0);
    }

    debug!(
        "conns: {:04X} connected to {} as {:?}",
        handle, event.peer_address, event.role
    );
    if host.acceptor.send(conn).is_err() {
        trace!("conns: nobody accepting connection {:04X}", handle);
    }
}

pub(crate) fn le_connection_update_complete(host: &HostShared, data: &[u8]) {
    let event = decode_or_drop!(host, LeConnectionUpdateComplete, data);

    if event.status != 0 {
        return;
    }
    if let Some(conn) = host.connections.get(event.connection_handle) {
        debug!(
            "conns: {:04X} parameters updated: {:?}",
            event.connection_handle, event.parameters
        );
        conn.set_parameters(event.parameters);
    }
}

pub(crate) fn disconnection_complete(host: &HostShared, data: &[u8]) {
    let event = decode_or_drop!(host, DisconnectionComplete, data);

    if event.status != 0 {
        warn!(
            "conns: disconnection of {:04X} failed with status {:02X}",
            event.connection_handle, event.status
        );
        return;
    }

    let Some(conn) = host.connections.remove(event.connection_handle) else {
        error!("conns: disconnecting an invalid handle {:04X}", event.connection_handle);
        host.stats.unknown_handle();
        return;
    };
    conn.disconnect(event.reason);
}

pub(crate) fn number_of_completed_packets(host: &HostShared, data: &[u8]) {
    let event = decode_or_drop!(host, NumberOfCompletedPackets, data);

    for entry in &event.entries {
        let Some(conn) = host.connections.get(entry.connection_handle) else {
            warn!(
                "conns: completed packets for unknown handle {:04X}",
                entry.connection_handle
            );
            host.stats.unknown_handle();
            match host.config.completed_packets_policy {
                CompletedPacketsPolicy::SkipUnknown => continue,
                CompletedPacketsPolicy::AbortBatch => return,
            }
        };

        // Acknowledged buffers go back to the shared pool; buffers still in
        // flight when the connection closes are recycled by its teardown.
        conn.tx_buffers().free(entry.num_completed_packets as usize);
    }
}

pub(crate) fn le_long_term_key_request(host: &Arc<HostShared>, data: &[u8]) {
    let event = decode_or_drop!(host, LeLongTermKeyRequest, data);

    debug!("conns: declining LTK request on {:04X}", event.connection_handle);
    host.send_async(HciCommand::LeLongTermKeyRequestNegativeReply {
        handle: event.connection_handle,
    });
}

pub(crate) fn le_advertising_report(host: &HostShared, data: &[u8]) {
    let event = decode_or_drop!(host, LeAdvertisingReportEvent, data);

    let sink = host.advertising_sink();
    for report in event.reports() {
        debug!(
            "{}, {:?}, {}, {}, [{}]",
            report.event_type,
            report.address_type,
            report.address,
            report.rssi,
            hex::encode_upper(report.data)
        );
        if let Some(sink) = &sink {
            sink(&report);
        }
    }
}

/// Route an inbound ACL packet to its connection
///
/// Data for a handle that is no longer connected is dropped silently; it is
/// the expected tail of a disconnection.
pub(crate) fn acl_data(host: &HostShared, data: &[u8]) {
    let Some(handle) = AclPacket::peek_handle(data) else {
        warn!("acl: truncated packet: [{}]", hex::encode_upper(data));
        host.stats.framing_error();
        return;
    };

    let Some(conn) = host.connections.get(handle) else {
        trace!("acl: dropping packet for stale handle {:04X}", handle);
        host.stats.dropped_acl_packet();
        return;
    };

    let packet = decode_or_drop!(host, AclPacket, data);
    conn.handle_packet(packet);
}
