//! Bluetooth HCI (Host Controller Interface) implementation
//!
//! This module provides the packet codecs, typed event records and the
//! transports used to reach a controller.

pub mod constants;
pub mod event;
pub mod packet;
pub mod socket;
pub mod transport;


pub use event::{
    AdvertisingReport, AdvertisingReports, CommandComplete, CommandStatus, CompletedPackets,
    ConnectionParameters, DisconnectionComplete, LeAdvertisingReportEvent, LeConnectionComplete,
    LeConnectionUpdateComplete, LeLongTermKeyRequest, NumberOfCompletedPackets,
};
pub use packet::{AclFlags, AclPacket, HciCommand, HciEvent};
pub use socket::HciSocket;
pub use transport::{MemorySink, PacketSink, PacketSource};
