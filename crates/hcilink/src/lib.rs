//! hcilink - host-side transport and event correlation for Bluetooth LE controllers
//!
//! This library sits between a raw HCI transport and the upper protocol layers.
//! It dispatches controller events to handlers, matches command completions to
//! the commands that caused them, tracks live connections and enforces the
//! controller's credit-based flow control for commands and ACL data.

pub mod config;
pub mod error;
pub mod gap;
pub mod hci;
pub mod host;

// Re-export common types for convenience
pub use config::{CompletedPacketsPolicy, HostConfig};
pub use error::{HciError, HciResult};
pub use gap::{AddressType, BdAddr, Role};
pub use hci::{AclPacket, HciCommand, HciEvent, HciSocket, MemorySink, PacketSink, PacketSource};
pub use host::{Completion, Connection, Host, HostStatsSnapshot, LinkState};
