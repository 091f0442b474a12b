//! Error types for the hcilink library
//!
//! This module defines the error types used throughout the library.

use thiserror::Error;

/// Errors that can occur when talking to an HCI controller
#[derive(Error, Debug)]
pub enum HciError {
    #[error("Failed to open HCI socket: {0}")]
    SocketError(#[from] std::io::Error),

    #[error("Failed to bind to HCI device: {0}")]
    BindError(std::io::Error),

    #[error("Failed to send HCI packet: {0}")]
    SendError(std::io::Error),

    #[error("Failed to receive HCI packet: {0}")]
    ReceiveError(std::io::Error),

    #[error("Invalid parameter length: {0}")]
    InvalidParamLength(usize),

    #[error("Invalid HCI packet format")]
    InvalidPacketFormat,

    #[error("Packet of {0} bytes does not fit in an HCI frame")]
    PacketTooLarge(usize),

    #[error("Command {0:#06X} is already waiting for completion")]
    CommandInFlight(u16),

    #[error("Command {0:#06X} timed out")]
    CommandTimeout(u16),

    #[error("Command {opcode:#06X} failed with status {status:#04X}")]
    CommandFailed { opcode: u16, status: u8 },

    #[error("Connection {0:#06X} is not known")]
    UnknownHandle(u16),

    #[error("Connection {0:#06X} is disconnected")]
    Disconnected(u16),

    #[error("Host was shut down")]
    Aborted,
}

/// Result type for host operations
pub type HciResult<T> = std::result::Result<T, HciError>;
