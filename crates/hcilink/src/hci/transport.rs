//! Transport seams between the host and a controller
//!
//! Packets crossing these traits are complete H4 frames: a one byte packet type
//! indicator followed by the HCI packet itself.

use crate::error::HciError;
use std::sync::Mutex;

/// Outbound half of a transport
pub trait PacketSink: Send + Sync {
    /// Write one complete H4 frame
    fn write_packet(&self, packet: &[u8]) -> Result<(), HciError>;
}

/// Inbound half of a transport
pub trait PacketSource {
    /// Read one complete H4 frame into `buf`
    ///
    /// Returns `Ok(0)` when no packet arrived within the transport's poll
    /// interval, which lets the reader check for shutdown.
    fn read_packet(&self, buf: &mut [u8]) -> Result<usize, HciError>;
}

/// A sink that keeps every written frame in memory
///
/// Useful for driving a host without hardware.
#[derive(Debug, Default)]
pub struct MemorySink {
    packets: Mutex<Vec<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All frames written so far, oldest first
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.packets.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Remove and return all frames written so far
    pub fn take(&self) -> Vec<Vec<u8>> {
        self.packets
            .lock()
            .map(|mut p| std::mem::take(&mut *p))
            .unwrap_or_default()
    }
}

impl PacketSink for MemorySink {
    fn write_packet(&self, packet: &[u8]) -> Result<(), HciError> {
        self.packets
            .lock()
            .map_err(|_| HciError::Aborted)?
            .push(packet.to_vec());
        Ok(())
    }
}
