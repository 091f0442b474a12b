//! Typed HCI event records
//!
//! Each record decodes the parameter bytes of one event (the bytes after the
//! two byte event header). LE meta records expect the full LE meta payload,
//! starting with the sub-event code.

use crate::error::HciError;
use crate::gap::{AddressType, BdAddr, Role};
use crate::hci::constants::*;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::time::Duration;

fn require_len(data: &[u8], len: usize) -> Result<(), HciError> {
    if data.len() < len {
        return Err(HciError::InvalidParamLength(data.len()));
    }
    Ok(())
}

fn require_subevent(data: &[u8], code: u8) -> Result<(), HciError> {
    match data.first() {
        Some(&c) if c == code => Ok(()),
        _ => Err(HciError::InvalidPacketFormat),
    }
}

fn read_addr(cursor: &mut Cursor<&[u8]>) -> Result<BdAddr, HciError> {
    let mut bytes = [0u8; 6];
    cursor.read_exact(&mut bytes)?;
    Ok(BdAddr::new(bytes))
}

/// Command Complete event [Vol 2, Part E, 7.7.14]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandComplete {
    /// Number of command packets the host may now send
    pub num_hci_command_packets: u8,
    pub opcode: u16,
    pub return_parameters: Vec<u8>,
}

impl CommandComplete {
    pub fn parse(data: &[u8]) -> Result<Self, HciError> {
        require_len(data, 3)?;

        let mut cursor = Cursor::new(data);
        let num_hci_command_packets = cursor.read_u8()?;
        let opcode = cursor.read_u16::<LittleEndian>()?;

        Ok(Self {
            num_hci_command_packets,
            opcode,
            return_parameters: data[3..].to_vec(),
        })
    }

    /// The status byte that leads most return parameter blocks
    pub fn status(&self) -> Option<u8> {
        self.return_parameters.first().copied()
    }
}

/// Command Status event [Vol 2, Part E, 7.7.15]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    pub status: u8,
    pub num_hci_command_packets: u8,
    pub opcode: u16,
}

impl CommandStatus {
    pub fn parse(data: &[u8]) -> Result<Self, HciError> {
        require_len(data, 4)?;

        let mut cursor = Cursor::new(data);
        Ok(Self {
            status: cursor.read_u8()?,
            num_hci_command_packets: cursor.read_u8()?,
            opcode: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

/// Disconnection Complete event [Vol 2, Part E, 7.7.5]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectionComplete {
    pub status: u8,
    pub connection_handle: u16,
    pub reason: u8,
}

impl DisconnectionComplete {
    pub fn parse(data: &[u8]) -> Result<Self, HciError> {
        require_len(data, 4)?;

        let mut cursor = Cursor::new(data);
        Ok(Self {
            status: cursor.read_u8()?,
            connection_handle: cursor.read_u16::<LittleEndian>()? & HCI_HANDLE_MASK,
            reason: cursor.read_u8()?,
        })
    }
}

/// One `(handle, count)` entry of a Number Of Completed Packets event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedPackets {
    pub connection_handle: u16,
    pub num_completed_packets: u16,
}

/// Number Of Completed Packets event [Vol 2, Part E, 7.7.19]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberOfCompletedPackets {
    pub entries: Vec<CompletedPackets>,
}

impl NumberOfCompletedPackets {
    pub fn parse(data: &[u8]) -> Result<Self, HciError> {
        require_len(data, 1)?;
        let num_handles = data[0] as usize;
        require_len(data, 1 + num_handles * 4)?;

        let mut cursor = Cursor::new(&data[1..]);
        let mut entries = Vec::with_capacity(num_handles);
        for _ in 0..num_handles {
            entries.push(CompletedPackets {
                connection_handle: cursor.read_u16::<LittleEndian>()? & HCI_HANDLE_MASK,
                num_completed_packets: cursor.read_u16::<LittleEndian>()?,
            });
        }

        Ok(Self { entries })
    }
}

/// Connection parameters negotiated by the link layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionParameters {
    /// Connection interval in 1.25 ms units
    pub interval: u16,
    /// Peripheral latency in connection events
    pub latency: u16,
    /// Supervision timeout in 10 ms units
    pub supervision_timeout: u16,
}

impl ConnectionParameters {
    pub fn interval_duration(&self) -> Duration {
        Duration::from_micros(self.interval as u64 * 1250)
    }

    pub fn supervision_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.supervision_timeout as u64 * 10)
    }
}

/// LE Connection Complete sub-event [Vol 2, Part E, 7.7.65.1]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeConnectionComplete {
    pub status: u8,
    pub connection_handle: u16,
    pub role: Role,
    pub peer_address_type: AddressType,
    pub peer_address: BdAddr,
    pub parameters: ConnectionParameters,
    pub master_clock_accuracy: u8,
}

impl LeConnectionComplete {
    pub fn parse(data: &[u8]) -> Result<Self, HciError> {
        require_subevent(data, EVT_LE_CONN_COMPLETE)?;
        require_len(data, 19)?;

        let mut cursor = Cursor::new(&data[1..]);
        let status = cursor.read_u8()?;
        let connection_handle = cursor.read_u16::<LittleEndian>()? & HCI_HANDLE_MASK;
        let role = Role::from(cursor.read_u8()?);
        let peer_address_type = AddressType::from(cursor.read_u8()?);
        let peer_address = read_addr(&mut cursor)?;
        let parameters = ConnectionParameters {
            interval: cursor.read_u16::<LittleEndian>()?,
            latency: cursor.read_u16::<LittleEndian>()?,
            supervision_timeout: cursor.read_u16::<LittleEndian>()?,
        };
        let master_clock_accuracy = cursor.read_u8()?;

        Ok(Self {
            status,
            connection_handle,
            role,
            peer_address_type,
            peer_address,
            parameters,
            master_clock_accuracy,
        })
    }
}

/// LE Connection Update Complete sub-event [Vol 2, Part E, 7.7.65.3]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeConnectionUpdateComplete {
    pub status: u8,
    pub connection_handle: u16,
    pub parameters: ConnectionParameters,
}

impl LeConnectionUpdateComplete {
    pub fn parse(data: &[u8]) -> Result<Self, HciError> {
        require_subevent(data, EVT_LE_CONN_UPDATE_COMPLETE)?;
        require_len(data, 10)?;

        let mut cursor = Cursor::new(&data[1..]);
        Ok(Self {
            status: cursor.read_u8()?,
            connection_handle: cursor.read_u16::<LittleEndian>()? & HCI_HANDLE_MASK,
            parameters: ConnectionParameters {
                interval: cursor.read_u16::<LittleEndian>()?,
                latency: cursor.read_u16::<LittleEndian>()?,
                supervision_timeout: cursor.read_u16::<LittleEndian>()?,
            },
        })
    }
}

/// LE Long Term Key Request sub-event [Vol 2, Part E, 7.7.65.5]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeLongTermKeyRequest {
    pub connection_handle: u16,
    pub random_number: u64,
    pub encrypted_diversifier: u16,
}

impl LeLongTermKeyRequest {
    pub fn parse(data: &[u8]) -> Result<Self, HciError> {
        require_subevent(data, EVT_LE_LTK_REQUEST)?;
        require_len(data, 13)?;

        let mut cursor = Cursor::new(&data[1..]);
        Ok(Self {
            connection_handle: cursor.read_u16::<LittleEndian>()? & HCI_HANDLE_MASK,
            random_number: cursor.read_u64::<LittleEndian>()?,
            encrypted_diversifier: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

/// LE Advertising Report sub-event [Vol 2, Part E, 7.7.65.2]
///
/// Every report boundary is validated by [`LeAdvertisingReportEvent::parse`], so
/// iterating with [`LeAdvertisingReportEvent::reports`] never fails and can be
/// restarted any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeAdvertisingReportEvent {
    num_reports: u8,
    raw: Vec<u8>,
}

// event type, address type, address, data length, (data), rssi
const ADV_REPORT_FIXED_LEN: usize = 1 + 1 + 6 + 1 + 1;

impl LeAdvertisingReportEvent {
    pub fn parse(data: &[u8]) -> Result<Self, HciError> {
        require_subevent(data, EVT_LE_ADVERTISING_REPORT)?;
        require_len(data, 2)?;

        let num_reports = data[1];
        let raw = &data[2..];
        let mut offset = 0;
        for _ in 0..num_reports {
            require_len(&raw[offset..], ADV_REPORT_FIXED_LEN)?;
            let data_len = raw[offset + 8] as usize;
            require_len(&raw[offset..], ADV_REPORT_FIXED_LEN + data_len)?;
            offset += ADV_REPORT_FIXED_LEN + data_len;
        }

        Ok(Self {
            num_reports,
            raw: raw[..offset].to_vec(),
        })
    }

    pub fn num_reports(&self) -> usize {
        self.num_reports as usize
    }

    pub fn reports(&self) -> AdvertisingReports<'_> {
        AdvertisingReports {
            remaining: self.num_reports as usize,
            data: &self.raw,
        }
    }
}

/// A single advertising report borrowed from its batch event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingReport<'a> {
    pub event_type: u8,
    pub address_type: AddressType,
    pub address: BdAddr,
    pub rssi: i8,
    pub data: &'a [u8],
}

/// Lazy iterator over the reports of an [`LeAdvertisingReportEvent`]
#[derive(Debug, Clone)]
pub struct AdvertisingReports<'a> {
    remaining: usize,
    data: &'a [u8],
}

impl<'a> Iterator for AdvertisingReports<'a> {
    type Item = AdvertisingReport<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.data.len() < ADV_REPORT_FIXED_LEN {
            return None;
        }

        let data_len = self.data[8] as usize;
        let (report, rest) = self.data.split_at(ADV_REPORT_FIXED_LEN + data_len);
        self.data = rest;
        self.remaining -= 1;

        Some(AdvertisingReport {
            event_type: report[0],
            address_type: AddressType::from(report[1]),
            address: BdAddr::from_slice(&report[2..8])?,
            data: &report[9..9 + data_len],
            rssi: report[9 + data_len] as i8,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
