//! HCI packet structures and parsing
//!
//! This module contains the command encoder, the event header splitter and the
//! ACL data packet codec. Typed event records live in [`crate::hci::event`].

use crate::error::HciError;
use crate::gap::BdAddr;
use crate::hci::constants::*;
use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};

/// Common HCI Commands
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HciCommand {
    // Link Control Commands (OGF: 0x01)
    Disconnect { handle: u16, reason: u8 },

    // Host Controller Commands (OGF: 0x03)
    Reset,
    SetEventMask { event_mask: u64 },

    // Informational Parameters (OGF: 0x04)
    ReadBdAddr,

    // LE Commands (OGF: 0x08)
    LeSetEventMask { event_mask: u64 },
    LeReadBufferSize,
    LeSetScanParameters {
        scan_type: u8,
        scan_interval: u16,
        scan_window: u16,
        own_address_type: u8,
        filter_policy: u8,
    },
    LeSetScanEnable { enable: bool, filter_duplicates: bool },
    LeCreateConnection {
        peer_addr: BdAddr,
        peer_addr_type: u8,
        conn_interval_min: u16,
        conn_interval_max: u16,
        supervision_timeout: u16,
    },
    LeCreateConnectionCancel,
    LeLongTermKeyRequestNegativeReply { handle: u16 },

    /// Any other command, given as an opcode and its encoded parameters
    Raw { opcode: u16, params: Vec<u8> },
}

impl HciCommand {
    /// Build a raw command from its OGF, OCF and parameter bytes
    pub fn new(ogf: u8, ocf: u16, params: Vec<u8>) -> Self {
        Self::Raw {
            opcode: opcode(ogf, ocf),
            params,
        }
    }

    /// Get the OGF and OCF for this command
    pub fn opcode_parts(&self) -> (u8, u16) {
        match self {
            Self::Disconnect { .. } => (OGF_LINK_CTL, OCF_DISCONNECT),
            Self::Reset => (OGF_HOST_CTL, OCF_RESET),
            Self::SetEventMask { .. } => (OGF_HOST_CTL, OCF_SET_EVENT_MASK),
            Self::ReadBdAddr => (OGF_INFO_PARAM, OCF_READ_BD_ADDR),
            Self::LeSetEventMask { .. } => (OGF_LE, OCF_LE_SET_EVENT_MASK),
            Self::LeReadBufferSize => (OGF_LE, OCF_LE_READ_BUFFER_SIZE),
            Self::LeSetScanParameters { .. } => (OGF_LE, OCF_LE_SET_SCAN_PARAMETERS),
            Self::LeSetScanEnable { .. } => (OGF_LE, OCF_LE_SET_SCAN_ENABLE),
            Self::LeCreateConnection { .. } => (OGF_LE, OCF_LE_CREATE_CONNECTION),
            Self::LeCreateConnectionCancel => (OGF_LE, OCF_LE_CREATE_CONNECTION_CANCEL),
            Self::LeLongTermKeyRequestNegativeReply { .. } => (OGF_LE, OCF_LE_LTK_NEGATIVE_REPLY),
            Self::Raw { opcode, .. } => ((opcode >> 10) as u8, opcode & 0x3ff),
        }
    }

    /// The 16-bit opcode that the controller echoes back in completion events
    pub fn opcode(&self) -> u16 {
        let (ogf, ocf) = self.opcode_parts();
        opcode(ogf, ocf)
    }

    /// Convert the command to its raw parameter bytes
    fn parameters(&self) -> Vec<u8> {
        match self {
            Self::Reset | Self::ReadBdAddr | Self::LeReadBufferSize | Self::LeCreateConnectionCancel => {
                vec![]
            }

            Self::Disconnect { handle, reason } => {
                let mut params = Vec::with_capacity(3);
                params.extend_from_slice(&handle.to_le_bytes());
                params.push(*reason);
                params
            }

            Self::SetEventMask { event_mask } | Self::LeSetEventMask { event_mask } => {
                event_mask.to_le_bytes().to_vec()
            }

            Self::LeSetScanParameters {
                scan_type,
                scan_interval,
                scan_window,
                own_address_type,
                filter_policy,
            } => {
                let mut params = Vec::with_capacity(7);
                params.push(*scan_type);
                params.extend_from_slice(&scan_interval.to_le_bytes());
                params.extend_from_slice(&scan_window.to_le_bytes());
                params.push(*own_address_type);
                params.push(*filter_policy);
                params
            }

            Self::LeSetScanEnable { enable, filter_duplicates } => {
                vec![u8::from(*enable), u8::from(*filter_duplicates)]
            }

            Self::LeCreateConnection {
                peer_addr,
                peer_addr_type,
                conn_interval_min,
                conn_interval_max,
                supervision_timeout,
            } => {
                let mut params = Vec::with_capacity(25);
                params.extend_from_slice(&0x0060u16.to_le_bytes()); // scan interval
                params.extend_from_slice(&0x0030u16.to_le_bytes()); // scan window
                params.push(0x00); // filter policy: use peer address
                params.push(*peer_addr_type);
                params.extend_from_slice(peer_addr.as_slice());
                params.push(0x00); // own address type: public
                params.extend_from_slice(&conn_interval_min.to_le_bytes());
                params.extend_from_slice(&conn_interval_max.to_le_bytes());
                params.extend_from_slice(&0u16.to_le_bytes()); // latency
                params.extend_from_slice(&supervision_timeout.to_le_bytes());
                params.extend_from_slice(&0u16.to_le_bytes()); // min CE length
                params.extend_from_slice(&0u16.to_le_bytes()); // max CE length
                params
            }

            Self::LeLongTermKeyRequestNegativeReply { handle } => handle.to_le_bytes().to_vec(),

            Self::Raw { params, .. } => params.clone(),
        }
    }

    /// Convert the command to a raw HCI packet, including the H4 type indicator
    pub fn to_packet(&self) -> Result<Vec<u8>, HciError> {
        let params = self.parameters();
        if params.len() > HCI_MAX_PARAM_LEN {
            return Err(HciError::InvalidParamLength(params.len()));
        }

        let mut packet = Vec::with_capacity(1 + HCI_COMMAND_HDR_SIZE + params.len());
        packet.push(HCI_COMMAND_PKT);
        packet.extend_from_slice(&self.opcode().to_le_bytes());
        packet.push(params.len() as u8);
        packet.extend_from_slice(&params);
        Ok(packet)
    }
}

/// HCI Event packet, split into header fields and payload
///
/// Parsing is lenient: the payload is whatever follows the two header bytes,
/// regardless of the declared length. Use [`HciEvent::is_well_framed`] to detect
/// a mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HciEvent {
    pub event_code: u8,
    pub parameter_total_length: u8,
    pub parameters: Vec<u8>,
}

impl HciEvent {
    /// Parse an HCI event from raw bytes (without the H4 type indicator)
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HCI_EVENT_HDR_SIZE {
            return None;
        }

        Some(HciEvent {
            event_code: data[0],
            parameter_total_length: data[1],
            parameters: data[HCI_EVENT_HDR_SIZE..].to_vec(),
        })
    }

    /// Whether the declared parameter length matches the bytes actually received
    pub fn is_well_framed(&self) -> bool {
        self.parameter_total_length as usize == self.parameters.len()
    }
}

bitflags! {
    /// Packet boundary and broadcast flags carried in the upper nibble of an ACL handle
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AclFlags: u16 {
        /// Continuing fragment of a higher layer message
        const CONTINUATION = 0x1000;
        /// First fragment of an automatically flushable message
        const FIRST_FLUSHABLE = 0x2000;
        const ACTIVE_BROADCAST = 0x4000;
    }
}

/// ACL data packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclPacket {
    pub handle: u16,
    pub flags: AclFlags,
    pub data: Vec<u8>,
}

impl AclPacket {
    pub fn new(handle: u16, flags: AclFlags, data: Vec<u8>) -> Self {
        Self {
            handle: handle & HCI_HANDLE_MASK,
            flags,
            data,
        }
    }

    /// Extract only the connection handle from a raw ACL packet
    pub fn peek_handle(data: &[u8]) -> Option<u16> {
        if data.len() < 2 {
            return None;
        }
        Some(LittleEndian::read_u16(data) & HCI_HANDLE_MASK)
    }

    /// Parse an ACL packet from raw bytes (without the H4 type indicator)
    pub fn parse(data: &[u8]) -> Result<Self, HciError> {
        if data.len() < HCI_ACL_HDR_SIZE {
            return Err(HciError::InvalidPacketFormat);
        }

        let raw_handle = LittleEndian::read_u16(&data[0..2]);
        let length = LittleEndian::read_u16(&data[2..4]) as usize;
        let payload = &data[HCI_ACL_HDR_SIZE..];
        if payload.len() < length {
            return Err(HciError::InvalidParamLength(payload.len()));
        }

        Ok(Self {
            handle: raw_handle & HCI_HANDLE_MASK,
            flags: AclFlags::from_bits_truncate(raw_handle),
            data: payload[..length].to_vec(),
        })
    }

    /// Whether this packet starts a new higher layer message
    pub fn is_start(&self) -> bool {
        !self.flags.contains(AclFlags::CONTINUATION)
    }

    /// Convert to a raw HCI packet, including the H4 type indicator
    pub fn to_packet(&self) -> Result<Vec<u8>, HciError> {
        if self.data.len() > u16::MAX as usize {
            return Err(HciError::PacketTooLarge(self.data.len()));
        }

        let mut packet = Vec::with_capacity(1 + HCI_ACL_HDR_SIZE + self.data.len());
        packet.push(HCI_ACL_PKT);
        packet.extend_from_slice(&(self.handle | self.flags.bits()).to_le_bytes());
        packet.extend_from_slice(&(self.data.len() as u16).to_le_bytes());
        packet.extend_from_slice(&self.data);
        Ok(packet)
    }
}
