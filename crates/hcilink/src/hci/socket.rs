//! HCI Socket implementation for Bluetooth communication
//!
//! This module provides a wrapper around the Linux HCI socket interface and
//! exposes it through the [`PacketSink`] and [`PacketSource`] transport traits.

use crate::error::HciError;
use crate::hci::constants::{HCI_ACL_PKT, HCI_EVENT_PKT};
use crate::hci::transport::{PacketSink, PacketSource};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

// Bluetooth socket constants
const AF_BLUETOOTH: i32 = 31;
const BTPROTO_HCI: i32 = 1;
const HCI_CHANNEL_RAW: u16 = 0;
const HCI_CHANNEL_USER: u16 = 1;
const SOL_HCI: i32 = 0;
const HCI_FILTER: i32 = 2;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Represents an HCI socket
#[derive(Debug)]
pub struct HciSocket {
    fd: RawFd,
}

// Define the sockaddr_hci structure
#[repr(C)]
struct SockaddrHci {
    hci_family: libc::sa_family_t,
    hci_dev: u16,
    hci_channel: u16,
}

// Define the hci_filter structure
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciSocket {
    /// Opens a raw HCI socket that receives every event and ACL packet
    ///
    /// # Arguments
    ///
    /// * `dev_id` - The device ID to open (0 for the first device)
    pub fn open(dev_id: u16) -> Result<Self, HciError> {
        let socket = Self::bind(dev_id, HCI_CHANNEL_RAW)?;
        socket.set_filter()?;
        Ok(socket)
    }

    /// Opens an exclusive user-channel socket
    ///
    /// The kernel stops processing the device while the socket is open, so the
    /// host owns the controller. The device must be down.
    pub fn open_user_channel(dev_id: u16) -> Result<Self, HciError> {
        Self::bind(dev_id, HCI_CHANNEL_USER)
    }

    fn bind(dev_id: u16, channel: u16) -> Result<Self, HciError> {
        let fd = unsafe {
            libc::socket(
                AF_BLUETOOTH,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                BTPROTO_HCI,
            )
        };

        if fd < 0 {
            return Err(HciError::SocketError(std::io::Error::last_os_error()));
        }

        let addr = SockaddrHci {
            hci_family: AF_BLUETOOTH as libc::sa_family_t,
            hci_dev: dev_id,
            hci_channel: channel,
        };

        let result = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<SockaddrHci>() as libc::socklen_t,
            )
        };

        if result < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(HciError::BindError(err));
        }

        Ok(HciSocket { fd })
    }

    fn set_filter(&self) -> Result<(), HciError> {
        let filter = HciFilter {
            type_mask: (1 << HCI_EVENT_PKT) | (1 << HCI_ACL_PKT),
            event_mask: [u32::MAX, u32::MAX],
            opcode: 0,
        };

        let result = unsafe {
            libc::setsockopt(
                self.fd,
                SOL_HCI,
                HCI_FILTER,
                &filter as *const _ as *const libc::c_void,
                std::mem::size_of::<HciFilter>() as libc::socklen_t,
            )
        };

        if result < 0 {
            return Err(HciError::SocketError(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Wait until the socket is readable, returning false on timeout
    fn wait_readable(&self, timeout: Duration) -> Result<bool, HciError> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };

        let result = unsafe { libc::poll(&mut pfd, 1, timeout.as_millis() as libc::c_int) };

        if result < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(HciError::ReceiveError(err));
        }
        Ok(result > 0)
    }
}

impl PacketSource for HciSocket {
    fn read_packet(&self, buf: &mut [u8]) -> Result<usize, HciError> {
        if !self.wait_readable(POLL_INTERVAL)? {
            return Ok(0);
        }

        let bytes_read =
            unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };

        if bytes_read < 0 {
            return Err(HciError::ReceiveError(std::io::Error::last_os_error()));
        }
        Ok(bytes_read as usize)
    }
}

impl PacketSink for HciSocket {
    fn write_packet(&self, packet: &[u8]) -> Result<(), HciError> {
        match unsafe { libc::write(self.fd, packet.as_ptr() as *const libc::c_void, packet.len()) } {
            -1 => Err(HciError::SendError(std::io::Error::last_os_error())),
            n if (n as usize) < packet.len() => Err(HciError::SendError(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "short write to HCI socket",
            ))),
            _ => Ok(()),
        }
    }
}

impl AsRawFd for HciSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for HciSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
