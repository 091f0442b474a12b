use crate::gap::constants::*;
use std::fmt;

/// Link-layer role of the local device on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Central,
    Peripheral,
}

impl From<u8> for Role {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Role::Peripheral,
            _ => Role::Central,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
    PublicIdentity,
    RandomIdentity,
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            PUBLIC_DEVICE_ADDRESS => AddressType::Public,
            RANDOM_DEVICE_ADDRESS => AddressType::Random,
            PUBLIC_IDENTITY_ADDRESS => AddressType::PublicIdentity,
            RANDOM_IDENTITY_ADDRESS => AddressType::RandomIdentity,
            _ => AddressType::Public,
        }
    }
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => PUBLIC_DEVICE_ADDRESS,
            AddressType::Random => RANDOM_DEVICE_ADDRESS,
            AddressType::PublicIdentity => PUBLIC_IDENTITY_ADDRESS,
            AddressType::RandomIdentity => RANDOM_IDENTITY_ADDRESS,
        }
    }
}

/// A Bluetooth device address, stored in the little-endian order used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = slice.get(..6)?.try_into().ok()?;
        Some(Self { bytes })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

/// Iterator over the `(type, data)` structures of an advertising payload
///
/// Iteration stops at the first zero-length or truncated structure.
#[derive(Debug, Clone)]
pub struct AdStructures<'a> {
    data: &'a [u8],
}

/// Split an advertising payload into its AD structures
pub fn ad_structures(data: &[u8]) -> AdStructures<'_> {
    AdStructures { data }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (&length, rest) = self.data.split_first()?;
        let length = length as usize;
        if length == 0 || length > rest.len() {
            self.data = &[];
            return None;
        }

        let ad_type = rest[0];
        let ad_data = &rest[1..length];
        self.data = &rest[length..];
        Some((ad_type, ad_data))
    }
}

/// Extract the advertised local name, complete or shortened
pub fn local_name(data: &[u8]) -> Option<String> {
    ad_structures(data)
        .find(|(ad_type, _)| {
            *ad_type == ADV_TYPE_COMPLETE_LOCAL_NAME || *ad_type == ADV_TYPE_SHORT_LOCAL_NAME
        })
        .map(|(_, name)| String::from_utf8_lossy(name).into_owned())
}
