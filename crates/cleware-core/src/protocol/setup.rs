//! Control transfer setup packet.

use byteorder::{LittleEndian, WriteBytesExt};
use std::fmt;

use super::constants::{REQUEST_SET_INTERFACE, REQUEST_TYPE_STANDARD_INTERFACE_OUT};

/// Data phase direction, bit 7 of `bmRequestType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device.
    Out,
    /// Device to host.
    In,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Out => write!(f, "OUT"),
            Direction::In => write!(f, "IN"),
        }
    }
}

/// Request type, bits 5..6 of `bmRequestType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// Request recipient, bits 0..4 of `bmRequestType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved(u8),
}

/// The 8-byte setup stage of a control transfer.
///
/// `value` and `index` are opaque here; the switch encoder or a raw caller
/// gives them meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    /// Expected size of the data stage.
    pub length: u16,
}

impl SetupPacket {
    pub const SIZE: usize = 8;

    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
            length,
        }
    }

    pub fn direction(&self) -> Direction {
        if self.request_type & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn kind(&self) -> RequestKind {
        match (self.request_type >> 5) & 0x03 {
            0 => RequestKind::Standard,
            1 => RequestKind::Class,
            2 => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.request_type & 0x1F {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            r => Recipient::Reserved(r),
        }
    }

    /// Standard SET_INTERFACE addressed to an interface.
    pub fn is_set_interface(&self) -> bool {
        self.request_type == REQUEST_TYPE_STANDARD_INTERFACE_OUT
            && self.request == REQUEST_SET_INTERFACE
    }

    /// Wire layout as sent on the bus (multi-byte fields little-endian).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.push(self.request_type);
        buf.push(self.request);
        // Writes into a Vec cannot fail.
        let _ = buf.write_u16::<LittleEndian>(self.value);
        let _ = buf.write_u16::<LittleEndian>(self.index);
        let _ = buf.write_u16::<LittleEndian>(self.length);
        buf
    }
}

impl fmt::Display for SetupPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bmRequestType=0x{:02x} bRequest=0x{:02x} wValue=0x{:04x} wIndex=0x{:04x} wLength={}",
            self.request_type, self.request, self.value, self.index, self.length
        )
    }
}
