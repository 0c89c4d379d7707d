//! ARP header view - RFC 826 (Ethernet/IPv4 layout)

use super::MacAddr;
use super::classify::{ClassifyError, ensure_len};
use std::net::Ipv4Addr;

/// Fixed part of the ARP header (htype, ptype, hlen, plen, op)
pub const HEADER_SIZE: usize = 8;
/// Fixed header plus sender/target hardware and protocol addresses
pub const PACKET_SIZE: usize = 28;

/// ARP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// ARP header plus the IPv4-over-Ethernet address block
#[derive(Debug)]
pub struct ArpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> ArpHeader<'a> {
    pub fn parse(frame: &'a [u8], offset: usize) -> Result<Self, ClassifyError> {
        ensure_len(frame, offset + PACKET_SIZE)?;
        Ok(Self {
            buffer: &frame[offset..offset + PACKET_SIZE],
        })
    }

    pub fn hardware_type(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn protocol_type(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// True when the address block really is 6-byte MAC / 4-byte IPv4
    pub fn is_ethernet_ipv4(&self) -> bool {
        self.hardware_type() == 1
            && self.protocol_type() == 0x0800
            && self.buffer[4] == 6
            && self.buffer[5] == 4
    }

    pub fn operation(&self) -> Option<ArpOp> {
        ArpOp::from_u16(u16::from_be_bytes([self.buffer[6], self.buffer[7]]))
    }

    pub fn sender_mac(&self) -> MacAddr {
        mac_at(self.buffer, 8)
    }

    pub fn sender_ip(&self) -> Ipv4Addr {
        ip_at(self.buffer, 14)
    }

    pub fn target_mac(&self) -> MacAddr {
        mac_at(self.buffer, 18)
    }

    pub fn target_ip(&self) -> Ipv4Addr {
        ip_at(self.buffer, 24)
    }
}

fn mac_at(buffer: &[u8], offset: usize) -> MacAddr {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buffer[offset..offset + 6]);
    MacAddr(mac)
}

fn ip_at(buffer: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    )
}
