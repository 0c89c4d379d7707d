//! Ethernet II header view with single 802.1Q tag unwrapping

use super::classify::{ClassifyError, ensure_len};
use super::{EtherType, MacAddr, VlanTag};

/// Ethernet header size without a VLAN tag
pub const HEADER_SIZE: usize = 14;
/// Ethernet header size with one 802.1Q tag
pub const VLAN_HEADER_SIZE: usize = 18;
/// Offset of the (outer) ethertype field
const ETHERTYPE_OFFSET: usize = 12;
/// Offset of the tag control information when a VLAN tag is present
pub const VLAN_TCI_OFFSET: usize = 14;

/// Parsed Ethernet header (zero-copy reference into a captured frame)
#[derive(Debug)]
pub struct EthernetHeader<'a> {
    buffer: &'a [u8],
    vlan_tag: Option<VlanTag>,
    payload_offset: usize,
}

impl<'a> EthernetHeader<'a> {
    /// Parse the header at the start of `frame`.
    ///
    /// Exactly one 802.1Q tag is unwrapped; a second tag shows up as the
    /// inner ethertype 0x8100.
    pub fn parse(frame: &'a [u8]) -> Result<Self, ClassifyError> {
        ensure_len(frame, HEADER_SIZE)?;

        let outer = u16::from_be_bytes([frame[ETHERTYPE_OFFSET], frame[ETHERTYPE_OFFSET + 1]]);
        let (vlan_tag, payload_offset) = if outer == EtherType::Vlan as u16 {
            ensure_len(frame, VLAN_HEADER_SIZE)?;
            let tci = [frame[VLAN_TCI_OFFSET], frame[VLAN_TCI_OFFSET + 1]];
            (Some(VlanTag::from_bytes(tci)), VLAN_HEADER_SIZE)
        } else {
            (None, HEADER_SIZE)
        };

        Ok(Self {
            buffer: frame,
            vlan_tag,
            payload_offset,
        })
    }

    pub fn dst_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buffer[0..6]);
        MacAddr(mac)
    }

    pub fn src_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buffer[6..12]);
        MacAddr(mac)
    }

    /// Ethertype as it appears right after the MAC addresses
    pub fn outer_ethertype(&self) -> u16 {
        u16::from_be_bytes([self.buffer[ETHERTYPE_OFFSET], self.buffer[ETHERTYPE_OFFSET + 1]])
    }

    /// Ethertype of the encapsulated payload (after the VLAN tag, if any)
    pub fn ethertype(&self) -> u16 {
        let offset = self.payload_offset - 2;
        u16::from_be_bytes([self.buffer[offset], self.buffer[offset + 1]])
    }

    pub fn vlan_tag(&self) -> Option<VlanTag> {
        self.vlan_tag
    }

    /// Offset of the network header within the frame
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }
}

/// Builder for Ethernet frames, used to synthesize replay traffic
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new(dst: MacAddr, src: MacAddr) -> Self {
        let mut buffer = Vec::with_capacity(64);
        buffer.extend_from_slice(&dst.0);
        buffer.extend_from_slice(&src.0);
        Self { buffer }
    }

    pub fn vlan_tag(mut self, tag: VlanTag) -> Self {
        self.buffer
            .extend_from_slice(&(EtherType::Vlan as u16).to_be_bytes());
        self.buffer.extend_from_slice(&tag.to_bytes());
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.buffer.extend_from_slice(&ethertype.to_be_bytes());
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.buffer.extend_from_slice(payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}
