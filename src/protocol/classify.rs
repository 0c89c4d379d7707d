//! Single-pass frame classification
//!
//! Turns a captured Ethernet frame into a [`Classified`] header stack: the
//! byte offsets of the Ethernet header, the optional 802.1Q tag, the network
//! header, the transport header and the application payload. Nothing is
//! copied; every offset is checked against the captured length, which is
//! routinely shorter than the on-wire length.

use super::arp::ArpHeader;
use super::ethernet::{self, EthernetHeader};
use super::icmp::IcmpHeader;
use super::ipv4::{Ipv4Header, Protocol};
use super::tcp::TcpHeader;
use super::udp::{self, UdpHeader};
use super::{EtherType, VlanTag};
use crate::capture::CaptureHeader;
use std::fmt;

/// Reasons a frame cannot be classified. None of these are fatal; the frame
/// itself is still stored and delivered as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("802.1Q tag encapsulates ethertype 0x{0:04x}, only IPv4 is handled")]
    UnsupportedEncapsulation(u16),

    #[error("unsupported transport protocol {0}")]
    UnsupportedTransport(u8),

    #[error("unsupported link protocol {0}")]
    Unsupported(EtherType),

    #[error("unknown ethertype 0x{0:04x}")]
    UnknownEthertype(u16),

    #[error("frame truncated: {needed} bytes needed, {available} captured")]
    Truncated { needed: usize, available: usize },

    #[error("malformed header: {0}")]
    Malformed(&'static str),
}

pub(crate) fn ensure_len(frame: &[u8], needed: usize) -> Result<(), ClassifyError> {
    if frame.len() < needed {
        return Err(ClassifyError::Truncated {
            needed,
            available: frame.len(),
        });
    }
    Ok(())
}

/// Transport header found inside an IPv4 packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp { offset: usize, header_len: usize },
    Udp { offset: usize },
    Icmp { offset: usize },
}

/// Network layer found after the Ethernet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Ipv4 {
        offset: usize,
        header_len: usize,
        transport: Transport,
    },
    /// ARP header at `offset`, address block right after its 8 fixed bytes
    Arp { offset: usize },
}

/// The single 802.1Q tag, if present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vlan {
    /// Offset of the tag protocol identifier (0x8100)
    pub offset: usize,
    pub tag: VlanTag,
}

/// Header stack of one captured frame, expressed as offsets into its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
    /// Length of the frame on the wire
    pub link_len: u32,
    /// Number of bytes the offsets were validated against
    pub captured_len: u32,
    pub vlan: Option<Vlan>,
    pub network: Network,
}

impl Classified {
    /// The Ethernet header always starts the captured payload.
    pub fn ethernet_offset(&self) -> usize {
        0
    }

    pub fn ethertype(&self) -> EtherType {
        match self.network {
            Network::Ipv4 { .. } => EtherType::Ipv4,
            Network::Arp { .. } => EtherType::Arp,
        }
    }

    pub fn network_offset(&self) -> usize {
        match self.network {
            Network::Ipv4 { offset, .. } | Network::Arp { offset } => offset,
        }
    }

    pub fn transport(&self) -> Option<Transport> {
        match self.network {
            Network::Ipv4 { transport, .. } => Some(transport),
            Network::Arp { .. } => None,
        }
    }

    pub fn transport_offset(&self) -> Option<usize> {
        self.transport().map(|t| match t {
            Transport::Tcp { offset, .. } | Transport::Udp { offset } | Transport::Icmp { offset } => {
                offset
            }
        })
    }

    /// Where application data begins. ICMP and ARP expose no payload region.
    pub fn payload_offset(&self) -> Option<usize> {
        match self.transport()? {
            Transport::Tcp { offset, header_len } => Some(offset + header_len),
            Transport::Udp { offset } => Some(offset + udp::HEADER_SIZE),
            Transport::Icmp { .. } => None,
        }
    }
}

impl fmt::Display for Classified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(vlan) = self.vlan {
            write!(f, "802.1Q[{}]/", vlan.tag.vid)?;
        }
        match self.network {
            Network::Arp { .. } => write!(f, "ARP"),
            Network::Ipv4 { transport, .. } => match transport {
                Transport::Tcp { .. } => write!(f, "IPv4/TCP"),
                Transport::Udp { .. } => write!(f, "IPv4/UDP"),
                Transport::Icmp { .. } => write!(f, "IPv4/ICMP"),
            },
        }
    }
}

/// Classify a captured frame.
///
/// `data` starts at the Ethernet header. Only the first
/// `min(data.len(), header.captured_len)` bytes are considered.
pub fn classify(header: &CaptureHeader, data: &[u8]) -> Result<Classified, ClassifyError> {
    let captured = data.len().min(header.captured_len as usize);
    let frame = &data[..captured];

    let eth = EthernetHeader::parse(frame)?;
    let vlan = eth.vlan_tag().map(|tag| Vlan {
        offset: ethernet::VLAN_TCI_OFFSET - 2,
        tag,
    });
    let ethertype = eth.ethertype();
    let offset = eth.payload_offset();

    if vlan.is_some() && ethertype != EtherType::Ipv4 as u16 {
        return Err(ClassifyError::UnsupportedEncapsulation(ethertype));
    }

    let network = match EtherType::from_u16(ethertype) {
        Some(EtherType::Ipv4) => classify_ipv4(frame, offset)?,
        Some(EtherType::Arp) => {
            ArpHeader::parse(frame, offset)?;
            Network::Arp { offset }
        }
        Some(other @ (EtherType::Ipv6 | EtherType::Stp | EtherType::Cdp | EtherType::Mp)) => {
            return Err(ClassifyError::Unsupported(other));
        }
        Some(EtherType::Vlan) | None => return Err(ClassifyError::UnknownEthertype(ethertype)),
    };

    Ok(Classified {
        link_len: header.link_len,
        captured_len: captured as u32,
        vlan,
        network,
    })
}

fn classify_ipv4(frame: &[u8], offset: usize) -> Result<Network, ClassifyError> {
    let ip = Ipv4Header::parse(frame, offset)?;
    let header_len = ip.header_len();
    let transport_offset = offset + header_len;

    let transport = match Protocol::from_u8(ip.protocol()) {
        Some(Protocol::Tcp) => {
            let tcp = TcpHeader::parse(frame, transport_offset)?;
            Transport::Tcp {
                offset: transport_offset,
                header_len: tcp.header_len(),
            }
        }
        Some(Protocol::Udp) => {
            UdpHeader::parse(frame, transport_offset)?;
            Transport::Udp {
                offset: transport_offset,
            }
        }
        Some(Protocol::Icmp) => {
            IcmpHeader::parse(frame, transport_offset)?;
            Transport::Icmp {
                offset: transport_offset,
            }
        }
        None => return Err(ClassifyError::UnsupportedTransport(ip.protocol())),
    };

    Ok(Network::Ipv4 {
        offset,
        header_len,
        transport,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Timestamp;
    use crate::protocol::MacAddr;
    use crate::protocol::ethernet::FrameBuilder;

    const DST: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    const SRC: MacAddr = MacAddr([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);

    fn header_for(data: &[u8]) -> CaptureHeader {
        CaptureHeader {
            interface_id: *b"eth0\0\0\0\0",
            capture_source_id: *b"mp-1\0\0\0\0",
            timestamp: Timestamp::new(1_700_000_000, 0),
            link_len: data.len() as u32,
            captured_len: data.len() as u32,
        }
    }

    fn ipv4(protocol: u8, ihl: u8, transport: &[u8]) -> Vec<u8> {
        let mut ip = vec![0u8; ihl as usize * 4];
        ip[0] = 0x40 | ihl;
        let total_len = ((ip.len() + transport.len()) as u16).to_be_bytes();
        ip[2..4].copy_from_slice(&total_len);
        ip[8] = 64;
        ip[9] = protocol;
        ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
        ip[16..20].copy_from_slice(&[10, 0, 0, 2]);
        ip.extend_from_slice(transport);
        ip
    }

    fn tcp_segment(data: &[u8]) -> Vec<u8> {
        let mut tcp = vec![0u8; 20];
        tcp[0..2].copy_from_slice(&40000u16.to_be_bytes());
        tcp[2..4].copy_from_slice(&443u16.to_be_bytes());
        tcp[12] = 5 << 4;
        tcp[13] = 0x18;
        tcp.extend_from_slice(data);
        tcp
    }

    fn udp_datagram(data: &[u8]) -> Vec<u8> {
        let mut udp = vec![0u8; 8];
        udp[0..2].copy_from_slice(&5353u16.to_be_bytes());
        udp[2..4].copy_from_slice(&5353u16.to_be_bytes());
        udp[4..6].copy_from_slice(&((8 + data.len()) as u16).to_be_bytes());
        udp.extend_from_slice(data);
        udp
    }

    fn run(data: &[u8]) -> Result<Classified, ClassifyError> {
        classify(&header_for(data), data)
    }

    #[test]
    fn test_ipv4_tcp() {
        let data = FrameBuilder::new(DST, SRC)
            .ethertype(0x0800)
            .payload(&ipv4(6, 5, &tcp_segment(b"hello")))
            .build();
        let c = run(&data).unwrap();

        assert_eq!(c.ethertype(), EtherType::Ipv4);
        assert_eq!(c.ethernet_offset(), 0);
        assert_eq!(c.network_offset(), 14);
        assert_eq!(c.transport_offset(), Some(14 + 20));
        assert_eq!(c.payload_offset(), Some(14 + 20 + 20));
        assert!(matches!(c.transport(), Some(Transport::Tcp { .. })));
        assert!(c.vlan.is_none());
        assert_eq!(&data[c.payload_offset().unwrap()..], b"hello");
        assert_eq!(c.to_string(), "IPv4/TCP");
    }

    #[test]
    fn test_ipv4_options_shift_transport() {
        let data = FrameBuilder::new(DST, SRC)
            .ethertype(0x0800)
            .payload(&ipv4(6, 6, &tcp_segment(&[])))
            .build();
        let c = run(&data).unwrap();
        assert_eq!(c.transport_offset(), Some(14 + 24));
        assert_eq!(c.payload_offset(), Some(data.len()));
    }

    #[test]
    fn test_vlan_ipv4_udp_matches_untagged() {
        let packet = ipv4(17, 5, &udp_datagram(b"query"));
        let untagged = FrameBuilder::new(DST, SRC)
            .ethertype(0x0800)
            .payload(&packet)
            .build();
        let tag = VlanTag {
            pcp: 0,
            dei: false,
            vid: 42,
        };
        let tagged = FrameBuilder::new(DST, SRC)
            .vlan_tag(tag)
            .ethertype(0x0800)
            .payload(&packet)
            .build();

        let plain = run(&untagged).unwrap();
        let c = run(&tagged).unwrap();

        assert_eq!(c.vlan, Some(Vlan { offset: 12, tag }));
        assert_eq!(c.network_offset(), plain.network_offset() + 4);
        assert_eq!(c.transport_offset(), plain.transport_offset().map(|o| o + 4));
        assert_eq!(c.payload_offset(), plain.payload_offset().map(|o| o + 4));
        assert_eq!(c.transport(), Some(Transport::Udp { offset: 14 + 4 + 20 }));
        assert_eq!(c.to_string(), "802.1Q[42]/IPv4/UDP");
    }

    #[test]
    fn test_vlan_non_ip_encapsulation() {
        let data = FrameBuilder::new(DST, SRC)
            .vlan_tag(VlanTag::from_bytes([0, 7]))
            .ethertype(0x0806)
            .payload(&[0u8; 28])
            .build();
        assert_eq!(
            run(&data).unwrap_err(),
            ClassifyError::UnsupportedEncapsulation(0x0806)
        );
    }

    #[test]
    fn test_double_vlan_not_unwrapped() {
        let data = FrameBuilder::new(DST, SRC)
            .vlan_tag(VlanTag::from_bytes([0, 7]))
            .vlan_tag(VlanTag::from_bytes([0, 8]))
            .ethertype(0x0800)
            .payload(&ipv4(17, 5, &udp_datagram(&[])))
            .build();
        assert_eq!(
            run(&data).unwrap_err(),
            ClassifyError::UnsupportedEncapsulation(0x8100)
        );
    }

    #[test]
    fn test_icmp_has_no_payload_region() {
        let data = FrameBuilder::new(DST, SRC)
            .ethertype(0x0800)
            .payload(&ipv4(1, 5, &[8, 0, 0, 0, 0, 1, 0, 1, 0xaa, 0xbb]))
            .build();
        let c = run(&data).unwrap();
        assert_eq!(c.transport(), Some(Transport::Icmp { offset: 34 }));
        assert_eq!(c.payload_offset(), None);
    }

    #[test]
    fn test_unsupported_transport() {
        let data = FrameBuilder::new(DST, SRC)
            .ethertype(0x0800)
            .payload(&ipv4(47, 5, &[0u8; 8]))
            .build();
        assert_eq!(run(&data).unwrap_err(), ClassifyError::UnsupportedTransport(47));
    }

    #[test]
    fn test_arp() {
        let mut arp = vec![0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x02];
        arp.extend_from_slice(&[0u8; 20]);
        let data = FrameBuilder::new(MacAddr::BROADCAST, SRC)
            .ethertype(0x0806)
            .payload(&arp)
            .build();
        let c = run(&data).unwrap();

        assert_eq!(c.network, Network::Arp { offset: 14 });
        assert_eq!(c.transport_offset(), None);
        assert_eq!(c.payload_offset(), None);
        assert_eq!(data.len() - c.network_offset(), crate::protocol::arp::PACKET_SIZE);
    }

    #[test]
    fn test_ipv6_unsupported() {
        let data = FrameBuilder::new(DST, SRC)
            .ethertype(0x86DD)
            .payload(&[0x60; 40])
            .build();
        assert_eq!(
            run(&data).unwrap_err(),
            ClassifyError::Unsupported(EtherType::Ipv6)
        );
    }

    #[test]
    fn test_administrative_ethertypes_unsupported() {
        for (value, expected) in [
            (0x0026, EtherType::Stp),
            (0x016E, EtherType::Cdp),
            (0x0810, EtherType::Mp),
        ] {
            let data = FrameBuilder::new(DST, SRC).ethertype(value).build();
            assert_eq!(run(&data).unwrap_err(), ClassifyError::Unsupported(expected));
        }
    }

    #[test]
    fn test_unknown_ethertype() {
        let data = FrameBuilder::new(DST, SRC)
            .ethertype(0x1234)
            .payload(&[1, 2, 3])
            .build();
        assert_eq!(run(&data).unwrap_err(), ClassifyError::UnknownEthertype(0x1234));
    }

    #[test]
    fn test_truncated_capture() {
        let data = FrameBuilder::new(DST, SRC)
            .ethertype(0x0800)
            .payload(&ipv4(6, 5, &tcp_segment(b"payload")))
            .build();
        let mut header = header_for(&data);
        // Snapped inside the TCP header
        header.captured_len = 40;

        assert_eq!(
            classify(&header, &data).unwrap_err(),
            ClassifyError::Truncated {
                needed: 54,
                available: 40
            }
        );
    }

    #[test]
    fn test_captured_len_bounds_view() {
        let data = FrameBuilder::new(DST, SRC)
            .ethertype(0x0800)
            .payload(&ipv4(17, 5, &udp_datagram(b"abc")))
            .build();
        let mut header = header_for(&data);
        header.link_len = 1500;

        let c = classify(&header, &data).unwrap();
        assert_eq!(c.link_len, 1500);
        assert_eq!(c.captured_len, data.len() as u32);
    }
}
