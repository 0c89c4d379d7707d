//! IPv4 header view - RFC 791

use super::classify::{ClassifyError, ensure_len};
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Transport protocol numbers the classifier dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Protocol {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
}

impl Protocol {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Protocol::Icmp),
            6 => Some(Protocol::Tcp),
            17 => Some(Protocol::Udp),
            _ => None,
        }
    }
}

/// Parsed IPv4 header located at `offset` inside a captured frame
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    /// Parse the header at `offset`, checking that the IHL-derived length
    /// fits in the captured bytes.
    pub fn parse(frame: &'a [u8], offset: usize) -> Result<Self, ClassifyError> {
        ensure_len(frame, offset + MIN_HEADER_SIZE)?;

        let buffer = &frame[offset..];
        let ihl = (buffer[0] & 0x0F) as usize;
        if ihl < 5 {
            return Err(ClassifyError::Malformed("IPv4 header length below 5 words"));
        }

        let header_len = ihl * 4;
        ensure_len(frame, offset + header_len)?;

        Ok(Self { buffer, header_len })
    }

    pub fn version(&self) -> u8 {
        self.buffer[0] >> 4
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.buffer[12], self.buffer[13], self.buffer[14], self.buffer[15])
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.buffer[16], self.buffer[17], self.buffer[18], self.buffer[19])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(ihl: u8, protocol: u8) -> Vec<u8> {
        let mut h = vec![0u8; ihl as usize * 4];
        h[0] = 0x40 | ihl;
        let total_len = (h.len() as u16).to_be_bytes();
        h[2..4].copy_from_slice(&total_len);
        h[8] = 64;
        h[9] = protocol;
        h[12..16].copy_from_slice(&[192, 168, 1, 10]);
        h[16..20].copy_from_slice(&[10, 0, 0, 1]);
        h
    }

    #[test]
    fn test_parse_at_offset() {
        let mut frame = vec![0xffu8; 14];
        frame.extend(header(5, 6));
        let ip = Ipv4Header::parse(&frame, 14).unwrap();

        assert_eq!(ip.version(), 4);
        assert_eq!(ip.header_len(), 20);
        assert_eq!(ip.protocol(), 6);
        assert_eq!(ip.ttl(), 64);
        assert_eq!(ip.total_length(), 20);
        assert_eq!(ip.src_addr(), Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(ip.dst_addr(), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn test_parse_with_options() {
        let frame = header(7, 17);
        let ip = Ipv4Header::parse(&frame, 0).unwrap();
        assert_eq!(ip.header_len(), 28);
    }

    #[test]
    fn test_options_beyond_capture() {
        let mut frame = header(8, 17);
        frame.truncate(24);
        assert_eq!(
            Ipv4Header::parse(&frame, 0).unwrap_err(),
            ClassifyError::Truncated {
                needed: 32,
                available: 24
            }
        );
    }

    #[test]
    fn test_ihl_too_small() {
        let mut frame = header(5, 6);
        frame[0] = 0x44;
        assert!(matches!(
            Ipv4Header::parse(&frame, 0),
            Err(ClassifyError::Malformed(_))
        ));
    }

    #[test]
    fn test_protocol_from_u8() {
        assert_eq!(Protocol::from_u8(6), Some(Protocol::Tcp));
        assert_eq!(Protocol::from_u8(17), Some(Protocol::Udp));
        assert_eq!(Protocol::from_u8(1), Some(Protocol::Icmp));
        assert_eq!(Protocol::from_u8(47), None);
    }
}
