//! ICMP header view - RFC 792

use super::classify::{ClassifyError, ensure_len};

/// ICMP header size (type, code, checksum, rest-of-header)
pub const HEADER_SIZE: usize = 8;

/// ICMP message types with an echo identifier/sequence in the rest-of-header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    DestinationUnreachable = 3,
    EchoRequest = 8,
    TimeExceeded = 11,
}

impl IcmpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IcmpType::EchoReply),
            3 => Some(IcmpType::DestinationUnreachable),
            8 => Some(IcmpType::EchoRequest),
            11 => Some(IcmpType::TimeExceeded),
            _ => None,
        }
    }
}

/// Parsed ICMP header located at `offset` inside a captured frame
#[derive(Debug)]
pub struct IcmpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> IcmpHeader<'a> {
    pub fn parse(frame: &'a [u8], offset: usize) -> Result<Self, ClassifyError> {
        ensure_len(frame, offset + HEADER_SIZE)?;
        Ok(Self {
            buffer: &frame[offset..offset + HEADER_SIZE],
        })
    }

    pub fn icmp_type(&self) -> u8 {
        self.buffer[0]
    }

    pub fn code(&self) -> u8 {
        self.buffer[1]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Echo request/reply identifier
    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    /// Echo request/reply sequence number
    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    pub fn is_echo(&self) -> bool {
        self.code() == 0
            && matches!(
                IcmpType::from_u8(self.icmp_type()),
                Some(IcmpType::EchoRequest | IcmpType::EchoReply)
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_echo_request() {
        let buf = [8, 0, 0xf7, 0xfd, 0x00, 0x01, 0x00, 0x02];
        let icmp = IcmpHeader::parse(&buf, 0).unwrap();
        assert_eq!(IcmpType::from_u8(icmp.icmp_type()), Some(IcmpType::EchoRequest));
        assert_eq!(icmp.identifier(), 1);
        assert_eq!(icmp.sequence(), 2);
        assert!(icmp.is_echo());
    }

    #[test]
    fn test_unreachable_is_not_echo() {
        let buf = [3, 3, 0, 0, 0, 0, 0, 0];
        let icmp = IcmpHeader::parse(&buf, 0).unwrap();
        assert!(!icmp.is_echo());
    }

    #[test]
    fn test_parse_short() {
        assert!(IcmpHeader::parse(&[8, 0, 0, 0], 0).is_err());
    }
}
