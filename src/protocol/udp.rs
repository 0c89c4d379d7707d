//! UDP header view - RFC 768

use super::classify::{ClassifyError, ensure_len};

/// UDP header size (fixed)
pub const HEADER_SIZE: usize = 8;

/// Parsed UDP header located at `offset` inside a captured frame
#[derive(Debug)]
pub struct UdpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> UdpHeader<'a> {
    pub fn parse(frame: &'a [u8], offset: usize) -> Result<Self, ClassifyError> {
        ensure_len(frame, offset + HEADER_SIZE)?;
        Ok(Self {
            buffer: &frame[offset..offset + HEADER_SIZE],
        })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Length of header plus data as claimed on the wire
    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    /// 0 means no checksum was computed
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }
}
