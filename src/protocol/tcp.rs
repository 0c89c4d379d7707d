//! TCP header view - RFC 793

use super::classify::{ClassifyError, ensure_len};
use std::fmt;

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// TCP flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
}

impl TcpFlags {
    /// Parse flags from byte 13 of the TCP header
    pub fn from_byte(byte: u8) -> Self {
        Self {
            fin: byte & 0x01 != 0,
            syn: byte & 0x02 != 0,
            rst: byte & 0x04 != 0,
            psh: byte & 0x08 != 0,
            ack: byte & 0x10 != 0,
            urg: byte & 0x20 != 0,
        }
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.syn, 'S'),
            (self.fin, 'F'),
            (self.ack, 'A'),
            (self.psh, 'P'),
            (self.urg, 'U'),
            (self.rst, 'R'),
        ];
        for (set, c) in flags {
            if set {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// Parsed TCP header located at `offset` inside a captured frame
#[derive(Debug)]
pub struct TcpHeader<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> TcpHeader<'a> {
    /// Parse the fixed header; the options covered by the data offset must
    /// also be inside the captured bytes.
    pub fn parse(frame: &'a [u8], offset: usize) -> Result<Self, ClassifyError> {
        ensure_len(frame, offset + MIN_HEADER_SIZE)?;

        let buffer = &frame[offset..];
        let header_len = (buffer[12] >> 4) as usize * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(ClassifyError::Malformed("TCP data offset below 5 words"));
        }
        ensure_len(frame, offset + header_len)?;

        Ok(Self { buffer, header_len })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn sequence(&self) -> u32 {
        u32::from_be_bytes([self.buffer[4], self.buffer[5], self.buffer[6], self.buffer[7]])
    }

    pub fn acknowledgment(&self) -> u32 {
        u32::from_be_bytes([self.buffer[8], self.buffer[9], self.buffer[10], self.buffer[11]])
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_byte(self.buffer[13])
    }

    pub fn window(&self) -> u16 {
        u16::from_be_bytes([self.buffer[14], self.buffer[15]])
    }
}
