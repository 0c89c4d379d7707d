//! Capture stream capability
//!
//! The engine consumes streams through the [`Stream`] trait and never opens
//! sources itself. Backends provided here:
//! - [`ReplayStream`]: in-memory frames, fed from another thread or preloaded
//! - [`PcapStream`]: libpcap and pcapng capture files
//!
//! [`PortProtoFilter`] works with any backend.
//!
//! Network address kinds (ethernet multicast, UDP multicast, TCP unicast) are
//! modelled by [`StreamAddr`] but need an external [`StreamOpener`].

mod filter;
mod pcap;
mod replay;
mod timestamp;

pub use filter::PortProtoFilter;
pub use pcap::{FileOpener, PcapStream};
pub use replay::{ReplayFeed, ReplayStream};
pub use timestamp::{Delay, PSEC_PER_SEC, Timestamp};

use crate::protocol::MacAddr;
use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Width of the interface and capture-source identifiers
pub const ID_LEN: usize = 8;

/// Per-frame capture metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureHeader {
    /// Interface the frame was captured on, NUL padded
    pub interface_id: [u8; ID_LEN],
    /// Capture point that produced the frame, NUL padded
    pub capture_source_id: [u8; ID_LEN],
    pub timestamp: Timestamp,
    /// Length of the frame on the wire
    pub link_len: u32,
    /// Number of bytes actually captured
    pub captured_len: u32,
}

impl CaptureHeader {
    /// Header for a fully captured frame of `len` bytes.
    pub fn new(timestamp: Timestamp, len: usize) -> Self {
        Self {
            timestamp,
            link_len: len as u32,
            captured_len: len as u32,
            ..Default::default()
        }
    }

    pub fn interface(&self) -> String {
        id_to_string(&self.interface_id)
    }

    pub fn capture_source(&self) -> String {
        id_to_string(&self.capture_source_id)
    }
}

/// Pack a name into a fixed-width identifier, truncating if needed.
pub fn id_from_str(name: &str) -> [u8; ID_LEN] {
    let mut id = [0u8; ID_LEN];
    let len = name.len().min(ID_LEN);
    id[..len].copy_from_slice(&name.as_bytes()[..len]);
    id
}

fn id_to_string(id: &[u8; ID_LEN]) -> String {
    let end = id.iter().position(|&b| b == 0).unwrap_or(ID_LEN);
    String::from_utf8_lossy(&id[..end]).into_owned()
}

/// One frame handed out by a stream. The bytes stay owned by the stream and
/// are valid until its next `read`.
#[derive(Debug)]
pub struct CapturedFrame<'a> {
    pub header: CaptureHeader,
    pub data: &'a [u8],
}

/// Outcomes of a read that did not produce a frame
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("no data available")]
    WouldBlock,

    #[error("end of stream")]
    EndOfStream,

    #[error(transparent)]
    Failed(#[from] Error),
}

/// Opaque filter passed through to stream reads. Streams skip frames the
/// filter rejects.
pub trait FrameFilter: Send + Sync {
    fn matches(&self, header: &CaptureHeader, data: &[u8]) -> bool;
}

impl<F> FrameFilter for F
where
    F: Fn(&CaptureHeader, &[u8]) -> bool + Send + Sync,
{
    fn matches(&self, header: &CaptureHeader, data: &[u8]) -> bool {
        self(header, data)
    }
}

/// Source of captured frames
///
/// `read` must not block: when nothing is ready it returns
/// [`ReadError::WouldBlock`].
pub trait Stream: Send {
    fn read(&mut self, filter: Option<&dyn FrameFilter>) -> std::result::Result<CapturedFrame<'_>, ReadError>;

    /// Release the underlying source. Dropping the stream has the same effect.
    fn close(&mut self) {}
}

/// Opens streams by address
pub trait StreamOpener {
    fn open(
        &self,
        addr: &StreamAddr,
        interface: Option<&str>,
        port: Option<u16>,
    ) -> Result<Box<dyn Stream>>;
}

/// Kind of capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    #[default]
    File,
    Ethernet,
    Udp,
    Tcp,
}

/// Address of a capture source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAddr {
    /// Local capture file
    File(PathBuf),
    /// Ethernet multicast group, needs an interface
    Ethernet(MacAddr),
    /// UDP multicast group, needs a port
    Udp(Ipv4Addr),
    /// TCP unicast peer, needs a port
    Tcp(Ipv4Addr),
}

impl StreamAddr {
    pub fn parse(address: &str, kind: StreamKind) -> Result<Self> {
        let invalid = || Error::InvalidAddress(format!("{address} ({kind:?})"));
        match kind {
            StreamKind::File => {
                if address.is_empty() {
                    return Err(invalid());
                }
                Ok(StreamAddr::File(PathBuf::from(address)))
            }
            StreamKind::Ethernet => address
                .parse()
                .map(StreamAddr::Ethernet)
                .map_err(|_| invalid()),
            StreamKind::Udp => address.parse().map(StreamAddr::Udp).map_err(|_| invalid()),
            StreamKind::Tcp => address.parse().map(StreamAddr::Tcp).map_err(|_| invalid()),
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self {
            StreamAddr::File(_) => StreamKind::File,
            StreamAddr::Ethernet(_) => StreamKind::Ethernet,
            StreamAddr::Udp(_) => StreamKind::Udp,
            StreamAddr::Tcp(_) => StreamKind::Tcp,
        }
    }
}

impl fmt::Display for StreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamAddr::File(path) => write!(f, "file://{}", path.display()),
            StreamAddr::Ethernet(mac) => write!(f, "eth://{mac}"),
            StreamAddr::Udp(ip) => write!(f, "udp://{ip}"),
            StreamAddr::Tcp(ip) => write!(f, "tcp://{ip}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_addr_parse() {
        assert_eq!(
            StreamAddr::parse("trace.pcap", StreamKind::File).unwrap(),
            StreamAddr::File(PathBuf::from("trace.pcap"))
        );
        assert_eq!(
            StreamAddr::parse("01:00:00:00:00:01", StreamKind::Ethernet).unwrap(),
            StreamAddr::Ethernet(MacAddr([1, 0, 0, 0, 0, 1]))
        );
        assert_eq!(
            StreamAddr::parse("225.10.11.10", StreamKind::Udp).unwrap(),
            StreamAddr::Udp(Ipv4Addr::new(225, 10, 11, 10))
        );
        assert_eq!(
            StreamAddr::parse("192.168.0.10", StreamKind::Tcp).unwrap().kind(),
            StreamKind::Tcp
        );
    }

    #[test]
    fn test_stream_addr_parse_invalid() {
        assert!(matches!(
            StreamAddr::parse("not-a-mac", StreamKind::Ethernet),
            Err(Error::InvalidAddress(_))
        ));
        assert!(StreamAddr::parse("300.1.1.1", StreamKind::Udp).is_err());
        assert!(StreamAddr::parse("", StreamKind::File).is_err());
    }

    #[test]
    fn test_stream_addr_display() {
        let addr = StreamAddr::Udp(Ipv4Addr::new(225, 10, 11, 10));
        assert_eq!(addr.to_string(), "udp://225.10.11.10");
    }

    #[test]
    fn test_id_roundtrip() {
        let id = id_from_str("eth0");
        assert_eq!(&id, b"eth0\0\0\0\0");

        let header = CaptureHeader {
            interface_id: id,
            capture_source_id: id_from_str("mp-long-name"),
            ..Default::default()
        };
        assert_eq!(header.interface(), "eth0");
        assert_eq!(header.capture_source(), "mp-long-");
    }

    #[test]
    fn test_closure_filter() {
        let only_long = |h: &CaptureHeader, _: &[u8]| h.captured_len > 60;
        let filter: &dyn FrameFilter = &only_long;
        assert!(filter.matches(&CaptureHeader::new(Timestamp::default(), 64), &[]));
        assert!(!filter.matches(&CaptureHeader::new(Timestamp::default(), 42), &[]));
    }
}
