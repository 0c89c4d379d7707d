//! Transport protocol, port and interface filter

use super::{CaptureHeader, FrameFilter};
use crate::protocol::ipv4::Protocol;
use crate::protocol::tcp::TcpHeader;
use crate::protocol::udp::UdpHeader;
use crate::protocol::{Transport, classify};

/// Keeps frames matching every configured criterion. An empty filter keeps
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortProtoFilter {
    /// Transport carried over IPv4
    pub protocol: Option<Protocol>,
    /// TCP or UDP port, either direction
    pub port: Option<u16>,
    /// Capture interface name
    pub interface: Option<String>,
}

impl PortProtoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.interface = Some(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.protocol.is_none() && self.port.is_none() && self.interface.is_none()
    }
}

impl FrameFilter for PortProtoFilter {
    fn matches(&self, header: &CaptureHeader, data: &[u8]) -> bool {
        if let Some(name) = &self.interface {
            if header.interface() != *name {
                return false;
            }
        }
        if self.protocol.is_none() && self.port.is_none() {
            return true;
        }

        let Some(transport) = classify(header, data).ok().and_then(|c| c.transport()) else {
            return false;
        };
        let (protocol, ports) = match transport {
            Transport::Tcp { offset, .. } => (
                Protocol::Tcp,
                TcpHeader::parse(data, offset)
                    .ok()
                    .map(|tcp| (tcp.src_port(), tcp.dst_port())),
            ),
            Transport::Udp { offset } => (
                Protocol::Udp,
                UdpHeader::parse(data, offset)
                    .ok()
                    .map(|udp| (udp.src_port(), udp.dst_port())),
            ),
            Transport::Icmp { .. } => (Protocol::Icmp, None),
        };

        if self.protocol.is_some_and(|p| p != protocol) {
            return false;
        }
        match self.port {
            Some(port) => ports.is_some_and(|(src, dst)| src == port || dst == port),
            None => true,
        }
    }
}
