//! Link-layer types shared by the header views and the classifier

use std::fmt;
use std::str::FromStr;

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error returned when a string is not a colon or hyphen separated MAC address
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address: {0:?}")]
pub struct ParseMacAddrError(String);

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Accepts "01:00:5e:00:00:01" and "01-00-5e-00-00-01".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMacAddrError(s.to_string());
        let sep = if s.contains(':') { ':' } else { '-' };

        let mut out = [0u8; 6];
        let mut parts = s.split(sep);
        for byte in out.iter_mut() {
            let part = parts.next().ok_or_else(err)?;
            if part.len() != 2 {
                return Err(err());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| err())?;
        }
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(MacAddr(out))
    }
}

/// EtherType values the classifier knows by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EtherType {
    /// Spanning tree for bridges (as seen on the wire by capture points)
    Stp = 0x0026,
    /// Cisco discovery / VTP
    Cdp = 0x016E,
    Ipv4 = 0x0800,
    Arp = 0x0806,
    /// Measurement-point control frames
    Mp = 0x0810,
    Vlan = 0x8100,
    Ipv6 = 0x86DD,
}

impl EtherType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0026 => Some(EtherType::Stp),
            0x016E => Some(EtherType::Cdp),
            0x0800 => Some(EtherType::Ipv4),
            0x0806 => Some(EtherType::Arp),
            0x0810 => Some(EtherType::Mp),
            0x8100 => Some(EtherType::Vlan),
            0x86DD => Some(EtherType::Ipv6),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EtherType::Stp => "STP",
            EtherType::Cdp => "CDP",
            EtherType::Ipv4 => "IPv4",
            EtherType::Arp => "ARP",
            EtherType::Mp => "MP",
            EtherType::Vlan => "802.1Q",
            EtherType::Ipv6 => "IPv6",
        }
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:04x})", self.name(), *self as u16)
    }
}

/// VLAN tag control information (802.1Q)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    /// Priority Code Point (3 bits)
    pub pcp: u8,
    /// Drop Eligible Indicator
    pub dei: bool,
    /// VLAN ID (12 bits)
    pub vid: u16,
}

impl VlanTag {
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let value = u16::from_be_bytes(bytes);
        Self {
            pcp: (value >> 13) as u8,
            dei: (value >> 12) & 0x01 != 0,
            vid: value & 0x0FFF,
        }
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        let value =
            ((self.pcp as u16 & 0x07) << 13) | ((self.dei as u16) << 12) | (self.vid & 0x0FFF);
        value.to_be_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_addr_parse() {
        let mac: MacAddr = "01:00:00:00:00:01".parse().unwrap();
        assert_eq!(mac, MacAddr([0x01, 0, 0, 0, 0, 0x01]));
        assert!(mac.is_multicast());

        let mac: MacAddr = "AA-bb-CC-dd-EE-ff".parse().unwrap();
        assert_eq!(mac, MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
        assert!(!MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]).is_multicast());
    }

    #[test]
    fn test_mac_addr_parse_rejects_garbage() {
        assert!("00:11:22:33:44".parse::<MacAddr>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<MacAddr>().is_err());
        assert!("00:11:22:33:44:zz".parse::<MacAddr>().is_err());
        assert!("001122334455".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_addr_display() {
        let mac = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(mac.to_string(), "00:11:22:33:44:55");
    }

    #[test]
    fn test_ethertype_from_u16() {
        assert_eq!(EtherType::from_u16(0x0800), Some(EtherType::Ipv4));
        assert_eq!(EtherType::from_u16(0x0026), Some(EtherType::Stp));
        assert_eq!(EtherType::from_u16(0x016E), Some(EtherType::Cdp));
        assert_eq!(EtherType::from_u16(0x0810), Some(EtherType::Mp));
        assert_eq!(EtherType::from_u16(0x86DD), Some(EtherType::Ipv6));
        assert_eq!(EtherType::from_u16(0x1234), None);
    }

    #[test]
    fn test_ethertype_display() {
        assert_eq!(EtherType::Ipv6.to_string(), "IPv6(0x86dd)");
        assert_eq!(EtherType::Stp.to_string(), "STP(0x0026)");
    }

    #[test]
    fn test_vlan_tag_bytes() {
        // PCP=5, DEI=1, VID=100 -> 0xB064
        let tag = VlanTag::from_bytes([0xB0, 0x64]);
        assert_eq!(tag.pcp, 5);
        assert!(tag.dei);
        assert_eq!(tag.vid, 100);
        assert_eq!(tag.to_bytes(), [0xB0, 0x64]);
    }
}
