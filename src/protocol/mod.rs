//! Link, network and transport header views and the frame classifier
//!
//! Header views borrow the captured bytes and check every offset against the
//! captured length before reading.

pub mod arp;
pub mod classify;
pub mod ethernet;
pub mod hexdump;
pub mod icmp;
pub mod ipv4;
pub mod tcp;
pub mod types;
pub mod udp;

pub use classify::{Classified, ClassifyError, Network, Transport, Vlan, classify};
pub use hexdump::hexdump;
pub use types::*;
