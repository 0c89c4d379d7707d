//! ringcap - packet consumer engine
//!
//! Frames from up to four capture streams are copied into a fixed-capacity
//! ring, handed out in arrival order (optionally held back by a fixed delay)
//! and classified into an Ethernet/VLAN/IPv4/ARP/transport header stack.

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use engine::{ConsumerEngine, EngineOptions, RawFrame};
pub use error::{Error, Result};
