//! Configuration types

use crate::capture::{Delay, StreamAddr, StreamKind};
use crate::engine::{DeferPolicy, EngineOptions, FailurePolicy};
use crate::telemetry::LogConfig;
use crate::Result;
use serde::Deserialize;
use std::time::Duration;

/// User-defined configuration (ringcap.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ring slots
    pub capacity: usize,
    /// Delivery delay in seconds
    pub delay: f64,
    pub defer_policy: DeferPolicy,
    /// Detach a stream after this many consecutive failed reads
    pub detach_after: Option<u32>,
    pub idle_sleep_us: u64,
    pub classify_on_ingest: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            delay: 0.0,
            defer_policy: DeferPolicy::Repost,
            detach_after: None,
            idle_sleep_us: 50,
            classify_on_ingest: false,
        }
    }
}

impl EngineConfig {
    /// Engine options with the default diagnostic sink.
    pub fn to_options(&self) -> Result<EngineOptions> {
        Ok(EngineOptions {
            capacity: self.capacity,
            delay: Delay::from_secs_f64(self.delay)?,
            defer_policy: self.defer_policy,
            failure_policy: match self.detach_after {
                Some(n) => FailurePolicy::DetachAfter(n),
                None => FailurePolicy::Keep,
            },
            idle_sleep: Duration::from_micros(self.idle_sleep_us),
            classify_on_ingest: self.classify_on_ingest,
            ..EngineOptions::default()
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub address: String,
    #[serde(default)]
    pub kind: StreamKind,
    pub interface: Option<String>,
    pub port: Option<u16>,
}

impl StreamConfig {
    pub fn addr(&self) -> Result<StreamAddr> {
        StreamAddr::parse(&self.address, self.kind)
    }
}
