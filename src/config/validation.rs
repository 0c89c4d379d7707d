//! Configuration validation

use super::Config;
use crate::capture::{StreamAddr, StreamKind};
use crate::engine::{MAX_CAPTURE_SIZE, MAX_STREAMS};
use crate::telemetry::is_known_level;
use tracing::{error, warn};

/// Ring memory above which a warning is issued
const LARGE_RING_BYTES: usize = 1 << 30;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn log_diagnostics(&self) {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
        for err in &self.errors {
            error!("{}", err);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_engine(config, &mut result);
    validate_streams(config, &mut result);
    validate_logging(config, &mut result);

    result
}

fn validate_engine(config: &Config, result: &mut ValidationResult) {
    let engine = &config.engine;

    if engine.capacity == 0 {
        result.error("engine.capacity: must be at least 1");
    } else if engine.capacity.saturating_mul(MAX_CAPTURE_SIZE) > LARGE_RING_BYTES {
        result.warn(format!(
            "engine.capacity: {} slots need more than 1 GiB of ring memory",
            engine.capacity
        ));
    }

    if !engine.delay.is_finite() || engine.delay < 0.0 {
        result.error(format!(
            "engine.delay: {} is not a non-negative number of seconds",
            engine.delay
        ));
    } else if engine.delay > u32::MAX as f64 {
        result.error(format!("engine.delay: {} is out of range", engine.delay));
    }

    if engine.detach_after == Some(0) {
        result.error("engine.detach_after: must be at least 1");
    }

    if engine.idle_sleep_us == 0 {
        result.warn("engine.idle_sleep_us: 0 makes the ingest thread spin while idle");
    }
}

fn validate_streams(config: &Config, result: &mut ValidationResult) {
    if config.streams.is_empty() {
        result.warn("streams: none configured");
    }
    if config.streams.len() > MAX_STREAMS {
        result.error(format!(
            "streams: {} configured, at most {} can be attached",
            config.streams.len(),
            MAX_STREAMS
        ));
    }

    for (i, stream) in config.streams.iter().enumerate() {
        let name = format!("streams[{}]", i);

        if let Err(e) = stream.addr() {
            result.error(format!("{}: {}", name, e));
            continue;
        }

        match stream.kind {
            StreamKind::Ethernet if stream.interface.is_none() => {
                result.error(format!("{}: ethernet streams require an interface", name));
            }
            StreamKind::Udp | StreamKind::Tcp if stream.port.is_none() => {
                result.error(format!("{}: {:?} streams require a port", name, stream.kind));
            }
            StreamKind::File if stream.port.is_some() => {
                result.warn(format!("{}: port is ignored for file streams", name));
            }
            _ => {}
        }

        if let Ok(StreamAddr::Ethernet(mac)) = stream.addr() {
            if !mac.is_multicast() {
                result.warn(format!("{}: {} is not a multicast address", name, mac));
            }
        }
        if let Ok(StreamAddr::Udp(ip)) = stream.addr() {
            if !ip.is_multicast() {
                result.warn(format!("{}: {} is not a multicast group", name, ip));
            }
        }
    }
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    if !is_known_level(&config.logging.level) {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            config.logging.level
        ));
    }
    if !matches!(config.logging.format.as_str(), "pretty" | "compact" | "json") {
        result.warn(format!(
            "logging.format: unknown format '{}', using pretty",
            config.logging.format
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;

    fn make_config() -> Config {
        Config {
            streams: vec![stream("trace.pcap", StreamKind::File)],
            ..Default::default()
        }
    }

    fn stream(address: &str, kind: StreamKind) -> StreamConfig {
        StreamConfig {
            address: address.to_string(),
            kind,
            interface: None,
            port: None,
        }
    }

    #[test]
    fn test_valid_minimal_config() {
        let config = make_config();
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_zero_capacity() {
        let mut config = make_config();
        config.engine.capacity = 0;
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("engine.capacity")));
    }

    #[test]
    fn test_large_ring_warning() {
        let mut config = make_config();
        config.engine.capacity = 1_000_000;
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.iter().any(|w| w.contains("1 GiB")));
    }

    #[test]
    fn test_bad_delay() {
        for delay in [-1.0, f64::NAN, f64::INFINITY] {
            let mut config = make_config();
            config.engine.delay = delay;
            assert!(validate(&config).errors.iter().any(|e| e.contains("engine.delay")));
        }
    }

    #[test]
    fn test_detach_after_zero() {
        let mut config = make_config();
        config.engine.detach_after = Some(0);
        assert!(validate(&config).has_errors());
    }

    #[test]
    fn test_too_many_streams() {
        let mut config = make_config();
        config.streams = (0..5)
            .map(|i| stream(&format!("trace{i}.pcap"), StreamKind::File))
            .collect();
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("at most 4")));
    }

    #[test]
    fn test_no_streams_warning() {
        let config = Config::default();
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.iter().any(|w| w.contains("none configured")));
    }

    #[test]
    fn test_ethernet_requires_interface() {
        let mut config = make_config();
        config
            .streams
            .push(stream("01:00:5e:00:00:01", StreamKind::Ethernet));
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("require an interface")));

        config.streams[1].interface = Some("eth0".to_string());
        assert!(!validate(&config).has_errors());
    }

    #[test]
    fn test_udp_requires_port() {
        let mut config = make_config();
        config.streams.push(stream("225.10.11.10", StreamKind::Udp));
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("require a port")));

        config.streams[1].port = Some(4000);
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_unicast_udp_group_warning() {
        let mut config = make_config();
        let mut udp = stream("10.0.0.1", StreamKind::Udp);
        udp.port = Some(4000);
        config.streams.push(udp);
        let result = validate(&config);
        assert!(result.warnings.iter().any(|w| w.contains("not a multicast group")));
    }

    #[test]
    fn test_invalid_address() {
        let mut config = make_config();
        config.streams.push(stream("not-an-ip", StreamKind::Tcp));
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("streams[1]")));
    }

    #[test]
    fn test_unknown_log_settings() {
        let mut config = make_config();
        config.logging.level = "verbose".to_string();
        config.logging.format = "xml".to_string();
        let result = validate(&config);
        assert!(!result.has_errors());
        assert_eq!(result.warnings.len(), 2);
    }
}
