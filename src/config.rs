//! Simulation configuration.
//!
//! This module provides YAML/JSON configuration file support for defining
//! simulations declaratively, plus a builder for programmatic setup.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! debug: false
//! terminal_count: 4
//! router_radix: 3
//! packet_length: 4
//! topology:
//!   type: ring
//!   size: 4
//! channel_delay: 1
//! input_buf_size: 100
//! max_cycles: 10000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::topology::{TopologyConfig, TopologyError};
use crate::types::Cycle;

/// Errors that can occur while loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

fn default_terminal_count() -> usize {
    4
}

fn default_router_radix() -> usize {
    3
}

fn default_packet_length() -> u64 {
    4
}

fn default_channel_delay() -> Cycle {
    1
}

fn default_input_buf_size() -> usize {
    100
}

fn default_max_cycles() -> Option<Cycle> {
    Some(10_000)
}

/// Construction parameters for a simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    /// Enable per-event tracing.
    #[serde(default)]
    pub debug: bool,

    /// Number of source/destination pairs (and, for a ring, routers).
    #[serde(default = "default_terminal_count")]
    pub terminal_count: usize,

    /// Ports per router; the ring uses 3.
    #[serde(default = "default_router_radix")]
    pub router_radix: usize,

    /// Flits per packet: one head, `packet_length - 2` bodies, one tail.
    #[serde(default = "default_packet_length")]
    pub packet_length: u64,

    /// Network shape.
    #[serde(default)]
    pub topology: TopologyConfig,

    /// Per-channel propagation delay in cycles.
    #[serde(default = "default_channel_delay")]
    pub channel_delay: Cycle,

    /// Input buffer depth per port, and the initial credit count of the
    /// upstream output unit.
    #[serde(default = "default_input_buf_size")]
    pub input_buf_size: usize,

    /// Packets each source injects before going quiet; `None` keeps the
    /// offered load infinite.
    #[serde(default)]
    pub max_packets: Option<u64>,

    /// Horizon for the driver loop; `None` runs until the event queue
    /// drains.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: Option<Cycle>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            debug: false,
            terminal_count: default_terminal_count(),
            router_radix: default_router_radix(),
            packet_length: default_packet_length(),
            topology: TopologyConfig::default(),
            channel_delay: default_channel_delay(),
            input_buf_size: default_input_buf_size(),
            max_packets: None,
            max_cycles: default_max_cycles(),
        }
    }
}

impl SimConfig {
    /// Creates the default configuration: a ring of four routers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting the format by
    /// extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let content = std::fs::read_to_string(path)?;

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "json" => Self::from_json(&content),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Converts to a YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.terminal_count == 0 {
            return Err(ConfigError::Validation(
                "terminal_count must be at least 1".to_string(),
            ));
        }
        if self.router_radix == 0 {
            return Err(ConfigError::Validation(
                "router_radix must be at least 1".to_string(),
            ));
        }
        if self.packet_length < 2 {
            return Err(ConfigError::Validation(
                "packet_length must be at least 2 (head and tail)".to_string(),
            ));
        }
        if self.channel_delay < 1 {
            return Err(ConfigError::Validation(
                "channel_delay must be at least 1".to_string(),
            ));
        }
        if self.input_buf_size < 1 {
            return Err(ConfigError::Validation(
                "input_buf_size must be at least 1".to_string(),
            ));
        }
        if let TopologyConfig::Ring { size } = self.topology {
            if size != self.terminal_count {
                return Err(ConfigError::Validation(format!(
                    "ring size {} does not match terminal_count {}",
                    size, self.terminal_count
                )));
            }
            if self.router_radix != 3 {
                return Err(ConfigError::Validation(format!(
                    "a ring needs router_radix 3, got {}",
                    self.router_radix
                )));
            }
        }
        Ok(())
    }
}

/// Builder for creating a [`SimConfig`] programmatically.
///
/// # Example
///
/// ```
/// use nocsim::config::SimConfigBuilder;
///
/// let config = SimConfigBuilder::new()
///     .terminal_count(4)
///     .packet_length(3)
///     .input_buf_size(3)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.packet_length, 3);
/// ```
#[derive(Debug, Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
    topology_set: bool,
}

impl SimConfigBuilder {
    /// Creates a builder seeded with the defaults.
    pub fn new() -> Self {
        Self {
            config: SimConfig::default(),
            topology_set: false,
        }
    }

    /// Enables per-event tracing.
    pub fn debug(mut self, enable: bool) -> Self {
        self.config.debug = enable;
        self
    }

    /// Sets the number of terminal pairs. Unless a topology was set
    /// explicitly, the ring is resized to match.
    pub fn terminal_count(mut self, count: usize) -> Self {
        self.config.terminal_count = count;
        self
    }

    /// Sets the per-router radix.
    pub fn router_radix(mut self, radix: usize) -> Self {
        self.config.router_radix = radix;
        self
    }

    /// Sets the flits-per-packet cadence.
    pub fn packet_length(mut self, length: u64) -> Self {
        self.config.packet_length = length;
        self
    }

    /// Selects the topology explicitly.
    pub fn topology(mut self, topology: TopologyConfig) -> Self {
        self.config.topology = topology;
        self.topology_set = true;
        self
    }

    /// Sets the channel propagation delay.
    pub fn channel_delay(mut self, delay: Cycle) -> Self {
        self.config.channel_delay = delay;
        self
    }

    /// Sets the input buffer depth (and initial credit count).
    pub fn input_buf_size(mut self, size: usize) -> Self {
        self.config.input_buf_size = size;
        self
    }

    /// Bounds the packets each source injects.
    pub fn max_packets(mut self, packets: Option<u64>) -> Self {
        self.config.max_packets = packets;
        self
    }

    /// Sets the driver horizon.
    pub fn max_cycles(mut self, cycles: Option<Cycle>) -> Self {
        self.config.max_cycles = cycles;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(mut self) -> ConfigResult<SimConfig> {
        if !self.topology_set {
            self.config.topology = TopologyConfig::Ring {
                size: self.config.terminal_count,
            };
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::new();
        assert_eq!(config.terminal_count, 4);
        assert_eq!(config.router_radix, 3);
        assert_eq!(config.packet_length, 4);
        assert_eq!(config.channel_delay, 1);
        assert_eq!(config.input_buf_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
debug: true
terminal_count: 8
packet_length: 3
topology:
  type: ring
  size: 8
channel_delay: 2
input_buf_size: 4
max_packets: 10
"#;
        let config = SimConfig::from_yaml(yaml).unwrap();
        assert!(config.debug);
        assert_eq!(config.terminal_count, 8);
        assert_eq!(config.packet_length, 3);
        assert_eq!(config.channel_delay, 2);
        assert_eq!(config.input_buf_size, 4);
        assert_eq!(config.max_packets, Some(10));
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{
            "terminal_count": 4,
            "topology": {"type": "ring", "size": 4}
        }"#;
        let config = SimConfig::from_json(json).unwrap();
        assert_eq!(config.terminal_count, 4);
    }

    #[test]
    fn test_validation_ring_size_mismatch() {
        let yaml = r#"
terminal_count: 4
topology:
  type: ring
  size: 8
"#;
        assert!(SimConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validation_packet_length() {
        let config = SimConfigBuilder::new().packet_length(1).build();
        assert!(config.is_err());
    }

    #[test]
    fn test_validation_zero_buffer() {
        let config = SimConfigBuilder::new().input_buf_size(0).build();
        assert!(config.is_err());
    }

    #[test]
    fn test_builder_resizes_ring() {
        let config = SimConfigBuilder::new().terminal_count(6).build().unwrap();
        assert_eq!(config.topology, TopologyConfig::Ring { size: 6 });
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = SimConfigBuilder::new()
            .terminal_count(4)
            .max_packets(Some(2))
            .build()
            .unwrap();
        let yaml = config.to_yaml().unwrap();
        let back = SimConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.terminal_count, back.terminal_count);
        assert_eq!(config.max_packets, back.max_packets);
    }
}
