//! Configuration system for simulation runs.
//!
//! This module provides YAML/JSON configuration file support for defining
//! simulations declaratively.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   max_time: 10000
//!   input_buf_size: 8
//!   channel_delay: 1
//!   packet_length: 4
//!   packets_per_source: 1
//!
//! topology:
//!   kind: ring
//!   k: 4
//!
//! traffic:
//!   pattern:
//!     shift:
//!       offset: 2
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::terminal::TrafficPattern;
use crate::topology::TopoDesc;
use crate::types::SimTime;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Global simulation parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimParams {
    /// The run stops once the next event lies past this time.
    #[serde(default = "default_max_time")]
    pub max_time: SimTime,

    /// Optional cap on the number of processed events.
    #[serde(default)]
    pub max_events: Option<u64>,

    /// Capacity of every input FIFO; also the initial credit count of every
    /// output unit.
    #[serde(default = "default_input_buf_size")]
    pub input_buf_size: usize,

    /// Link delay of every channel, in cycles.
    #[serde(default = "default_channel_delay")]
    pub channel_delay: SimTime,

    /// Flits per packet (head + bodies + tail).
    #[serde(default = "default_packet_length")]
    pub packet_length: u64,

    /// Packets each source emits before going quiet; unlimited if absent.
    #[serde(default)]
    pub packets_per_source: Option<u64>,
}

fn default_max_time() -> SimTime {
    10_000
}

fn default_input_buf_size() -> usize {
    8
}

fn default_channel_delay() -> SimTime {
    1
}

fn default_packet_length() -> u64 {
    4
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            max_time: default_max_time(),
            max_events: None,
            input_buf_size: default_input_buf_size(),
            channel_delay: default_channel_delay(),
            packet_length: default_packet_length(),
            packets_per_source: None,
        }
    }
}

/// Which regular topology to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopoKind {
    Ring,
    Torus,
}

/// Topology section of a configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub kind: TopoKind,
    /// Nodes per dimension.
    pub k: usize,
    /// Number of dimensions (rings are always 1).
    #[serde(default = "default_dimensions")]
    pub r: usize,
}

fn default_dimensions() -> usize {
    1
}

impl TopologyConfig {
    pub fn desc(&self) -> TopoDesc {
        TopoDesc::torus(self.k, self.r)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.k < 2 {
            return Err(ConfigError::Validation(format!(
                "topology needs at least 2 nodes per dimension, got k={}",
                self.k
            )));
        }
        if self.r < 1 {
            return Err(ConfigError::Validation(
                "topology needs at least one dimension".to_string(),
            ));
        }
        if self.kind == TopoKind::Ring && self.r != 1 {
            return Err(ConfigError::Validation(format!(
                "a ring is one-dimensional, got r={}",
                self.r
            )));
        }
        Ok(())
    }
}

/// Traffic section of a configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TrafficConfig {
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub pattern: TrafficPattern,
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimParams,

    pub topology: TopologyConfig,

    #[serde(default)]
    pub traffic: TrafficConfig,
}

impl SimConfig {
    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a file, auto-detecting the format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Converts to a YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to a JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.topology.validate()?;

        let sim = &self.simulation;
        if sim.input_buf_size < 1 {
            return Err(ConfigError::Validation(
                "input_buf_size must be at least 1".to_string(),
            ));
        }
        if sim.channel_delay < 1 {
            return Err(ConfigError::Validation(
                "channel_delay must be at least 1 cycle".to_string(),
            ));
        }
        if sim.packet_length < 2 {
            return Err(ConfigError::Validation(format!(
                "packet_length must cover a head and a tail, got {}",
                sim.packet_length
            )));
        }

        let num_nodes = self.topology.desc().num_nodes();
        match self.traffic.pattern {
            TrafficPattern::Fixed { dest } if dest >= num_nodes => {
                return Err(ConfigError::Validation(format!(
                    "traffic destination {} out of range for {} terminals",
                    dest, num_nodes
                )));
            }
            TrafficPattern::Shift { offset } if offset >= num_nodes => {
                tracing::warn!(
                    "traffic shift offset {} wraps around {} terminals",
                    offset,
                    num_nodes
                );
            }
            _ => {}
        }

        Ok(())
    }
}

/// Builder for creating a `SimConfig` programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    simulation: SimParams,
    topology: Option<TopologyConfig>,
    traffic: TrafficConfig,
}

impl SimConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects a bidirectional ring of `k` routers.
    pub fn ring(mut self, k: usize) -> Self {
        self.topology = Some(TopologyConfig {
            kind: TopoKind::Ring,
            k,
            r: 1,
        });
        self
    }

    /// Selects a k-ary r-cube torus.
    pub fn torus(mut self, k: usize, r: usize) -> Self {
        self.topology = Some(TopologyConfig {
            kind: TopoKind::Torus,
            k,
            r,
        });
        self
    }

    pub fn max_time(mut self, time: SimTime) -> Self {
        self.simulation.max_time = time;
        self
    }

    pub fn max_events(mut self, events: u64) -> Self {
        self.simulation.max_events = Some(events);
        self
    }

    pub fn input_buf_size(mut self, size: usize) -> Self {
        self.simulation.input_buf_size = size;
        self
    }

    pub fn channel_delay(mut self, delay: SimTime) -> Self {
        self.simulation.channel_delay = delay;
        self
    }

    pub fn packet_length(mut self, length: u64) -> Self {
        self.simulation.packet_length = length;
        self
    }

    pub fn packets_per_source(mut self, packets: u64) -> Self {
        self.simulation.packets_per_source = Some(packets);
        self
    }

    pub fn traffic(mut self, pattern: TrafficPattern) -> Self {
        self.traffic.pattern = pattern;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        let topology = self.topology.ok_or_else(|| {
            ConfigError::Validation("a topology section is required".to_string())
        })?;
        let config = SimConfig {
            simulation: self.simulation,
            topology,
            traffic: self.traffic,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = SimParams::default();
        assert_eq!(params.max_time, 10_000);
        assert_eq!(params.input_buf_size, 8);
        assert_eq!(params.channel_delay, 1);
        assert_eq!(params.packet_length, 4);
        assert!(params.packets_per_source.is_none());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
simulation:
  max_time: 5000
  input_buf_size: 4
  packets_per_source: 2

topology:
  kind: ring
  k: 4

traffic:
  pattern:
    fixed:
      dest: 2
"#;
        let config = SimConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.simulation.max_time, 5000);
        assert_eq!(config.simulation.input_buf_size, 4);
        assert_eq!(config.simulation.packets_per_source, Some(2));
        assert_eq!(config.topology.kind, TopoKind::Ring);
        assert_eq!(config.topology.k, 4);
        assert_eq!(config.traffic.pattern, TrafficPattern::Fixed { dest: 2 });
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{
            "topology": {"kind": "torus", "k": 3, "r": 2}
        }"#;
        let config = SimConfig::from_json(json).unwrap();
        assert_eq!(config.topology.kind, TopoKind::Torus);
        assert_eq!(config.topology.desc().num_nodes(), 9);
        // Omitted sections fall back to defaults.
        assert_eq!(config.simulation.packet_length, 4);
        assert_eq!(config.traffic.pattern, TrafficPattern::Shift { offset: 2 });
    }

    #[test]
    fn test_builder() {
        let config = SimConfigBuilder::new()
            .ring(4)
            .input_buf_size(8)
            .packet_length(4)
            .packets_per_source(1)
            .build()
            .unwrap();
        assert_eq!(config.topology.k, 4);
        assert_eq!(config.simulation.packets_per_source, Some(1));
    }

    #[test]
    fn test_builder_requires_topology() {
        assert!(SimConfigBuilder::new().build().is_err());
    }

    #[test]
    fn test_validation_rejects_tiny_packets() {
        let result = SimConfigBuilder::new().ring(4).packet_length(1).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_multi_dimensional_ring() {
        let yaml = r#"
topology:
  kind: ring
  k: 4
  r: 2
"#;
        assert!(SimConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_destination() {
        let result = SimConfigBuilder::new()
            .ring(4)
            .traffic(TrafficPattern::Fixed { dest: 9 })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = SimConfigBuilder::new()
            .torus(3, 2)
            .max_time(2000)
            .build()
            .unwrap();

        let yaml = config.to_yaml().unwrap();
        let restored = SimConfig::from_yaml(&yaml).unwrap();
        assert_eq!(restored.topology.k, 3);
        assert_eq!(restored.topology.r, 2);
        assert_eq!(restored.simulation.max_time, 2000);
    }
}
