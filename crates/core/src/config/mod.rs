use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{GovernorError, Result};

/// Top-level configuration structure for the governor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub sampler: SamplerConfig,
    pub policy: PolicyConfig,
    pub alerts: AlertConfig,
    pub profiler: ProfilerConfig,
}

impl GovernorConfig {
    /// Parses a JSON document. Missing sections and fields fall back to their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.sampler.validate()?;
        self.policy.validate()?;
        self.alerts.validate()?;
        self.profiler.validate()
    }
}

/// Settings for the signal sampler and the device-capability estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Length of the frame counting window used to derive fps.
    pub fps_window_ms: f64,
    /// Cadence of the heap-usage poll.
    pub memory_poll_interval_ms: f64,
    pub min_fps: f32,
    pub max_concurrent_animations: usize,
    pub low_end_min_fps: f32,
    pub low_end_max_concurrent: usize,
    /// Devices with at most this many logical cores count as low-end.
    pub low_end_max_cores: u32,
    /// Devices with at most this much memory count as low-end.
    pub low_end_max_memory_gb: f32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            fps_window_ms: 1_000.0,
            memory_poll_interval_ms: 5_000.0,
            min_fps: 45.0,
            max_concurrent_animations: 12,
            low_end_min_fps: 30.0,
            low_end_max_concurrent: 3,
            low_end_max_cores: 2,
            low_end_max_memory_gb: 2.0,
        }
    }
}

impl SamplerConfig {
    fn validate(&self) -> Result<()> {
        if self.fps_window_ms <= 0.0 {
            return Err(GovernorError::invalid_config(
                "sampler.fps_window_ms must be positive",
            ));
        }
        if self.memory_poll_interval_ms <= 0.0 {
            return Err(GovernorError::invalid_config(
                "sampler.memory_poll_interval_ms must be positive",
            ));
        }
        if self.max_concurrent_animations == 0 || self.low_end_max_concurrent == 0 {
            return Err(GovernorError::invalid_config(
                "sampler concurrency caps must allow at least one animation",
            ));
        }
        Ok(())
    }
}

/// Thresholds of the degradation policy. Each tier lists the conditions that
/// push the target level to that tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Number of fps samples averaged by the policy engine.
    pub history_len: usize,
    pub critical_fps: f32,
    pub critical_memory_ratio: f32,
    pub severe_fps: f32,
    pub severe_memory_ratio: f32,
    pub severe_battery_level: f32,
    pub mild_fps: f32,
    pub mild_memory_ratio: f32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            history_len: 10,
            critical_fps: 30.0,
            critical_memory_ratio: 0.9,
            severe_fps: 45.0,
            severe_memory_ratio: 0.7,
            severe_battery_level: 0.2,
            mild_fps: 55.0,
            mild_memory_ratio: 0.5,
        }
    }
}

impl PolicyConfig {
    fn validate(&self) -> Result<()> {
        if self.history_len == 0 {
            return Err(GovernorError::invalid_config(
                "policy.history_len must be at least 1",
            ));
        }
        if !(self.critical_fps <= self.severe_fps && self.severe_fps <= self.mild_fps) {
            return Err(GovernorError::invalid_config(
                "policy fps thresholds must satisfy critical <= severe <= mild",
            ));
        }
        if !(self.mild_memory_ratio <= self.severe_memory_ratio
            && self.severe_memory_ratio <= self.critical_memory_ratio)
        {
            return Err(GovernorError::invalid_config(
                "policy memory thresholds must satisfy mild <= severe <= critical",
            ));
        }
        Ok(())
    }
}

/// Thresholds of the alert bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Below this fps a high severity alert fires.
    pub fps_high: f32,
    /// Below this fps (and at or above `fps_high`) a medium alert fires.
    pub fps_medium: f32,
    pub memory_high_ratio: f32,
    pub battery_high_level: f32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            fps_high: 30.0,
            fps_medium: 45.0,
            memory_high_ratio: 0.8,
            battery_high_level: 0.15,
        }
    }
}

impl AlertConfig {
    fn validate(&self) -> Result<()> {
        if !(self.fps_high <= self.fps_medium) {
            return Err(GovernorError::invalid_config(
                "alert fps thresholds must satisfy high <= medium",
            ));
        }
        if !(0.0..=1.0).contains(&self.memory_high_ratio)
            || !(0.0..=1.0).contains(&self.battery_high_level)
        {
            return Err(GovernorError::invalid_config(
                "alert memory and battery thresholds must lie in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Settings of the theme-transition profiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Retained transition records; older records are evicted first.
    pub max_records: usize,
    pub fps_window_ms: f64,
    pub slow_transition_ms: f64,
    /// Transitions whose estimated fps falls below this count as a frame drop.
    pub frame_drop_fps: f32,
    pub frame_drop_limit: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            max_records: 50,
            fps_window_ms: 1_000.0,
            slow_transition_ms: 500.0,
            frame_drop_fps: 50.0,
            frame_drop_limit: 10,
        }
    }
}

impl ProfilerConfig {
    fn validate(&self) -> Result<()> {
        if self.max_records == 0 {
            return Err(GovernorError::invalid_config(
                "profiler.max_records must be at least 1",
            ));
        }
        if self.fps_window_ms <= 0.0 {
            return Err(GovernorError::invalid_config(
                "profiler.fps_window_ms must be positive",
            ));
        }
        Ok(())
    }
}
