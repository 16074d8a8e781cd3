//! Degradation policy: rolling fps history plus the latest snapshot in, a
//! hysteresis-damped level and its settings bundle out.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
    admission::Priority,
    config::PolicyConfig,
    sampler::{NetworkClass, SignalSnapshot},
};

/// Severity index from 0 (full fidelity) to 3 (minimum fidelity).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DegradationLevel(u8);

impl DegradationLevel {
    pub const NONE: Self = Self(0);
    pub const MILD: Self = Self(1);
    pub const SEVERE: Self = Self(2);
    pub const MAXIMUM: Self = Self(3);

    /// Builds a level, saturating at [`DegradationLevel::MAXIMUM`].
    pub fn new(value: u8) -> Self {
        Self(value.min(Self::MAXIMUM.0))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Moves one step toward `target`, or stays put when already there.
    pub fn step_toward(self, target: Self) -> Self {
        match self.0.cmp(&target.0) {
            std::cmp::Ordering::Less => Self(self.0 + 1),
            std::cmp::Ordering::Greater => Self(self.0 - 1),
            std::cmp::Ordering::Equal => self,
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What animation-producing callers are allowed to do at the current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradationSettings {
    pub disable_parallax: bool,
    pub reduce_complexity: bool,
    pub limit_concurrent_animations: usize,
    pub shorten_durations: bool,
    pub disable_hover_effects: bool,
    pub use_simple_fallbacks: bool,
}

impl Default for DegradationSettings {
    fn default() -> Self {
        Self::for_level(DegradationLevel::NONE, &SignalSnapshot::default())
    }
}

impl DegradationSettings {
    /// Settings table. The snapshot only matters at level 1, where a slow
    /// network also disables parallax.
    pub fn for_level(level: DegradationLevel, snapshot: &SignalSnapshot) -> Self {
        match level.value() {
            3 => Self {
                disable_parallax: true,
                reduce_complexity: true,
                limit_concurrent_animations: 1,
                shorten_durations: true,
                disable_hover_effects: true,
                use_simple_fallbacks: true,
            },
            2 => Self {
                disable_parallax: true,
                reduce_complexity: true,
                limit_concurrent_animations: 2,
                shorten_durations: true,
                disable_hover_effects: false,
                use_simple_fallbacks: true,
            },
            1 => Self {
                disable_parallax: snapshot.network_class == NetworkClass::Slow,
                reduce_complexity: true,
                limit_concurrent_animations: 4,
                shorten_durations: false,
                disable_hover_effects: false,
                use_simple_fallbacks: false,
            },
            _ => Self {
                disable_parallax: false,
                reduce_complexity: false,
                limit_concurrent_animations: 12,
                shorten_durations: false,
                disable_hover_effects: false,
                use_simple_fallbacks: false,
            },
        }
    }

    /// Whether a caller should drop an animation outright instead of asking
    /// for admission. Essential animations are never skipped.
    pub fn should_skip(&self, priority: Priority, essential: bool) -> bool {
        if essential {
            return false;
        }
        match priority {
            Priority::Low => self.use_simple_fallbacks,
            Priority::Medium => self.disable_hover_effects,
            Priority::High => false,
        }
    }

    /// Halves `duration_ms` when durations should be shortened.
    pub fn scale_duration(&self, duration_ms: f64) -> f64 {
        if self.shorten_durations {
            duration_ms * 0.5
        } else {
            duration_ms
        }
    }
}

/// Bounded fps history; the oldest sample is evicted on overflow.
#[derive(Debug, Clone)]
pub struct FpsHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl FpsHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, fps: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(fps);
    }

    /// Arithmetic mean, or `None` before the first sample.
    pub fn average(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Turns signal snapshots into a stable [`DegradationLevel`].
///
/// Each call to [`DegradationPolicyEngine::update_settings`] moves the level
/// at most one step toward the target, so reaching level 3 from level 0 takes
/// three updates no matter how bad the signals are.
#[derive(Debug, Clone)]
pub struct DegradationPolicyEngine {
    config: PolicyConfig,
    history: FpsHistory,
    level: DegradationLevel,
    settings: DegradationSettings,
}

impl Default for DegradationPolicyEngine {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

impl DegradationPolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            history: FpsHistory::new(config.history_len),
            config,
            level: DegradationLevel::NONE,
            settings: DegradationSettings::default(),
        }
    }

    /// Records the snapshot's fps, steps the level and recomputes the settings.
    pub fn update_settings(&mut self, snapshot: &SignalSnapshot) -> DegradationSettings {
        self.history.push(snapshot.fps);
        let target = self.target_level(snapshot);
        let next = self.level.step_toward(target);

        if next != self.level {
            tracing::info!(
                from = self.level.value(),
                to = next.value(),
                target = target.value(),
                avg_fps = self.average_fps(),
                "degradation level changed"
            );
        }

        self.level = next;
        self.settings = DegradationSettings::for_level(next, snapshot);
        self.settings
    }

    /// Level the signals call for, before hysteresis. Tiers are checked from
    /// most to least severe and the first match wins.
    pub fn target_level(&self, snapshot: &SignalSnapshot) -> DegradationLevel {
        let avg_fps = self.average_fps();
        let config = &self.config;

        if snapshot.is_low_end_device
            || avg_fps < config.critical_fps
            || snapshot.memory_usage_ratio > config.critical_memory_ratio
        {
            DegradationLevel::MAXIMUM
        } else if avg_fps < config.severe_fps
            || snapshot.memory_usage_ratio > config.severe_memory_ratio
            || snapshot.battery_level < config.severe_battery_level
        {
            DegradationLevel::SEVERE
        } else if avg_fps < config.mild_fps
            || snapshot.memory_usage_ratio > config.mild_memory_ratio
            || snapshot.network_class == NetworkClass::Slow
        {
            DegradationLevel::MILD
        } else {
            DegradationLevel::NONE
        }
    }

    pub fn level(&self) -> DegradationLevel {
        self.level
    }

    pub fn settings(&self) -> DegradationSettings {
        self.settings
    }

    /// Mean of the retained fps samples; 60 before any sample arrives.
    pub fn average_fps(&self) -> f32 {
        self.history.average().unwrap_or(60.0)
    }

    pub fn history(&self) -> &FpsHistory {
        &self.history
    }
}
