//! Cost accounting for discrete theme switches.
//!
//! The profiler keeps its own [`FrameRateMeter`] and history, independent of
//! the degradation loop, and derives a second, theme-specific set of adaptive
//! hints from them.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::ProfilerConfig, runtime::RuntimeSignalSource, sampler::FrameRateMeter, GovernorError,
    Result,
};

/// Opaque token returned by [`ThemeTransitionProfiler::start_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionHandle(u64);

impl TransitionHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Measurements for one finished theme switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeTransitionRecord {
    pub start_time_ms: f64,
    pub end_time_ms: f64,
    pub duration_ms: f64,
    pub fps_before: f32,
    pub fps_after: f32,
    /// Mean of `fps_before` and `fps_after`; no frames are sampled in between.
    pub fps_during_estimate: f32,
    /// Heap growth over the transition, when the heap is observable.
    pub memory_delta_bytes: Option<i64>,
    pub elements_transitioned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl PerformanceLevel {
    pub fn from_frame_rate(fps: f32) -> Self {
        if fps >= 55.0 {
            Self::Excellent
        } else if fps >= 45.0 {
            Self::Good
        } else if fps >= 30.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub transitions: usize,
    pub average_duration_ms: f64,
    pub average_frame_rate: f32,
    pub frame_drops: usize,
    pub performance_level: PerformanceLevel,
    pub recommendations: Vec<String>,
}

/// Theme-switch specific degradation hints, thresholded on frame rate alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveConfiguration {
    pub should_reduce_animations: bool,
    pub should_disable_parallax: bool,
    pub should_shorten_durations: bool,
    pub should_simplify_transitions: bool,
    pub max_concurrent_animations: usize,
}

impl AdaptiveConfiguration {
    pub fn for_frame_rate(fps: f32) -> Self {
        let max_concurrent_animations = if fps < 30.0 {
            1
        } else if fps < 35.0 {
            2
        } else if fps < 40.0 {
            3
        } else if fps < 45.0 {
            4
        } else {
            6
        };

        Self {
            should_reduce_animations: fps < 45.0,
            should_disable_parallax: fps < 40.0,
            should_shorten_durations: fps < 35.0,
            should_simplify_transitions: fps < 30.0,
            max_concurrent_animations,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingTransition {
    start_time_ms: f64,
    fps_before: f32,
    initial_memory: Option<u64>,
    elements: usize,
}

pub struct ThemeTransitionProfiler {
    source: Arc<dyn RuntimeSignalSource>,
    config: ProfilerConfig,
    meter: FrameRateMeter,
    pending: HashMap<u64, PendingTransition>,
    next_handle: u64,
    history: VecDeque<ThemeTransitionRecord>,
    monitoring: bool,
}

impl ThemeTransitionProfiler {
    pub fn new(source: Arc<dyn RuntimeSignalSource>, config: ProfilerConfig) -> Self {
        Self {
            meter: FrameRateMeter::new(config.fps_window_ms),
            history: VecDeque::with_capacity(config.max_records),
            source,
            config,
            pending: HashMap::new(),
            next_handle: 0,
            monitoring: false,
        }
    }

    pub fn start_monitoring(&mut self) {
        if self.monitoring {
            return;
        }
        self.meter.restart(self.source.now_ms());
        self.monitoring = true;
    }

    pub fn stop_monitoring(&mut self) {
        self.monitoring = false;
    }

    /// Counts one frame. Returns the new fps when a window closes.
    pub fn on_frame(&mut self) -> Option<f32> {
        if !self.monitoring {
            return None;
        }
        self.meter.record_frame(self.source.now_ms())
    }

    pub fn current_fps(&self) -> f32 {
        self.meter.fps()
    }

    pub fn start_transition(&mut self, elements_count: usize) -> TransitionHandle {
        let handle = TransitionHandle(self.next_handle);
        self.next_handle += 1;

        let pending = PendingTransition {
            start_time_ms: self.source.now_ms(),
            fps_before: self.current_fps(),
            initial_memory: self.source.memory().map(|memory| memory.used_heap_bytes()),
            elements: elements_count,
        };
        tracing::debug!(handle = handle.0, elements_count, "theme transition started");
        self.pending.insert(handle.0, pending);
        handle
    }

    /// Finalises a transition and appends it to the history, evicting the
    /// oldest record once the retention limit is reached.
    pub fn end_transition(&mut self, handle: TransitionHandle) -> Result<ThemeTransitionRecord> {
        let pending = self
            .pending
            .remove(&handle.0)
            .ok_or(GovernorError::UnknownTransition(handle.0))?;

        let end_time_ms = self.source.now_ms();
        let fps_after = self.current_fps();
        let memory_delta_bytes = match (pending.initial_memory, self.source.memory()) {
            (Some(initial), Some(memory)) => {
                Some(memory.used_heap_bytes() as i64 - initial as i64)
            }
            _ => None,
        };

        let record = ThemeTransitionRecord {
            start_time_ms: pending.start_time_ms,
            end_time_ms,
            duration_ms: end_time_ms - pending.start_time_ms,
            fps_before: pending.fps_before,
            fps_after,
            fps_during_estimate: (pending.fps_before + fps_after) / 2.0,
            memory_delta_bytes,
            elements_transitioned: pending.elements,
        };

        if record.duration_ms > self.config.slow_transition_ms {
            tracing::warn!(
                duration_ms = record.duration_ms,
                elements = record.elements_transitioned,
                "slow theme transition"
            );
        }

        if self.history.len() == self.config.max_records {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());
        Ok(record)
    }

    pub fn history(&self) -> impl Iterator<Item = &ThemeTransitionRecord> {
        self.history.iter()
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        let transitions = self.history.len();
        let average_duration_ms = if transitions == 0 {
            0.0
        } else {
            self.history.iter().map(|r| r.duration_ms).sum::<f64>() / transitions as f64
        };
        let average_frame_rate = self.average_frame_rate();
        let frame_drops = self
            .history
            .iter()
            .filter(|r| r.fps_during_estimate < self.config.frame_drop_fps)
            .count();

        let mut recommendations = Vec::new();
        if average_duration_ms > self.config.slow_transition_ms {
            recommendations.push(format!(
                "Theme transitions are taking longer than expected ({average_duration_ms:.0}ms on average); \
                 transition fewer elements or shorten the transition."
            ));
        }
        if average_frame_rate < 45.0 {
            recommendations.push(format!(
                "Frame rate is low during theme transitions ({average_frame_rate:.0} fps); \
                 simplify the transition effects."
            ));
        }
        if frame_drops > self.config.frame_drop_limit {
            recommendations.push(format!(
                "Frequent frame drops detected ({frame_drops} transitions below {:.0} fps); \
                 disable parallax while switching themes.",
                self.config.frame_drop_fps
            ));
        }

        PerformanceSummary {
            transitions,
            average_duration_ms,
            average_frame_rate,
            frame_drops,
            performance_level: PerformanceLevel::from_frame_rate(average_frame_rate),
            recommendations,
        }
    }

    pub fn adaptive_configuration(&self) -> AdaptiveConfiguration {
        AdaptiveConfiguration::for_frame_rate(self.average_frame_rate())
    }

    // Mean of the per-record estimates; the live meter before any record.
    fn average_frame_rate(&self) -> f32 {
        if !self.history.is_empty() {
            return self
                .history
                .iter()
                .map(|r| r.fps_during_estimate)
                .sum::<f32>()
                / self.history.len() as f32;
        }
        self.current_fps()
    }
}

impl std::fmt::Debug for ThemeTransitionProfiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeTransitionProfiler")
            .field("monitoring", &self.monitoring)
            .field("current_fps", &self.meter.fps())
            .field("pending", &self.pending.len())
            .field("history", &self.history.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualRuntime;

    fn profiler_for(runtime: &Arc<ManualRuntime>) -> ThemeTransitionProfiler {
        ThemeTransitionProfiler::new(runtime.clone(), ProfilerConfig::default())
    }

    fn run_frames(profiler: &mut ThemeTransitionProfiler, runtime: &ManualRuntime, ms: f64, n: usize) {
        for _ in 0..n {
            runtime.advance(ms);
            profiler.on_frame();
        }
    }

    #[test]
    fn slow_transition_yields_recommendation() {
        let runtime = Arc::new(ManualRuntime::new());
        let mut profiler = profiler_for(&runtime);

        let handle = profiler.start_transition(4);
        runtime.advance(600.0);
        let record = profiler.end_transition(handle).unwrap();

        assert_eq!(record.duration_ms, 600.0);
        assert_eq!(record.elements_transitioned, 4);
        let summary = profiler.performance_summary();
        assert!(summary
            .recommendations
            .iter()
            .any(|r| r.contains("taking longer than expected")));
        assert_eq!(summary.performance_level, PerformanceLevel::Excellent);
    }

    #[test]
    fn fps_during_is_the_before_after_mean() {
        let runtime = Arc::new(ManualRuntime::new());
        let mut profiler = profiler_for(&runtime);
        profiler.start_monitoring();

        let handle = profiler.start_transition(10);
        // One second at 40 fps drags the meter from its default 60 to 40.
        run_frames(&mut profiler, &runtime, 25.0, 40);
        let record = profiler.end_transition(handle).unwrap();

        assert_eq!(record.fps_before, 60.0);
        assert!((record.fps_after - 40.0).abs() < 0.01);
        assert!((record.fps_during_estimate - 50.0).abs() < 0.01);
    }

    #[test]
    fn memory_delta_needs_the_heap_capability() {
        let runtime = Arc::new(ManualRuntime::new().with_heap(1_000, 10_000));
        let mut profiler = profiler_for(&runtime);
        let handle = profiler.start_transition(1);
        runtime.set_heap_used(1_500);
        assert_eq!(profiler.end_transition(handle).unwrap().memory_delta_bytes, Some(500));

        let bare = Arc::new(ManualRuntime::new());
        let mut profiler = profiler_for(&bare);
        let handle = profiler.start_transition(1);
        assert_eq!(profiler.end_transition(handle).unwrap().memory_delta_bytes, None);
    }

    #[test]
    fn unknown_or_reused_handle_is_an_error() {
        let runtime = Arc::new(ManualRuntime::new());
        let mut profiler = profiler_for(&runtime);
        let handle = profiler.start_transition(1);
        profiler.end_transition(handle).unwrap();

        let err = profiler.end_transition(handle).unwrap_err();
        assert!(matches!(err, GovernorError::UnknownTransition(0)));
    }

    #[test]
    fn history_is_bounded() {
        let runtime = Arc::new(ManualRuntime::new());
        let mut profiler = ThemeTransitionProfiler::new(
            runtime.clone(),
            ProfilerConfig {
                max_records: 3,
                ..Default::default()
            },
        );

        for elements in 0..5 {
            let handle = profiler.start_transition(elements);
            profiler.end_transition(handle).unwrap();
        }

        let kept: Vec<usize> = profiler.history().map(|r| r.elements_transitioned).collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn frame_drops_trigger_their_own_recommendation() {
        let runtime = Arc::new(ManualRuntime::new());
        let mut profiler = profiler_for(&runtime);
        profiler.start_monitoring();
        // One second at 25ms per frame settles the meter at 40 fps.
        run_frames(&mut profiler, &runtime, 25.0, 40);

        for _ in 0..12 {
            let handle = profiler.start_transition(2);
            profiler.end_transition(handle).unwrap();
        }

        let summary = profiler.performance_summary();
        assert_eq!(summary.frame_drops, 12);
        assert_eq!(summary.performance_level, PerformanceLevel::Fair);
        assert_eq!(summary.recommendations.len(), 2);
        assert!(summary.recommendations[1].contains("frame drops"));
    }

    #[test]
    fn summary_reflects_transitions_not_ambient_frame_rate() {
        let runtime = Arc::new(ManualRuntime::new());
        let mut profiler = profiler_for(&runtime);
        profiler.start_monitoring();
        run_frames(&mut profiler, &runtime, 1_000.0 / 60.0, 30 * 60);

        // Each transition spans a 60 -> 20 fps or 20 -> 60 fps swing.
        let handle = profiler.start_transition(12);
        run_frames(&mut profiler, &runtime, 50.0, 50);
        profiler.end_transition(handle).unwrap();
        let handle = profiler.start_transition(12);
        run_frames(&mut profiler, &runtime, 1_000.0 / 60.0, 120);
        profiler.end_transition(handle).unwrap();

        for record in profiler.history() {
            assert!((record.fps_during_estimate - 40.0).abs() < 1.0);
        }
        let summary = profiler.performance_summary();
        assert!((summary.average_frame_rate - 40.0).abs() < 1.0);
        assert_eq!(summary.performance_level, PerformanceLevel::Fair);
        assert_eq!(summary.frame_drops, 2);
        assert!(summary
            .recommendations
            .iter()
            .any(|r| r.contains("Frame rate is low")));
        assert!(profiler.adaptive_configuration().should_reduce_animations);
    }

    #[test]
    fn adaptive_configuration_tiers() {
        let smooth = AdaptiveConfiguration::for_frame_rate(58.0);
        assert!(!smooth.should_reduce_animations);
        assert_eq!(smooth.max_concurrent_animations, 6);

        let choppy = AdaptiveConfiguration::for_frame_rate(38.0);
        assert!(choppy.should_reduce_animations);
        assert!(choppy.should_disable_parallax);
        assert!(!choppy.should_shorten_durations);

        let poor = AdaptiveConfiguration::for_frame_rate(20.0);
        assert!(poor.should_simplify_transitions);
        assert_eq!(poor.max_concurrent_animations, 1);
    }
}
