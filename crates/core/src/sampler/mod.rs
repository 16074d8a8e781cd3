//! Runtime health sampling.
//!
//! [`SignalSampler`] owns the live [`SignalSnapshot`]. Frame rate is measured
//! from the host's frame callback, heap usage is polled on an interval, and
//! network/battery readings arrive as change notifications. Every field update
//! is published to subscribers as a copy of the whole snapshot.

mod meter;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    bus::{Subscription, Topic},
    config::SamplerConfig,
    runtime::{Capabilities, RuntimeSignalSource},
    schedule::{Cadence, TaskScheduler},
};

pub use meter::FrameRateMeter;

/// Coarse connection quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
    Slow,
    Fast,
    #[default]
    Unknown,
}

impl NetworkClass {
    /// Maps an effective connection type string onto a class.
    pub fn from_effective_type(effective_type: &str) -> Self {
        match effective_type.trim().to_ascii_lowercase().as_str() {
            "slow-2g" | "2g" => Self::Slow,
            "3g" | "4g" => Self::Fast,
            _ => Self::Unknown,
        }
    }
}

/// Latest view of every health signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub fps: f32,
    /// Used heap as a fraction of the heap limit.
    pub memory_usage_ratio: f32,
    /// Battery charge in `[0, 1]`.
    pub battery_level: f32,
    pub network_class: NetworkClass,
    pub is_low_end_device: bool,
    pub animation_count: usize,
}

impl Default for SignalSnapshot {
    fn default() -> Self {
        Self {
            fps: 60.0,
            memory_usage_ratio: 0.0,
            battery_level: 1.0,
            network_class: NetworkClass::Unknown,
            is_low_end_device: false,
            animation_count: 0,
        }
    }
}

/// Thresholds the sampler applies to itself, tightened on low-end devices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerThresholds {
    pub min_fps: f32,
    pub max_concurrent_animations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SamplerTask {
    FrameTick,
    MemoryPoll,
}

pub struct SignalSampler {
    source: Arc<dyn RuntimeSignalSource>,
    config: SamplerConfig,
    capabilities: Capabilities,
    thresholds: SamplerThresholds,
    snapshot: SignalSnapshot,
    meter: FrameRateMeter,
    scheduler: TaskScheduler<SamplerTask>,
    network_changes: Option<flume::Receiver<String>>,
    battery_changes: Option<flume::Receiver<f32>>,
    topic: Topic<SignalSnapshot>,
    monitoring: bool,
}

impl SignalSampler {
    /// Probes the runtime once: capabilities, the device-class estimate and the
    /// initial network and battery readings.
    pub fn new(source: Arc<dyn RuntimeSignalSource>, config: SamplerConfig) -> Self {
        let capabilities = Capabilities::detect(source.as_ref());
        let is_low_end_device = detect_low_end(source.as_ref(), &config);

        let thresholds = if is_low_end_device {
            tracing::info!(
                cores = ?source.hardware_concurrency(),
                memory_gb = ?source.device_memory_gb(),
                "low-end device detected; tightening sampler thresholds"
            );
            SamplerThresholds {
                min_fps: config.low_end_min_fps,
                max_concurrent_animations: config.low_end_max_concurrent,
            }
        } else {
            SamplerThresholds {
                min_fps: config.min_fps,
                max_concurrent_animations: config.max_concurrent_animations,
            }
        };

        let mut snapshot = SignalSnapshot {
            is_low_end_device,
            ..Default::default()
        };

        let network_changes = source.network().map(|network| {
            snapshot.network_class = NetworkClass::from_effective_type(&network.effective_type());
            network.subscribe_changes()
        });
        let battery_changes = source.battery().map(|battery| {
            snapshot.battery_level = battery.level().clamp(0.0, 1.0);
            battery.subscribe_changes()
        });

        tracing::debug!(?capabilities, ?snapshot, "signal sampler created");

        Self {
            meter: FrameRateMeter::new(config.fps_window_ms),
            source,
            config,
            capabilities,
            thresholds,
            snapshot,
            scheduler: TaskScheduler::new(),
            network_changes,
            battery_changes,
            topic: Topic::new("signal-snapshot"),
            monitoring: false,
        }
    }

    /// Starts frame counting and, when the heap is observable, the memory
    /// poll. Calling it while already monitoring does nothing.
    pub fn start_monitoring(&mut self) {
        if self.monitoring {
            return;
        }

        let now = self.source.now_ms();
        self.meter.restart(now);
        self.scheduler
            .schedule(SamplerTask::FrameTick, Cadence::EveryFrame, now);
        if self.capabilities.memory {
            self.scheduler.schedule(
                SamplerTask::MemoryPoll,
                Cadence::Interval {
                    period_ms: self.config.memory_poll_interval_ms,
                },
                now,
            );
        }
        self.monitoring = true;
        tracing::info!(capabilities = ?self.capabilities, "signal monitoring started");
    }

    /// Cancels all sampling. The snapshot keeps its last values.
    pub fn stop_monitoring(&mut self) {
        if !self.monitoring {
            return;
        }
        self.scheduler.cancel_all();
        self.monitoring = false;
        tracing::info!("signal monitoring stopped");
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    /// Runs one frame's worth of sampling. Must be called from the host's
    /// frame callback. Returns one snapshot per field update, in the order the
    /// updates were applied; each has already been published to subscribers.
    pub fn on_frame(&mut self) -> Vec<SignalSnapshot> {
        if !self.monitoring {
            return Vec::new();
        }

        let mut updates = Vec::new();
        self.drain_change_events(&mut updates);

        let now = self.source.now_ms();
        for task in self.scheduler.due(now) {
            match task {
                SamplerTask::FrameTick => {
                    if let Some(fps) = self.meter.record_frame(now) {
                        tracing::debug!(fps, "frame rate measured");
                        self.snapshot.fps = fps;
                        updates.push(self.publish());
                    }
                }
                SamplerTask::MemoryPoll => {
                    if let Some(memory) = self.source.memory() {
                        self.snapshot.memory_usage_ratio = memory.usage_ratio();
                        updates.push(self.publish());
                    }
                }
            }
        }

        updates
    }

    /// Records how many animations are currently running. Publishes only when
    /// the count actually changes.
    pub fn set_animation_count(&mut self, count: usize) -> Option<SignalSnapshot> {
        if self.snapshot.animation_count == count {
            return None;
        }
        self.snapshot.animation_count = count;
        Some(self.publish())
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SignalSnapshot) + Send + Sync + 'static,
    {
        self.topic.subscribe(callback)
    }

    pub fn snapshot(&self) -> SignalSnapshot {
        self.snapshot
    }

    pub fn thresholds(&self) -> SamplerThresholds {
        self.thresholds
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// `true` when the latest fps reading is below the sampler's own floor.
    pub fn is_below_min_fps(&self) -> bool {
        self.snapshot.fps < self.thresholds.min_fps
    }

    /// Stops monitoring and drops every subscriber.
    pub fn dispose(&mut self) {
        self.stop_monitoring();
        self.topic.clear();
        self.network_changes = None;
        self.battery_changes = None;
    }

    fn drain_change_events(&mut self, updates: &mut Vec<SignalSnapshot>) {
        let network: Vec<String> = self
            .network_changes
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default();
        for effective_type in network {
            let class = NetworkClass::from_effective_type(&effective_type);
            tracing::debug!(%effective_type, ?class, "network class changed");
            self.snapshot.network_class = class;
            updates.push(self.publish());
        }

        let battery: Vec<f32> = self
            .battery_changes
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default();
        for level in battery {
            self.snapshot.battery_level = level.clamp(0.0, 1.0);
            updates.push(self.publish());
        }
    }

    fn publish(&self) -> SignalSnapshot {
        let snapshot = self.snapshot;
        self.topic.publish(&snapshot);
        snapshot
    }
}

impl std::fmt::Debug for SignalSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalSampler")
            .field("capabilities", &self.capabilities)
            .field("thresholds", &self.thresholds)
            .field("snapshot", &self.snapshot)
            .field("monitoring", &self.monitoring)
            .finish()
    }
}

fn detect_low_end(source: &dyn RuntimeSignalSource, config: &SamplerConfig) -> bool {
    let few_cores = source
        .hardware_concurrency()
        .map(|cores| cores <= config.low_end_max_cores)
        .unwrap_or(false);
    let little_memory = source
        .device_memory_gb()
        .map(|gigabytes| gigabytes <= config.low_end_max_memory_gb)
        .unwrap_or(false);
    few_cores || little_memory
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use super::*;
    use crate::runtime::ManualRuntime;

    fn sampler_for(runtime: &Arc<ManualRuntime>) -> SignalSampler {
        SignalSampler::new(runtime.clone(), SamplerConfig::default())
    }

    fn run_frames(sampler: &mut SignalSampler, runtime: &ManualRuntime, frame_ms: f64, n: usize) {
        for _ in 0..n {
            runtime.advance(frame_ms);
            sampler.on_frame();
        }
    }

    #[test]
    fn optimistic_defaults_without_capabilities() {
        let runtime = Arc::new(ManualRuntime::new());
        let sampler = sampler_for(&runtime);

        let snapshot = sampler.snapshot();
        assert_eq!(snapshot, SignalSnapshot::default());
        assert_eq!(sampler.thresholds().min_fps, 45.0);
        assert_eq!(sampler.thresholds().max_concurrent_animations, 12);
    }

    #[test]
    fn low_end_device_tightens_thresholds() {
        let runtime = Arc::new(ManualRuntime::new().with_hardware_concurrency(2));
        let sampler = sampler_for(&runtime);

        assert!(sampler.snapshot().is_low_end_device);
        assert_eq!(sampler.thresholds().min_fps, 30.0);
        assert_eq!(sampler.thresholds().max_concurrent_animations, 3);
    }

    #[test]
    fn small_memory_alone_marks_low_end() {
        let runtime = Arc::new(
            ManualRuntime::new()
                .with_hardware_concurrency(8)
                .with_device_memory_gb(2.0),
        );
        assert!(sampler_for(&runtime).snapshot().is_low_end_device);
    }

    #[test]
    fn maps_effective_connection_types() {
        assert_eq!(NetworkClass::from_effective_type("slow-2g"), NetworkClass::Slow);
        assert_eq!(NetworkClass::from_effective_type("2g"), NetworkClass::Slow);
        assert_eq!(NetworkClass::from_effective_type("3g"), NetworkClass::Fast);
        assert_eq!(NetworkClass::from_effective_type("4G"), NetworkClass::Fast);
        assert_eq!(NetworkClass::from_effective_type("wifi"), NetworkClass::Unknown);
    }

    #[test]
    fn measures_frame_rate_per_window() {
        let runtime = Arc::new(ManualRuntime::new());
        let mut sampler = sampler_for(&runtime);
        sampler.start_monitoring();

        run_frames(&mut sampler, &runtime, 25.0, 40);

        assert!((sampler.snapshot().fps - 40.0).abs() < 0.01);
        assert!(sampler.is_below_min_fps());
    }

    #[test]
    fn start_is_idempotent() {
        let runtime = Arc::new(ManualRuntime::new().with_heap(10, 100));
        let mut sampler = sampler_for(&runtime);
        sampler.start_monitoring();
        sampler.start_monitoring();

        assert_eq!(sampler.scheduler.len(), 2);
    }

    #[test]
    fn polls_memory_every_five_seconds() {
        let runtime = Arc::new(ManualRuntime::new().with_heap(75, 100));
        let mut sampler = sampler_for(&runtime);
        sampler.start_monitoring();

        runtime.advance(4_999.0);
        sampler.on_frame();
        assert_eq!(sampler.snapshot().memory_usage_ratio, 0.0);

        runtime.advance(1.0);
        sampler.on_frame();
        assert!((sampler.snapshot().memory_usage_ratio - 0.75).abs() < 1e-6);
    }

    #[test]
    fn network_and_battery_follow_change_events() {
        let runtime = Arc::new(ManualRuntime::new().with_network("4g").with_battery(0.9));
        let mut sampler = sampler_for(&runtime);
        assert_eq!(sampler.snapshot().network_class, NetworkClass::Fast);
        assert_eq!(sampler.snapshot().battery_level, 0.9);

        sampler.start_monitoring();
        runtime.set_network("2g");
        runtime.set_battery(0.1);
        let updates = sampler.on_frame();

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].network_class, NetworkClass::Slow);
        assert_eq!(updates[1].battery_level, 0.1);
    }

    #[test]
    fn missing_battery_keeps_default() {
        let runtime = Arc::new(ManualRuntime::new().with_network("3g"));
        let mut sampler = sampler_for(&runtime);
        sampler.start_monitoring();
        runtime.set_battery(0.05);
        run_frames(&mut sampler, &runtime, 16.0, 100);

        assert_eq!(sampler.snapshot().battery_level, 1.0);
        assert_eq!(sampler.snapshot().network_class, NetworkClass::Fast);
    }

    #[test]
    fn stop_freezes_the_snapshot() {
        let runtime = Arc::new(ManualRuntime::new().with_network("4g"));
        let mut sampler = sampler_for(&runtime);
        sampler.start_monitoring();
        sampler.stop_monitoring();
        sampler.stop_monitoring();

        runtime.set_network("2g");
        run_frames(&mut sampler, &runtime, 50.0, 40);

        assert_eq!(sampler.snapshot().network_class, NetworkClass::Fast);
        assert_eq!(sampler.snapshot().fps, 60.0);
    }

    #[test]
    fn subscribers_receive_copies_and_survive_faults() {
        let runtime = Arc::new(ManualRuntime::new().with_battery(1.0));
        let mut sampler = sampler_for(&runtime);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        let _faulty = sampler.subscribe(|_| panic!("subscriber bug"));
        let _recorder = {
            let seen = seen.clone();
            let calls = calls.clone();
            sampler.subscribe(move |snapshot| {
                calls.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push(snapshot.battery_level);
            })
        };

        sampler.start_monitoring();
        runtime.set_battery(0.5);
        sampler.on_frame();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![0.5]);
    }

    #[test]
    fn animation_count_publishes_on_change_only() {
        let runtime = Arc::new(ManualRuntime::new());
        let mut sampler = sampler_for(&runtime);

        assert!(sampler.set_animation_count(0).is_none());
        assert_eq!(sampler.set_animation_count(3).unwrap().animation_count, 3);
    }
}
