//! Owning facade that wires the components together.
//!
//! A [`PerformanceGovernor`] is constructed explicitly and handed to whoever
//! needs it; [`GovernorHandle`] shares one across threads.

mod handle;

use std::sync::Arc;

use serde::Serialize;

use crate::{
    admission::{Admission, AnimationAdmissionQueue, AnimationRequest, Priority},
    alerts::{PerformanceAlert, PerformanceAlertBus},
    bus::{Subscription, Topic},
    config::GovernorConfig,
    loader::{NetworkAwareLoaderPolicy, NetworkSettings},
    policy::{DegradationLevel, DegradationPolicyEngine, DegradationSettings},
    profiler::{
        AdaptiveConfiguration, PerformanceSummary, ThemeTransitionProfiler,
        ThemeTransitionRecord, TransitionHandle,
    },
    runtime::RuntimeSignalSource,
    sampler::{SignalSampler, SignalSnapshot},
    GovernorError, Result,
};

pub use handle::GovernorHandle;

/// What one call to [`PerformanceGovernor::on_frame`] produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameReport {
    /// Snapshots published by the sampler this frame, in order.
    pub snapshots: Vec<SignalSnapshot>,
    pub alerts: Vec<PerformanceAlert>,
    /// Queued animations started because the admission limit rose.
    pub started: Vec<String>,
}

impl FrameReport {
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.alerts.is_empty() && self.started.is_empty()
    }
}

pub struct PerformanceGovernor {
    sampler: SignalSampler,
    policy: DegradationPolicyEngine,
    loader: NetworkAwareLoaderPolicy,
    queue: AnimationAdmissionQueue,
    profiler: ThemeTransitionProfiler,
    alerts: PerformanceAlertBus,
    settings_topic: Topic<DegradationSettings>,
    network_topic: Topic<NetworkSettings>,
    disposed: bool,
}

impl PerformanceGovernor {
    /// Validates `config` and probes the runtime. Nothing is sampled until
    /// [`Self::start_monitoring`].
    pub fn new(source: Arc<dyn RuntimeSignalSource>, config: GovernorConfig) -> Result<Self> {
        config.validate()?;

        let sampler = SignalSampler::new(source.clone(), config.sampler.clone());
        let snapshot = sampler.snapshot();
        let queue = AnimationAdmissionQueue::new(sampler.thresholds().max_concurrent_animations);
        let mut loader = NetworkAwareLoaderPolicy::new();
        loader.update_settings(snapshot.network_class, snapshot.is_low_end_device);

        Ok(Self {
            sampler,
            policy: DegradationPolicyEngine::new(config.policy),
            loader,
            queue,
            profiler: ThemeTransitionProfiler::new(source, config.profiler),
            alerts: PerformanceAlertBus::new(config.alerts),
            settings_topic: Topic::new("degradation-settings"),
            network_topic: Topic::new("network-settings"),
            disposed: false,
        })
    }

    pub fn start_monitoring(&mut self) -> Result<()> {
        if self.disposed {
            return Err(GovernorError::Disposed);
        }
        self.sampler.start_monitoring();
        self.profiler.start_monitoring();
        Ok(())
    }

    pub fn stop_monitoring(&mut self) {
        self.sampler.stop_monitoring();
        self.profiler.stop_monitoring();
    }

    /// Stops monitoring, drops every subscriber and forgets all animations.
    /// Queued start callbacks are dropped without running.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.stop_monitoring();
        self.sampler.dispose();
        self.alerts.clear();
        self.settings_topic.clear();
        self.network_topic.clear();
        self.queue.clear();
        self.disposed = true;
        tracing::info!("performance governor disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Drives one host frame: samples signals, recomputes both policies for
    /// every sampler update, fires alerts and applies the new admission limit.
    pub fn on_frame(&mut self) -> FrameReport {
        let (mut report, ready) = self.tick();
        report.started = ready.into_iter().map(AnimationRequest::start).collect();
        report
    }

    pub(crate) fn tick(&mut self) -> (FrameReport, Vec<AnimationRequest>) {
        let mut report = FrameReport::default();
        let mut ready = Vec::new();

        self.profiler.on_frame();
        for snapshot in self.sampler.on_frame() {
            let settings = self.policy.update_settings(&snapshot);
            self.settings_topic.publish(&settings);

            let network = self
                .loader
                .update_settings(snapshot.network_class, snapshot.is_low_end_device);
            self.network_topic.publish(&network);

            report.alerts.extend(self.alerts.evaluate(&snapshot));
            // Never looser than the sampler's device-class cap.
            let limit = settings
                .limit_concurrent_animations
                .min(self.sampler.thresholds().max_concurrent_animations);
            ready.extend(self.queue.resize(limit));
            report.snapshots.push(snapshot);
        }

        if !ready.is_empty() {
            self.sync_animation_count();
        }
        (report, ready)
    }

    /// Starts the animation now if the limit allows, otherwise queues it.
    pub fn request_admission<F>(&mut self, id: impl Into<String>, start: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.admit(AnimationRequest::new(id, start)) {
            Admission::Start(request) => {
                request.start();
                true
            }
            Admission::AlreadyActive => true,
            Admission::Queued => false,
        }
    }

    /// Finishes `id` and starts whatever queued animations now fit.
    pub fn complete_animation(&mut self, id: &str) -> Vec<String> {
        self.release(id)
            .into_iter()
            .map(AnimationRequest::start)
            .collect()
    }

    pub(crate) fn admit(&mut self, request: AnimationRequest) -> Admission {
        if self.disposed {
            tracing::warn!(id = request.id(), "admission requested after dispose; dropped");
            return Admission::Queued;
        }
        let admission = self.queue.admit(request);
        if matches!(admission, Admission::Start(_)) {
            self.sync_animation_count();
        }
        admission
    }

    pub(crate) fn release(&mut self, id: &str) -> Vec<AnimationRequest> {
        let ready = self.queue.release(id);
        self.sync_animation_count();
        ready
    }

    // Published to sampler subscribers only; feeding it back into the policy
    // would loop through the admission limit.
    fn sync_animation_count(&mut self) {
        self.sampler.set_animation_count(self.queue.active_count());
    }

    pub fn animation_settings(&self) -> DegradationSettings {
        self.policy.settings()
    }

    pub fn network_settings(&self) -> NetworkSettings {
        self.loader.settings()
    }

    pub fn degradation_level(&self) -> DegradationLevel {
        self.policy.level()
    }

    pub fn snapshot(&self) -> SignalSnapshot {
        self.sampler.snapshot()
    }

    pub fn image_src<'a>(&self, high_src: &'a str, low_src: Option<&'a str>) -> &'a str {
        self.loader.image_src(high_src, low_src)
    }

    pub fn should_preload(&self, priority: Priority) -> bool {
        self.loader.should_preload(priority)
    }

    pub fn should_lazy_load(&self) -> bool {
        self.loader.should_lazy_load()
    }

    /// Whether a caller should skip an animation instead of requesting
    /// admission for it.
    pub fn should_skip(&self, priority: Priority, essential: bool) -> bool {
        self.policy.settings().should_skip(priority, essential)
    }

    pub fn start_transition(&mut self, elements_count: usize) -> TransitionHandle {
        self.profiler.start_transition(elements_count)
    }

    pub fn end_transition(&mut self, handle: TransitionHandle) -> Result<ThemeTransitionRecord> {
        self.profiler.end_transition(handle)
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        self.profiler.performance_summary()
    }

    pub fn adaptive_configuration(&self) -> AdaptiveConfiguration {
        self.profiler.adaptive_configuration()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SignalSnapshot) + Send + Sync + 'static,
    {
        self.sampler.subscribe(callback)
    }

    pub fn subscribe_to_alerts<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PerformanceAlert) + Send + Sync + 'static,
    {
        self.alerts.subscribe_to_alerts(callback)
    }

    pub fn subscribe_settings<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DegradationSettings) + Send + Sync + 'static,
    {
        self.settings_topic.subscribe(callback)
    }

    pub fn subscribe_network_settings<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&NetworkSettings) + Send + Sync + 'static,
    {
        self.network_topic.subscribe(callback)
    }

    pub fn sampler(&self) -> &SignalSampler {
        &self.sampler
    }

    pub fn policy(&self) -> &DegradationPolicyEngine {
        &self.policy
    }

    pub fn queue(&self) -> &AnimationAdmissionQueue {
        &self.queue
    }

    pub fn profiler(&self) -> &ThemeTransitionProfiler {
        &self.profiler
    }
}

impl std::fmt::Debug for PerformanceGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceGovernor")
            .field("sampler", &self.sampler)
            .field("level", &self.policy.level())
            .field("queue", &self.queue)
            .field("profiler", &self.profiler)
            .field("disposed", &self.disposed)
            .finish()
    }
}
