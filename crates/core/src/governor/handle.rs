use std::sync::{Arc, Mutex, MutexGuard};

use super::{FrameReport, PerformanceGovernor};
use crate::{
    admission::{Admission, AnimationRequest, Priority},
    alerts::PerformanceAlert,
    bus::Subscription,
    loader::NetworkSettings,
    policy::{DegradationLevel, DegradationSettings},
    profiler::{AdaptiveConfiguration, PerformanceSummary, ThemeTransitionRecord, TransitionHandle},
    sampler::SignalSnapshot,
    GovernorError, Result,
};

/// Shared, thread-safe view over a [`PerformanceGovernor`].
///
/// Animation start callbacks run after the lock is released, so they may call
/// back into the handle. Subscriber callbacks run while it is held and must
/// not.
#[derive(Clone)]
pub struct GovernorHandle {
    shared: Arc<Mutex<PerformanceGovernor>>,
}

impl GovernorHandle {
    pub fn new(governor: PerformanceGovernor) -> Self {
        Self {
            shared: Arc::new(Mutex::new(governor)),
        }
    }

    pub fn start_monitoring(&self) -> Result<()> {
        self.lock()?.start_monitoring()
    }

    pub fn stop_monitoring(&self) -> Result<()> {
        self.lock()?.stop_monitoring();
        Ok(())
    }

    pub fn dispose(&self) -> Result<()> {
        self.lock()?.dispose();
        Ok(())
    }

    pub fn on_frame(&self) -> Result<FrameReport> {
        let (mut report, ready) = self.lock()?.tick();
        report.started = ready.into_iter().map(AnimationRequest::start).collect();
        Ok(report)
    }

    pub fn request_admission<F>(&self, id: impl Into<String>, start: F) -> Result<bool>
    where
        F: FnOnce() + Send + 'static,
    {
        let admission = self.lock()?.admit(AnimationRequest::new(id, start));
        Ok(match admission {
            Admission::Start(request) => {
                request.start();
                true
            }
            Admission::AlreadyActive => true,
            Admission::Queued => false,
        })
    }

    pub fn complete_animation(&self, id: &str) -> Result<Vec<String>> {
        let ready = self.lock()?.release(id);
        Ok(ready.into_iter().map(AnimationRequest::start).collect())
    }

    pub fn animation_settings(&self) -> Result<DegradationSettings> {
        Ok(self.lock()?.animation_settings())
    }

    pub fn network_settings(&self) -> Result<NetworkSettings> {
        Ok(self.lock()?.network_settings())
    }

    pub fn degradation_level(&self) -> Result<DegradationLevel> {
        Ok(self.lock()?.degradation_level())
    }

    pub fn snapshot(&self) -> Result<SignalSnapshot> {
        Ok(self.lock()?.snapshot())
    }

    pub fn image_src(&self, high_src: &str, low_src: Option<&str>) -> Result<String> {
        Ok(self.lock()?.image_src(high_src, low_src).to_string())
    }

    pub fn should_preload(&self, priority: Priority) -> Result<bool> {
        Ok(self.lock()?.should_preload(priority))
    }

    pub fn should_lazy_load(&self) -> Result<bool> {
        Ok(self.lock()?.should_lazy_load())
    }

    pub fn should_skip(&self, priority: Priority, essential: bool) -> Result<bool> {
        Ok(self.lock()?.should_skip(priority, essential))
    }

    pub fn start_transition(&self, elements_count: usize) -> Result<TransitionHandle> {
        Ok(self.lock()?.start_transition(elements_count))
    }

    pub fn end_transition(&self, handle: TransitionHandle) -> Result<ThemeTransitionRecord> {
        self.lock()?.end_transition(handle)
    }

    pub fn performance_summary(&self) -> Result<PerformanceSummary> {
        Ok(self.lock()?.performance_summary())
    }

    pub fn adaptive_configuration(&self) -> Result<AdaptiveConfiguration> {
        Ok(self.lock()?.adaptive_configuration())
    }

    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&SignalSnapshot) + Send + Sync + 'static,
    {
        Ok(self.lock()?.subscribe(callback))
    }

    pub fn subscribe_to_alerts<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&PerformanceAlert) + Send + Sync + 'static,
    {
        Ok(self.lock()?.subscribe_to_alerts(callback))
    }

    pub fn subscribe_settings<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&DegradationSettings) + Send + Sync + 'static,
    {
        Ok(self.lock()?.subscribe_settings(callback))
    }

    pub fn subscribe_network_settings<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&NetworkSettings) + Send + Sync + 'static,
    {
        Ok(self.lock()?.subscribe_network_settings(callback))
    }

    /// Runs `f` with exclusive access to the governor.
    pub fn with<R>(&self, f: impl FnOnce(&mut PerformanceGovernor) -> R) -> Result<R> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    fn lock(&self) -> Result<MutexGuard<'_, PerformanceGovernor>> {
        self.shared
            .lock()
            .map_err(|_| GovernorError::Poisoned("performance governor"))
    }
}

impl std::fmt::Debug for GovernorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorHandle").finish()
    }
}
