//! Runtime performance governor for animated user interfaces.
//!
//! Signals (frame rate, heap usage, battery, network class) are sampled from a
//! [`RuntimeSignalSource`] once per host frame. They drive a hysteresis-damped
//! degradation level, an admission queue that bounds concurrent animations, an
//! asset-loading policy, threshold alerts and a theme-transition profiler.
//! [`PerformanceGovernor`] wires the pieces together.

pub mod admission;
pub mod alerts;
pub mod bus;
pub mod config;
pub mod error;
pub mod governor;
pub mod loader;
pub mod policy;
pub mod profiler;
pub mod runtime;
pub mod sampler;
pub mod schedule;

pub use admission::{AnimationAdmissionQueue, Priority};
pub use alerts::{AlertKind, AlertSeverity, PerformanceAlert, PerformanceAlertBus};
pub use bus::{Subscription, Topic};
pub use config::{AlertConfig, GovernorConfig, PolicyConfig, ProfilerConfig, SamplerConfig};
pub use error::{GovernorError, Result};
pub use governor::{FrameReport, GovernorHandle, PerformanceGovernor};
pub use loader::{NetworkAwareLoaderPolicy, NetworkSettings};
pub use policy::{DegradationLevel, DegradationPolicyEngine, DegradationSettings};
pub use profiler::{
    AdaptiveConfiguration, PerformanceLevel, PerformanceSummary, ThemeTransitionProfiler,
    ThemeTransitionRecord, TransitionHandle,
};
pub use runtime::{
    BatteryCapable, ManualRuntime, MemoryCapable, NetworkCapable, RuntimeSignalSource,
};
pub use sampler::{FrameRateMeter, NetworkClass, SignalSampler, SignalSnapshot};
pub use schedule::{Cadence, CancellationToken, TaskScheduler};
