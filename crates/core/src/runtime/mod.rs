//! Capability-checked adapter over the host runtime.
//!
//! Only the monotonic clock is mandatory. Every other signal source is an
//! optional sub-capability that the sampler queries once at construction;
//! a missing capability leaves the corresponding snapshot field at its
//! optimistic default.

mod manual;

pub use manual::ManualRuntime;

/// Heap usage reader.
pub trait MemoryCapable: Send + Sync {
    fn used_heap_bytes(&self) -> u64;

    fn heap_limit_bytes(&self) -> u64;

    /// Used heap as a fraction of the limit, clamped to `[0, 1]`.
    fn usage_ratio(&self) -> f32 {
        let limit = self.heap_limit_bytes();
        if limit == 0 {
            return 0.0;
        }
        (self.used_heap_bytes() as f64 / limit as f64).clamp(0.0, 1.0) as f32
    }
}

/// Network information reader plus change notification.
pub trait NetworkCapable: Send + Sync {
    /// Current effective connection type (`"slow-2g"`, `"2g"`, `"3g"`, `"4g"`, ...).
    fn effective_type(&self) -> String;

    /// Receiver that yields the new effective type each time it changes.
    fn subscribe_changes(&self) -> flume::Receiver<String>;
}

/// Battery reader plus change notification.
pub trait BatteryCapable: Send + Sync {
    /// Charge level in `[0, 1]`.
    fn level(&self) -> f32;

    /// Receiver that yields the new level each time it changes.
    fn subscribe_changes(&self) -> flume::Receiver<f32>;
}

/// Everything the governor needs from its host.
pub trait RuntimeSignalSource: Send + Sync {
    /// Monotonic clock in milliseconds.
    fn now_ms(&self) -> f64;

    /// Number of logical processors, if the host exposes it.
    fn hardware_concurrency(&self) -> Option<u32> {
        None
    }

    /// Approximate device memory in gigabytes, if the host exposes it.
    fn device_memory_gb(&self) -> Option<f32> {
        None
    }

    fn memory(&self) -> Option<&dyn MemoryCapable> {
        None
    }

    fn network(&self) -> Option<&dyn NetworkCapable> {
        None
    }

    fn battery(&self) -> Option<&dyn BatteryCapable> {
        None
    }
}

/// Snapshot of which optional capabilities a runtime offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub memory: bool,
    pub network: bool,
    pub battery: bool,
    pub hardware_concurrency: bool,
    pub device_memory: bool,
}

impl Capabilities {
    pub fn detect(source: &dyn RuntimeSignalSource) -> Self {
        Self {
            memory: source.memory().is_some(),
            network: source.network().is_some(),
            battery: source.battery().is_some(),
            hardware_concurrency: source.hardware_concurrency().is_some(),
            device_memory: source.device_memory_gb().is_some(),
        }
    }
}
