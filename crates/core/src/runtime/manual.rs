use std::sync::{Mutex, MutexGuard};

use super::{BatteryCapable, MemoryCapable, NetworkCapable, RuntimeSignalSource};

/// Scriptable runtime whose clock and signals are driven by the caller.
///
/// Used by the test suites and by the `simulate` command. Capabilities are
/// absent until enabled through the `with_*` builders.
#[derive(Debug, Default)]
pub struct ManualRuntime {
    now_ms: Mutex<f64>,
    hardware_concurrency: Option<u32>,
    device_memory_gb: Option<f32>,
    heap: Option<ManualHeap>,
    network: Option<ManualNetwork>,
    battery: Option<ManualBattery>,
}

impl ManualRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hardware_concurrency(mut self, cores: u32) -> Self {
        self.hardware_concurrency = Some(cores);
        self
    }

    pub fn with_device_memory_gb(mut self, gigabytes: f32) -> Self {
        self.device_memory_gb = Some(gigabytes);
        self
    }

    pub fn with_heap(mut self, used_bytes: u64, limit_bytes: u64) -> Self {
        self.heap = Some(ManualHeap {
            used: Mutex::new(used_bytes),
            limit: limit_bytes,
        });
        self
    }

    pub fn with_network(mut self, effective_type: &str) -> Self {
        self.network = Some(ManualNetwork {
            current: Mutex::new(effective_type.to_string()),
            listeners: Mutex::new(Vec::new()),
        });
        self
    }

    pub fn with_battery(mut self, level: f32) -> Self {
        self.battery = Some(ManualBattery {
            level: Mutex::new(level),
            listeners: Mutex::new(Vec::new()),
        });
        self
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta_ms: f64) {
        *lock(&self.now_ms) += delta_ms.max(0.0);
    }

    /// Updates the used heap. Ignored when the heap capability is absent.
    pub fn set_heap_used(&self, used_bytes: u64) {
        if let Some(heap) = &self.heap {
            *lock(&heap.used) = used_bytes;
        }
    }

    /// Switches the effective connection type and notifies listeners.
    pub fn set_network(&self, effective_type: &str) {
        if let Some(network) = &self.network {
            *lock(&network.current) = effective_type.to_string();
            lock(&network.listeners).retain(|tx| tx.send(effective_type.to_string()).is_ok());
        }
    }

    /// Changes the battery level and notifies listeners.
    pub fn set_battery(&self, level: f32) {
        if let Some(battery) = &self.battery {
            *lock(&battery.level) = level;
            lock(&battery.listeners).retain(|tx| tx.send(level).is_ok());
        }
    }
}

impl RuntimeSignalSource for ManualRuntime {
    fn now_ms(&self) -> f64 {
        *lock(&self.now_ms)
    }

    fn hardware_concurrency(&self) -> Option<u32> {
        self.hardware_concurrency
    }

    fn device_memory_gb(&self) -> Option<f32> {
        self.device_memory_gb
    }

    fn memory(&self) -> Option<&dyn MemoryCapable> {
        self.heap.as_ref().map(|heap| heap as &dyn MemoryCapable)
    }

    fn network(&self) -> Option<&dyn NetworkCapable> {
        self.network
            .as_ref()
            .map(|network| network as &dyn NetworkCapable)
    }

    fn battery(&self) -> Option<&dyn BatteryCapable> {
        self.battery
            .as_ref()
            .map(|battery| battery as &dyn BatteryCapable)
    }
}

#[derive(Debug)]
struct ManualHeap {
    used: Mutex<u64>,
    limit: u64,
}

impl MemoryCapable for ManualHeap {
    fn used_heap_bytes(&self) -> u64 {
        *lock(&self.used)
    }

    fn heap_limit_bytes(&self) -> u64 {
        self.limit
    }
}

#[derive(Debug)]
struct ManualNetwork {
    current: Mutex<String>,
    listeners: Mutex<Vec<flume::Sender<String>>>,
}

impl NetworkCapable for ManualNetwork {
    fn effective_type(&self) -> String {
        lock(&self.current).clone()
    }

    fn subscribe_changes(&self) -> flume::Receiver<String> {
        let (tx, rx) = flume::unbounded();
        lock(&self.listeners).push(tx);
        rx
    }
}

#[derive(Debug)]
struct ManualBattery {
    level: Mutex<f32>,
    listeners: Mutex<Vec<flume::Sender<f32>>>,
}

impl BatteryCapable for ManualBattery {
    fn level(&self) -> f32 {
        *lock(&self.level)
    }

    fn subscribe_changes(&self) -> flume::Receiver<f32> {
        let (tx, rx) = flume::unbounded();
        lock(&self.listeners).push(tx);
        rx
    }
}

// A panicking test thread must not wedge the scripted runtime for the others.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Capabilities;

    #[test]
    fn capabilities_start_absent() {
        let runtime = ManualRuntime::new();
        assert_eq!(Capabilities::detect(&runtime), Capabilities::default());
    }

    #[test]
    fn notifies_network_listeners() {
        let runtime = ManualRuntime::new().with_network("4g");
        let changes = runtime.network().unwrap().subscribe_changes();

        runtime.set_network("2g");

        assert_eq!(changes.try_recv().unwrap(), "2g");
        assert_eq!(runtime.network().unwrap().effective_type(), "2g");
    }

    #[test]
    fn heap_ratio_is_clamped() {
        let runtime = ManualRuntime::new().with_heap(150, 100);
        assert_eq!(runtime.memory().unwrap().usage_ratio(), 1.0);
    }

    #[test]
    fn clock_never_moves_backwards() {
        let runtime = ManualRuntime::new();
        runtime.advance(16.0);
        runtime.advance(-5.0);
        assert_eq!(runtime.now_ms(), 16.0);
    }
}
