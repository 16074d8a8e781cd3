use std::sync::Mutex;
use std::time::Instant;

use motion_governor_core::{MemoryCapable, RuntimeSignalSource};
use sysinfo::System;

/// Signal source backed by the machine this process runs on.
///
/// Memory pressure is reported as system-wide used memory against total
/// memory. Battery and network information are not exposed.
pub struct HostRuntime {
    started: Instant,
    cores: Option<u32>,
    memory_gb: Option<f32>,
    memory: SystemMemory,
}

impl HostRuntime {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();

        let total = system.total_memory();
        let memory_gb = (total > 0).then(|| (total as f64 / 1024f64.powi(3)) as f32);
        let cores = std::thread::available_parallelism()
            .ok()
            .and_then(|cores| u32::try_from(cores.get()).ok());

        tracing::debug!(?cores, ?memory_gb, "host runtime probed");

        Self {
            started: Instant::now(),
            cores,
            memory_gb,
            memory: SystemMemory {
                system: Mutex::new(system),
            },
        }
    }
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeSignalSource for HostRuntime {
    fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1_000.0
    }

    fn hardware_concurrency(&self) -> Option<u32> {
        self.cores
    }

    fn device_memory_gb(&self) -> Option<f32> {
        self.memory_gb
    }

    fn memory(&self) -> Option<&dyn MemoryCapable> {
        Some(&self.memory)
    }
}

struct SystemMemory {
    system: Mutex<System>,
}

impl MemoryCapable for SystemMemory {
    fn used_heap_bytes(&self) -> u64 {
        match self.system.lock() {
            Ok(mut system) => {
                system.refresh_memory();
                system.used_memory()
            }
            Err(_) => 0,
        }
    }

    fn heap_limit_bytes(&self) -> u64 {
        self.system
            .lock()
            .map(|system| system.total_memory())
            .unwrap_or(0)
    }
}
