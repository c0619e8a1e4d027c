//! Host resource usage for `/status`

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::sync::Mutex;

/// One CPU/RAM reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemUsage {
    /// Global CPU usage since the previous sample (percent)
    pub cpu_percent: f32,
    /// Used memory (percent of total)
    pub memory_percent: f32,
}

impl std::fmt::Display for SystemUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CPU: {:.1}% | RAM: {:.1}%",
            self.cpu_percent, self.memory_percent
        )
    }
}

/// Samples host CPU and memory usage.
///
/// CPU usage is a delta between refreshes, so the collector keeps its
/// [`System`] across calls and primes it on construction.
pub struct SystemMonitor {
    system: Mutex<System>,
}

impl SystemMonitor {
    /// Create a monitor with an initial CPU reading
    pub fn new() -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        system.refresh_cpu_all();
        Self {
            system: Mutex::new(system),
        }
    }

    /// Current usage
    pub async fn sample(&self) -> SystemUsage {
        let mut system = self.system.lock().await;
        system.refresh_cpu_all();
        system.refresh_memory();

        let total = system.total_memory();
        let memory_percent = if total > 0 {
            (system.used_memory() as f64 / total as f64 * 100.0) as f32
        } else {
            0.0
        };
        SystemUsage {
            cpu_percent: system.global_cpu_usage(),
            memory_percent,
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMonitor").finish_non_exhaustive()
    }
}
