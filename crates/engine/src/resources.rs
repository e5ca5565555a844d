//! System resource sampling
//!
//! A background thread samples CPU and memory usage at a fixed interval and
//! publishes the latest snapshot. The scheduler and the priority calculator
//! only read it.

use crate::buffer::BoundedBuffer;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use hookflow_core::{Error, ResourceHint, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Samples kept for trend detection
pub const RESOURCE_HISTORY_SIZE: usize = 100;

/// Samples averaged on each side of a trend comparison
const TREND_WINDOW: usize = 5;

/// Smallest change between windows, in percentage points, that counts as a trend
const TREND_DEADBAND: f64 = 1.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Point-in-time resource usage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceSnapshot {
    /// Global CPU usage, 0 to 100
    pub cpu_percent: f64,
    /// Used memory, 0 to 100
    pub memory_percent: f64,
    /// Available memory in MiB
    pub memory_available_mb: f64,
    /// Total memory in MiB, 0 when unknown
    pub memory_total_mb: f64,
}

impl ResourceSnapshot {
    /// Whether a hook with this hint fits into the free capacity
    #[must_use]
    pub fn fits(&self, hint: &ResourceHint) -> bool {
        let cpu_fits = self.cpu_percent + hint.cpu_percent <= 100.0;
        let memory_fits =
            self.memory_total_mb <= 0.0 || hint.memory_mb <= self.memory_available_mb;
        cpu_fits && memory_fits
    }

    /// Memory hint expressed as a share of total memory
    #[must_use]
    pub fn memory_share(&self, memory_mb: f64) -> f64 {
        if self.memory_total_mb <= 0.0 {
            0.0
        } else {
            memory_mb / self.memory_total_mb * 100.0
        }
    }
}

/// Direction of recent resource usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceTrend {
    /// Recent samples are higher
    Increasing,
    /// Recent samples are lower
    Decreasing,
    /// No clear change, or too few samples
    #[default]
    Stable,
}

/// CPU and memory trends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceTrends {
    /// CPU usage trend
    pub cpu: ResourceTrend,
    /// Memory usage trend
    pub memory: ResourceTrend,
}

/// Source of resource samples
pub trait ResourceProbe: Send + 'static {
    /// Take a sample
    fn sample(&mut self) -> ResourceSnapshot;
}

/// Samples the host through `sysinfo`
///
/// CPU usage is the difference between two refreshes, so a sample taken less
/// than [`sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`] after the previous refresh
/// waits out the rest of that interval first.
pub struct SysinfoProbe {
    system: sysinfo::System,
    last_cpu_refresh: Instant,
}

impl SysinfoProbe {
    /// Create a sampler and prime the CPU counters
    #[must_use]
    pub fn new() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system,
            last_cpu_refresh: Instant::now(),
        }
    }
}

/// Time left before CPU counters refreshed `since` ago give a real reading
fn cpu_settle_delay(since: Duration) -> Duration {
    sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.saturating_sub(since)
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    #[allow(clippy::cast_precision_loss)]
    fn sample(&mut self) -> ResourceSnapshot {
        let delay = cpu_settle_delay(self.last_cpu_refresh.elapsed());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.system.refresh_cpu_usage();
        self.last_cpu_refresh = Instant::now();
        self.system.refresh_memory();

        let total = self.system.total_memory() as f64;
        let used = self.system.used_memory() as f64;
        let available = self.system.available_memory() as f64;

        ResourceSnapshot {
            cpu_percent: f64::from(self.system.global_cpu_usage()).clamp(0.0, 100.0),
            memory_percent: if total > 0.0 { used / total * 100.0 } else { 0.0 },
            memory_available_mb: available / BYTES_PER_MB,
            memory_total_mb: total / BYTES_PER_MB,
        }
    }
}

#[derive(Debug)]
struct Samples {
    cpu: BoundedBuffer<f64>,
    memory: BoundedBuffer<f64>,
}

impl Samples {
    fn new() -> Self {
        Self {
            cpu: BoundedBuffer::new(RESOURCE_HISTORY_SIZE),
            memory: BoundedBuffer::new(RESOURCE_HISTORY_SIZE),
        }
    }

    fn push(&mut self, snapshot: &ResourceSnapshot) {
        self.cpu.push(snapshot.cpu_percent);
        self.memory.push(snapshot.memory_percent);
    }
}

#[derive(Debug)]
struct Shared {
    current: RwLock<ResourceSnapshot>,
    samples: Mutex<Samples>,
}

impl Shared {
    fn publish(&self, snapshot: ResourceSnapshot) {
        *self.current.write() = snapshot;
        self.samples.lock().push(&snapshot);
    }
}

/// Latest resource snapshot plus a sampling thread that keeps it fresh
#[derive(Debug)]
pub struct ResourceMonitor {
    shared: Arc<Shared>,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ResourceMonitor {
    /// Start sampling in the background
    ///
    /// The first sample is taken before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the sampling thread cannot be spawned.
    pub fn start<P: ResourceProbe>(mut probe: P, interval: Duration) -> Result<Self> {
        let shared = Arc::new(Shared {
            current: RwLock::new(ResourceSnapshot::default()),
            samples: Mutex::new(Samples::new()),
        });
        shared.publish(probe.sample());

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("hookflow-resource-monitor".to_string())
            .spawn(move || sample_loop(probe, &thread_shared, &stop_rx, interval))
            .map_err(|e| Error::Runtime(format!("Failed to start resource monitor: {e}")))?;

        tracing::debug!(interval_ms = interval.as_millis(), "Resource monitor started");

        Ok(Self {
            shared,
            stop: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Monitor that always reports the same snapshot
    #[must_use]
    pub fn fixed(snapshot: ResourceSnapshot) -> Self {
        let shared = Arc::new(Shared {
            current: RwLock::new(snapshot),
            samples: Mutex::new(Samples::new()),
        });
        Self {
            shared,
            stop: None,
            worker: None,
        }
    }

    /// Latest snapshot
    #[must_use]
    pub fn current(&self) -> ResourceSnapshot {
        *self.shared.current.read()
    }

    /// Replace the current snapshot
    pub fn record(&self, snapshot: ResourceSnapshot) {
        self.shared.publish(snapshot);
    }

    /// Trends over the sample history
    #[must_use]
    pub fn trends(&self) -> ResourceTrends {
        let samples = self.shared.samples.lock();
        ResourceTrends {
            cpu: trend(&samples.cpu),
            memory: trend(&samples.memory),
        }
    }

    /// Number of samples kept
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.shared.samples.lock().cpu.len()
    }

    /// Whether the sampling thread is running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the sampling thread and wait for it
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // A full channel or a gone receiver both mean the thread is stopping
            let _ = stop.try_send(());
        }
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("Resource monitor thread panicked");
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sample_loop<P: ResourceProbe>(
    mut probe: P,
    shared: &Shared,
    stop: &Receiver<()>,
    interval: Duration,
) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => shared.publish(probe.sample()),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("Resource monitor stopped");
}

#[allow(clippy::cast_precision_loss)]
fn trend(samples: &BoundedBuffer<f64>) -> ResourceTrend {
    if samples.len() < TREND_WINDOW * 2 {
        return ResourceTrend::Stable;
    }
    let window: Vec<f64> = samples.latest(TREND_WINDOW * 2).copied().collect();
    let (older, recent) = window.split_at(TREND_WINDOW);
    let older = older.iter().sum::<f64>() / TREND_WINDOW as f64;
    let recent = recent.iter().sum::<f64>() / TREND_WINDOW as f64;

    if recent - older > TREND_DEADBAND {
        ResourceTrend::Increasing
    } else if older - recent > TREND_DEADBAND {
        ResourceTrend::Decreasing
    } else {
        ResourceTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        calls: Arc<AtomicUsize>,
    }

    impl ResourceProbe for CountingProbe {
        #[allow(clippy::cast_precision_loss)]
        fn sample(&mut self) -> ResourceSnapshot {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            ResourceSnapshot {
                cpu_percent: n as f64,
                ..ResourceSnapshot::default()
            }
        }
    }

    fn snapshot(cpu: f64, memory: f64) -> ResourceSnapshot {
        ResourceSnapshot {
            cpu_percent: cpu,
            memory_percent: memory,
            memory_available_mb: 1024.0,
            memory_total_mb: 4096.0,
        }
    }

    #[test]
    fn test_fits_checks_cpu_and_memory() {
        let current = snapshot(70.0, 75.0);
        assert!(current.fits(&ResourceHint::new(30.0, 512.0)));
        assert!(!current.fits(&ResourceHint::new(31.0, 0.0)));
        assert!(!current.fits(&ResourceHint::new(0.0, 2048.0)));
    }

    #[test]
    fn test_unknown_memory_always_fits() {
        let current = ResourceSnapshot::default();
        assert!(current.fits(&ResourceHint::new(10.0, 1_000_000.0)));
        assert!(current.memory_share(512.0).abs() < f64::EPSILON);
        assert!((snapshot(0.0, 0.0).memory_share(1024.0) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_needs_ten_samples() {
        let monitor = ResourceMonitor::fixed(ResourceSnapshot::default());
        for cpu in [10.0, 20.0, 30.0] {
            monitor.record(snapshot(cpu, 50.0));
        }
        assert_eq!(monitor.trends(), ResourceTrends::default());
    }

    #[test]
    fn test_trend_directions() {
        let monitor = ResourceMonitor::fixed(ResourceSnapshot::default());
        for i in 0..10 {
            let i = f64::from(i);
            monitor.record(snapshot(i * 10.0, 90.0 - i * 5.0));
        }
        let trends = monitor.trends();
        assert_eq!(trends.cpu, ResourceTrend::Increasing);
        assert_eq!(trends.memory, ResourceTrend::Decreasing);
        assert_eq!(monitor.history_len(), 10);

        for _ in 0..10 {
            monitor.record(snapshot(40.0, 40.0));
        }
        assert_eq!(monitor.trends().cpu, ResourceTrend::Stable);
    }

    #[test]
    fn test_monitor_samples_and_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut monitor = ResourceMonitor::start(
            CountingProbe {
                calls: Arc::clone(&calls),
            },
            Duration::from_millis(5),
        )
        .unwrap();
        assert!(monitor.is_active());

        std::thread::sleep(Duration::from_millis(60));
        monitor.stop();
        assert!(!monitor.is_active());

        let taken = calls.load(Ordering::SeqCst);
        assert!(taken >= 2);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), taken);
    }

    #[test]
    fn test_sysinfo_sampler_reports_sane_values() {
        let snapshot = SysinfoProbe::new().sample();
        assert!((0.0..=100.0).contains(&snapshot.cpu_percent));
        assert!((0.0..=100.0).contains(&snapshot.memory_percent));
    }

    #[test]
    fn test_cpu_settle_delay() {
        let minimum = sysinfo::MINIMUM_CPU_UPDATE_INTERVAL;
        assert_eq!(cpu_settle_delay(Duration::ZERO), minimum);
        assert_eq!(cpu_settle_delay(minimum * 2), Duration::ZERO);
        assert!(cpu_settle_delay(minimum / 2) <= minimum / 2 + Duration::from_millis(1));
    }

    #[test]
    fn test_first_sample_waits_for_cpu_interval() {
        let start = Instant::now();
        let mut probe = SysinfoProbe::new();
        probe.sample();
        assert!(start.elapsed() >= sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);

        // The monitor's first snapshot goes through the same wait
        let start = Instant::now();
        let monitor = ResourceMonitor::start(SysinfoProbe::new(), Duration::from_secs(60)).unwrap();
        assert!(start.elapsed() >= sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        assert_eq!(monitor.history_len(), 1);
    }
}
