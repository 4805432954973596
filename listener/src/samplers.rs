//! Host metric samplers
//!
//! Each sampler produces one history field per tick. Composite readings are
//! written as `first/second` so they stay a single field.

use std::path::{Path, PathBuf};

use sysinfo::{Disks, Networks, System};
use tracing::debug;

use crate::config::ListenerConfig;
use crate::error::{SamplerError, SamplerResult};

/// A source of one metric channel
pub trait Sampler: Send {
    /// Channel name, also used to register the history line
    fn name(&self) -> &str;

    /// Take one reading
    fn sample(&mut self) -> SamplerResult<String>;
}

/// Percent with one decimal, e.g. `12.5`
pub fn format_percent(value: f64) -> String {
    format!("{:.1}", value)
}

/// Composite field, e.g. `1024/2048`
pub fn format_pair(first: u64, second: u64) -> String {
    format!("{}/{}", first, second)
}

/// Channel names of [`default_samplers`], in line order
pub const DEFAULT_CHANNELS: [&str; 4] = ["cpu", "memory", "network", "disk"];

/// The standard channel set in line order
pub fn default_samplers(config: &ListenerConfig) -> Vec<Box<dyn Sampler>> {
    vec![
        Box::new(CpuSampler::new()),
        Box::new(MemorySampler::new()),
        Box::new(NetworkSampler::new()),
        Box::new(DiskSampler::new(config.disk_mount_point.clone())),
    ]
}

/// Global CPU usage percent
pub struct CpuSampler {
    system: System,
}

impl CpuSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // Usage is a delta between refreshes; prime the first one.
        system.refresh_cpu();
        Self { system }
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for CpuSampler {
    fn name(&self) -> &str {
        "cpu"
    }

    fn sample(&mut self) -> SamplerResult<String> {
        self.system.refresh_cpu();
        if self.system.cpus().is_empty() {
            return Err(SamplerError::Unavailable {
                sampler: self.name().to_string(),
                reason: "no CPUs reported".to_string(),
            });
        }
        let usage = self.system.global_cpu_info().cpu_usage() as f64;
        debug!(usage, "CPU percent");
        Ok(format_percent(usage))
    }
}

/// Used memory as a percent of total memory
pub struct MemorySampler {
    system: System,
}

impl MemorySampler {
    pub fn new() -> Self {
        Self { system: System::new() }
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for MemorySampler {
    fn name(&self) -> &str {
        "memory"
    }

    fn sample(&mut self) -> SamplerResult<String> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(SamplerError::Unavailable {
                sampler: self.name().to_string(),
                reason: "total memory reported as zero".to_string(),
            });
        }
        let percent = self.system.used_memory() as f64 / total as f64 * 100.0;
        debug!(percent, "virtual memory percent");
        Ok(format_percent(percent))
    }
}

/// Bytes sent and received over all interfaces, as `sent/received`
pub struct NetworkSampler {
    networks: Networks,
}

impl NetworkSampler {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for NetworkSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for NetworkSampler {
    fn name(&self) -> &str {
        "network"
    }

    fn sample(&mut self) -> SamplerResult<String> {
        self.networks.refresh_list();
        let (sent, received) = self
            .networks
            .iter()
            .fold((0u64, 0u64), |(sent, received), (_, data)| {
                (
                    sent.saturating_add(data.total_transmitted()),
                    received.saturating_add(data.total_received()),
                )
            });
        debug!(sent, received, "network bytes");
        Ok(format_pair(sent, received))
    }
}

/// Used and free bytes on one disk, as `used/free`
pub struct DiskSampler {
    mount_point: PathBuf,
    disks: Disks,
}

impl DiskSampler {
    pub fn new<P: Into<PathBuf>>(mount_point: P) -> Self {
        Self {
            mount_point: mount_point.into(),
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

/// `(used, free)` bytes from a disk's total and available space
///
/// Only space available to unprivileged users is reported, so blocks reserved
/// for root count as used rather than free.
pub fn disk_usage(total: u64, available: u64) -> (u64, u64) {
    (total.saturating_sub(available), available)
}

/// Index of the mount that contains `target`, preferring the longest match
pub fn select_mount<'a, I>(mounts: I, target: &Path) -> Option<usize>
where
    I: IntoIterator<Item = &'a Path>,
{
    mounts
        .into_iter()
        .enumerate()
        .filter(|(_, mount)| target.starts_with(mount))
        .max_by_key(|(_, mount)| mount.components().count())
        .map(|(index, _)| index)
}

impl Sampler for DiskSampler {
    fn name(&self) -> &str {
        "disk"
    }

    fn sample(&mut self) -> SamplerResult<String> {
        self.disks.refresh_list();
        let disks = self.disks.list();
        let index = select_mount(disks.iter().map(|disk| disk.mount_point()), &self.mount_point)
            .ok_or_else(|| SamplerError::DiskNotFound {
                mount_point: self.mount_point.clone(),
            })?;

        let disk = &disks[index];
        let (used, free) = disk_usage(disk.total_space(), disk.available_space());
        debug!(used, free, mount = %disk.mount_point().display(), "disk usage");
        Ok(format_pair(used, free))
    }
}
