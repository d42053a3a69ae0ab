//! Host metrics provider: the capability the reporter samples every tick,
//! plus `LocalHost`, backed by sysinfo (and procfs on Linux).

use std::collections::HashSet;

use anyhow::Result;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
#[cfg(not(target_os = "linux"))]
use sysinfo::Networks;

use crate::config::Config;
#[cfg(target_os = "linux")]
use crate::procfs::{CpuTimes, Procfs};

/// Filesystems that count towards disk totals.
const COUNTED_FILESYSTEMS: &[&str] = &[
    "ext4", "ext3", "ext2", "reiserfs", "jfs", "btrfs", "fuseblk", "zfs", "simfs", "ntfs",
    "fat32", "exfat", "xfs",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    // cumulative since boot
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl InterfaceCounters {
    pub fn new(name: impl Into<String>, rx_bytes: u64, tx_bytes: u64) -> Self {
        Self {
            name: name.into(),
            rx_bytes,
            tx_bytes,
        }
    }
}

/// Memory and swap, in KiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub mem_total: u64,
    pub mem_used: u64,
    pub swap_total: u64,
    pub swap_used: u64,
}

/// Filesystem totals, in MiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
}

pub trait HostMetrics: Send {
    /// Busy CPU percentage since the previous call. Never blocks.
    fn cpu_percent(&mut self) -> Result<f64>;

    /// Per-interface cumulative byte counters, unfiltered.
    fn interface_counters(&mut self) -> Result<Vec<InterfaceCounters>>;

    fn uptime_secs(&mut self) -> Result<u64>;

    /// One-minute load average, `None` where the platform has none.
    fn load_one(&mut self) -> Option<f64>;

    fn memory(&mut self) -> Result<MemoryUsage>;

    fn disk(&mut self) -> Result<DiskUsage>;
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub struct LocalHost {
    sys: System,
    disks: Disks,
    #[cfg(target_os = "linux")]
    procfs: Procfs,
    #[cfg(target_os = "linux")]
    last_cpu: Option<CpuTimes>,
    #[cfg(not(target_os = "linux"))]
    networks: Networks,
}

impl LocalHost {
    pub fn new(config: &Config) -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::everything());
        let sys = System::new_with_specifics(refresh_kind);
        #[cfg(not(target_os = "linux"))]
        let _ = config;
        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            #[cfg(target_os = "linux")]
            procfs: Procfs::new(config.procfs_path.clone()),
            #[cfg(target_os = "linux")]
            last_cpu: None,
            #[cfg(not(target_os = "linux"))]
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl HostMetrics for LocalHost {
    #[cfg(target_os = "linux")]
    fn cpu_percent(&mut self) -> Result<f64> {
        let now = self.procfs.cpu_times()?;
        let pct = self
            .last_cpu
            .map(|prev| now.busy_percent_since(&prev))
            .unwrap_or(0.0);
        self.last_cpu = Some(now);
        Ok(round1(pct))
    }

    #[cfg(not(target_os = "linux"))]
    fn cpu_percent(&mut self) -> Result<f64> {
        self.sys.refresh_cpu_usage();
        Ok(round1(self.sys.global_cpu_usage() as f64))
    }

    #[cfg(target_os = "linux")]
    fn interface_counters(&mut self) -> Result<Vec<InterfaceCounters>> {
        Ok(self.procfs.net_dev()?)
    }

    #[cfg(not(target_os = "linux"))]
    fn interface_counters(&mut self) -> Result<Vec<InterfaceCounters>> {
        self.networks.refresh(true);
        Ok(self
            .networks
            .iter()
            .map(|(name, data)| {
                InterfaceCounters::new(
                    name.as_str(),
                    data.total_received(),
                    data.total_transmitted(),
                )
            })
            .collect())
    }

    #[cfg(target_os = "linux")]
    fn uptime_secs(&mut self) -> Result<u64> {
        Ok(self.procfs.uptime_secs()?)
    }

    #[cfg(not(target_os = "linux"))]
    fn uptime_secs(&mut self) -> Result<u64> {
        Ok(System::uptime())
    }

    #[cfg(target_os = "linux")]
    fn load_one(&mut self) -> Option<f64> {
        self.procfs.load_one().ok().map(round1)
    }

    #[cfg(all(not(target_os = "linux"), not(windows)))]
    fn load_one(&mut self) -> Option<f64> {
        Some(round1(System::load_average().one))
    }

    #[cfg(windows)]
    fn load_one(&mut self) -> Option<f64> {
        None
    }

    fn memory(&mut self) -> Result<MemoryUsage> {
        self.sys.refresh_memory();
        let mem_total = self.sys.total_memory();
        let mem_used = mem_total.saturating_sub(self.sys.available_memory());
        Ok(MemoryUsage {
            mem_total: mem_total / 1024,
            mem_used: mem_used / 1024,
            swap_total: self.sys.total_swap() / 1024,
            swap_used: self.sys.used_swap() / 1024,
        })
    }

    fn disk(&mut self) -> Result<DiskUsage> {
        self.disks.refresh(true);
        let mut seen = HashSet::new();
        let (total, avail) = self
            .disks
            .list()
            .iter()
            .filter(|d| {
                let fs = d.file_system().to_string_lossy().to_ascii_lowercase();
                COUNTED_FILESYSTEMS.contains(&fs.as_str())
            })
            // bind mounts of the same device count once
            .filter(|d| seen.insert(d.name().to_os_string()))
            .fold((0u64, 0u64), |(t, a), d| {
                (t.saturating_add(d.total_space()), a.saturating_add(d.available_space()))
            });
        Ok(DiskUsage {
            total: total / 1024 / 1024,
            used: total.saturating_sub(avail) / 1024 / 1024,
        })
    }
}
