//! System State Probe - samples load, processes and user activity.
//!
//! Rules:
//! - One snapshot per utterance, never edited afterwards
//! - Individual processes we cannot read are skipped, never fatal
//! - Anything the platform cannot report stays None and the checks
//!   depending on it are skipped

use chrono::Utc;
use roxy_common::SystemStateSnapshot;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use sysinfo::{Disks, System};
use tracing::{debug, warn};

/// Source of system snapshots
pub trait SystemProbe: Send {
    /// Capture the current state
    fn sample(&mut self) -> SystemStateSnapshot;

    /// Dial the configured host; None when the probe does not check networks
    fn network_reachable(&mut self) -> Option<bool> {
        None
    }
}

/// Live probe backed by sysinfo
pub struct SysinfoProbe {
    system: System,
    disks: Disks,
    network_addr: String,
    network_timeout: Duration,
}

impl SysinfoProbe {
    pub fn new(network_addr: &str, network_timeout_secs: u64) -> Self {
        let mut system = System::new();
        // Prime CPU counters so the first delta is meaningful
        system.refresh_cpu();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            network_addr: network_addr.to_string(),
            network_timeout: Duration::from_secs(network_timeout_secs),
        }
    }

    fn cpu_pct(&mut self) -> f64 {
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.system.refresh_cpu();
        self.system.global_cpu_info().cpu_usage() as f64
    }

    fn mem_pct(&mut self) -> f64 {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return 0.0;
        }
        self.system.used_memory() as f64 / total as f64 * 100.0
    }

    fn process_names(&mut self) -> Vec<String> {
        self.system.refresh_processes();
        self.system
            .processes()
            .values()
            .map(|p| p.name().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Free space on the root filesystem, or the largest disk if no root
    fn free_disk_bytes(&mut self) -> Option<u64> {
        self.disks.refresh();
        let root = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .map(|d| d.available_space());
        root.or_else(|| self.disks.list().iter().map(|d| d.available_space()).max())
    }
}

impl SystemProbe for SysinfoProbe {
    fn sample(&mut self) -> SystemStateSnapshot {
        let cpu_pct = self.cpu_pct();
        let mem_pct = self.mem_pct();
        let names = self.process_names();
        let audio_available = Some(
            Path::new("/proc/asound/cards").exists()
                || names
                    .iter()
                    .any(|n| n.contains("pipewire") || n.contains("pulseaudio")),
        );

        let snapshot = SystemStateSnapshot {
            cpu_pct,
            mem_pct,
            running_processes: names.into_iter().collect(),
            active_window: active_window_title(),
            idle_seconds: user_idle_seconds(),
            free_disk_bytes: self.free_disk_bytes(),
            network_reachable: None,
            audio_available,
            sampled_at: Utc::now(),
        };

        debug!(
            "Probe: CPU={:.1}%, Mem={:.1}%, processes={}, idle={:?}",
            snapshot.cpu_pct,
            snapshot.mem_pct,
            snapshot.running_processes.len(),
            snapshot.idle_seconds
        );

        snapshot
    }

    fn network_reachable(&mut self) -> Option<bool> {
        Some(tcp_reachable(&self.network_addr, self.network_timeout))
    }
}

/// Whether a TCP connection to `addr` opens within `timeout`
pub fn tcp_reachable(addr: &str, timeout: Duration) -> bool {
    let targets: Vec<SocketAddr> = match addr.to_socket_addrs() {
        Ok(a) => a.collect(),
        Err(e) => {
            warn!("Probe: cannot resolve {}: {}", addr, e);
            return false;
        }
    };
    targets
        .iter()
        .any(|a| TcpStream::connect_timeout(a, timeout).is_ok())
}

/// Seconds since last input, via xprintidle when available
fn user_idle_seconds() -> Option<f64> {
    let output = Command::new("xprintidle").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let ms: f64 = String::from_utf8_lossy(&output.stdout).trim().parse().ok()?;
    Some(ms / 1000.0)
}

fn active_window_title() -> Option<String> {
    let output = Command::new("xdotool")
        .args(["getactivewindow", "getwindowname"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Probe that always reports the same state
pub struct FixedProbe {
    snapshot: SystemStateSnapshot,
    samples: usize,
}

impl FixedProbe {
    pub fn new(snapshot: SystemStateSnapshot) -> Self {
        Self {
            snapshot,
            samples: 0,
        }
    }

    /// How many snapshots were taken
    pub fn samples(&self) -> usize {
        self.samples
    }
}

impl SystemProbe for FixedProbe {
    fn sample(&mut self) -> SystemStateSnapshot {
        self.samples += 1;
        let mut s = self.snapshot.clone();
        s.sampled_at = Utc::now();
        s
    }

    fn network_reachable(&mut self) -> Option<bool> {
        self.snapshot.network_reachable
    }
}
