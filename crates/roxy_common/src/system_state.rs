//! System state snapshot consumed by the confidence calculator and validator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const GIB: f64 = 1_073_741_824.0;

/// Point-in-time view of machine load and user activity.
/// Captured once per utterance, never edited afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStateSnapshot {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    /// Lowercased process names
    pub running_processes: BTreeSet<String>,
    pub active_window: Option<String>,
    /// None when the platform cannot report input idle time
    pub idle_seconds: Option<f64>,
    pub free_disk_bytes: Option<u64>,
    pub network_reachable: Option<bool>,
    pub audio_available: Option<bool>,
    pub sampled_at: DateTime<Utc>,
}

impl SystemStateSnapshot {
    /// Quiet machine with nothing running, used as a base in tests and
    /// when the probe cannot sample at all
    pub fn idle() -> Self {
        Self {
            cpu_pct: 0.0,
            mem_pct: 0.0,
            running_processes: BTreeSet::new(),
            active_window: None,
            idle_seconds: None,
            free_disk_bytes: None,
            network_reachable: None,
            audio_available: None,
            sampled_at: Utc::now(),
        }
    }

    pub fn with_load(mut self, cpu_pct: f64, mem_pct: f64) -> Self {
        self.cpu_pct = cpu_pct;
        self.mem_pct = mem_pct;
        self
    }

    pub fn with_processes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.running_processes = names
            .into_iter()
            .map(|n| n.as_ref().to_lowercase())
            .collect();
        self
    }

    pub fn with_idle_seconds(mut self, idle: f64) -> Self {
        self.idle_seconds = Some(idle);
        self
    }

    pub fn with_free_disk_gb(mut self, gb: f64) -> Self {
        self.free_disk_bytes = Some((gb * GIB) as u64);
        self
    }

    pub fn with_network(mut self, reachable: bool) -> Self {
        self.network_reachable = Some(reachable);
        self
    }

    pub fn with_audio(mut self, available: bool) -> Self {
        self.audio_available = Some(available);
        self
    }

    pub fn with_active_window(mut self, title: &str) -> Self {
        self.active_window = Some(title.to_string());
        self
    }

    pub fn free_disk_gb(&self) -> Option<f64> {
        self.free_disk_bytes.map(|b| b as f64 / GIB)
    }

    /// Whether a running process is named `needle`.
    ///
    /// Names are compared word by word (split on anything that is not a
    /// letter or digit), so "code" matches "code" and "code.exe" but not
    /// "vscode-helper". A multi-word needle also matches its words run
    /// together: "windows media player" matches "WindowsMediaPlayer.exe"
    /// and "epic games" matches "EpicGamesLauncher".
    pub fn is_running(&self, needle: &str) -> bool {
        let words = name_words(needle);
        if words.is_empty() {
            return false;
        }
        let joined = words.concat();
        self.running_processes.iter().any(|p| {
            let tokens = name_words(p);
            tokens.windows(words.len()).any(|w| w == words.as_slice())
                || (words.len() > 1 && tokens.iter().any(|t| t.starts_with(&joined)))
        })
    }
}

fn name_words(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}
