//! Built-in action adapters.
//!
//! Real adapters live outside this crate. These two cover the service
//! binary's dry-run mode and tests.

use roxy_common::{ActionAdapter, AdapterOutcome, Interpretation};
use std::sync::Mutex;
use tracing::info;

/// Logs the action and reports success
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunAdapter;

impl ActionAdapter for DryRunAdapter {
    fn execute(&self, interpretation: &Interpretation) -> AdapterOutcome {
        info!(
            "[dry-run] {} {} {:?}",
            interpretation.action,
            interpretation.target.as_deref().unwrap_or("-"),
            interpretation.execution_data
        );
        AdapterOutcome::ok()
    }
}

/// Remembers every interpretation it is handed; targets listed in
/// `failing` report failure
#[derive(Debug, Default)]
pub struct RecordingAdapter {
    executed: Mutex<Vec<Interpretation>>,
    failing: Vec<String>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, target: &str) -> Self {
        self.failing.push(target.to_lowercase());
        self
    }

    pub fn executed(&self) -> Vec<Interpretation> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.executed.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl ActionAdapter for RecordingAdapter {
    fn execute(&self, interpretation: &Interpretation) -> AdapterOutcome {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(interpretation.clone());
        }
        match interpretation.target_lower() {
            Some(t) if self.failing.contains(&t) => {
                AdapterOutcome::failed(format!("No se pudo ejecutar {}", t))
            }
            _ => AdapterOutcome::ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxy_common::{Action, CommandType};

    #[test]
    fn test_recording_adapter_failures() {
        let adapter = RecordingAdapter::new().failing_on("Steam");
        let steam = Interpretation::new(CommandType::App, Action::OpenApp, Some("steam".into()), 0.9);
        let chrome = Interpretation::new(CommandType::App, Action::OpenApp, Some("chrome".into()), 0.9);

        assert!(!adapter.execute(&steam).success);
        assert!(adapter.execute(&chrome).success);
        assert_eq!(adapter.count(), 2);
        assert_eq!(adapter.executed()[1].target.as_deref(), Some("chrome"));
    }
}
