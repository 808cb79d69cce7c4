//! Pre-execution validation outcome.

use serde::{Deserialize, Serialize};

/// Verdict of the pre-execution validator for one interpretation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub should_execute: bool,
    pub confidence_score: f64,
    pub warnings: Vec<String>,
    pub blocking_issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub delay_seconds: u64,
}

impl ValidationOutcome {
    /// Nothing checked, nothing to object to
    pub fn pass() -> Self {
        Self {
            should_execute: true,
            confidence_score: 1.0,
            warnings: Vec::new(),
            blocking_issues: Vec::new(),
            recommendations: Vec::new(),
            delay_seconds: 0,
        }
    }

    pub fn is_blocked(&self) -> bool {
        !self.blocking_issues.is_empty()
    }

    /// One-line summary for logs and user messages
    pub fn summary(&self) -> String {
        if self.should_execute {
            format!(
                "ok (score {:.2}, {} warnings, delay {}s)",
                self.confidence_score,
                self.warnings.len(),
                self.delay_seconds
            )
        } else if self.blocking_issues.is_empty() {
            format!("low validation score {:.2}", self.confidence_score)
        } else {
            format!("blocked: {}", self.blocking_issues.join(", "))
        }
    }
}
