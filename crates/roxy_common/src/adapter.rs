//! Action adapter contract.
//!
//! Adapters open apps, stream media or search content. The pipeline only
//! knows this interface.

use serde::{Deserialize, Serialize};

use crate::interpretation::Interpretation;

/// What an adapter reports back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl AdapterOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Executes a finalized interpretation
pub trait ActionAdapter: Send + Sync {
    fn execute(&self, interpretation: &Interpretation) -> AdapterOutcome;
}

/// Lets callers keep a handle on an adapter the pipeline owns
impl<T: ActionAdapter + ?Sized> ActionAdapter for std::sync::Arc<T> {
    fn execute(&self, interpretation: &Interpretation) -> AdapterOutcome {
        (**self).execute(interpretation)
    }
}
