//! Roxy Common - Shared types for the command interpretation pipeline.
//!
//! Data model, error types and the contracts of the external collaborators
//! (classifier, knowledge lookup, action adapters).

pub mod adapter;
pub mod ambiguity;
pub mod classifier;
pub mod command;
pub mod context;
pub mod error;
pub mod interpretation;
pub mod knowledge;
pub mod outcome;
pub mod system_state;
pub mod validation;

pub use adapter::*;
pub use ambiguity::*;
pub use classifier::{ClassifierClient, ClientConfig, ClientError, FakeClassifier, HttpClassifierClient};
pub use command::*;
pub use context::*;
pub use error::RoxyError;
pub use interpretation::*;
pub use knowledge::{is_useful_answer, FakeKnowledge, HttpKnowledgeClient, KnowledgeClient, MIN_USEFUL_ANSWER_CHARS};
pub use outcome::*;
pub use system_state::*;
pub use validation::*;
