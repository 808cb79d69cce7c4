//! Roxy daemon library - the command interpretation pipeline, exposed for
//! the binaries and integration tests.

pub mod adapters;
pub mod ambiguity;
pub mod confidence;
pub mod config;
pub mod corrector;
pub mod learning;
pub mod pipeline;
pub mod probe;
pub mod resolver;
pub mod validator;

pub use config::Config;
pub use pipeline::{Decision, ExecutionReport, Pipeline, PipelineContext};
