// verdict: content risk scoring and classification
//
// This is the library root. Each module corresponds to a stage of the
// pipeline (agents → scoring → history) or to the state around it
// (rules, tags, storage).

pub mod agents;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod history;
pub mod output;
pub mod pipeline;
pub mod rules;
pub mod scoring;
pub mod status;
pub mod tagging;

#[cfg(feature = "web")]
pub mod web;

pub use engine::{Engine, PipelineHandle};
pub use error::{EngineError, ValidationError};
