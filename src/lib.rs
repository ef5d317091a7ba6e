//! askpipe: Observable Question-Answering Pipeline
//!
//! Answers a question through five stages (retrieval, tool, generation,
//! evaluation, remediation). Every stage runs inside a span that carries a
//! fixed attribute contract, every failure is classified into a closed
//! taxonomy, and the final request status is resolved from the stage outcomes
//! and the remediation decision.

pub mod cli;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod remediation;
pub mod stage;
pub mod status;
pub mod taxonomy;
pub mod telemetry;
pub mod types;

pub use error::ApiError;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use types::{AskRequest, AskResponse, ChaosFlags, SpanStatus, Stage};
