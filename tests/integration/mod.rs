//! Integration tests for the askpipe pipeline

mod config_integration;
mod metrics_concurrency;
mod pipeline_scenarios;
mod span_contract;
mod test_utils;
