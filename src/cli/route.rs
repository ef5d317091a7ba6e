//! CLI route: single route table and run context. Dispatches to the pipeline and presentation.

use crate::cli::parse::Commands;
use crate::cli::presentation::{format_ask_json, format_ask_text, format_eval};
use crate::cli::{command_name, output_format};
use crate::config::{AskpipeConfig, ConfigLoader};
use crate::error::ApiError;
use crate::evaluation::evaluate;
use crate::pipeline::Pipeline;
use crate::telemetry::{FanoutSink, LogSink, MetricsRegistry, RecordingSink, SpanSink};
use crate::types::{AskRequest, ChaosFlags};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runtime context for CLI execution: the loaded configuration.
pub struct RunContext {
    config: AskpipeConfig,
    color: bool,
}

impl RunContext {
    /// Load configuration from the global file, `config_path`, and the environment.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load_from(config_path.as_deref())?.validated()?;
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: AskpipeConfig) -> Self {
        Self {
            config,
            color: std::io::stdout().is_terminal(),
        }
    }

    pub fn config(&self) -> &AskpipeConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let result = self.execute_inner(command).await;
        info!(
            command = command_name(command),
            format = output_format(command),
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "command finished"
        );
        result
    }

    async fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Ask {
                query,
                tenant,
                request_id,
                break_tool,
                bad_retrieval,
                policy_risk,
                token_spike,
                format,
                show_spans,
            } => {
                let mut request = AskRequest::new(tenant.clone(), query.clone()).with_chaos(
                    ChaosFlags {
                        break_tool: *break_tool,
                        bad_retrieval: *bad_retrieval,
                        policy_risk: *policy_risk,
                        token_spike: *token_spike,
                    },
                );
                if let Some(id) = request_id {
                    request = request.with_request_id(id.clone());
                }
                self.handle_ask(request, format, *show_spans).await
            }
            Commands::Eval {
                query,
                context,
                answer,
                format,
            } => format_eval(&evaluate(query, context, answer), format),
            Commands::Config => self.config.to_toml(),
        }
    }

    async fn handle_ask(
        &self,
        request: AskRequest,
        format: &str,
        show_spans: bool,
    ) -> Result<String, ApiError> {
        let recording = Arc::new(RecordingSink::new());
        let log: Arc<dyn SpanSink> = Arc::new(LogSink);
        let spans = FanoutSink::new(vec![log]).with(recording.clone());
        let metrics = Arc::new(MetricsRegistry::new());
        let pipeline = Pipeline::from_config(&self.config, Arc::new(spans), metrics.clone())?;

        let response = pipeline.ask(request).await?;
        debug!(metrics = ?metrics.snapshot(), "request metrics");

        let records = recording.records();
        let spans = show_spans.then_some(records.as_slice());
        if format == "json" {
            format_ask_json(&response, spans)
        } else {
            Ok(format_ask_text(&response, spans, self.color))
        }
    }
}
