//! CLI parse: clap types for askpipe. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// askpipe CLI - Observable question answering with evaluation and remediation
#[derive(Parser)]
#[command(name = "askpipe")]
#[command(about = "Answer questions through an observable retrieval/generation pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer one question
    Ask {
        /// The question
        query: String,
        /// Tenant the request is accounted to
        #[arg(long, default_value = "default")]
        tenant: String,
        /// Request id (generated when omitted)
        #[arg(long)]
        request_id: Option<String>,
        /// Make the tool stage time out
        #[arg(long)]
        break_tool: bool,
        /// Make retrieval return nothing
        #[arg(long)]
        bad_retrieval: bool,
        /// Append policy-violating content to the generated answer
        #[arg(long)]
        policy_risk: bool,
        /// Inflate the prompt with repeated context
        #[arg(long)]
        token_spike: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
        /// Also print every span emitted for the request
        #[arg(long)]
        show_spans: bool,
    },
    /// Score an answer without running the pipeline
    Eval {
        /// The question
        #[arg(long)]
        query: String,
        /// Retrieved context the answer should be grounded in
        #[arg(long, default_value = "")]
        context: String,
        /// The answer to score
        #[arg(long)]
        answer: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the effective configuration as TOML
    Config,
}
