//! CLI domain: parse, route, help, output, and presentation only.
//! No pipeline logic; a single route table dispatches to the pipeline.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::{command_name, output_format};
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_ask_json, format_ask_text, format_eval, format_scores_table, format_spans_table,
};
pub use route::RunContext;
