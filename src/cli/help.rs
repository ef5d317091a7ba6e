//! CLI help and command-name contract for logging.

use crate::cli::parse::Commands;

/// Command name string for log correlation (e.g. "ask", "eval").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Ask { .. } => "ask",
        Commands::Eval { .. } => "eval",
        Commands::Config => "config",
    }
}

/// Output format requested by the command, `text` when it has none.
pub fn output_format(command: &Commands) -> &str {
    match command {
        Commands::Ask { format, .. } | Commands::Eval { format, .. } => format,
        Commands::Config => "text",
    }
}
