//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("service.name", "askpipe")?
        .set_default("service.environment", "development")?
        .set_default("retrieval.provider", "keyword")?
        .set_default("retrieval.top_k", 3_i64)?
        .set_default("tool.name", "system_status")?
        .set_default("tool.timeout_ms", 2000_i64)?
        .set_default("generation.provider", "extractive")?
        .set_default("remediation.policy_risk_threshold", 0.7)?
        .set_default("remediation.quality_threshold", 0.75)?
        .set_default("remediation.faithfulness_threshold", 0.8)?
        .set_default("remediation.trigger", "overall")
}
