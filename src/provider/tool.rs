use crate::provider::{Tool, ToolOutput};
use crate::taxonomy::StageFailure;
use async_trait::async_trait;

/// Tool that reports a fixed system status line.
#[derive(Debug, Clone)]
pub struct StatusTool {
    name: String,
    timeout_ms: u64,
    result: String,
}

impl Default for StatusTool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME, 2000, Self::DEFAULT_RESULT)
    }
}

impl StatusTool {
    pub const DEFAULT_NAME: &'static str = "system_status";
    pub const DEFAULT_RESULT: &'static str = "All systems operational";

    pub fn new(name: impl Into<String>, timeout_ms: u64, result: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout_ms,
            result: result.into(),
        }
    }
}

#[async_trait]
impl Tool for StatusTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    async fn invoke(&self) -> Result<ToolOutput, StageFailure> {
        Ok(ToolOutput {
            result: self.result.clone(),
        })
    }
}
