//! Integration tests for the configuration system

use super::test_utils::*;
use askpipe::config::{AskpipeConfig, ConfigLoader};
use askpipe::pipeline::Pipeline;
use askpipe::remediation::{ActionType, QualityTrigger};
use askpipe::taxonomy::ErrorCode;
use askpipe::telemetry::{MetricsRegistry, RecordingSink};
use askpipe::{ApiError, AskRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn load(dir: &TempDir, toml: &str, env: &[(&str, &str)]) -> Result<AskpipeConfig, ApiError> {
    let path = dir.path().join("askpipe.toml");
    std::fs::write(&path, toml).unwrap();
    ConfigLoader::new()
        .without_global()
        .with_file(&path)
        .with_env(
            env.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
        .load()
}

#[tokio::test]
async fn file_config_wires_corpus_and_tool() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus.json");
    std::fs::write(
        &corpus,
        r#"[
  {"id": "kb-1", "title": "Widgets", "text": "Widgets are assembled in the north plant. Each widget is tested twice."},
  {"id": "kb-2", "title": "Gadgets", "text": "Gadgets ship from the south warehouse."}
]"#,
    )
    .unwrap();

    let config = load(
        &dir,
        &format!(
            r#"
[service]
name = "kb-assistant"
environment = "staging"

[retrieval]
top_k = 1
corpus = "{}"

[tool]
name = "inventory"
timeout_ms = 750
result = "inventory nominal"
"#,
            corpus.display()
        ),
        &[],
    )
    .unwrap();

    let spans = Arc::new(RecordingSink::new());
    let pipeline =
        Pipeline::from_config(&config, spans.clone(), Arc::new(MetricsRegistry::new())).unwrap();
    let response = pipeline
        .ask(AskRequest::new(TENANT, "Where are widgets assembled?"))
        .await
        .unwrap();

    assert_eq!(response.retrieval.sources, vec!["kb-1".to_string()]);
    assert!(response.answer.contains("north plant"));

    let tool = &spans.records_named("core.tool")[0];
    assert_eq!(tool.attr_str("tool.name"), Some("inventory"));
    assert_eq!(tool.attr("tool.timeout_ms").and_then(|v| v.as_i64()), Some(750));
    assert_eq!(tool.attr_str("service.name"), Some("kb-assistant"));
    assert_eq!(tool.attr_str("deployment.environment"), Some("staging"));
}

#[tokio::test]
async fn env_switches_quality_trigger() {
    let dir = TempDir::new().unwrap();
    let config = load(
        &dir,
        "[remediation]\nquality_threshold = 0.75\n",
        &[
            ("ASKPIPE__REMEDIATION__TRIGGER", "faithfulness"),
            ("ASKPIPE__REMEDIATION__FAITHFULNESS_THRESHOLD", "0.99"),
        ],
    )
    .unwrap();
    assert_eq!(config.remediation.trigger, QualityTrigger::Faithfulness);
    assert_eq!(config.remediation.faithfulness_threshold, 0.99);

    let pipeline = Pipeline::from_config(
        &config,
        Arc::new(RecordingSink::new()),
        Arc::new(MetricsRegistry::new()),
    )
    .unwrap();
    let response = pipeline.ask(request()).await.unwrap();
    if response.eval.faithfulness < 0.99 {
        assert_eq!(
            response.remediation.actions[0].action_type,
            ActionType::Clarification
        );
    } else {
        assert!(!response.remediation.triggered);
    }
}

#[test]
fn invalid_thresholds_fail_validation() {
    let dir = TempDir::new().unwrap();
    let config = load(
        &dir,
        "[remediation]\nquality_threshold = 1.5\npolicy_risk_threshold = -0.1\n",
        &[],
    )
    .unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 2);

    let err = Pipeline::from_config(
        &config,
        Arc::new(RecordingSink::new()),
        Arc::new(MetricsRegistry::new()),
    )
    .err()
    .unwrap();
    match err {
        ApiError::ConfigError(message) => assert!(message.contains("quality_threshold")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unreadable_corpus_is_reported() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus.json");
    std::fs::write(&corpus, "{not json").unwrap();
    let mut config = AskpipeConfig::default();
    config.retrieval.corpus = Some(corpus);

    let err = Pipeline::from_config(
        &config,
        Arc::new(RecordingSink::new()),
        Arc::new(MetricsRegistry::new()),
    )
    .err()
    .unwrap();
    assert!(matches!(err, ApiError::ConfigError(_)));
}

#[tokio::test]
async fn unreachable_openai_endpoint_fails_generation() {
    let dir = TempDir::new().unwrap();
    let config = load(
        &dir,
        r#"
[generation]
provider = "openai"
api_key = "sk-test"
endpoint = "http://127.0.0.1:9/v1"
"#,
        &[],
    )
    .unwrap();

    let spans = Arc::new(RecordingSink::new());
    let pipeline =
        Pipeline::from_config(&config, spans.clone(), Arc::new(MetricsRegistry::new())).unwrap();
    let err = pipeline.ask(request()).await.unwrap_err();

    assert_eq!(
        err.classification().map(|c| c.code),
        Some(ErrorCode::LlmProviderDown)
    );
    let generation = &spans.records_named("core.generation")[0];
    assert_eq!(generation.attr_str("generation.provider"), Some("openai"));
    assert_eq!(generation.attr_str("generation.model"), Some("gpt-4o-mini"));
    assert_eq!(spans.open_spans(), 0);
}
