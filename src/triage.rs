//! AI failure triage: turns raw job logs into a structured verdict.
//!
//! The analyzer is infallible by contract. Missing credentials, transport
//! errors, and unparseable responses are all downgraded to synthesized
//! verdicts so an analyzer problem can never mask the real job failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::AnalyzerError;

/// OpenAI chat completions endpoint.
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Environment variable holding the analyzer credential.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Only the tail of the log text is sent to the model.
const MAX_LOG_BYTES: usize = 16 * 1024;

/// Single attempt, no retry; generous enough for a large log tail.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const SYSTEM_PROMPT: &str = "You are a DevOps expert analyzing failure logs.";

/// Structured root-cause verdict for a failed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageVerdict {
    /// Brief description of what went wrong.
    pub summary: String,
    /// Error-kind tag, e.g. dependency_error, config_error, runtime_error.
    pub category: String,
    /// Suggested remediation.
    pub suggested_fix: String,
}

impl TriageVerdict {
    /// Synthesize a local verdict for an analyzer failure.
    #[must_use]
    pub fn from_analyzer_error(err: &AnalyzerError) -> Self {
        match err {
            AnalyzerError::MissingCredential { variable } => Self {
                summary: format!("AI triage is not configured: {variable} is not set"),
                category: "configuration_error".to_string(),
                suggested_fix: format!("Set the {variable} environment variable"),
            },
            AnalyzerError::Api { details } => Self {
                summary: format!("Error calling the triage API: {details}"),
                category: "api_error".to_string(),
                suggested_fix: "Check the API key and network connectivity".to_string(),
            },
            AnalyzerError::Parse { details } => Self {
                summary: format!("Triage response was not parseable: {details}"),
                category: "parse_error".to_string(),
                suggested_fix: "Inspect the raw job logs manually".to_string(),
            },
        }
    }
}

/// One blocking analysis call per failed job. Implementations must not fail:
/// any internal error becomes a best-effort verdict.
#[async_trait]
pub trait FailureAnalyzer: Send + Sync {
    async fn analyze(&self, logs: &str) -> TriageVerdict;
}

#[async_trait]
impl<T: FailureAnalyzer + ?Sized> FailureAnalyzer for Arc<T> {
    async fn analyze(&self, logs: &str) -> TriageVerdict {
        (**self).analyze(logs).await
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

/// Failure analyzer backed by the OpenAI chat completions API.
pub struct OpenAiAnalyzer {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiAnalyzer {
    #[must_use]
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    /// Point at a different endpoint (proxies, compatible servers).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn try_analyze(&self, logs: &str) -> Result<TriageVerdict, AnalyzerError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(AnalyzerError::MissingCredential {
                variable: API_KEY_VAR,
            })?;

        let prompt = format!(
            "Analyze this build/deployment failure log and provide:\n\
             1. A brief summary of what went wrong\n\
             2. The category of error (dependency_error, config_error, runtime_error, etc.)\n\
             3. A suggested fix\n\n\
             Log content:\n{}\n\n\
             Respond in JSON format with keys: summary, category, suggested_fix",
            tail(logs, MAX_LOG_BYTES)
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.3,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalyzerError::Api {
                details: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AnalyzerError::Api {
            details: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(AnalyzerError::Api {
                    details: err.error.message,
                });
            }
            return Err(AnalyzerError::Api {
                details: format!("{status}: {body}"),
            });
        }

        let api_response: ChatResponse =
            serde_json::from_str(&body).map_err(|e| AnalyzerError::Parse {
                details: e.to_string(),
            })?;

        let text = api_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        parse_verdict(&text)
    }
}

#[async_trait]
impl FailureAnalyzer for OpenAiAnalyzer {
    async fn analyze(&self, logs: &str) -> TriageVerdict {
        match self.try_analyze(logs).await {
            Ok(verdict) => {
                debug!(category = %verdict.category, "Triage verdict received");
                verdict
            }
            Err(err) => {
                warn!(error = %err, "Analyzer failed, synthesizing local verdict");
                TriageVerdict::from_analyzer_error(&err)
            }
        }
    }
}

/// Parse the model reply into a verdict, tolerating markdown code fences.
pub fn parse_verdict(text: &str) -> Result<TriageVerdict, AnalyzerError> {
    let stripped = strip_code_fences(text);
    serde_json::from_str(stripped).map_err(|e| AnalyzerError::Parse {
        details: e.to_string(),
    })
}

/// Strip a surrounding ```json ... ``` (or bare ```) fence if present.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map_or(rest, str::trim).trim()
}

/// Final `max_bytes` of `text`, split on a char boundary.
fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_plain_json() {
        let text = r#"{"summary": "s", "category": "c", "suggested_fix": "f"}"#;
        assert_eq!(strip_code_fences(text), text);
    }

    #[test]
    fn test_strip_json_fence() {
        let text = "```json\n{\"summary\": \"s\"}\n```";
        assert_eq!(strip_code_fences(text), "{\"summary\": \"s\"}");
    }

    #[test]
    fn test_strip_bare_fence() {
        let text = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_verdict_with_fence() {
        let text = "```json\n{\"summary\": \"missing module\", \"category\": \"dependency_error\", \"suggested_fix\": \"pip install foo\"}\n```";
        let verdict = parse_verdict(text).unwrap();
        assert_eq!(verdict.category, "dependency_error");
        assert_eq!(verdict.suggested_fix, "pip install foo");
    }

    #[test]
    fn test_parse_verdict_rejects_garbage() {
        let err = parse_verdict("the job failed because of reasons").unwrap_err();
        assert!(matches!(err, AnalyzerError::Parse { .. }));
    }

    #[test]
    fn test_tail_caps_long_input() {
        let text = "x".repeat(MAX_LOG_BYTES * 2);
        assert_eq!(tail(&text, MAX_LOG_BYTES).len(), MAX_LOG_BYTES);
        assert_eq!(tail("short", MAX_LOG_BYTES), "short");
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let text = "é".repeat(10);
        let t = tail(&text, 3);
        assert!(t.len() <= 3);
        assert!(t.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn test_missing_credential_synthesizes_verdict() {
        let analyzer = OpenAiAnalyzer::new(None, "gpt-4o-mini");
        assert!(!analyzer.is_configured());

        let verdict = analyzer.analyze("ImportError: no module named foo").await;
        assert_eq!(verdict.category, "configuration_error");
        assert!(verdict.summary.contains(API_KEY_VAR));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_synthesizes_api_error() {
        let analyzer = OpenAiAnalyzer::new(Some("test-key".to_string()), "gpt-4o-mini")
            .with_base_url("http://127.0.0.1:1/v1/chat/completions");

        let verdict = analyzer.analyze("some failure").await;
        assert_eq!(verdict.category, "api_error");
    }
}
