// ============================================================================
// INFERENCE CLIENT
// ============================================================================
// The external model is reached through one async call: prompt in, text out.
// Per-call failures are values, never panics, and are attributed to the one
// row or batch that made the call.
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::config::InferenceConfig;
use crate::error::InferenceError;
use crate::query::DisplayRow;

/// Longest slice of an error body kept in an error message
const ERROR_BODY_PREVIEW: usize = 256;

// ----------------------------------------------------------------------------
// Client Trait
// ----------------------------------------------------------------------------

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Send one prompt and return the model's text.
    async fn call(&self, prompt: &str) -> Result<String, InferenceError>;
}

// ----------------------------------------------------------------------------
// HTTP Client
// ----------------------------------------------------------------------------

/// Completion endpoint over HTTP. Posts `{ "model", "prompt" }` and reads the
/// text at a configured JSON pointer of the response.
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    client: HttpClient,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    response_pointer: String,
}

impl HttpInferenceClient {
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let client = HttpClient::builder()
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| InferenceError::transport(e.to_string()))?;

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            debug!(
                target: "convolens::inference",
                env = %config.api_key_env,
                "No API key in environment; sending unauthenticated requests"
            );
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            response_pointer: config.response_pointer.clone(),
        })
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn call(&self, prompt: &str) -> Result<String, InferenceError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "model": self.model, "prompt": prompt }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| InferenceError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = status_error(status, &body);
            warn!(target: "convolens::inference", status = status.as_u16(), "Inference call rejected");
            return Err(error);
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| InferenceError::format(format!("response body is not JSON: {}", e)))?;
        extract_text(&body, &self.response_pointer)
    }
}

fn status_error(status: StatusCode, body: &str) -> InferenceError {
    let message: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
    if status == StatusCode::TOO_MANY_REQUESTS {
        InferenceError::Quota { message }
    } else {
        InferenceError::Http {
            status: status.as_u16(),
            message,
        }
    }
}

/// Text at `pointer`. Non-string values are returned as their JSON text.
pub fn extract_text(body: &JsonValue, pointer: &str) -> Result<String, InferenceError> {
    match body.pointer(pointer) {
        Some(JsonValue::String(text)) => Ok(text.clone()),
        Some(JsonValue::Null) | None => Err(InferenceError::format(format!(
            "nothing at '{}' in response",
            pointer
        ))),
        Some(other) => Ok(other.to_string()),
    }
}

// ----------------------------------------------------------------------------
// Structured Responses
// ----------------------------------------------------------------------------

/// Parse model text as a JSON value. Models often wrap JSON in a fenced code
/// block or surround it with prose, so the outermost object or array is
/// tried when the whole text does not parse.
pub fn parse_structured(text: &str) -> Result<JsonValue, InferenceError> {
    let trimmed = strip_fence(text.trim());
    if let Ok(value) = serde_json::from_str::<JsonValue>(trimmed) {
        return Ok(value);
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<JsonValue>(&trimmed[start..=end]) {
                    return Ok(value);
                }
            }
        }
    }

    Err(InferenceError::format("model output is not JSON"))
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (```json) up to the first newline.
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

// ----------------------------------------------------------------------------
// Prompts
// ----------------------------------------------------------------------------

/// Instruction preambles for the three kinds of call. Inputs are appended
/// as JSON after the preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub row: String,
    pub batch: String,
    pub final_summary: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            row: "Analyze this conversation record. Respond with a JSON object.".into(),
            batch: "Consolidate these conversation insights. Respond with a JSON object.".into(),
            final_summary: "Summarize these findings into one report. Respond with a JSON object."
                .into(),
        }
    }
}

impl Prompts {
    pub fn render_row(&self, row: &DisplayRow) -> String {
        let fields: serde_json::Map<String, JsonValue> = row
            .values
            .iter()
            .map(|(name, value)| (name.clone(), JsonValue::String(value.clone())))
            .collect();
        format!("{}\n\n{}", self.row, JsonValue::Object(fields))
    }

    pub fn render_batch(&self, insights: &[JsonValue]) -> String {
        format!("{}\n\n{}", self.batch, JsonValue::Array(insights.to_vec()))
    }

    pub fn render_final(&self, inputs: &[JsonValue]) -> String {
        format!("{}\n\n{}", self.final_summary, JsonValue::Array(inputs.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[rstest]
    #[case("{\"topic\": \"vpn\"}")]
    #[case("```json\n{\"topic\": \"vpn\"}\n```")]
    #[case("```\n{\"topic\": \"vpn\"}```")]
    #[case("Here you go: {\"topic\": \"vpn\"} hope it helps")]
    fn test_parse_structured_variants(#[case] text: &str) {
        assert_eq!(parse_structured(text).unwrap(), json!({ "topic": "vpn" }));
    }

    #[test]
    fn test_parse_structured_rejects_prose() {
        assert!(matches!(
            parse_structured("no json here"),
            Err(InferenceError::Format { .. })
        ));
    }

    #[test]
    fn test_extract_text() {
        let body = json!({ "choices": [{ "text": "hello" }], "usage": { "total": 3 } });
        assert_eq!(extract_text(&body, "/choices/0/text").unwrap(), "hello");
        assert_eq!(extract_text(&body, "/usage").unwrap(), "{\"total\":3}");
        assert!(extract_text(&body, "/choices/1/text").is_err());
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            InferenceError::Quota { .. }
        ));
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, "upstream"),
            InferenceError::Http { status: 502, message: "upstream".into() }
        );
    }

    #[test]
    fn test_row_prompt_carries_fields() {
        let row = DisplayRow {
            row_id: 3,
            values: vec![("Domain".into(), "Billing".into())],
        };
        let prompt = Prompts::default().render_row(&row);
        assert!(prompt.ends_with("{\"Domain\":\"Billing\"}"));
    }

    /// Serve one canned HTTP response and return the raw request.
    async fn serve_once(listener: TcpListener, status: &'static str, body: &'static str) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= head_end + 4 + length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&request).into_owned()
    }

    fn client_for(addr: std::net::SocketAddr) -> HttpInferenceClient {
        let config = InferenceConfig {
            endpoint: format!("http://{}/v1/completions", addr),
            model: "test-model".into(),
            api_key_env: "CONVOLENS_TEST_KEY_THAT_IS_NOT_SET".into(),
            ..InferenceConfig::default()
        };
        HttpInferenceClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_http_client_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = client_for(listener.local_addr().unwrap());
        let server = tokio::spawn(serve_once(listener, "200 OK", r#"{"choices":[{"text":"{\"ok\":true}"}]}"#));

        let text = client.call("hello").await.unwrap();
        assert_eq!(text, "{\"ok\":true}");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/completions"));
        assert!(request.contains("\"model\":\"test-model\""));
        assert!(request.contains("\"prompt\":\"hello\""));
    }

    #[tokio::test]
    async fn test_http_client_maps_quota() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = client_for(listener.local_addr().unwrap());
        let server = tokio::spawn(serve_once(listener, "429 Too Many Requests", "{}"));

        let err = client.call("hello").await.unwrap_err();
        assert!(matches!(err, InferenceError::Quota { .. }));
        server.await.unwrap();
    }
}
