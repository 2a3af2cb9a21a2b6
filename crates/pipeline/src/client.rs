use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde_json::Value;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;

/// Classified failure kinds for a chat-completion call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    NoApiKey,
    Http429,
    Http5xx,
    Http4xx,
    NetworkError,
    InvalidJson,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoApiKey => "no_api_key",
            Self::Http429 => "http_429",
            Self::Http5xx => "http_5xx",
            Self::Http4xx => "http_4xx",
            Self::NetworkError => "network_error",
            Self::InvalidJson => "invalid_json",
        }
    }
    /// 429s, 5xx, and network failures are worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http429 | Self::Http5xx | Self::NetworkError)
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one chat-completion invocation (after client retries).
#[derive(Clone, Debug)]
pub struct ChatResult {
    pub ok: bool,
    pub status_code: Option<u16>,
    pub response_json: Option<Value>,
    pub error: Option<String>,
    pub error_type: Option<TransportErrorKind>,
    pub request_id: Option<String>,
}

impl ChatResult {
    pub fn success(status_code: u16, response_json: Value, request_id: Option<String>) -> Self {
        Self {
            ok: true,
            status_code: Some(status_code),
            response_json: Some(response_json),
            error: None,
            error_type: None,
            request_id,
        }
    }
    pub fn failure(
        error_type: TransportErrorKind,
        status_code: Option<u16>,
        error: impl Into<String>,
        request_id: Option<String>,
    ) -> Self {
        Self {
            ok: false,
            status_code,
            response_json: None,
            error: Some(error.into()),
            error_type: Some(error_type),
            request_id,
        }
    }
}

/// One chat-completion request: system + user messages and one tool per
/// legal action, with the tool choice forced.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub tools: Vec<Value>,
    pub reasoning: Option<Value>,
}

/// The remote-model seam. The production implementation speaks to
/// OpenRouter; tests substitute scripted policies.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    async fn create_chat_completion(&self, request: ChatRequest) -> ChatResult;
}

/// OpenRouter chat-completions client with typed error classification
/// and bounded exponential backoff for retryable failures.
pub struct OpenRouterClient {
    api_key: Option<String>,
    base_url: String,
    max_retries: u32,
    client: reqwest::Client,
    jitter: Mutex<SmallRng>,
}

impl OpenRouterClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://openrouter.ai/api/v1";
    const BACKOFF_BASE_S: f64 = 0.5;

    pub fn new(api_key: Option<String>) -> anyhow::Result<Self> {
        Self::with_base_url(api_key, Self::DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> anyhow::Result<Self> {
        let api_key = api_key.or_else(|| std::env::var("OPENROUTER_API_KEY").ok());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 2,
            client,
            jitter: Mutex::new(SmallRng::seed_from_u64(0)),
        })
    }

    async fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter = self.jitter.lock().await.random_range(0.0..0.1);
        Duration::from_secs_f64(Self::BACKOFF_BASE_S * 2f64.powi(attempt as i32) + jitter)
    }

    fn request_id_from(response: &reqwest::Response) -> Option<String> {
        for header in ["x-request-id", "openrouter-request-id"] {
            if let Some(value) = response.headers().get(header) {
                if let Ok(value) = value.to_str() {
                    return Some(value.to_string());
                }
            }
        }
        None
    }
}

#[async_trait::async_trait]
impl ModelClient for OpenRouterClient {
    async fn create_chat_completion(&self, request: ChatRequest) -> ChatResult {
        let Some(api_key) = &self.api_key else {
            return ChatResult::failure(
                TransportErrorKind::NoApiKey,
                None,
                "OPENROUTER_API_KEY not set",
                None,
            );
        };
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": 0.0,
            "tools": request.tools,
            "tool_choice": "required",
        });
        if let Some(reasoning) = &request.reasoning {
            payload["reasoning"] = reasoning.clone();
        }
        let url = format!("{}/chat/completions", self.base_url);

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let response = self
                .client
                .post(&url)
                .bearer_auth(api_key)
                .json(&payload)
                .send()
                .await;
            let response = match response {
                Ok(response) => response,
                Err(error) => {
                    let result = ChatResult::failure(
                        TransportErrorKind::NetworkError,
                        None,
                        error.to_string(),
                        None,
                    );
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.backoff_delay(attempt).await).await;
                        last_error = Some(result);
                        continue;
                    }
                    return result;
                }
            };
            let status = response.status().as_u16();
            let request_id = Self::request_id_from(&response);
            if status >= 400 {
                let error_type = match status {
                    429 => TransportErrorKind::Http429,
                    500..=599 => TransportErrorKind::Http5xx,
                    _ => TransportErrorKind::Http4xx,
                };
                if error_type.is_retryable() && attempt < self.max_retries {
                    tokio::time::sleep(self.backoff_delay(attempt).await).await;
                    last_error = Some(ChatResult::failure(
                        error_type,
                        Some(status),
                        format!("HTTP {}", status),
                        request_id,
                    ));
                    continue;
                }
                let body = response.text().await.unwrap_or_default();
                let error = if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.trim().to_string()
                };
                return ChatResult::failure(error_type, Some(status), error, request_id);
            }
            let body = match response.text().await {
                Ok(body) => body,
                Err(error) => {
                    return ChatResult::failure(
                        TransportErrorKind::NetworkError,
                        Some(status),
                        error.to_string(),
                        request_id,
                    );
                }
            };
            return match serde_json::from_str::<Value>(&body) {
                Ok(data) => {
                    let request_id =
                        request_id.or_else(|| data["id"].as_str().map(str::to_string));
                    ChatResult::success(status, data, request_id)
                }
                Err(_) => ChatResult::failure(
                    TransportErrorKind::InvalidJson,
                    Some(status),
                    "invalid JSON response",
                    request_id,
                ),
            };
        }
        last_error.unwrap_or_else(|| {
            ChatResult::failure(
                TransportErrorKind::NetworkError,
                None,
                "chat completion request failed",
                None,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_have_wire_names() {
        assert_eq!(TransportErrorKind::Http429.as_str(), "http_429");
        assert_eq!(TransportErrorKind::NoApiKey.as_str(), "no_api_key");
        assert!(TransportErrorKind::Http5xx.is_retryable());
        assert!(!TransportErrorKind::Http4xx.is_retryable());
        assert!(!TransportErrorKind::InvalidJson.is_retryable());
    }

    #[tokio::test]
    async fn missing_api_key_short_circuits() {
        let client = OpenRouterClient::with_base_url(None, "http://127.0.0.1:0").unwrap();
        let client = OpenRouterClient {
            api_key: None,
            ..client
        };
        let result = client
            .create_chat_completion(ChatRequest {
                model: "m".into(),
                messages: vec![],
                tools: vec![],
                reasoning: None,
            })
            .await;
        assert!(!result.ok);
        assert_eq!(result.error_type, Some(TransportErrorKind::NoApiKey));
    }
}
