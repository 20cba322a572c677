//! HTTP Generation Provider
//!
//! Provider implementation over a chat-completion style HTTP endpoint.
//! Supports both single-payload responses and chunked event streams; the
//! stream path assembles text through [`EventStreamDecoder`] and honors
//! external cancellation by dropping the body stream mid-read.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::stream::{EventStreamDecoder, StreamEvent};
use super::{CancelToken, GenerationCall, GenerationProvider, ProviderSpec};
use crate::types::{ErrorClassifier, ForgeError, ProviderError, ProviderErrorKind, Result};

/// Maximum error-body length kept for classification messages
const MAX_ERROR_BODY: usize = 512;

/// Generation provider backed by an HTTP endpoint
pub struct HttpProvider {
    name: String,
    endpoint: String,
    model: String,
    supports_streaming: bool,
    /// API key stored securely - never exposed in logs or debug output
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("supports_streaming", &self.supports_streaming)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpProvider {
    pub fn new(spec: ProviderSpec) -> Result<Self> {
        spec.validate()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(spec.timeout_secs))
            .connect_timeout(Duration::from_secs(
                crate::constants::network::CONNECTION_TIMEOUT_SECS,
            ))
            .build()
            .map_err(|e| ForgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: spec.name,
            endpoint: spec.endpoint,
            model: spec.model,
            supports_streaming: spec.supports_streaming,
            api_key: spec.api_key.map(SecretString::from),
            client,
        })
    }

    fn build_request(&self, call: &GenerationCall, stream: bool) -> reqwest::RequestBuilder {
        let body = WireRequest {
            model: if call.model.is_empty() {
                &self.model
            } else {
                &call.model
            },
            messages: &call.messages,
            temperature: call.temperature,
            max_tokens: call.max_tokens,
            stream,
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }

        request
    }

    async fn send(&self, call: &GenerationCall, stream: bool) -> Result<reqwest::Response> {
        let response = self
            .build_request(call, stream)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(e.to_string(), &self.name))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(MAX_ERROR_BODY);
            return Err(ErrorClassifier::classify_http_status(
                status.as_u16(),
                body,
                &self.name,
            )
            .into());
        }

        Ok(response)
    }

    /// Assemble a chunked event stream into accumulated text.
    ///
    /// The loop selects on the cancel token so an external cancel aborts
    /// the underlying transport promptly by dropping the body stream.
    async fn generate_streaming(
        &self,
        call: &GenerationCall,
        cancel: &CancelToken,
    ) -> Result<String> {
        let response = self.send(call, true).await?;
        let mut body = response.bytes_stream();
        let mut decoder = EventStreamDecoder::new();
        let mut text = String::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(provider = %self.name, "Streaming read cancelled");
                    return Err(ForgeError::Cancelled("streaming generation call".into()));
                }
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for event in decoder.feed(&bytes) {
                            match event {
                                StreamEvent::Data(payload) => {
                                    if let Some(fragment) = delta_text(&payload) {
                                        text.push_str(&fragment);
                                    }
                                }
                                StreamEvent::Done => return Ok(text),
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(ErrorClassifier::classify_transport(
                            format!("stream read failed: {}", e),
                            &self.name,
                        )
                        .into());
                    }
                    // Closure without the explicit terminator still ends the
                    // stream cleanly; flush any trailing partial line first.
                    None => {
                        if let Some(StreamEvent::Data(payload)) = decoder.finish()
                            && let Some(fragment) = delta_text(&payload)
                        {
                            text.push_str(&fragment);
                        }
                        return Ok(text);
                    }
                }
            }
        }
    }

    async fn generate_single(&self, call: &GenerationCall) -> Result<String> {
        let response = self.send(call, false).await?;

        let value: Value = response.json().await.map_err(|e| {
            ProviderError::with_provider(
                ProviderErrorKind::Malformed,
                format!("unparseable response body: {}", e),
                &self.name,
            )
        })?;

        completion_text(&value).ok_or_else(|| {
            ProviderError::with_provider(
                ProviderErrorKind::Malformed,
                "no content in response body",
                &self.name,
            )
            .into()
        })
    }
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    async fn generate(&self, call: &GenerationCall, cancel: &CancelToken) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(ForgeError::Cancelled("generation call".into()));
        }

        debug!(provider = %self.name, model = %self.model, stream = call.stream, "Generation call");

        if call.stream && self.supports_streaming {
            self.generate_streaming(call, cancel).await
        } else {
            self.generate_single(call).await
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_streaming(&self) -> bool {
        self.supports_streaming
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.get(&self.endpoint).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!(provider = %self.name, "Health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [super::ChatMessage],
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

/// Extract the text fragment from one stream-event payload.
///
/// Known provider families are checked in a fixed order and normalized to
/// plain text; a payload that is not JSON at all is itself the fragment.
/// Valid JSON in an unknown shape is ignored (metadata events).
fn delta_text(payload: &str) -> Option<String> {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return Some(payload.to_string());
    };

    let fragment = value
        .pointer("/choices/0/delta/content")
        .or_else(|| value.pointer("/choices/0/text"))
        .or_else(|| value.pointer("/delta/text"))
        .or_else(|| value.get("content"))
        .or_else(|| value.get("response"));

    fragment.and_then(Value::as_str).map(|s| s.to_string())
}

/// Extract the text from a complete (non-streamed) response payload
fn completion_text(value: &Value) -> Option<String> {
    let content = value
        .pointer("/choices/0/message/content")
        .or_else(|| value.pointer("/choices/0/text"))
        .or_else(|| value.get("content"))
        .or_else(|| value.get("response"))
        .or_else(|| value.get("text"));

    content
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
