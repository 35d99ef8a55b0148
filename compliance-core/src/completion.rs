use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt, future::Either, stream};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{ComplianceError, Result};
use crate::sse::delta_stream;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";

/// Total deadline for one completion call, streamed reads included.
/// A stalled upstream must not hang a handler indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Structured-output constraint forwarded verbatim to the completion API
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
    pub json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonSchemaFormat {
    pub name: &'static str,
    pub schema: Value,
    pub strict: bool,
}

impl ResponseFormat {
    /// Strict named-schema constraint: the model must emit a JSON document
    /// matching `schema` instead of free text.
    pub fn json_schema(name: &'static str, schema: Value) -> Self {
        Self {
            format_type: "json_schema",
            json_schema: JsonSchemaFormat {
                name,
                schema,
                strict: true,
            },
        }
    }
}

/// A fully constructed prompt plus its optional output-schema constraint
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub prompt: String,
    pub response_format: Option<ResponseFormat>,
}

impl PromptRequest {
    pub fn new(prompt: String) -> Self {
        Self {
            prompt,
            response_format: None,
        }
    }

    pub fn with_schema(prompt: String, format: ResponseFormat) -> Self {
        Self {
            prompt,
            response_format: Some(format),
        }
    }
}

/// Non-streaming completion seam used by the fan-out aggregator.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Submit a prompt and return the model's full response text.
    async fn complete(&self, request: &PromptRequest) -> Result<String>;
}

/// Client for an OpenAI-compatible chat-completion endpoint.
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl CompletionClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ComplianceError::UpstreamTransport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            api_key,
            model,
        })
    }

    /// Build a client from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
    /// `COMPLETION_MODEL`; only the key is required.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ComplianceError::MissingConfig("OPENAI_API_KEY"))?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model =
            std::env::var("COMPLETION_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self::new(base_url, api_key, model)
    }

    fn request_body(&self, request: &PromptRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "stream": stream,
        });
        if let Some(format) = &request.response_format {
            body["response_format"] =
                serde_json::to_value(format).expect("response format serializes");
        }
        body
    }

    /// Issue a streaming completion call and return the fragment stream.
    ///
    /// The request is not sent until the stream is first polled. A failed
    /// send or a non-2xx status yields a stream whose only item is the
    /// error: by the time a relay observes it, response headers may already
    /// be committed, so the failure has to be surfaced in-band.
    pub fn stream(&self, request: PromptRequest) -> impl Stream<Item = Result<String>> + Send + use<> {
        let http = self.http.clone();
        let url = format!("{}/chat/completions", self.base_url);
        let api_key = self.api_key.clone();
        let body = self.request_body(&request, true);

        stream::once(async move {
            let attempt = async {
                debug!(%url, "starting streaming completion call");
                let response = http
                    .post(&url)
                    .bearer_auth(&api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| ComplianceError::UpstreamTransport(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ComplianceError::UpstreamStatus {
                        status: status.as_u16(),
                        body,
                    });
                }
                Ok(delta_stream(response.bytes_stream()))
            };

            match attempt.await {
                Ok(fragments) => Either::Left(fragments),
                Err(err) => Either::Right(stream::iter([Err(err)])),
            }
        })
        .flatten()
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(&self, request: &PromptRequest) -> Result<String> {
        let body = self.request_body(request, false);
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ComplianceError::UpstreamTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComplianceError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| ComplianceError::MalformedResponse(e.to_string()))?;

        document
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ComplianceError::MalformedResponse(
                    "missing choices[0].message.content".to_string(),
                )
            })
    }
}
