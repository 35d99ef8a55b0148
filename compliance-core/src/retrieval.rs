use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{ComplianceError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Path of the generated passage inside a Weaviate generative-search reply
const GENERATED_PATH: &str = "/data/Get/AI_Act_Article/0/_additional/generate/singleResult";

/// Seam for the vector-search backend: given a regulatory topic and the
/// flattened transcript, return a short guidance passage.
#[async_trait]
pub trait GuidanceSource: Send + Sync {
    async fn guidance(&self, topic: &str, transcript: &str) -> Result<String>;
}

/// Weaviate-backed guidance retrieval using generative search over the
/// `AI_Act_Article` collection.
pub struct WeaviateRetriever {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WeaviateRetriever {
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ComplianceError::UpstreamTransport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// Build a retriever from `WEAVIATE_URL` and `WEAVIATE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("WEAVIATE_URL")
            .map_err(|_| ComplianceError::MissingConfig("WEAVIATE_URL"))?;
        let api_key = std::env::var("WEAVIATE_API_KEY")
            .map_err(|_| ComplianceError::MissingConfig("WEAVIATE_API_KEY"))?;

        Self::new(base_url, api_key)
    }

    fn graphql_query(topic: &str, transcript: &str) -> String {
        let prompt = format!(
            "Based on the EU AI Act, provide specific guidance on {topic} requirements for this HR AI feature. Feature: {transcript}"
        );
        // GraphQL string literals take JSON-style escaping
        let topic_literal = Value::String(topic.to_string()).to_string();
        let prompt_literal = Value::String(prompt).to_string();

        format!(
            "{{ Get {{ AI_Act_Article(nearText: {{concepts: [{topic_literal}]}}, limit: 1) {{ content _additional {{ generate(singleResult: {{prompt: {prompt_literal}}}) {{ singleResult }} }} }} }} }}"
        )
    }
}

#[async_trait]
impl GuidanceSource for WeaviateRetriever {
    async fn guidance(&self, topic: &str, transcript: &str) -> Result<String> {
        debug!(topic, "running guidance retrieval");

        let query = Self::graphql_query(topic, transcript);
        let response = self
            .http
            .post(format!("{}/v1/graphql", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "query": query }))
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
            .pointer(GENERATED_PATH)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ComplianceError::MalformedResponse(format!(
                    "no generated guidance returned for topic '{topic}'"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_query_escapes_embedded_quotes() {
        let query = WeaviateRetriever::graphql_query(
            "human oversight",
            "user: it \"auto-rejects\" candidates",
        );

        assert!(query.contains(r#"concepts: ["human oversight"]"#));
        assert!(query.contains(r#"\"auto-rejects\""#));
        assert!(query.starts_with("{ Get { AI_Act_Article("));
    }

    #[test]
    fn generated_path_matches_reply_shape() {
        let reply = json!({
            "data": {
                "Get": {
                    "AI_Act_Article": [
                        {
                            "content": "Article text",
                            "_additional": {
                                "generate": {"singleResult": "Guidance passage"}
                            }
                        }
                    ]
                }
            }
        });

        let passage = reply.pointer(GENERATED_PATH).and_then(Value::as_str);
        assert_eq!(passage, Some("Guidance passage"));
    }
}
