//! Client for the text-annotation (wikification) service that tags free text
//! with concept names.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "http://wikifier.org/annotate-article";

/// One concept found in a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default, rename = "pageRank")]
    pub page_rank: Option<f64>,
    #[serde(default)]
    pub cosine: Option<f64>,
}

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("annotation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("annotation service returned {0}")]
    Status(StatusCode),
    #[error("malformed annotation response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid annotation endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

#[async_trait]
pub trait Annotator: Send + Sync {
    async fn annotate(&self, text: &str, lang: &str) -> Result<Vec<Annotation>, AnnotateError>;
}

/// Concept titles for `text`. A failing service yields no concepts.
pub async fn concepts_or_empty(annotator: &dyn Annotator, text: &str, lang: &str) -> Vec<String> {
    match annotator.annotate(text, lang).await {
        Ok(annotations) => concept_titles(&annotations),
        Err(err) => {
            tracing::warn!(error = %err, "annotation failed, continuing without concepts");
            Vec::new()
        }
    }
}

pub fn concept_titles(annotations: &[Annotation]) -> Vec<String> {
    annotations.iter().filter(|a| !a.title.is_empty()).map(|a| a.title.clone()).collect()
}

#[derive(Debug, Deserialize)]
struct WikifierResponse {
    #[serde(default)]
    annotations: Option<Vec<Annotation>>,
}

/// Missing `annotations` means the service had nothing to say, not an error.
pub fn parse_response(body: &str) -> Result<Vec<Annotation>, AnnotateError> {
    let parsed: WikifierResponse = serde_json::from_str(body)?;
    Ok(parsed.annotations.unwrap_or_default())
}

#[derive(Debug, Clone)]
pub struct WikifierConfig {
    pub endpoint: String,
    pub user_key: String,
    pub timeout_secs: u64,
}

impl Default for WikifierConfig {
    fn default() -> Self {
        Self { endpoint: DEFAULT_ENDPOINT.to_string(), user_key: String::new(), timeout_secs: 10 }
    }
}

impl WikifierConfig {
    /// Reads `WIKIFIER_ENDPOINT`, `WIKIFIER_USER_KEY` and `WIKIFIER_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: std::env::var("WIKIFIER_ENDPOINT").unwrap_or(defaults.endpoint),
            user_key: std::env::var("WIKIFIER_USER_KEY").unwrap_or(defaults.user_key),
            timeout_secs: std::env::var("WIKIFIER_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.timeout_secs),
        }
    }
}

pub struct WikifierClient {
    client: Client,
    endpoint: Url,
    user_key: String,
}

impl WikifierClient {
    pub fn new(config: WikifierConfig) -> Result<Self, AnnotateError> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        let endpoint = Url::parse(&config.endpoint)?;
        Ok(Self { client, endpoint, user_key: config.user_key })
    }
}

#[async_trait]
impl Annotator for WikifierClient {
    async fn annotate(&self, text: &str, lang: &str) -> Result<Vec<Annotation>, AnnotateError> {
        let resp = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("text", text),
                ("lang", lang),
                ("out", "extendedJson"),
                ("jsonForEval", "true"),
                ("userKey", self.user_key.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AnnotateError::Status(resp.status()));
        }
        let body = resp.text().await?;
        let annotations = parse_response(&body)?;
        tracing::debug!(annotations = annotations.len(), chars = text.len(), "text annotated");
        Ok(annotations)
    }
}
