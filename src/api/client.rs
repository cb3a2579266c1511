//! Wiki API client
//!
//! Rate-limited HTTP client for the markup service's action API. Every call
//! is a form-encoded POST; a fixed inter-request delay keeps at most one
//! request in flight with deterministic spacing, which is what the session's
//! batch and descent chains rely on.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use url::Url;

use super::types::*;
use crate::error::{ServiceError, ServiceResult};

/// Spacing between consecutive API dispatches, in milliseconds.
const CALL_INTERVAL_MS: u64 = 30;
/// Per-request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = "tplscope/0.1";

/// Connection settings for [`WikiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint of the wiki's `api.php`.
    pub api_url: Url,
    /// Delay inserted between consecutive dispatches.
    pub call_interval: Duration,
    /// Hard timeout for a single request.
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            call_interval: Duration::from_millis(CALL_INTERVAL_MS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Build a config from `WIKI_API_URL` (loading `.env` if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let raw = std::env::var("WIKI_API_URL").context("WIKI_API_URL is not set")?;
        let api_url = Url::parse(&raw).with_context(|| format!("invalid WIKI_API_URL: {raw}"))?;
        Ok(Self::new(api_url))
    }
}

pub struct WikiClient {
    client: Client,
    config: ClientConfig,
    last_request: Mutex<Instant>,
}

impl WikiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request: Mutex::new(Instant::now()),
        })
    }

    /// Enforce the inter-request spacing before each dispatch.
    async fn pace(&self) {
        let elapsed = {
            let last = self
                .last_request
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            last.elapsed()
        };

        if elapsed < self.config.call_interval {
            sleep(self.config.call_interval - elapsed).await;
        }

        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    async fn post<T: DeserializeOwned>(&self, form: &[(&str, &str)]) -> ServiceResult<T> {
        self.pace().await;
        tracing::debug!(action = form.first().map(|(_, v)| *v), "wiki api call");

        let response = self
            .client
            .post(self.config.api_url.clone())
            .header("Api-User-Agent", USER_AGENT)
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::transport(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ServiceError::service("invalid-json", e.to_string()))
    }
}

/// Reject a response that carries an explicit error payload.
fn check_error(error: Option<ApiError>) -> ServiceResult<()> {
    match error {
        Some(e) => Err(ServiceError::service(e.code, e.info)),
        None => Ok(()),
    }
}

#[async_trait]
impl MarkupService for WikiClient {
    async fn parse_to_tree(
        &self,
        text: &str,
        context_title: Option<&str>,
    ) -> ServiceResult<String> {
        let mut form = vec![
            ("action", "expandtemplates"),
            ("format", "json"),
            ("prop", "parsetree"),
            ("text", text),
        ];
        if let Some(title) = context_title {
            form.push(("title", title));
        }
        let response: ExpandResponse = self.post(&form).await?;
        check_error(response.error)?;
        response
            .expandtemplates
            .and_then(|p| p.parsetree)
            .ok_or_else(|| ServiceError::service("missing-result", "no parse tree in response"))
    }

    async fn expand(&self, text: &str, context_title: Option<&str>) -> ServiceResult<String> {
        let mut form = vec![
            ("action", "expandtemplates"),
            ("format", "json"),
            ("prop", "wikitext"),
            ("includecomments", ""),
            ("text", text),
        ];
        if let Some(title) = context_title {
            form.push(("title", title));
        }
        let response: ExpandResponse = self.post(&form).await?;
        check_error(response.error)?;
        response
            .expandtemplates
            .and_then(|p| p.wikitext)
            .ok_or_else(|| ServiceError::service("missing-result", "no wikitext in response"))
    }

    async fn expand_with_frame(
        &self,
        text: &str,
        frame: &HashMap<String, String>,
        context_title: Option<&str>,
    ) -> ServiceResult<String> {
        let frame_json = serde_json::to_string(frame)
            .map_err(|e| ServiceError::service("bad-frame", e.to_string()))?;
        let mut form = vec![
            ("action", "expandframe"),
            ("format", "json"),
            ("text", text),
            ("frame", frame_json.as_str()),
        ];
        if let Some(title) = context_title {
            form.push(("title", title));
        }
        let response: ExpandFrameResponse = self.post(&form).await?;
        check_error(response.error)?;
        response
            .expandframe
            .and_then(|p| p.result)
            .ok_or_else(|| ServiceError::service("missing-result", "no result in response"))
    }

    async fn resolve_invocation(
        &self,
        fragment: &str,
    ) -> ServiceResult<Option<TemplateResolution>> {
        let form = vec![
            ("action", "parse"),
            ("format", "json"),
            ("prop", "templates"),
            ("contentmodel", "wikitext"),
            ("text", fragment),
        ];
        let response: ParseResponse = self.post(&form).await?;
        check_error(response.error)?;
        let payload = response
            .parse
            .ok_or_else(|| ServiceError::service("missing-result", "no parse in response"))?;
        Ok(payload.templates.into_iter().next().map(|t| TemplateResolution {
            title: t.title,
            exists: t.exists.is_some(),
        }))
    }

    async fn fetch_page(&self, title: &str) -> ServiceResult<Option<String>> {
        let form = vec![
            ("action", "query"),
            ("format", "json"),
            ("prop", "revisions"),
            ("rvprop", "content"),
            ("titles", title),
        ];
        let response: QueryResponse = self.post(&form).await?;
        check_error(response.error)?;
        let payload = response
            .query
            .ok_or_else(|| ServiceError::service("missing-result", "no query in response"))?;
        for page in payload.pages.into_values() {
            if page.missing.is_some() {
                tracing::debug!(title = page.title.as_deref(), "page is missing");
                continue;
            }
            if let Some(content) = page
                .revisions
                .and_then(|revs| revs.into_iter().next())
                .and_then(|r| r.content)
            {
                return Ok(Some(content));
            }
        }
        Ok(None)
    }
}
