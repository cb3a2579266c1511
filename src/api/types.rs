//! Wire types for the remote markup service
//!
//! The service speaks the MediaWiki action API: JSON envelopes whose payload
//! field is named after the action, with legacy `*` content keys. Only the
//! fields the engine consumes are modeled.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ServiceResult;

/// Error payload attached to any action response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: String,
    #[serde(default)]
    pub info: String,
}

/// Response to `action=expandtemplates`, for both the parse-tree and the
/// expanded-wikitext variants.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpandResponse {
    #[serde(default)]
    pub expandtemplates: Option<ExpandPayload>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpandPayload {
    #[serde(default)]
    pub parsetree: Option<String>,
    #[serde(default)]
    pub wikitext: Option<String>,
}

/// Response to `action=parse&prop=templates`.
#[derive(Debug, Clone, Deserialize)]
pub struct ParseResponse {
    #[serde(default)]
    pub parse: Option<ParsePayload>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsePayload {
    #[serde(default)]
    pub templates: Vec<TemplateLink>,
}

/// One entry of a parse's template list. `exists` is present (possibly
/// empty) exactly when the page exists as an invocable template.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateLink {
    #[serde(rename = "*")]
    pub title: String,
    #[serde(default)]
    pub exists: Option<String>,
}

/// Response to `action=query&prop=revisions&rvprop=content`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub query: Option<QueryPayload>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryPayload {
    #[serde(default)]
    pub pages: HashMap<String, PageInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub missing: Option<String>,
    #[serde(default)]
    pub revisions: Option<Vec<Revision>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Revision {
    #[serde(rename = "*")]
    #[serde(default)]
    pub content: Option<String>,
}

/// Response to the frame-expansion action (`action=expandframe`).
#[derive(Debug, Clone, Deserialize)]
pub struct ExpandFrameResponse {
    #[serde(default)]
    pub expandframe: Option<ExpandFramePayload>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpandFramePayload {
    #[serde(default)]
    pub result: Option<String>,
}

/// Outcome of resolving an invocation fragment to its canonical page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateResolution {
    /// Canonical page title (namespace included).
    pub title: String,
    /// Whether the page exists as an invocable template.
    pub exists: bool,
}

/// The four remote operations the engine depends on, plus server-side frame
/// expansion. Implemented by the HTTP client and by test doubles.
#[async_trait]
pub trait MarkupService: Send + Sync {
    /// Parse raw markup into the service's structured parse tree (returned
    /// as XML text).
    async fn parse_to_tree(&self, text: &str, context_title: Option<&str>)
        -> ServiceResult<String>;

    /// Expand a markup fragment into plain wikitext.
    async fn expand(&self, text: &str, context_title: Option<&str>) -> ServiceResult<String>;

    /// Expand a markup fragment inside a caller-supplied parameter frame.
    async fn expand_with_frame(
        &self,
        text: &str,
        frame: &HashMap<String, String>,
        context_title: Option<&str>,
    ) -> ServiceResult<String>;

    /// Resolve a one-invocation fragment (`{{Name}}`) to its canonical page
    /// identity. `None` means the parse reported no template at all.
    async fn resolve_invocation(&self, fragment: &str)
        -> ServiceResult<Option<TemplateResolution>>;

    /// Fetch the raw content of a page. `None` means the page is missing.
    async fn fetch_page(&self, title: &str) -> ServiceResult<Option<String>>;
}
