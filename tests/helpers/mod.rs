#![allow(dead_code)] // each test binary uses a different subset

//! Shared test double for the remote markup service.
//!
//! Every operation is scripted per input text; unscripted inputs fail
//! loudly so a test can never silently depend on behavior it did not set
//! up. The mock records every call (with its context title) so tests can
//! assert dispatch order.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tplscope::api::types::{MarkupService, TemplateResolution};
use tplscope::error::{ServiceError, ServiceResult};

#[derive(Default)]
struct MockInner {
    parse_trees: Mutex<HashMap<String, String>>,
    expansions: Mutex<HashMap<String, String>>,
    failing_expansions: Mutex<HashSet<String>>,
    failing_parses: Mutex<HashSet<String>>,
    resolutions: Mutex<HashMap<String, Option<TemplateResolution>>>,
    pages: Mutex<HashMap<String, Option<String>>>,
    calls: Mutex<Vec<(String, String, Option<String>)>>,
}

/// Cloneable handle to one scripted service; clones share the script and
/// the call log.
#[derive(Clone, Default)]
pub struct MockService {
    inner: Arc<MockInner>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stub_parse(&self, text: &str, parsetree_xml: &str) -> &Self {
        self.inner
            .parse_trees
            .lock()
            .unwrap()
            .insert(text.to_string(), parsetree_xml.to_string());
        self
    }

    pub fn fail_parse(&self, text: &str) -> &Self {
        self.inner
            .failing_parses
            .lock()
            .unwrap()
            .insert(text.to_string());
        self
    }

    pub fn stub_expand(&self, text: &str, expanded: &str) -> &Self {
        self.inner
            .expansions
            .lock()
            .unwrap()
            .insert(text.to_string(), expanded.to_string());
        // Stubbing a concrete expansion clears any prior scripted failure
        // for the same text, so a corrected stub takes effect.
        self.inner
            .failing_expansions
            .lock()
            .unwrap()
            .remove(text);
        self
    }

    /// Stub a set of texts to expand to themselves.
    pub fn expand_identity(&self, texts: &[&str]) -> &Self {
        for text in texts {
            self.stub_expand(text, text);
        }
        self
    }

    pub fn fail_expand(&self, text: &str) -> &Self {
        self.inner
            .failing_expansions
            .lock()
            .unwrap()
            .insert(text.to_string());
        self
    }

    pub fn stub_resolution(&self, fragment: &str, resolution: Option<TemplateResolution>) -> &Self {
        self.inner
            .resolutions
            .lock()
            .unwrap()
            .insert(fragment.to_string(), resolution);
        self
    }

    pub fn stub_page(&self, title: &str, content: Option<&str>) -> &Self {
        self.inner
            .pages
            .lock()
            .unwrap()
            .insert(title.to_string(), content.map(|c| c.to_string()));
        self
    }

    /// Every call made so far as `(operation, input, context_title)`.
    pub fn calls(&self) -> Vec<(String, String, Option<String>)> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// The operation/input pairs only, for order assertions.
    pub fn call_sequence(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .map(|(op, input, _)| (op, input))
            .collect()
    }

    fn record(&self, op: &str, input: &str, title: Option<&str>) {
        self.inner.calls.lock().unwrap().push((
            op.to_string(),
            input.to_string(),
            title.map(|t| t.to_string()),
        ));
    }
}

#[async_trait]
impl MarkupService for MockService {
    async fn parse_to_tree(
        &self,
        text: &str,
        context_title: Option<&str>,
    ) -> ServiceResult<String> {
        self.record("parse", text, context_title);
        if self.inner.failing_parses.lock().unwrap().contains(text) {
            return Err(ServiceError::transport(format!(
                "scripted parse failure: {text}"
            )));
        }
        self.inner
            .parse_trees
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .ok_or_else(|| ServiceError::service("no-stub", format!("unscripted parse: {text:?}")))
    }

    async fn expand(&self, text: &str, context_title: Option<&str>) -> ServiceResult<String> {
        self.record("expand", text, context_title);
        if self.inner.failing_expansions.lock().unwrap().contains(text) {
            return Err(ServiceError::service("scripted", "scripted expand failure"));
        }
        self.inner
            .expansions
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .ok_or_else(|| {
                ServiceError::service("no-stub", format!("unscripted expansion: {text:?}"))
            })
    }

    async fn expand_with_frame(
        &self,
        text: &str,
        frame: &HashMap<String, String>,
        context_title: Option<&str>,
    ) -> ServiceResult<String> {
        self.record("expand_with_frame", text, context_title);
        // Frame expansion is scripted as plain expansion of the text with
        // the frame rendered into the key.
        let mut keys: Vec<_> = frame.iter().collect();
        keys.sort();
        let key = format!(
            "{text}|{}",
            keys.iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",")
        );
        self.inner
            .expansions
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                ServiceError::service("no-stub", format!("unscripted frame expansion: {key:?}"))
            })
    }

    async fn resolve_invocation(
        &self,
        fragment: &str,
    ) -> ServiceResult<Option<TemplateResolution>> {
        self.record("resolve", fragment, None);
        self.inner
            .resolutions
            .lock()
            .unwrap()
            .get(fragment)
            .cloned()
            .ok_or_else(|| {
                ServiceError::service("no-stub", format!("unscripted resolution: {fragment:?}"))
            })
    }

    async fn fetch_page(&self, title: &str) -> ServiceResult<Option<String>> {
        self.record("fetch", title, None);
        self.inner
            .pages
            .lock()
            .unwrap()
            .get(title)
            .cloned()
            .ok_or_else(|| ServiceError::service("no-stub", format!("unscripted page: {title:?}")))
    }
}

/// Shorthand for a resolution that exists as a template.
pub fn template(title: &str) -> Option<TemplateResolution> {
    Some(TemplateResolution {
        title: title.to_string(),
        exists: true,
    })
}

/// Shorthand for a resolution to something that is not an invocable
/// template page.
pub fn non_template(title: &str) -> Option<TemplateResolution> {
    Some(TemplateResolution {
        title: title.to_string(),
        exists: false,
    })
}
