//! Debugging session
//!
//! The session object owns every piece of mutable state the debugger works
//! on: the expansion tree and its visual index, the parameter table, the
//! display state, the undo log, the breadcrumb stack, and the user-visible
//! note area. All entry points the hosting UI calls live here. A single
//! `busy` flag serializes every operation that may issue a remote call;
//! multi-step chains (batch evaluation, descent) hold it for the whole chain
//! and release it on every exit path.

use std::collections::{HashMap, VecDeque};

use crate::api::types::MarkupService;
use crate::error::{EngineError, EngineResult, ServiceError};
use crate::nav::{Breadcrumb, NavigationFrame, NavigationStack};
use crate::params::ParamTable;
use crate::parsetree;
use crate::transclude;
use crate::tree::{NodeId, NodeKind, Tree, VisualId, VisualIndex, ROOT_VISUAL};
use crate::view::{self, ViewState};
use crate::undo::UndoLog;

/// Maximum number of retained user-visible notes.
const MAX_NOTES: usize = 10;

/// What a single evaluation request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalOutcome {
    /// A new evaluated representation was committed.
    Evaluated,
    /// The node was already evaluated; visibility was flipped instead.
    ToggledVisibility,
    /// There was nothing to do (no tree loaded).
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescendOutcome {
    Descended,
    /// The clicked node is not a template invocation; descent is a no-op.
    NotDescendable,
}

/// One argument of a template invocation, after serialization.
enum ArgValue {
    Named { name: String, value: String },
    Positional(String),
}

/// A template-debugging session. Created on first input, torn down when the
/// hosting view closes; nothing is persisted.
pub struct Session<S> {
    service: S,
    context_title: Option<String>,
    input: String,
    tree: Option<Tree>,
    visuals: VisualIndex,
    view: ViewState,
    params: ParamTable,
    undo: UndoLog,
    nav: NavigationStack,
    notes: VecDeque<String>,
    busy: bool,
}

impl<S: MarkupService> Session<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            context_title: None,
            input: String::new(),
            tree: None,
            visuals: VisualIndex::default(),
            view: ViewState::new(),
            params: ParamTable::new(),
            undo: UndoLog::new(),
            nav: NavigationStack::new(),
            notes: VecDeque::new(),
            busy: false,
        }
    }

    // ------------------------------------------------------------------
    // Concurrency gate
    // ------------------------------------------------------------------

    fn try_acquire(&mut self) -> EngineResult<()> {
        if self.busy {
            return Err(EngineError::Busy);
        }
        self.busy = true;
        Ok(())
    }

    fn release(&mut self) {
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    // ------------------------------------------------------------------
    // Input replacement and tree building
    // ------------------------------------------------------------------

    /// Replace the session input wholesale: the navigation stack resets to
    /// the initial crumb, the undo log is cleared, and a new tree and
    /// parameter table are built from `text` (seeded with `inherited`
    /// overrides when given).
    pub async fn set_input(
        &mut self,
        text: impl Into<String>,
        inherited: Option<HashMap<String, String>>,
    ) -> EngineResult<()> {
        self.try_acquire()?;
        self.nav.reset();
        self.rebuild_from_input(text.into(), inherited.as_ref()).await;
        self.release();
        Ok(())
    }

    /// Change the context title under which parse/expand requests run, and
    /// re-parse the current input.
    pub async fn set_context_title(&mut self, title: Option<String>) -> EngineResult<()> {
        self.try_acquire()?;
        self.context_title = title;
        let input = self.input.clone();
        self.rebuild_from_input(input, None).await;
        self.release();
        Ok(())
    }

    /// Fetch a page's raw content and make it the session input, as the
    /// hosting page does when opened on a subpage.
    pub async fn load_page_as_input(&mut self, title: &str) -> EngineResult<()> {
        self.try_acquire()?;
        let result = self.load_page_inner(title).await;
        self.release();
        result
    }

    async fn load_page_inner(&mut self, title: &str) -> EngineResult<()> {
        let content = self
            .service
            .fetch_page(title)
            .await
            .map_err(EngineError::TemplatePage)?
            .ok_or_else(|| {
                EngineError::TemplatePage(ServiceError::service("missing-page", title))
            })?;
        self.nav.reset();
        self.rebuild_from_input(content, None).await;
        Ok(())
    }

    /// Parse `text` and install the resulting tree, table, visual index and
    /// fresh display/undo state. Parse failures of any kind degrade to an
    /// empty tree plus a note; the session continues.
    async fn rebuild_from_input(
        &mut self,
        text: String,
        inherited: Option<&HashMap<String, String>>,
    ) {
        self.input = text;
        self.undo.clear();

        let tree = if self.input.is_empty() {
            None
        } else {
            match self
                .service
                .parse_to_tree(&self.input, self.context_title.as_deref())
                .await
            {
                Ok(xml) => match parsetree::parse_document(&xml) {
                    Ok(doc) => Some(Tree::from_parse_tree(&doc)),
                    Err(e) => {
                        self.note(format!("Parse error: {e}"));
                        None
                    }
                },
                // "No text" is how the service spells an effectively empty
                // document; not worth a note.
                Err(e) if e.is_no_text() => None,
                Err(e) => {
                    self.note(format!("Parse error: {e}"));
                    None
                }
            }
        };
        self.install_tree(tree, inherited);
    }

    fn install_tree(&mut self, tree: Option<Tree>, inherited: Option<&HashMap<String, String>>) {
        let old = std::mem::take(&mut self.params);
        let extracted = tree
            .as_ref()
            .map(|t| t.placeholder_names())
            .unwrap_or_default();
        self.params = ParamTable::rebuild(&extracted, inherited, &old);
        self.tree = tree;
        self.view = ViewState::new();
        match &mut self.tree {
            Some(tree) => {
                tree.bind_placeholders(&self.params);
                self.visuals = VisualIndex::build(tree);
                self.notes.clear();
            }
            None => self.visuals = VisualIndex::default(),
        }
        tracing::debug!(
            nodes = self.tree.as_ref().map(|t| t.len()).unwrap_or(0),
            params = self.params.len(),
            "session tree rebuilt"
        );
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Evaluate the node behind a visual element, or flip its visibility if
    /// it already carries an evaluated representation.
    pub async fn evaluate_node(&mut self, visual: VisualId) -> EngineResult<EvalOutcome> {
        self.try_acquire()?;
        let result = self.evaluate_node_inner(visual).await;
        self.release();
        result
    }

    /// Evaluate the whole document: the root is treated as one node through
    /// the single-node path.
    pub async fn evaluate_all(&mut self) -> EngineResult<EvalOutcome> {
        self.try_acquire()?;
        let result = if self.tree.is_some() {
            self.evaluate_node_inner(ROOT_VISUAL).await
        } else {
            Ok(EvalOutcome::Nothing)
        };
        self.release();
        result
    }

    async fn evaluate_node_inner(&mut self, visual: VisualId) -> EngineResult<EvalOutcome> {
        let node = self.visuals.node_of(visual).ok_or_else(|| {
            EngineError::structure(format!("no tree node behind visual element {visual}"))
        })?;
        if self.view.is_evaluated(node) {
            self.view.toggle(node);
            return Ok(EvalOutcome::ToggledVisibility);
        }
        let tree = self
            .tree
            .as_ref()
            .ok_or_else(|| EngineError::structure("no tree loaded"))?;
        let text = tree.wikitext(node, Some(&self.params));
        if text.is_empty() {
            // Nothing to expand; transition straight to the evaluated form.
            self.commit_evaluation(node, String::new(), false);
            return Ok(EvalOutcome::Evaluated);
        }
        let expanded = self
            .service
            .expand(&text, self.context_title.as_deref())
            .await
            .map_err(EngineError::Eval)?;
        self.commit_evaluation(node, expanded, false);
        Ok(EvalOutcome::Evaluated)
    }

    fn commit_evaluation(&mut self, node: NodeId, text: String, grouped: bool) {
        if !self.view.attach_evaluation(node, text) {
            return;
        }
        if grouped {
            if !self.undo.append_to_group(node) {
                // Batch bookkeeping should have opened a group; recover by
                // recording the action on its own.
                self.undo.push_single(node);
            }
        } else {
            self.undo.push_single(node);
        }
    }

    /// Evaluate every unevaluated instance of the placeholder bound to
    /// `row`, strictly one request at a time, as one atomic undo group.
    /// Returns the number of instances committed; a mid-batch failure keeps
    /// what was already committed and aborts the rest.
    pub async fn evaluate_all_for_row(&mut self, row: usize) -> EngineResult<usize> {
        self.try_acquire()?;
        let result = self.evaluate_all_for_row_inner(row).await;
        self.release();
        result
    }

    async fn evaluate_all_for_row_inner(&mut self, row: usize) -> EngineResult<usize> {
        if row >= self.params.len() {
            return Err(EngineError::structure(format!("no parameter row {row}")));
        }
        let jobs: Vec<(NodeId, String)> = match &self.tree {
            Some(tree) => tree
                .placeholders()
                .into_iter()
                .filter(|id| {
                    matches!(
                        tree.node(*id).map(|n| &n.kind),
                        Some(NodeKind::Placeholder { param_row: Some(r) }) if *r == row
                    )
                })
                .filter(|id| !self.view.is_evaluated(*id))
                .map(|id| (id, tree.wikitext(id, Some(&self.params))))
                .collect(),
            None => Vec::new(),
        };
        if jobs.is_empty() {
            // No eligible instances: the undo log must not be touched.
            return Ok(0);
        }

        self.undo.begin_group();
        let mut committed = 0;
        for (node, text) in jobs {
            if text.is_empty() {
                self.commit_evaluation(node, String::new(), true);
                committed += 1;
                continue;
            }
            match self
                .service
                .expand(&text, self.context_title.as_deref())
                .await
            {
                Ok(expanded) => {
                    self.commit_evaluation(node, expanded, true);
                    committed += 1;
                }
                Err(e) => {
                    self.undo.discard_empty_group();
                    tracing::warn!(row, committed, "batch evaluation aborted");
                    return Err(EngineError::Eval(e));
                }
            }
        }
        self.undo.discard_empty_group();
        Ok(committed)
    }

    /// Expand the raw input server-side inside a frame built from the set
    /// parameter overrides, leaving the tree untouched. This is the
    /// one-shot preview path; unset rows fall back to their defaults on the
    /// server.
    pub async fn preview_with_frame(&mut self) -> EngineResult<String> {
        self.try_acquire()?;
        let frame: HashMap<String, String> = self
            .params
            .rows()
            .iter()
            .filter(|r| r.is_set)
            .map(|r| (r.name.clone(), r.value.clone()))
            .collect();
        let result = self
            .service
            .expand_with_frame(&self.input, &frame, self.context_title.as_deref())
            .await
            .map_err(EngineError::Eval);
        self.release();
        result
    }

    // ------------------------------------------------------------------
    // Descend / return
    // ------------------------------------------------------------------

    /// Descend into the template invocation behind a visual element: expand
    /// all its argument texts, resolve the callee page, fetch and filter its
    /// content, push a breadcrumb owning the current state, and rebuild the
    /// session from the callee's markup seeded with the resolved arguments.
    pub async fn descend(&mut self, visual: VisualId) -> EngineResult<DescendOutcome> {
        self.try_acquire()?;
        let result = self.descend_inner(visual).await;
        self.release();
        result
    }

    async fn descend_inner(&mut self, visual: VisualId) -> EngineResult<DescendOutcome> {
        let node = self.visuals.node_of(visual).ok_or_else(|| {
            EngineError::structure(format!("no tree node behind visual element {visual}"))
        })?;
        let tree = self
            .tree
            .as_ref()
            .ok_or_else(|| EngineError::structure("no tree loaded"))?;
        let Some(template) = tree.node(node) else {
            return Err(EngineError::structure(format!("unknown node {node}")));
        };
        if !matches!(template.kind, NodeKind::Template) {
            return Ok(DescendOutcome::NotDescendable);
        }

        // Serialize the title and every argument. Named arguments split into
        // two independently-expanded texts; name and value are trimmed, the
        // title and positional values keep their whitespace.
        let mut title = String::new();
        let mut parts: Vec<ArgValue> = Vec::new();
        for (i, child) in template.children.iter().enumerate() {
            if i == 0 {
                title = tree.wikitext(*child, Some(&self.params));
            } else if tree.part_is_named(*child) {
                let part_children = tree
                    .node(*child)
                    .map(|p| p.children.clone())
                    .unwrap_or_default();
                let name = part_children
                    .first()
                    .map(|c| tree.wikitext(*c, Some(&self.params)))
                    .unwrap_or_default();
                let value = part_children
                    .get(2)
                    .map(|c| tree.wikitext(*c, Some(&self.params)))
                    .unwrap_or_default();
                parts.push(ArgValue::Named {
                    name: name.trim().to_string(),
                    value: value.trim().to_string(),
                });
            } else {
                parts.push(ArgValue::Positional(
                    tree.wikitext(*child, Some(&self.params)),
                ));
            }
        }

        // Expand every non-empty argument text, one request at a time; the
        // client inserts the inter-request spacing.
        let title = self.expand_arg(title).await?;
        let mut expanded_parts = Vec::with_capacity(parts.len());
        for part in parts {
            expanded_parts.push(match part {
                ArgValue::Named { name, value } => ArgValue::Named {
                    name: self.expand_arg(name).await?,
                    value: self.expand_arg(value).await?,
                },
                ArgValue::Positional(value) => {
                    ArgValue::Positional(self.expand_arg(value).await?)
                }
            });
        }

        // The invocation name can differ from the callee's canonical page
        // (assumed namespace, leading colon, parser functions); resolve it.
        let invocation = format!("{{{{{title}}}}}");
        let resolution = self
            .service
            .resolve_invocation(&invocation)
            .await
            .map_err(EngineError::TemplateName)?
            .ok_or_else(|| EngineError::TemplateNotFound {
                invocation: title.clone(),
            })?;
        if !resolution.exists {
            return Err(EngineError::NotATemplate {
                title: resolution.title,
            });
        }

        let content = self
            .service
            .fetch_page(&resolution.title)
            .await
            .map_err(EngineError::TemplatePage)?
            .ok_or_else(|| {
                EngineError::TemplatePage(ServiceError::service(
                    "missing-page",
                    resolution.title.clone(),
                ))
            })?;
        let body = transclude::extract_transclusion_body(&content);

        // The callee sees named arguments by name and positional ones under
        // 1-based index keys.
        let mut inherited: HashMap<String, String> = HashMap::new();
        let mut position = 1usize;
        for part in expanded_parts {
            match part {
                ArgValue::Named { name, value } => {
                    inherited.insert(name, value);
                }
                ArgValue::Positional(value) => {
                    inherited.insert(position.to_string(), value);
                    position += 1;
                }
            }
        }

        tracing::info!(template = %resolution.title, "descending into template");
        let frame = self.capture_frame();
        self.nav.push(title, frame);
        self.rebuild_from_input(body, Some(&inherited)).await;
        Ok(DescendOutcome::Descended)
    }

    async fn expand_arg(&self, text: String) -> EngineResult<String> {
        if text.is_empty() {
            return Ok(text);
        }
        self.service
            .expand(&text, self.context_title.as_deref())
            .await
            .map_err(EngineError::ArgEval)
    }

    /// Capture the full current state as a navigation frame. The parameter
    /// table is cloned rather than moved because the rebuild that follows a
    /// descent still carries values forward from it.
    fn capture_frame(&mut self) -> NavigationFrame {
        NavigationFrame {
            input: std::mem::take(&mut self.input),
            tree: self.tree.take(),
            visuals: std::mem::take(&mut self.visuals),
            view: std::mem::take(&mut self.view),
            params: self.params.clone(),
            undo: std::mem::take(&mut self.undo),
        }
    }

    /// Return to an earlier breadcrumb, restoring its snapshot verbatim and
    /// discarding every level entered after it. Rejected while an
    /// asynchronous operation is in flight.
    pub fn return_to(&mut self, crumb: usize) -> EngineResult<()> {
        if self.busy {
            return Err(EngineError::Busy);
        }
        let frame = self.nav.return_to(crumb)?;
        self.input = frame.input;
        self.tree = frame.tree;
        self.visuals = frame.visuals;
        self.view = frame.view;
        self.params = frame.params;
        self.undo = frame.undo;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Undo
    // ------------------------------------------------------------------

    /// Reverse the most recent evaluation action (a batch reverses
    /// atomically). Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> EngineResult<bool> {
        if self.busy {
            return Err(EngineError::Busy);
        }
        match self.undo.pop() {
            Some(entry) => {
                for id in entry.nodes() {
                    self.view.revert(*id);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Revert every evaluation and clear the undo log.
    pub fn undo_all(&mut self) -> EngineResult<()> {
        if self.busy {
            return Err(EngineError::Busy);
        }
        self.view.revert_all();
        self.undo.clear();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Parameter operations (synchronous; no remote calls, no gate)
    // ------------------------------------------------------------------

    pub fn toggle_parameter_set(&mut self, row: usize, to: Option<bool>) -> EngineResult<()> {
        self.params.toggle(row, to)
    }

    pub fn toggle_all_parameter_set(&mut self) {
        self.params.toggle_all();
    }

    pub fn set_parameter_value(
        &mut self,
        row: usize,
        value: impl Into<String>,
    ) -> EngineResult<()> {
        self.params.set_value(row, value)
    }

    pub fn clear_all_parameter_values(&mut self) {
        self.params.clear_values();
    }

    // ------------------------------------------------------------------
    // Notes and read accessors
    // ------------------------------------------------------------------

    fn note(&mut self, message: String) {
        tracing::warn!(%message, "session note");
        while self.notes.len() >= MAX_NOTES {
            self.notes.pop_front();
        }
        self.notes.push_back(message);
    }

    pub fn notes(&self) -> impl Iterator<Item = &str> {
        self.notes.iter().map(|s| s.as_str())
    }

    pub fn clear_notes(&mut self) {
        self.notes.clear();
    }

    /// The currently-visible representation of the document as plain text.
    pub fn rendered_output(&self) -> String {
        match &self.tree {
            Some(tree) => view::render(tree, &self.view),
            None => String::new(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn context_title(&self) -> Option<&str> {
        self.context_title.as_deref()
    }

    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    pub fn visuals(&self) -> &VisualIndex {
        &self.visuals
    }

    pub fn parameters(&self) -> &ParamTable {
        &self.params
    }

    pub fn breadcrumbs(&self) -> &[Breadcrumb] {
        self.nav.crumbs()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn evaluated_count(&self) -> usize {
        self.view.evaluated_count()
    }

    /// Serialize the whole document with overrides applied, as evaluation
    /// would submit it.
    pub fn serialized_input(&self) -> String {
        match &self.tree {
            Some(tree) => tree.wikitext(tree.root(), Some(&self.params)),
            None => String::new(),
        }
    }
}
