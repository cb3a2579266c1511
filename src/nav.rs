//! Descend/return navigation
//!
//! Descending into a called template replaces the whole session state with
//! the callee's. Each descent pushes a breadcrumb; the crumb left behind
//! becomes a history marker owning a complete snapshot of the state at the
//! moment of descent, restored verbatim when the user returns to it. The
//! current crumb never owns a frame.

use crate::error::{EngineError, EngineResult};
use crate::params::ParamTable;
use crate::tree::{Tree, VisualIndex};
use crate::undo::UndoLog;
use crate::view::ViewState;

/// Label of the crumb representing the initial input.
pub const INITIAL_CRUMB: &str = "\u{2a00}";

/// Complete snapshot of session state at a descent point.
///
/// Frames own their contents outright: capture moves the live structures in,
/// restore moves them back out. Nothing is aliased between a pushed frame
/// and the active session.
#[derive(Debug, Clone, Default)]
pub struct NavigationFrame {
    pub input: String,
    pub tree: Option<Tree>,
    pub visuals: VisualIndex,
    pub view: ViewState,
    pub params: ParamTable,
    pub undo: UndoLog,
}

/// One level of the descend history.
#[derive(Debug, Clone)]
pub struct Breadcrumb {
    pub label: String,
    frame: Option<NavigationFrame>,
}

impl Breadcrumb {
    fn current(label: String) -> Self {
        Self { label, frame: None }
    }

    /// History markers carry a frame; the current crumb does not.
    pub fn is_history(&self) -> bool {
        self.frame.is_some()
    }
}

/// The breadcrumb stack. Always holds at least the initial crumb.
#[derive(Debug, Clone)]
pub struct NavigationStack {
    crumbs: Vec<Breadcrumb>,
}

impl Default for NavigationStack {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationStack {
    pub fn new() -> Self {
        Self {
            crumbs: vec![Breadcrumb::current(INITIAL_CRUMB.to_string())],
        }
    }

    /// Wipe the history and return to a single initial crumb.
    pub fn reset(&mut self) {
        self.crumbs.clear();
        self.crumbs.push(Breadcrumb::current(INITIAL_CRUMB.to_string()));
    }

    pub fn crumbs(&self) -> &[Breadcrumb] {
        &self.crumbs
    }

    /// Number of crumbs (the current one included).
    pub fn depth(&self) -> usize {
        self.crumbs.len()
    }

    /// Push a new current crumb for a descent into `label`, converting the
    /// previous current crumb into a history marker owning `frame`.
    pub fn push(&mut self, label: String, frame: NavigationFrame) {
        if let Some(previous) = self.crumbs.last_mut() {
            previous.frame = Some(frame);
        }
        self.crumbs.push(Breadcrumb::current(label));
    }

    /// Pop back to the crumb at `index`, discarding every crumb after it,
    /// and hand back its frame. The target crumb becomes current again.
    pub fn return_to(&mut self, index: usize) -> EngineResult<NavigationFrame> {
        if index + 1 >= self.crumbs.len() {
            return Err(EngineError::structure(format!(
                "breadcrumb {index} is not a history marker"
            )));
        }
        self.crumbs.truncate(index + 1);
        let target = self
            .crumbs
            .last_mut()
            .ok_or_else(|| EngineError::structure("empty breadcrumb stack"))?;
        target
            .frame
            .take()
            .ok_or_else(|| EngineError::structure(format!("breadcrumb {index} has no frame")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(input: &str) -> NavigationFrame {
        NavigationFrame {
            input: input.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_starts_with_initial_crumb() {
        let nav = NavigationStack::new();
        assert_eq!(nav.depth(), 1);
        assert_eq!(nav.crumbs()[0].label, INITIAL_CRUMB);
        assert!(!nav.crumbs()[0].is_history());
    }

    #[test]
    fn test_push_converts_previous_to_history() {
        let mut nav = NavigationStack::new();
        nav.push("T".into(), frame("outer"));
        assert_eq!(nav.depth(), 2);
        assert!(nav.crumbs()[0].is_history());
        assert!(!nav.crumbs()[1].is_history());
        assert_eq!(nav.crumbs()[1].label, "T");
    }

    #[test]
    fn test_return_to_restores_and_truncates() {
        let mut nav = NavigationStack::new();
        nav.push("A".into(), frame("level0"));
        nav.push("B".into(), frame("level1"));
        assert_eq!(nav.depth(), 3);

        // Jump straight back over two levels.
        let restored = nav.return_to(0).unwrap();
        assert_eq!(restored.input, "level0");
        assert_eq!(nav.depth(), 1);
        assert!(!nav.crumbs()[0].is_history());
    }

    #[test]
    fn test_return_to_current_rejected() {
        let mut nav = NavigationStack::new();
        nav.push("A".into(), frame("x"));
        assert!(nav.return_to(1).is_err());
        assert!(nav.return_to(5).is_err());
        assert_eq!(nav.depth(), 2);
    }

    #[test]
    fn test_reset() {
        let mut nav = NavigationStack::new();
        nav.push("A".into(), frame("x"));
        nav.reset();
        assert_eq!(nav.depth(), 1);
        assert!(!nav.crumbs()[0].is_history());
    }
}
