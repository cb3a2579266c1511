//! Display state
//!
//! The visible representation of the tree. Evaluating a node does not touch
//! the tree itself: the node's original representation is hidden (toggled,
//! not removed) and an evaluated text representation is attached alongside
//! it, so evaluation can be reverted or flipped back and forth at will.
//! State is keyed by node id; rendering walks the tree and consults this map
//! at every node.

use std::collections::HashMap;

use crate::tree::{NodeId, NodeKind, Tree};

/// Display state of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeView {
    /// Server-computed expansion attached to this node, if any.
    pub evaluated: Option<String>,
    /// Whether the evaluated representation (rather than the original) is
    /// currently visible.
    pub showing_evaluated: bool,
}

/// Display state for the whole tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    views: HashMap<NodeId, NodeView>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_evaluated(&self, id: NodeId) -> bool {
        self.views
            .get(&id)
            .map(|v| v.evaluated.is_some())
            .unwrap_or(false)
    }

    /// The evaluated text of `id` when it is the visible representation.
    pub fn visible_evaluation(&self, id: NodeId) -> Option<&str> {
        self.views
            .get(&id)
            .filter(|v| v.showing_evaluated)
            .and_then(|v| v.evaluated.as_deref())
    }

    /// Attach an evaluated representation and make it visible. Returns false
    /// (and changes nothing) if the node already has one.
    pub fn attach_evaluation(&mut self, id: NodeId, text: String) -> bool {
        let view = self.views.entry(id).or_default();
        if view.evaluated.is_some() {
            return false;
        }
        view.evaluated = Some(text);
        view.showing_evaluated = true;
        true
    }

    /// Flip between the original and evaluated representations. Returns
    /// false if the node has no evaluated representation to flip to.
    pub fn toggle(&mut self, id: NodeId) -> bool {
        match self.views.get_mut(&id) {
            Some(view) if view.evaluated.is_some() => {
                view.showing_evaluated = !view.showing_evaluated;
                true
            }
            _ => false,
        }
    }

    /// Remove the evaluated representation and restore the original.
    pub fn revert(&mut self, id: NodeId) {
        self.views.remove(&id);
    }

    /// Remove every evaluated representation.
    pub fn revert_all(&mut self) {
        self.views.clear();
    }

    pub fn evaluated_count(&self) -> usize {
        self.views.values().filter(|v| v.evaluated.is_some()).count()
    }
}

/// Render the currently-visible representation of the tree as plain text.
///
/// A node showing its evaluated representation contributes that text and its
/// subtree is skipped; everything else renders in its literal markup form
/// (overrides are a serialization concern, not a display one).
pub fn render(tree: &Tree, view: &ViewState) -> String {
    let mut out = String::new();
    render_node(tree, view, tree.root(), &mut out);
    out
}

fn render_children(tree: &Tree, view: &ViewState, children: &[NodeId], out: &mut String) {
    for child in children {
        render_node(tree, view, *child, out);
    }
}

fn render_node(tree: &Tree, view: &ViewState, id: NodeId, out: &mut String) {
    if let Some(text) = view.visible_evaluation(id) {
        out.push_str(text);
        return;
    }
    let Some(node) = tree.node(id) else {
        out.push_str("<missing/>");
        return;
    };
    match &node.kind {
        NodeKind::Root
        | NodeKind::Part
        | NodeKind::Title
        | NodeKind::Value
        | NodeKind::Name
        | NodeKind::Comment
        | NodeKind::Ignore => render_children(tree, view, &node.children, out),
        NodeKind::Template => {
            out.push_str("{{");
            for (i, child) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push('|');
                }
                render_node(tree, view, *child, out);
            }
            out.push_str("}}");
        }
        NodeKind::Placeholder { .. } => {
            out.push_str("{{{");
            for (i, child) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push('|');
                }
                render_node(tree, view, *child, out);
            }
            out.push_str("}}}");
        }
        NodeKind::Ext { name, attr, inner } => {
            out.push('<');
            out.push_str(name);
            if let Some(attr) = attr {
                out.push(' ');
                out.push_str(attr);
            }
            out.push('>');
            if let Some(inner) = inner {
                out.push_str(inner);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        NodeKind::Text(t) => out.push_str(t),
        NodeKind::Other { tag } => {
            if node.children.is_empty() {
                out.push('<');
                out.push_str(tag);
                out.push_str("/>");
            } else {
                out.push('<');
                out.push_str(tag);
                out.push('>');
                render_children(tree, view, &node.children, out);
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsetree::parse_document;

    fn tree_of(xml: &str) -> Tree {
        Tree::from_parse_tree(&parse_document(xml).unwrap())
    }

    #[test]
    fn test_render_mirrors_original_markup() {
        let tree = tree_of(
            "<root>a <template><title>T</title></template> b \
             <tplarg><title>p</title></tplarg></root>",
        );
        let view = ViewState::new();
        assert_eq!(render(&tree, &view), "a {{T}} b {{{p}}}");
    }

    #[test]
    fn test_evaluated_node_replaces_subtree() {
        let tree = tree_of("<root>a <template><title>T</title></template> b</root>");
        let template = tree.templates()[0];
        let mut view = ViewState::new();
        assert!(view.attach_evaluation(template, "EXPANDED".into()));
        assert_eq!(render(&tree, &view), "a EXPANDED b");

        // Toggling flips back to the original without losing the evaluation.
        assert!(view.toggle(template));
        assert_eq!(render(&tree, &view), "a {{T}} b");
        assert!(view.is_evaluated(template));
        assert!(view.toggle(template));
        assert_eq!(render(&tree, &view), "a EXPANDED b");
    }

    #[test]
    fn test_attach_twice_refused() {
        let tree = tree_of("<root><template><title>T</title></template></root>");
        let template = tree.templates()[0];
        let mut view = ViewState::new();
        assert!(view.attach_evaluation(template, "one".into()));
        assert!(!view.attach_evaluation(template, "two".into()));
        assert_eq!(view.visible_evaluation(template), Some("one"));
    }

    #[test]
    fn test_revert_restores_original() {
        let tree = tree_of("<root>x<template><title>T</title></template>y</root>");
        let template = tree.templates()[0];
        let before = render(&tree, &ViewState::new());
        let mut view = ViewState::new();
        view.attach_evaluation(template, "gone".into());
        view.revert(template);
        assert_eq!(render(&tree, &view), before);
        assert!(!view.is_evaluated(template));
    }

    #[test]
    fn test_toggle_without_evaluation() {
        let mut view = ViewState::new();
        assert!(!view.toggle(3));
    }

    #[test]
    fn test_outer_evaluation_shadows_inner() {
        let tree = tree_of(
            "<root><template><title>Outer</title><part><name index=\"1\"/><value>\
             <tplarg><title>p</title></tplarg></value></part></template></root>",
        );
        let ids = tree.templates();
        let outer = ids[0];
        let inner = *tree.placeholders().first().unwrap();
        let mut view = ViewState::new();
        view.attach_evaluation(inner, "INNER".into());
        assert_eq!(render(&tree, &view), "{{Outer|INNER}}");
        view.attach_evaluation(outer, "OUTER".into());
        assert_eq!(render(&tree, &view), "OUTER");
        // Hiding the outer evaluation reveals the inner one again.
        view.toggle(outer);
        assert_eq!(render(&tree, &view), "{{Outer|INNER}}");
    }
}
