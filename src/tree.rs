//! Expansion tree
//!
//! In-memory model of the parsed markup. Nodes live in an arena indexed by
//! stable integer ids assigned depth-first in document order; the visual
//! layer holds ids only, never references into the arena. Serialization
//! reconstructs wikitext from any subtree, substituting parameter overrides
//! where a bound placeholder's row is set.

use std::collections::HashMap;

use crate::params::{constructed_name, ParamTable};
use crate::parsetree::{XmlElement, XmlNode};

/// Stable identifier of a tree node (arena index).
pub type NodeId = usize;

/// Identifier of a visual element shown by the hosting UI.
pub type VisualId = usize;

/// The visual id of the root wrapper, always assigned first.
pub const ROOT_VISUAL: VisualId = 0;

/// Extension tags rendered structurally; anything else stays opaque.
const KNOWN_EXT_TAGS: [&str; 2] = ["nowiki", "pre"];

/// Structural kind of a tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Document root, wrapping the top-level sequence.
    Root,
    /// A `{{...}}` template invocation: title followed by argument parts.
    Template,
    /// A `{{{...}}}` parameter placeholder: title followed by default parts.
    /// `param_row` is the bound row in the current parameter table, wired
    /// after every table rebuild.
    Placeholder { param_row: Option<usize> },
    /// One argument of a template or placeholder.
    Part,
    Title,
    Value,
    Name,
    /// A source comment, kept verbatim.
    Comment,
    /// Wrapper around markup the transclusion machinery ignores
    /// (`<includeonly>` tags and friends).
    Ignore,
    /// A recognized extension tag (`nowiki`, `pre`).
    Ext {
        name: String,
        attr: Option<String>,
        inner: Option<String>,
    },
    /// Literal text.
    Text(String),
    /// Any element the engine does not interpret; serialized literally.
    Other { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
}

/// Arena-backed expansion tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Convert the remote parser's document into the arena model, assigning
    /// ids depth-first in source order.
    pub fn from_parse_tree(doc: &XmlElement) -> Tree {
        let mut tree = Tree::default();
        tree.root = tree.convert_element(doc);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The id counter: how many ids this tree version has assigned.
    pub fn id_counter(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            kind,
            children: Vec::new(),
        });
        id
    }

    fn convert_node(&mut self, node: &XmlNode) -> NodeId {
        match node {
            XmlNode::Element(el) => self.convert_element(el),
            XmlNode::Text(t) => self.alloc(NodeKind::Text(t.clone())),
        }
    }

    fn convert_element(&mut self, el: &XmlElement) -> NodeId {
        if el.name == "ext" {
            if let Some(kind) = ext_kind(el) {
                return self.alloc(kind);
            }
        }
        let kind = match el.name.as_str() {
            "root" => NodeKind::Root,
            "template" => NodeKind::Template,
            "tplarg" => NodeKind::Placeholder { param_row: None },
            "part" => NodeKind::Part,
            "title" => NodeKind::Title,
            "value" => NodeKind::Value,
            "name" => NodeKind::Name,
            "comment" => NodeKind::Comment,
            "ignore" => NodeKind::Ignore,
            other => NodeKind::Other {
                tag: other.to_string(),
            },
        };
        let id = self.alloc(kind);
        for child in &el.children {
            let child_id = self.convert_node(child);
            self.nodes[id].children.push(child_id);
        }
        id
    }

    /// All placeholder nodes in document (traversal) order.
    pub fn placeholders(&self) -> Vec<NodeId> {
        // Ids are assigned in preorder, so arena order is document order.
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Placeholder { .. }))
            .map(|n| n.id)
            .collect()
    }

    /// All template invocation nodes in document (traversal) order.
    pub fn templates(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Template))
            .map(|n| n.id)
            .collect()
    }

    /// The name of the placeholder at `id`, where `traversal_index` is its
    /// 0-based position among all placeholders.
    ///
    /// The name is the trimmed text of the title when the title is a single
    /// flat text value; an empty title yields the empty name; a title that
    /// is itself a nested expandable structure gets a synthetic
    /// `<constructed:i>` name.
    pub fn placeholder_name(&self, id: NodeId, traversal_index: usize) -> String {
        let Some(title) = self
            .node(id)
            .and_then(|n| n.children.first())
            .and_then(|c| self.node(*c))
        else {
            return String::new();
        };
        match title.children.as_slice() {
            [] => String::new(),
            [only] => match self.node(*only).map(|n| &n.kind) {
                Some(NodeKind::Text(t)) => t.trim().to_string(),
                _ => constructed_name(traversal_index),
            },
            _ => constructed_name(traversal_index),
        }
    }

    /// The distinct placeholder names of this tree, in traversal order (one
    /// entry per placeholder occurrence; deduplication is the table's job).
    pub fn placeholder_names(&self) -> Vec<String> {
        self.placeholders()
            .iter()
            .enumerate()
            .map(|(i, id)| self.placeholder_name(*id, i))
            .collect()
    }

    /// Wire every placeholder to its row in `table`.
    pub fn bind_placeholders(&mut self, table: &ParamTable) {
        let bindings: Vec<(NodeId, Option<usize>)> = self
            .placeholders()
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, table.row_of_name(&self.placeholder_name(*id, i))))
            .collect();
        for (id, row) in bindings {
            if let Some(node) = self.nodes.get_mut(id) {
                if let NodeKind::Placeholder { param_row } = &mut node.kind {
                    *param_row = row;
                }
            }
        }
    }

    /// Whether a template part is a named (`name=value`) argument.
    pub fn part_is_named(&self, id: NodeId) -> bool {
        self.node(id)
            .map(|n| matches!(n.kind, NodeKind::Part) && n.children.len() == 3)
            .unwrap_or(false)
    }

    /// Reconstruct wikitext for the subtree at `id`. With `overrides`, a
    /// bound placeholder whose row resolves emits the override verbatim in
    /// place of its own `{{{...}}}` syntax.
    pub fn wikitext(&self, id: NodeId, overrides: Option<&ParamTable>) -> String {
        let mut out = String::new();
        self.write_wikitext(id, overrides, &mut out);
        out
    }

    fn write_children(&self, node: &Node, overrides: Option<&ParamTable>, out: &mut String) {
        for child in &node.children {
            self.write_wikitext(*child, overrides, out);
        }
    }

    fn write_braced(
        &self,
        node: &Node,
        braces: (&str, &str),
        overrides: Option<&ParamTable>,
        out: &mut String,
    ) {
        out.push_str(braces.0);
        for (i, child) in node.children.iter().enumerate() {
            if i > 0 {
                out.push('|');
            }
            self.write_wikitext(*child, overrides, out);
        }
        out.push_str(braces.1);
    }

    fn write_wikitext(&self, id: NodeId, overrides: Option<&ParamTable>, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            // Should never miss; render a visible marker instead of
            // panicking so the session stays usable.
            tracing::warn!(id, "wikitext requested for unknown node");
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
            | NodeKind::Ignore => self.write_children(node, overrides, out),
            NodeKind::Template => self.write_braced(node, ("{{", "}}"), overrides, out),
            NodeKind::Placeholder { param_row } => {
                if let (Some(table), Some(row)) = (overrides, param_row) {
                    if let Some(value) = table.resolve_override(*row) {
                        out.push_str(value);
                        return;
                    }
                }
                self.write_braced(node, ("{{{", "}}}"), overrides, out);
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
                    self.write_children(node, overrides, out);
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            }
        }
    }
}

/// Recognize a `nowiki`/`pre` extension element, extracting its pieces.
fn ext_kind(el: &XmlElement) -> Option<NodeKind> {
    let mut children = el.children.iter().filter_map(|c| match c {
        XmlNode::Element(e) => Some(e),
        XmlNode::Text(_) => None,
    });
    let name_el = children.next()?;
    if name_el.name != "name" {
        return None;
    }
    let name = match name_el.children.as_slice() {
        [XmlNode::Text(t)] => t.clone(),
        _ => return None,
    };
    if !KNOWN_EXT_TAGS.contains(&name.as_str()) {
        return None;
    }
    let mut attr = None;
    let mut inner = None;
    for child in children {
        match child.name.as_str() {
            "attr" => {
                if let Some(XmlNode::Text(t)) = child.children.first() {
                    attr = Some(t.clone());
                }
            }
            "inner" => {
                if let Some(XmlNode::Text(t)) = child.children.first() {
                    inner = Some(t.clone());
                }
            }
            _ => {}
        }
    }
    Some(NodeKind::Ext { name, attr, inner })
}

/// Bidirectional index between visual-element ids and tree-node ids.
///
/// The root wrapper always takes visual id 0; every template and placeholder
/// then gets one visual id in traversal order. Visual elements hold only the
/// id, never a reference into the arena.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisualIndex {
    next: usize,
    to_node: HashMap<VisualId, NodeId>,
    from_node: HashMap<NodeId, VisualId>,
}

impl VisualIndex {
    pub fn build(tree: &Tree) -> Self {
        let mut index = VisualIndex::default();
        index.assign(tree.root());
        for node in &tree.nodes {
            if node.id == tree.root() {
                continue;
            }
            if matches!(
                node.kind,
                NodeKind::Template | NodeKind::Placeholder { .. }
            ) {
                index.assign(node.id);
            }
        }
        index
    }

    fn assign(&mut self, node: NodeId) -> VisualId {
        let visual = self.next;
        self.next += 1;
        self.to_node.insert(visual, node);
        self.from_node.insert(node, visual);
        visual
    }

    pub fn node_of(&self, visual: VisualId) -> Option<NodeId> {
        self.to_node.get(&visual).copied()
    }

    pub fn visual_of(&self, node: NodeId) -> Option<VisualId> {
        self.from_node.get(&node).copied()
    }

    /// The visual id counter: how many visual ids have been assigned.
    pub fn id_counter(&self) -> usize {
        self.next
    }

    pub fn len(&self) -> usize {
        self.to_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_node.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsetree::parse_document;

    fn tree_of(xml: &str) -> Tree {
        Tree::from_parse_tree(&parse_document(xml).unwrap())
    }

    const INVOCATION: &str = "<root><template><title>T</title>\
        <part><name>x</name>=<value>1</value></part>\
        <part><name index=\"1\"/><value>2</value></part></template></root>";

    #[test]
    fn test_ids_are_preorder() {
        let tree = tree_of(INVOCATION);
        assert_eq!(tree.root(), 0);
        for node in 0..tree.len() {
            let n = tree.node(node).unwrap();
            assert_eq!(n.id, node);
            for child in &n.children {
                assert!(*child > node, "child id must follow its parent");
            }
        }
    }

    #[test]
    fn test_round_trip_template() {
        let tree = tree_of(INVOCATION);
        assert_eq!(tree.wikitext(tree.root(), None), "{{T|x=1|2}}");
    }

    #[test]
    fn test_round_trip_placeholder_with_default() {
        let tree = tree_of(
            "<root><tplarg><title>a</title><part><name index=\"1\"/>\
             <value>def</value></part></tplarg></root>",
        );
        assert_eq!(tree.wikitext(tree.root(), None), "{{{a|def}}}");
    }

    #[test]
    fn test_placeholder_override_substitution() {
        let mut tree = tree_of("<root><tplarg><title>a</title></tplarg></root>");
        let mut table = ParamTable::rebuild(&tree.placeholder_names(), None, &ParamTable::new());
        tree.bind_placeholders(&table);

        assert_eq!(tree.wikitext(tree.root(), Some(&table)), "{{{a}}}");
        table.set_value(0, "b").unwrap();
        table.toggle(0, Some(true)).unwrap();
        assert_eq!(tree.wikitext(tree.root(), Some(&table)), "b");
    }

    #[test]
    fn test_placeholder_names_and_constructed() {
        // Second placeholder's name is itself a placeholder: unnameable.
        let tree = tree_of(
            "<root><tplarg><title> a </title></tplarg>\
             <tplarg><title><tplarg><title>n</title></tplarg></title></tplarg></root>",
        );
        let names = tree.placeholder_names();
        assert_eq!(names[0], "a");
        // Traversal order counts every placeholder, nested ones included.
        assert_eq!(names[1], "<constructed:1>");
        assert_eq!(names[2], "n");
    }

    #[test]
    fn test_empty_title_yields_empty_name() {
        let tree = tree_of("<root><tplarg><title></title></tplarg></root>");
        assert_eq!(tree.placeholder_names(), vec![String::new()]);
    }

    #[test]
    fn test_part_is_named() {
        let tree = tree_of(INVOCATION);
        let template = tree.node(tree.root()).unwrap().children[0];
        let parts: Vec<_> = tree.node(template).unwrap().children[1..].to_vec();
        assert!(tree.part_is_named(parts[0]));
        assert!(!tree.part_is_named(parts[1]));
    }

    #[test]
    fn test_ext_nowiki_serialization() {
        let tree = tree_of(
            "<root><ext><name>nowiki</name><inner>{{not|a|call}}</inner>\
             <close>&lt;/nowiki&gt;</close></ext></root>",
        );
        assert_eq!(
            tree.wikitext(tree.root(), None),
            "<nowiki>{{not|a|call}}</nowiki>"
        );
    }

    #[test]
    fn test_unknown_element_serialized_literally() {
        let tree = tree_of("<root><h2>heading</h2><hr/></root>");
        assert_eq!(tree.wikitext(tree.root(), None), "<h2>heading</h2><hr/>");
    }

    #[test]
    fn test_comment_and_ignore_pass_through() {
        let tree = tree_of(
            "<root><comment>&lt;!-- hi --&gt;</comment>\
             <ignore>&lt;includeonly&gt;</ignore></root>",
        );
        assert_eq!(
            tree.wikitext(tree.root(), None),
            "<!-- hi --><includeonly>"
        );
    }

    #[test]
    fn test_visual_index() {
        let tree = tree_of(
            "<root>a<template><title>T</title></template>\
             <tplarg><title>p</title></tplarg></root>",
        );
        let visuals = VisualIndex::build(&tree);
        assert_eq!(visuals.node_of(ROOT_VISUAL), Some(tree.root()));
        // One visual per template/placeholder, in traversal order.
        assert_eq!(visuals.len(), 3);
        let template = tree
            .nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Template))
            .unwrap();
        assert_eq!(visuals.visual_of(template.id), Some(1));
        assert_eq!(visuals.node_of(2), Some(tree.placeholders()[0]));
        assert_eq!(visuals.id_counter(), 3);
    }
}
