//! Accessibility tree reconstruction
//!
//! The browser delivers the accessibility tree as a flat record batch. The
//! tree is rebuilt from parent identifiers only; child-identifier lists are
//! never trusted (some browser versions duplicate entries in them).

use std::collections::HashMap;

use crate::cdp::types::{AxValue, RawAxNode};

/// A node of the reconstructed accessibility tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxNode {
    /// Per-document numeric identifier; doubles as the snapshot reference
    pub id: u64,
    pub role: String,
    pub name: String,
    /// Named properties normalized to display strings
    pub properties: Vec<(String, String)>,
    pub ignored: bool,
    /// DOM back-identifier used for interaction targeting
    pub backend_node_id: Option<i64>,
    pub children: Vec<AxNode>,
}

/// Roles that accept input; these always carry their reference through
/// pruning and are the only ones the formatter marks with `[ref=N]`.
pub const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "textbox",
    "searchbox",
    "checkbox",
    "radio",
    "combobox",
    "listbox",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "slider",
    "spinbutton",
    "switch",
    "tab",
    "treeitem",
];

impl AxNode {
    /// Build a leaf for synthesized text (figure captions, color summaries)
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            role: "StaticText".to_string(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Property value by name
    pub fn prop(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Heading level, when present
    pub fn level(&self) -> Option<i64> {
        self.prop("level").and_then(|v| v.parse().ok())
    }

    /// Whether this node accepts input
    pub fn is_interactive(&self) -> bool {
        INTERACTIVE_ROLES.contains(&self.role.as_str())
    }

    /// Whether the subtree contains an interactive node
    pub fn has_interactive(&self) -> bool {
        self.is_interactive() || self.children.iter().any(AxNode::has_interactive)
    }

    /// Whether the subtree contains a heading
    pub fn has_heading(&self) -> bool {
        self.role == "heading" || self.children.iter().any(AxNode::has_heading)
    }

    /// Accessible names of the subtree, concatenated and lowercased
    pub fn subtree_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if !self.name.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&self.name.to_lowercase());
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// First descendant (or self) matching the predicate, depth-first
    pub fn find<'a>(&'a self, pred: &dyn Fn(&AxNode) -> bool) -> Option<&'a AxNode> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(pred))
    }

    /// Count of nodes in the subtree
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(AxNode::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

fn ax_string(value: &Option<AxValue>) -> String {
    value
        .as_ref()
        .and_then(|v| v.value.as_ref())
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn convert(raw: &RawAxNode) -> AxNode {
    let mut properties = Vec::new();
    if let Some(props) = &raw.properties {
        for prop in props {
            if let Some(value) = &prop.value.value {
                properties.push((prop.name.clone(), display_value(value)));
            }
        }
    }
    // The separate value field folds into the property set
    let value = ax_string(&raw.value);
    if !value.is_empty() && !properties.iter().any(|(n, _)| n == "value") {
        properties.push(("value".to_string(), value));
    }

    AxNode {
        id: raw.node_id.parse().unwrap_or(0),
        role: ax_string(&raw.role),
        name: ax_string(&raw.name),
        properties,
        ignored: raw.ignored,
        backend_node_id: raw.backend_dom_node_id,
        children: Vec::new(),
    }
}

/// Rebuild the nested tree from the flat batch and accumulate the reference
/// map (tree-node id -> DOM back-identifier). Returns `None` for an empty
/// batch.
pub fn build_tree(raw: &[RawAxNode]) -> (Option<AxNode>, HashMap<u64, i64>) {
    let mut refs = HashMap::new();
    if raw.is_empty() {
        return (None, refs);
    }

    let mut nodes: HashMap<u64, AxNode> = HashMap::with_capacity(raw.len());
    let mut children_of: HashMap<u64, Vec<u64>> = HashMap::new();
    let mut root_id = None;

    for record in raw {
        let node = convert(record);
        let id = node.id;
        if let Some(backend) = node.backend_node_id {
            refs.insert(id, backend);
        }
        match record.parent_id.as_ref().and_then(|p| p.parse::<u64>().ok()) {
            Some(parent) => children_of.entry(parent).or_default().push(id),
            None => {
                if root_id.is_none() {
                    root_id = Some(id);
                }
            }
        }
        nodes.insert(id, node);
    }

    let root_id = match root_id {
        Some(id) => id,
        None => return (None, refs),
    };

    let root = assemble(root_id, &mut nodes, &children_of);
    (root, refs)
}

/// Link children depth-first. Each node is consumed exactly once, so a
/// malformed batch with a parent cycle cannot recurse forever.
fn assemble(
    id: u64,
    nodes: &mut HashMap<u64, AxNode>,
    children_of: &HashMap<u64, Vec<u64>>,
) -> Option<AxNode> {
    let mut node = nodes.remove(&id)?;
    if let Some(child_ids) = children_of.get(&id) {
        for &child_id in child_ids {
            if let Some(child) = assemble(child_id, nodes, children_of) {
                node.children.push(child);
            }
        }
    }
    Some(node)
}
