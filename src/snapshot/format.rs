//! Snapshot text serializer
//!
//! One line per emitted node: `- role "name" [prop=value, …] [ref=N]`,
//! indented two spaces per level. Render noise (inline text boxes, line
//! breaks) is skipped; ignored nodes contribute their children only. The
//! `_promote` role left behind by wrapper collapse is transparent.

use super::prune::PROMOTE_ROLE;
use super::tree::AxNode;

/// Roles that only mirror rendered text runs
const NOISE_ROLES: &[&str] = &["InlineTextBox", "LineBreak"];

/// Properties worth showing, in emission order
const EMITTED_PROPS: &[&str] = &[
    "checked",
    "disabled",
    "expanded",
    "level",
    "selected",
    "required",
    "value",
];

/// Serialize a tree to the snapshot text format
pub fn format_tree(root: &AxNode) -> String {
    let mut lines = Vec::new();
    emit(root, 0, &mut lines);
    lines.join("\n")
}

fn emit(node: &AxNode, depth: usize, lines: &mut Vec<String>) {
    if NOISE_ROLES.contains(&node.role.as_str()) {
        return;
    }

    // Ignored and transparent nodes yield their place to their children
    if node.ignored || node.role == PROMOTE_ROLE {
        for child in &node.children {
            emit(child, depth, lines);
        }
        return;
    }

    let mut line = String::new();
    for _ in 0..depth {
        line.push_str("  ");
    }
    line.push_str("- ");
    line.push_str(&node.role);

    if !node.name.is_empty() {
        line.push_str(" \"");
        line.push_str(&node.name);
        line.push('"');
    }

    let props: Vec<String> = EMITTED_PROPS
        .iter()
        .filter_map(|key| {
            node.prop(key)
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}={}", key, v))
        })
        .collect();
    if !props.is_empty() {
        line.push_str(" [");
        line.push_str(&props.join(", "));
        line.push(']');
    }

    if node.is_interactive() && node.backend_node_id.is_some() {
        line.push_str(&format!(" [ref={}]", node.id));
    }

    lines.push(line);

    for child in &node.children {
        emit(child, depth + 1, lines);
    }
}

/// Prepend the statistics line. The pruned count always equals the body's
/// character count.
pub fn with_stats(raw_chars: usize, body: &str) -> String {
    let pruned_chars = body.chars().count();
    let pct = if raw_chars > 0 {
        raw_chars.saturating_sub(pruned_chars) * 100 / raw_chars
    } else {
        0
    };
    format!(
        "# {} chars → {} chars ({}% pruned)\n{}",
        raw_chars, pruned_chars, pct, body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64, role: &str, name: &str, children: Vec<AxNode>) -> AxNode {
        AxNode {
            id,
            role: role.to_string(),
            name: name.to_string(),
            backend_node_id: Some(id as i64 * 10),
            children,
            ..Default::default()
        }
    }

    #[test]
    fn lines_carry_role_name_props_and_ref() {
        let mut heading = node(2, "heading", "Example Domain", vec![]);
        heading.properties.push(("level".into(), "1".into()));
        let link = node(3, "link", "More information...", vec![]);
        let root = node(1, "RootWebArea", "", vec![heading, link]);

        let text = format_tree(&root);
        assert_eq!(
            text,
            "- RootWebArea\n  - heading \"Example Domain\" [level=1]\n  - link \"More information...\" [ref=3]"
        );
    }

    #[test]
    fn ignored_nodes_yield_their_children() {
        let mut wrapper = node(2, "generic", "", vec![node(3, "button", "Go", vec![])]);
        wrapper.ignored = true;
        let root = node(1, "RootWebArea", "", vec![wrapper]);

        let text = format_tree(&root);
        assert!(!text.contains("generic"));
        assert!(text.contains("  - button \"Go\" [ref=3]"));
    }

    #[test]
    fn noise_roles_are_skipped_entirely() {
        let static_text = node(
            2,
            "StaticText",
            "hello",
            vec![node(3, "InlineTextBox", "hello", vec![])],
        );
        let root = node(1, "RootWebArea", "", vec![static_text]);

        let text = format_tree(&root);
        assert!(text.contains("StaticText"));
        assert!(!text.contains("InlineTextBox"));
    }

    #[test]
    fn refs_only_mark_interactive_roles() {
        let root = node(
            1,
            "RootWebArea",
            "",
            vec![
                node(2, "heading", "Title", vec![]),
                node(3, "textbox", "Search", vec![]),
            ],
        );
        let text = format_tree(&root);
        assert!(!text.contains("heading \"Title\" [ref="));
        assert!(text.contains("textbox \"Search\" [ref=3]"));
    }

    #[test]
    fn stats_prefix_declares_the_body_length() {
        let body = "- RootWebArea\n  - button \"Go\"";
        let doc = with_stats(100, body);
        let first = doc.lines().next().unwrap();
        assert_eq!(
            first,
            format!("# 100 chars → {} chars (71% pruned)", body.chars().count())
        );
        assert_eq!(doc[first.len() + 1..], *body);
    }
}
