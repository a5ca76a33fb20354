//! Snapshot pruning pipeline
//!
//! Five stages turn the full accessibility tree into what an agent needs:
//! region extraction, node-level rules, wrapper collapse, post-clean, and
//! the act-mode commerce-noise passes. Every stage copies; the input tree is
//! never mutated, and running the pipeline twice yields the same output as
//! running it once.

use std::collections::HashSet;

use super::tree::AxNode;

/// Marker role for a collapsed wrapper that still has several children.
/// The formatter treats it as transparent.
pub const PROMOTE_ROLE: &str = "_promote";

/// What the snapshot is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotMode {
    /// Interaction targets only
    #[default]
    Act,
    /// Reading: keep prose and document structure
    Browse,
    /// Orientation: keep banner and navigation links
    Navigate,
    /// Everything, unpruned
    Full,
}

const LANDMARK_ROLES: &[&str] = &[
    "banner",
    "main",
    "navigation",
    "complementary",
    "contentinfo",
    "region",
    "search",
    "form",
];

const ACT_LANDMARKS: &[&str] = &["main", "form", "search"];
const BROWSE_LANDMARKS: &[&str] = &["main", "region", "complementary"];
const NAVIGATE_LANDMARKS: &[&str] = &["banner", "navigation", "main", "search", "contentinfo"];

/// Regions with these words in their name are side content, not main
const AUX_REGION_WORDS: &[&str] = &[
    "image",
    "review",
    "recommend",
    "related",
    "similar",
    "also viewed",
    "cookie",
];

/// Sub-headings that introduce prose blocks nobody acts on
const DESCRIPTION_HEADING_WORDS: &[&str] = &[
    "about this",
    "description",
    "detail",
    "feature",
    "specification",
    "overview",
];

const COLOR_GROUP_WORDS: &[&str] = &["colors", "couleurs", "farben", "kleuren"];

const NAMED_GROUP_ROLES: &[&str] = &[
    "radiogroup",
    "tablist",
    "menu",
    "menubar",
    "toolbar",
    "tree",
    "treegrid",
    "grid",
];

/// Unnamed containers of these roles collapse away
const STRUCTURAL_ROLES: &[&str] = &[
    "generic",
    "GenericContainer",
    "group",
    "list",
    "table",
    "row",
    "rowgroup",
    "cell",
    "presentation",
    "none",
    "separator",
    "LayoutTable",
    "LayoutTableRow",
    "LayoutTableCell",
    PROMOTE_ROLE,
];

const STOCK_SHIPPING_WORDS: &[&str] = &[
    "in stock",
    "out of stock",
    "free shipping",
    "free delivery",
    "ships ",
    "delivery ",
];

const NOISE_BUTTON_WORDS: &[&str] = &[
    "energy class",
    "sponsored",
    "ad feedback",
    "product information sheet",
    "ratings detail",
    "rating details",
];

const NOISE_LINK_WORDS: &[&str] = &[
    "view options",
    "see options",
    "see more options",
    "privacy notice",
    "privacy policy",
    "terms of",
    "cookie preference",
    "legal notice",
    "imprint",
    "sitemap",
    "conditions of use",
    "accessibility statement",
];

const TRUNCATE_HEADING_WORDS: &[&str] = &["related searches", "need help"];

const FILTER_GROUP_WORDS: &[&str] = &[
    "filter",
    "sort by",
    "refine by",
    "price range",
    "customer review",
    "availability",
];

fn matches_any(name: &str, words: &[&str]) -> bool {
    let lower = name.to_lowercase();
    words.iter().any(|w| lower.contains(w))
}

/// Run the pipeline. `None` means everything pruned away (empty page).
pub fn prune(root: &AxNode, mode: SnapshotMode, context: Option<&str>) -> Option<AxNode> {
    if mode == SnapshotMode::Full {
        return Some(root.clone());
    }

    let keywords: Vec<String> = context
        .map(|c| {
            c.split_whitespace()
                .map(|w| w.to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let shell = extract_regions(root, mode);

    let ctx = Ctx {
        mode,
        keywords: &keywords,
        parent_role: "",
        inside_main: false,
    };
    let children: Vec<AxNode> = shell
        .children
        .iter()
        .flat_map(|c| prune_node(c, &ctx))
        .collect();
    let shell = AxNode { children, ..shell };

    let shell = collapse_wrappers(&shell)?;
    let shell = post_clean(&shell, mode);

    let shell = if mode == SnapshotMode::Act {
        let mut seen_links = HashSet::new();
        commerce_pass(&shell, &mut seen_links)?
    } else {
        shell
    };

    Some(shell)
}

// === Stage 1: region extraction ===

fn allowed_landmarks(mode: SnapshotMode) -> &'static [&'static str] {
    match mode {
        SnapshotMode::Act => ACT_LANDMARKS,
        SnapshotMode::Browse => BROWSE_LANDMARKS,
        SnapshotMode::Navigate => NAVIGATE_LANDMARKS,
        SnapshotMode::Full => LANDMARK_ROLES,
    }
}

fn collect_landmarks<'a>(node: &'a AxNode, out: &mut Vec<&'a AxNode>) {
    if LANDMARK_ROLES.contains(&node.role.as_str()) {
        out.push(node);
        return;
    }
    for child in &node.children {
        collect_landmarks(child, out);
    }
}

/// Unwrap the root web-area and keep only the regions the mode wants.
/// Returns a transparent shell holding the kept subtrees.
fn extract_regions(root: &AxNode, mode: SnapshotMode) -> AxNode {
    let top: Vec<&AxNode> =
        if root.role == "RootWebArea" || root.role == "WebArea" || root.role == PROMOTE_ROLE {
            root.children.iter().collect()
        } else {
            vec![root]
        };

    let mut landmarks = Vec::new();
    for node in &top {
        collect_landmarks(node, &mut landmarks);
    }

    let kept: Vec<AxNode> = if !landmarks.is_empty() {
        let allowed = allowed_landmarks(mode);
        landmarks
            .into_iter()
            .filter(|l| {
                // Auxiliary-named regions are side content, never "main"
                if l.role == "region" && matches_any(&l.name, AUX_REGION_WORDS) {
                    return false;
                }
                allowed.contains(&l.role.as_str())
            })
            .cloned()
            .collect()
    } else {
        let qualifying: Vec<AxNode> = top
            .iter()
            .filter(|n| n.has_heading() || n.has_interactive())
            .map(|n| (*n).clone())
            .collect();
        if qualifying.is_empty() {
            top.into_iter().cloned().collect()
        } else {
            qualifying
        }
    };

    AxNode {
        id: root.id,
        role: PROMOTE_ROLE.to_string(),
        children: kept,
        ..Default::default()
    }
}

// === Stage 2: node-level pruning ===

struct Ctx<'a> {
    mode: SnapshotMode,
    keywords: &'a [String],
    parent_role: &'a str,
    inside_main: bool,
}

impl<'a> Ctx<'a> {
    fn act_like(&self) -> bool {
        matches!(self.mode, SnapshotMode::Act | SnapshotMode::Navigate)
    }

    fn browse(&self) -> bool {
        self.mode == SnapshotMode::Browse
    }

    fn descend<'b>(&self, node: &'b AxNode) -> Ctx<'b>
    where
        'a: 'b,
    {
        Ctx {
            mode: self.mode,
            keywords: self.keywords,
            parent_role: &node.role,
            inside_main: self.inside_main || node.role == "main",
        }
    }
}

fn prune_children(node: &AxNode, ctx: &Ctx) -> Vec<AxNode> {
    let child_ctx = ctx.descend(node);
    node.children
        .iter()
        .flat_map(|c| prune_node(c, &child_ctx))
        .collect()
}

fn keep_with_children(node: &AxNode, ctx: &Ctx) -> Vec<AxNode> {
    vec![AxNode {
        children: prune_children(node, ctx),
        ..node.clone()
    }]
}

/// Prune the container but hoist its surviving interactive content
fn hoist_interactive(node: &AxNode, ctx: &Ctx) -> Vec<AxNode> {
    prune_children(node, ctx)
        .into_iter()
        .filter(AxNode::has_interactive)
        .collect()
}

fn is_lone_separator(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.chars().count() == 1 && !trimmed.chars().next().unwrap().is_alphanumeric()
}

/// `$[d,.]+` / `€[d,]+`
fn is_price(name: &str) -> bool {
    let trimmed = name.trim();
    let rest = match trimmed.strip_prefix('$').or_else(|| trimmed.strip_prefix('€')) {
        Some(r) => r,
        None => return false,
    };
    !rest.is_empty()
        && rest.chars().any(|c| c.is_ascii_digit())
        && rest.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.')
}

fn keep_static_text_act(name: &str) -> bool {
    let trimmed = name.trim();
    let chars = trimmed.chars().count();
    chars <= 30
        || (trimmed.ends_with(':') && chars <= 40)
        || is_price(trimmed)
        || matches_any(trimmed, STOCK_SHIPPING_WORDS)
        || trimmed.starts_with("colors(")
}

fn prune_node(node: &AxNode, ctx: &Ctx) -> Vec<AxNode> {
    // Interaction targets survive every rule below
    if node.is_interactive() {
        let mut kept = AxNode {
            children: prune_children(node, ctx),
            ..node.clone()
        };
        // Links hoisted out of prose carry no inline content
        if node.role == "link" && ctx.parent_role == "paragraph" && ctx.act_like() {
            kept.children.clear();
        }
        return vec![kept];
    }

    match node.role.as_str() {
        "paragraph" => {
            if ctx.act_like() {
                hoist_interactive(node, ctx)
            } else {
                keep_with_children(node, ctx)
            }
        }
        "navigation" if ctx.browse() && ctx.inside_main => Vec::new(),
        "code" | "term" | "definition" => vec![node.clone()],
        "strong" | "emphasis" | "blockquote" => {
            if ctx.browse() {
                keep_with_children(node, ctx)
            } else {
                hoist_interactive(node, ctx)
            }
        }
        "figure" | "Figure" => {
            if ctx.browse() {
                if node.name.is_empty() {
                    Vec::new()
                } else {
                    vec![AxNode::text(format!("[Figure: {}]", node.name))]
                }
            } else {
                hoist_interactive(node, ctx)
            }
        }
        "listitem" => {
            if ctx.act_like() {
                let kept = AxNode {
                    children: prune_children(node, ctx),
                    ..node.clone()
                };
                if !kept.has_interactive() {
                    return Vec::new();
                }
                if ctx.mode == SnapshotMode::Act && !ctx.keywords.is_empty() {
                    // Match against what the card retains, so a second run
                    // sees the same text and makes the same decision
                    let text = kept.subtree_text();
                    if !ctx.keywords.iter().any(|k| text.contains(k.as_str())) {
                        // Card does not match the task: condense to one link
                        if let Some(link) = kept.find(&|n| n.role == "link") {
                            let mut condensed = link.clone();
                            condensed.children.clear();
                            return vec![condensed];
                        }
                        return Vec::new();
                    }
                }
                vec![kept]
            } else {
                keep_with_children(node, ctx)
            }
        }
        "list" => {
            if ctx.act_like() && !node.has_interactive() {
                Vec::new()
            } else {
                keep_with_children(node, ctx)
            }
        }
        "group" => {
            if matches_any(&node.name, COLOR_GROUP_WORDS) {
                let names: Vec<&str> = node
                    .children
                    .iter()
                    .filter(|c| !c.name.is_empty())
                    .map(|c| c.name.as_str())
                    .collect();
                return vec![AxNode::text(format!(
                    "colors({}): {}",
                    names.len(),
                    names.join(", ")
                ))];
            }
            keep_with_children(node, ctx)
        }
        role if NAMED_GROUP_ROLES.contains(&role) => keep_with_children(node, ctx),
        "heading" => {
            let level = node.level().unwrap_or(2);
            if level != 1
                && ctx.mode == SnapshotMode::Act
                && matches_any(&node.name, DESCRIPTION_HEADING_WORDS)
            {
                return Vec::new();
            }
            // Headings are leaves in the output
            vec![AxNode {
                children: Vec::new(),
                ..node.clone()
            }]
        }
        "StaticText" => {
            if ctx.browse() {
                if is_lone_separator(&node.name) {
                    Vec::new()
                } else {
                    vec![AxNode {
                        children: Vec::new(),
                        ..node.clone()
                    }]
                }
            } else if keep_static_text_act(&node.name) {
                vec![AxNode {
                    children: Vec::new(),
                    ..node.clone()
                }]
            } else {
                Vec::new()
            }
        }
        "image" | "img" => {
            if ctx.browse() && !node.name.is_empty() {
                vec![AxNode {
                    children: Vec::new(),
                    ..node.clone()
                }]
            } else {
                Vec::new()
            }
        }
        "separator" => Vec::new(),
        "region" if ctx.act_like() && matches_any(&node.name, AUX_REGION_WORDS) => Vec::new(),
        "complementary" if ctx.act_like() => Vec::new(),
        _ => keep_with_children(node, ctx),
    }
}

// === Stage 3: wrapper collapse ===

fn collapse_wrappers(node: &AxNode) -> Option<AxNode> {
    let children: Vec<AxNode> = node
        .children
        .iter()
        .filter_map(collapse_wrappers)
        .collect();
    let mut out = AxNode {
        children,
        ..node.clone()
    };

    if STRUCTURAL_ROLES.contains(&out.role.as_str()) && out.name.is_empty() {
        match out.children.len() {
            0 => None,
            1 => Some(out.children.pop().unwrap()),
            _ => {
                out.role = PROMOTE_ROLE.to_string();
                Some(out)
            }
        }
    } else {
        Some(out)
    }
}

// === Stage 4: post-clean ===

fn post_clean(node: &AxNode, mode: SnapshotMode) -> AxNode {
    let mut children: Vec<AxNode> = node.children.iter().map(|c| post_clean(c, mode)).collect();

    if mode == SnapshotMode::Act {
        children = drop_orphan_headings(children);
    }

    let mut out = AxNode {
        children,
        ..node.clone()
    };

    // Comboboxes show the chosen option, not the whole option list
    if out.role == "combobox" || out.role == "listbox" {
        let selected = out
            .find(&|n| {
                (n.role == "option" || n.role == "menuitem") && n.prop("selected") == Some("true")
            })
            .map(|s| s.name.clone());
        if let Some(name) = selected {
            out.name = name;
        }
        out.children.clear();
    }

    out
}

/// A non-h1 heading with no interactive sibling before the next heading
/// introduces nothing actionable
fn drop_orphan_headings(children: Vec<AxNode>) -> Vec<AxNode> {
    let orphan: Vec<bool> = children
        .iter()
        .enumerate()
        .map(|(i, child)| {
            if child.role != "heading" || child.level() == Some(1) {
                return false;
            }
            !children[i + 1..]
                .iter()
                .take_while(|s| s.role != "heading")
                .any(AxNode::has_interactive)
        })
        .collect();

    children
        .into_iter()
        .zip(orphan)
        .filter(|(_, orphan)| !orphan)
        .map(|(c, _)| c)
        .collect()
}

// === Stage 5: commerce-noise passes (act only) ===

fn is_truncation_point(node: &AxNode) -> bool {
    (node.role == "button" && matches_any(&node.name, &["back to top"]))
        || (node.role == "heading"
            && (node.level() == Some(6) || matches_any(&node.name, TRUNCATE_HEADING_WORDS)))
}

fn is_filter_group(node: &AxNode) -> bool {
    if !matches!(node.role.as_str(), "group" | "generic" | PROMOTE_ROLE) {
        return false;
    }
    if matches_any(&node.name, FILTER_GROUP_WORDS) {
        return true;
    }
    node.children
        .first()
        .map(|first| first.role == "heading" && matches_any(&first.name, FILTER_GROUP_WORDS))
        .unwrap_or(false)
}

fn commerce_pass(node: &AxNode, seen_links: &mut HashSet<String>) -> Option<AxNode> {
    match node.role.as_str() {
        "link" => {
            if matches_any(&node.name, NOISE_LINK_WORDS) {
                return None;
            }
            if !node.name.is_empty() {
                let key = node.name.to_lowercase();
                if !seen_links.insert(key) {
                    return None;
                }
            }
        }
        "button" => {
            if matches_any(&node.name, NOISE_BUTTON_WORDS) {
                return None;
            }
        }
        _ => {
            if is_filter_group(node) {
                return None;
            }
        }
    }

    let mut children = Vec::new();
    for child in &node.children {
        if is_truncation_point(child) {
            break;
        }
        if let Some(kept) = commerce_pass(child, seen_links) {
            children.push(kept);
        }
    }

    Some(AxNode {
        children,
        ..node.clone()
    })
}
