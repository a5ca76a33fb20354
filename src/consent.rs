//! Consent dismisser
//!
//! Best-effort pass that runs after load: walk the accessibility tree for a
//! consent container, find an accept control in a broad multilingual
//! vocabulary, and click it through JavaScript so overlays cannot swallow
//! the event. Failures are logged and ignored; this never fails navigation.

use crate::cdp::Session;
use crate::error::Result;
use crate::snapshot::tree::{build_tree, AxNode};

/// Words that mark a consent container
const CONTAINER_WORDS: &[&str] = &[
    "cookie",
    "consent",
    "privacy",
    "gdpr",
    "datenschutz",
    "tracking",
];

/// Accept phrases safe to click anywhere on the page
const STRONG_ACCEPT_PHRASES: &[&str] = &[
    "accept all cookies",
    "accept all",
    "allow all cookies",
    "allow all",
    "alle akzeptieren",
    "alle cookies akzeptieren",
    "tout accepter",
    "accepter tout",
    "aceptar todo",
    "accetta tutto",
    "alles accepteren",
];

/// Accept words that need a consent container around them
const ACCEPT_WORDS: &[&str] = &[
    "accept",
    "agree",
    "i agree",
    "allow",
    "got it",
    "ok",
    "akzeptieren",
    "zustimmen",
    "einverstanden",
    "accepter",
    "j'accepte",
    "aceptar",
    "accetta",
    "aceitar",
    "accepteren",
    "godkänn",
    "accepter alle",
    "hyväksy",
    "zaakceptuj",
    "принять",
    "同意",
];

fn is_clickable(node: &AxNode) -> bool {
    matches!(node.role.as_str(), "button" | "link") && node.backend_node_id.is_some()
}

fn name_matches_exactly(name: &str, phrases: &[&str]) -> bool {
    let lower = name.trim().to_lowercase();
    phrases.iter().any(|p| lower == *p)
}

fn name_contains(name: &str, words: &[&str]) -> bool {
    let lower = name.to_lowercase();
    words.iter().any(|w| lower.contains(w))
}

fn marks_container(node: &AxNode) -> bool {
    matches!(node.role.as_str(), "dialog" | "alertdialog")
        || name_contains(&node.name, CONTAINER_WORDS)
}

/// Pick the accept control's DOM back-identifier, if the page shows one
pub fn find_accept_control(root: &AxNode) -> Option<i64> {
    find_in(root, false)
}

fn find_in(node: &AxNode, in_container: bool) -> Option<i64> {
    let in_container = in_container || marks_container(node);

    if is_clickable(node) {
        if name_matches_exactly(&node.name, STRONG_ACCEPT_PHRASES) {
            return node.backend_node_id;
        }
        if in_container && name_matches_exactly(&node.name, ACCEPT_WORDS) {
            return node.backend_node_id;
        }
        if in_container && name_contains(&node.name, &["accept all", "allow all"]) {
            return node.backend_node_id;
        }
    }

    node.children
        .iter()
        .find_map(|child| find_in(child, in_container))
}

async fn click_via_js(session: &Session, backend_node_id: i64) -> Result<()> {
    let object_id = session.resolve_node(backend_node_id).await?;
    session
        .call_function_on(&object_id, "function() { this.click(); }", None)
        .await?;
    Ok(())
}

/// Run the pass; returns whether anything was clicked
pub async fn dismiss(session: &Session) -> bool {
    let batch = match session.get_full_ax_tree().await {
        Ok(batch) => batch,
        Err(e) => {
            tracing::debug!("consent pass skipped: {}", e);
            return false;
        }
    };
    let (root, _) = build_tree(&batch);
    let root = match root {
        Some(root) => root,
        None => return false,
    };

    let target = match find_accept_control(&root) {
        Some(backend) => backend,
        None => return false,
    };

    match click_via_js(session, target).await {
        Ok(()) => {
            tracing::debug!("dismissed consent via node {}", target);
            true
        }
        Err(e) => {
            tracing::debug!("consent click failed: {}", e);
            false
        }
    }
}
