//! Snapshot engine
//!
//! Pulls the accessibility tree over CDP, rebuilds it, prunes it for the
//! requested mode, and renders the agent-facing text document with its
//! reference map.

pub mod format;
pub mod prune;
pub mod tree;

use std::collections::HashMap;

pub use prune::SnapshotMode;
pub use tree::AxNode;

use crate::cdp::Session;
use crate::error::Result;

/// One captured snapshot: the document, its reference map, and the pruned
/// tree (used for challenge and consent inspection).
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Formatted text document, stats line first
    pub text: String,
    /// Reference token -> DOM back-identifier, valid for this snapshot only
    pub refs: HashMap<u64, i64>,
    /// The pruned tree the document was rendered from
    pub tree: Option<AxNode>,
}

/// Render a reconstructed tree into the final document
pub fn render(root: Option<&AxNode>, mode: SnapshotMode, context: Option<&str>) -> (String, Option<AxNode>) {
    let root = match root {
        Some(r) => r,
        None => return (format::with_stats(0, ""), None),
    };

    let raw_chars = format::format_tree(root).chars().count();
    let pruned = prune::prune(root, mode, context);
    let body = pruned
        .as_ref()
        .map(|t| format::format_tree(t))
        .unwrap_or_default();
    (format::with_stats(raw_chars, &body), pruned)
}

/// Capture a fresh snapshot from the page session
pub async fn capture(
    session: &Session,
    mode: SnapshotMode,
    context: Option<&str>,
) -> Result<Snapshot> {
    let batch = session.get_full_ax_tree().await?;
    let (root, refs) = tree::build_tree(&batch);
    let (text, pruned) = render(root.as_ref(), mode, context);

    tracing::debug!(
        nodes = batch.len(),
        refs = refs.len(),
        "captured snapshot ({:?})",
        mode
    );

    Ok(Snapshot {
        text,
        refs,
        tree: pruned,
    })
}
