//! # Canopy
//!
//! Agent-facing browser automation over the Chrome DevTools Protocol.
//!
//! Canopy drives a locally installed Chromium-family browser through a single
//! multiplexed WebSocket and models the page the way an agent needs it: a
//! pruned accessibility snapshot with per-snapshot element references that
//! resolve back to DOM nodes for clicking, typing, and the rest.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use canopy::{Page, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> canopy::Result<()> {
//!     let mut page = Page::connect(SessionConfig::default()).await?;
//!
//!     page.goto("https://example.com").await?;
//!     let snapshot = page.snapshot().await?;
//!     println!("{}", snapshot);
//!
//!     // References come from the snapshot and live until the next one
//!     page.click(42).await?;
//!
//!     page.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modes
//!
//! Headless launches a fresh browser with a throwaway profile. Headed
//! attaches to a browser you already run with a debug port. Hybrid starts
//! headless and, when a page turns out to be an anti-bot interstitial, tears
//! down and redoes the pipeline against your external browser.

pub mod browser;
pub mod cdp;
pub mod consent;
pub mod cookies;
pub mod error;
pub mod input;
pub mod page;
pub mod snapshot;
pub mod stealth;

use std::path::PathBuf;

// Re-exports
pub use browser::Browser;
pub use cookies::{Cookie, CookieSource, StorageState};
pub use error::{Error, Result};
pub use input::TypeOptions;
pub use page::{ConsoleRecord, DialogRecord, Page, RequestRecord, TabInfo, WaitCondition};
pub use snapshot::{Snapshot, SnapshotMode};

/// How the browser endpoint comes to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Launch and own a fresh headless browser
    Headless,
    /// Attach to an external browser on this debug port; never terminate it
    Headed { port: u16 },
    /// Start headless, fall back to the external browser on a challenge page
    Hybrid { port: u16 },
}

impl LaunchMode {
    /// Whether this mode runs without a visible window
    pub fn is_headless(&self) -> bool {
        matches!(self, LaunchMode::Headless | LaunchMode::Hybrid { .. })
    }
}

/// Configuration for one page session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Launch / attach / hybrid
    pub mode: LaunchMode,
    /// Run the consent dismisser after every navigation
    pub dismiss_consent: bool,
    /// Default pruning mode for snapshots
    pub snapshot_mode: SnapshotMode,
    /// Free-text task keywords that sharpen act-mode pruning
    pub context: Option<String>,
    /// Proxy server passed to the browser
    pub proxy: Option<String>,
    /// Emulated viewport (width, height), scale 1, non-mobile
    pub viewport: Option<(u32, u32)>,
    /// Storage state document to seed cookies from
    pub storage_state: Option<PathBuf>,
    /// Explicit browser binary instead of discovery
    pub browser_path: Option<String>,
    /// Profile directory; a unique per-process temp path when unset
    pub user_data_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: LaunchMode::Headless,
            dismiss_consent: true,
            snapshot_mode: SnapshotMode::Act,
            context: None,
            proxy: None,
            viewport: None,
            storage_state: None,
            browser_path: None,
            user_data_dir: None,
        }
    }
}

impl SessionConfig {
    /// Attach to an external browser instead of launching one
    pub fn headed(port: u16) -> Self {
        Self {
            mode: LaunchMode::Headed { port },
            ..Default::default()
        }
    }

    /// Headless with a challenge-page fallback to an external browser
    pub fn hybrid(port: u16) -> Self {
        Self {
            mode: LaunchMode::Hybrid { port },
            ..Default::default()
        }
    }
}
