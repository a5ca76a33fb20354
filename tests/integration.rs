//! Integration tests against a real browser.
//!
//! These require a Chromium-family browser on the machine.
//! Run with: cargo test --test integration -- --ignored

use canopy::{Page, SessionConfig, SnapshotMode, TypeOptions, WaitCondition};
use std::time::Duration;

fn browser_available() -> bool {
    canopy::browser::find_browser().is_ok()
}

#[tokio::test]
#[ignore = "requires a browser"]
async fn launch_and_close() {
    if !browser_available() {
        eprintln!("no browser found, skipping");
        return;
    }

    let page = Page::connect(SessionConfig::default())
        .await
        .expect("failed to connect");
    page.close().await;
}

#[tokio::test]
#[ignore = "requires a browser"]
async fn navigate_and_snapshot_example_domain() {
    if !browser_available() {
        eprintln!("no browser found, skipping");
        return;
    }

    let mut page = Page::connect(SessionConfig::default())
        .await
        .expect("failed to connect");

    page.goto("https://example.com").await.expect("goto failed");

    let act = page
        .snapshot_with_mode(SnapshotMode::Act)
        .await
        .expect("snapshot failed");
    assert!(act.starts_with("# "));
    assert!(act.contains("Example Domain"));
    assert!(act.contains("[ref="));

    let browse = page
        .snapshot_with_mode(SnapshotMode::Browse)
        .await
        .expect("snapshot failed");
    assert!(browse.len() >= act.len());

    page.close().await;
}

#[tokio::test]
#[ignore = "requires a browser"]
async fn type_into_a_data_url_form() {
    if !browser_available() {
        eprintln!("no browser found, skipping");
        return;
    }

    let mut page = Page::connect(SessionConfig::default())
        .await
        .expect("failed to connect");

    page.goto("data:text/html,<input aria-label=Name><button>Send</button>")
        .await
        .expect("goto failed");

    let snapshot = page
        .snapshot_with_mode(SnapshotMode::Act)
        .await
        .expect("snapshot failed");

    // Pull the textbox ref out of the snapshot and type into it
    let reference: u64 = snapshot
        .lines()
        .find(|l| l.contains("textbox"))
        .and_then(|l| l.split("[ref=").nth(1))
        .and_then(|r| r.strip_suffix(']'))
        .expect("no textbox ref")
        .parse()
        .expect("unparseable ref");

    page.type_text(reference, "Ada", TypeOptions::default())
        .await
        .expect("type failed");
    page.press("Tab").await.expect("press failed");

    page.close().await;
}

#[tokio::test]
#[ignore = "requires a browser"]
async fn waits_and_screenshot() {
    if !browser_available() {
        eprintln!("no browser found, skipping");
        return;
    }

    let mut page = Page::connect(SessionConfig::default())
        .await
        .expect("failed to connect");

    page.goto("https://example.com").await.expect("goto failed");
    page.wait_for(
        WaitCondition::Text("Example Domain".into()),
        Duration::from_secs(10),
    )
    .await
    .expect("wait_for failed");
    page.wait_for_network_idle(Duration::from_secs(10), Duration::from_millis(500))
        .await
        .expect("network idle failed");

    let png = page.screenshot(Some("png"), None).await.expect("screenshot");
    assert!(!png.is_empty());

    let pdf = page.pdf(false).await.expect("pdf");
    assert!(!pdf.is_empty());

    page.close().await;
}

#[tokio::test]
#[ignore = "requires a browser and an external browser on port 9222"]
async fn hybrid_fallback_against_a_live_challenge() {
    if !browser_available() {
        eprintln!("no browser found, skipping");
        return;
    }

    // Needs a headed browser already running with --remote-debugging-port=9222
    let mut page = Page::connect(SessionConfig::hybrid(9222))
        .await
        .expect("failed to connect");

    // A site fronted by a bot check; headless gets the interstitial, the
    // external browser usually passes
    page.goto("https://www.whatismybrowser.com/").await.expect("goto failed");
    let text = page
        .snapshot_with_mode(SnapshotMode::Browse)
        .await
        .expect("snapshot failed");
    assert!(!text.is_empty());

    page.close().await;
}
