//! Page handle
//!
//! The public façade over one browser page: navigation, snapshots,
//! reference-based interaction, waits, export, cookies, tabs, dialogs, and
//! teardown. Holds the current reference map; every fresh snapshot replaces
//! it wholesale, invalidating earlier references.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant, SystemTime};

use serde_json::Value;

use crate::browser::Browser;
use crate::cdp::types::{
    NetworkRequestWillBeSentEvent, PageJavascriptDialogOpeningEvent, RuntimeConsoleApiCalledEvent,
};
use crate::cdp::{Session, Subscription};
use crate::consent;
use crate::cookies::{self, Cookie, CookieSource, StorageState};
use crate::error::{Error, Result};
use crate::input::{Input, TypeOptions};
use crate::snapshot::{self, tree::AxNode, SnapshotMode};
use crate::stealth;
use crate::{LaunchMode, SessionConfig};

/// Default deadline for navigation and waits
const NAV_TIMEOUT: Duration = Duration::from_secs(30);
/// Settle delay after the load event, for late layout and SPA hydration
const SETTLE_DELAY: Duration = Duration::from_millis(500);
/// Poll interval for wait_for
const WAIT_POLL: Duration = Duration::from_millis(200);

/// Permission categories denied before any navigation
const DENIED_PERMISSIONS: &[&str] = &[
    "geolocation",
    "notifications",
    "midi",
    "durableStorage",
    "audioCapture",
    "videoCapture",
    "backgroundSync",
    "sensors",
    "idleDetection",
];

/// Phrases that mark an anti-bot interstitial
const CHALLENGE_PHRASES: &[&str] = &[
    "just a moment",
    "checking your browser",
    "verify you are human",
    "prove your humanity",
    "attention required",
    "file a ticket",
];

/// Whether a pruned tree reads like a bot challenge
pub fn looks_like_challenge(tree: &AxNode) -> bool {
    let text = tree.subtree_text();
    CHALLENGE_PHRASES.iter().any(|p| text.contains(p))
}

/// A JavaScript dialog the core auto-dismissed
#[derive(Debug, Clone)]
pub struct DialogRecord {
    pub kind: String,
    pub message: String,
    pub timestamp: SystemTime,
}

/// A console call captured from the page
#[derive(Debug, Clone)]
pub struct ConsoleRecord {
    pub kind: String,
    pub text: String,
}

/// A network request observed on the session
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub url: String,
    pub method: String,
}

/// One page-type tab as enumerated by the browser
#[derive(Debug, Clone)]
pub struct TabInfo {
    pub index: usize,
    pub title: String,
    pub url: String,
}

/// What wait_for polls for
#[derive(Debug, Clone)]
pub enum WaitCondition {
    /// document.body.innerText contains the string
    Text(String),
    /// document.querySelector(selector) is non-null
    Selector(String),
}

/// Logs and counters shared with the background subscriptions
#[derive(Clone, Default)]
struct SharedLogs {
    dialogs: Arc<StdMutex<Vec<DialogRecord>>>,
    console: Arc<StdMutex<Vec<ConsoleRecord>>>,
    requests: Arc<StdMutex<Vec<RequestRecord>>>,
    inflight: Arc<AtomicI64>,
}

/// The public page handle; owns its browser endpoint, session, and state
pub struct Page {
    browser: Browser,
    session: Session,
    config: SessionConfig,
    refs: HashMap<u64, i64>,
    logs: SharedLogs,
    /// Background subscriptions live exactly as long as the session
    subscriptions: Vec<Subscription>,
    current_url: Option<String>,
    seeded_cookies: Vec<Cookie>,
}

impl Page {
    /// Launch (or attach to) a browser and prepare one page target
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let browser = match config.mode {
            LaunchMode::Headed { port } => Browser::connect_existing(port).await?,
            LaunchMode::Headless | LaunchMode::Hybrid { .. } => Browser::launch(&config).await?,
        };

        let logs = SharedLogs::default();
        let (session, subscriptions) = build_page(&browser, &config, &logs).await?;

        // Seed cookies from storage state; a missing file is fine, a
        // malformed one is not
        let mut seeded_cookies = Vec::new();
        if let Some(path) = &config.storage_state {
            if path.exists() {
                let state = StorageState::load(path)?;
                seeded_cookies = state.cookies;
                if let Err(e) = cookies::install(&session, &seeded_cookies).await {
                    tracing::debug!("cookie seed failed: {}", e);
                }
            }
        }

        Ok(Self {
            browser,
            session,
            config,
            refs: HashMap::new(),
            logs,
            subscriptions,
            current_url: None,
            seeded_cookies,
        })
    }

    /// The underlying CDP session
    pub fn session(&self) -> &Session {
        &self.session
    }

    // === Navigation ===

    /// Navigate and wait for the load event, then settle and dismiss consent
    pub async fn goto(&mut self, url: &str) -> Result<()> {
        self.goto_with_timeout(url, NAV_TIMEOUT).await
    }

    /// Navigate with an explicit deadline
    pub async fn goto_with_timeout(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.navigate_and_settle(url, timeout).await?;

        // Hybrid: a challenge page this early means headless got flagged
        if self.hybrid_port().is_some() && self.browser.owns_process() {
            let snap = snapshot::capture(&self.session, SnapshotMode::Full, None).await?;
            if snap.tree.as_ref().is_some_and(looks_like_challenge) {
                self.fall_back_to_external(url, timeout).await?;
            }
        }
        Ok(())
    }

    async fn navigate_and_settle(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let load = self.session.once("Page.loadEventFired", timeout);

        let nav = self.session.navigate(url).await?;
        if let Some(error) = nav.error_text {
            return Err(Error::NavigationFailed(error));
        }

        load.await.map_err(|e| match e {
            Error::Timeout(msg) => Error::NavigationFailed(format!("no load event: {}", msg)),
            other => other,
        })?;

        tokio::time::sleep(SETTLE_DELAY).await;
        self.current_url = Some(url.to_string());

        if self.config.dismiss_consent {
            consent::dismiss(&self.session).await;
        }
        Ok(())
    }

    /// Navigate to the previous history entry
    pub async fn go_back(&mut self) -> Result<()> {
        let history = self.session.get_navigation_history().await?;
        let index = history.current_index as usize;
        if index == 0 || history.entries.is_empty() {
            return Err(Error::NoHistory);
        }
        let entry = &history.entries[index - 1];
        self.session.navigate_to_history_entry(entry.id).await?;
        self.current_url = Some(entry.url.clone());
        Ok(())
    }

    /// Navigate to the next history entry
    pub async fn go_forward(&mut self) -> Result<()> {
        let history = self.session.get_navigation_history().await?;
        let next = history.current_index as usize + 1;
        if next >= history.entries.len() {
            return Err(Error::NoHistory);
        }
        let entry = &history.entries[next];
        self.session.navigate_to_history_entry(entry.id).await?;
        self.current_url = Some(entry.url.clone());
        Ok(())
    }

    /// Reload the current page
    pub async fn reload(&self) -> Result<()> {
        self.session.reload(false).await
    }

    /// Current URL as the page reports it
    pub async fn url(&self) -> Result<String> {
        self.eval_string("location.href").await
    }

    /// Current document title
    pub async fn title(&self) -> Result<String> {
        self.eval_string("document.title").await
    }

    async fn eval_string(&self, expression: &str) -> Result<String> {
        let result = self.session.evaluate(expression).await?;
        Ok(result
            .result
            .value
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default())
    }

    // === Snapshots ===

    /// Take a snapshot in the configured default mode
    pub async fn snapshot(&mut self) -> Result<String> {
        self.snapshot_with_mode(self.config.snapshot_mode).await
    }

    /// Take a snapshot in an explicit mode, replacing the reference map
    pub async fn snapshot_with_mode(&mut self, mode: SnapshotMode) -> Result<String> {
        let context = self.config.context.clone();
        let snap = snapshot::capture(&self.session, mode, context.as_deref()).await?;

        // Hybrid: retry once against the external browser, then return
        // whatever the second pass sees
        if snap.tree.as_ref().is_some_and(looks_like_challenge)
            && self.hybrid_port().is_some()
            && self.browser.owns_process()
        {
            if let Some(url) = self.current_url.clone() {
                self.fall_back_to_external(&url, NAV_TIMEOUT).await?;
                let retry = snapshot::capture(&self.session, mode, context.as_deref()).await?;
                self.refs = retry.refs;
                return Ok(retry.text);
            }
        }

        self.refs = snap.refs;
        Ok(snap.text)
    }

    fn hybrid_port(&self) -> Option<u16> {
        match self.config.mode {
            LaunchMode::Hybrid { port } => Some(port),
            _ => None,
        }
    }

    /// Tear down the headless browser and redo the pipeline against the
    /// external one on the configured debug port.
    async fn fall_back_to_external(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let port = self.hybrid_port().ok_or_else(|| {
            Error::NavigationFailed("hybrid fallback without a debug port".into())
        })?;
        tracing::info!("challenge detected, falling back to external browser on {}", port);

        // Close target, transport, and the owned child
        self.subscriptions.clear();
        let _ = self.browser.connection().close_target(self.session.target_id()).await;
        let old = std::mem::replace(&mut self.browser, Browser::connect_existing(port).await?);
        old.close().await;

        let (session, subscriptions) = build_page(&self.browser, &self.config, &self.logs).await?;
        self.session = session;
        self.subscriptions = subscriptions;
        self.refs.clear();

        if !self.seeded_cookies.is_empty() {
            if let Err(e) = cookies::install(&self.session, &self.seeded_cookies).await {
                tracing::debug!("cookie re-seed failed: {}", e);
            }
        }

        self.navigate_and_settle(url, timeout).await
    }

    // === Interaction ===

    fn input(&self) -> Input<'_> {
        Input::new(&self.session, &self.refs)
    }

    /// Click a referenced element
    pub async fn click(&self, reference: u64) -> Result<()> {
        self.input().click(reference).await
    }

    /// Type into a referenced element
    pub async fn type_text(&self, reference: u64, text: &str, opts: TypeOptions) -> Result<()> {
        self.input().type_text(reference, text, opts).await
    }

    /// Press a symbolic key
    pub async fn press(&self, key: &str) -> Result<()> {
        self.input().press(key).await
    }

    /// Wheel-scroll the page
    pub async fn scroll(&self, delta_y: f64, x: Option<f64>, y: Option<f64>) -> Result<()> {
        self.input().scroll(delta_y, x, y).await
    }

    /// Hover over a referenced element
    pub async fn hover(&self, reference: u64) -> Result<()> {
        self.input().hover(reference).await
    }

    /// Select an option by value or visible text
    pub async fn select(&self, reference: u64, value: &str) -> Result<()> {
        self.input().select(reference, value).await
    }

    /// Drag from one referenced element to another
    pub async fn drag(&self, from_reference: u64, to_reference: u64) -> Result<()> {
        self.input().drag(from_reference, to_reference).await
    }

    /// Set files on a referenced file input
    pub async fn upload(&self, reference: u64, files: Vec<String>) -> Result<()> {
        self.input().upload(reference, files).await
    }

    // === Export ===

    /// Screenshot as base64
    pub async fn screenshot(&self, format: Option<&str>, quality: Option<u8>) -> Result<String> {
        self.session.capture_screenshot(format, quality).await
    }

    /// Screenshot decoded to raw image bytes
    pub async fn screenshot_bytes(
        &self,
        format: Option<&str>,
        quality: Option<u8>,
    ) -> Result<Vec<u8>> {
        use base64::Engine;
        let data = self.session.capture_screenshot(format, quality).await?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| Error::Decode(e.to_string()))
    }

    /// PDF with background printing, as base64
    pub async fn pdf(&self, landscape: bool) -> Result<String> {
        self.session.print_to_pdf(landscape).await
    }

    // === Waits ===

    /// Wait for the next load event; SPAs that never fire one get a short
    /// DOM settle instead of an error
    pub async fn wait_for_navigation(&self, timeout: Duration) -> Result<()> {
        match self.session.once("Page.loadEventFired", timeout).await {
            Ok(_) => {
                tokio::time::sleep(SETTLE_DELAY).await;
                Ok(())
            }
            Err(Error::Timeout(_)) => {
                tokio::time::sleep(SETTLE_DELAY).await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Wait until no request has been in flight for `idle`, within `timeout`
    pub async fn wait_for_network_idle(&self, timeout: Duration, idle: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut idle_since: Option<Instant> = None;

        loop {
            let inflight = self.logs.inflight.load(Ordering::SeqCst);
            if inflight <= 0 {
                match idle_since {
                    Some(since) if since.elapsed() >= idle => return Ok(()),
                    None => idle_since = Some(Instant::now()),
                    _ => {}
                }
            } else {
                idle_since = None;
            }

            if Instant::now() >= deadline {
                return Err(Error::timeout(format!(
                    "network not idle within {:?} ({} in flight)",
                    timeout, inflight
                )));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Poll for a text or selector condition
    pub async fn wait_for(&self, condition: WaitCondition, timeout: Duration) -> Result<()> {
        let expression = match &condition {
            WaitCondition::Text(text) => format!(
                "document.body && document.body.innerText.includes('{}')",
                escape_single_quotes(text)
            ),
            WaitCondition::Selector(selector) => format!(
                "!!document.querySelector('{}')",
                escape_single_quotes(selector)
            ),
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(result) = self.session.evaluate(&expression).await {
                if result.result.value.and_then(|v| v.as_bool()).unwrap_or(false) {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::timeout(format!("condition {:?} not met", condition)));
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    // === Tabs ===

    /// Enumerate page-type targets
    pub async fn tabs(&self) -> Result<Vec<TabInfo>> {
        let targets = self.browser.connection().get_targets().await?;
        Ok(targets
            .into_iter()
            .filter(|t| t.r#type == "page")
            .enumerate()
            .map(|(index, t)| TabInfo {
                index,
                title: t.title,
                url: t.url,
            })
            .collect())
    }

    /// Bring the tab at `index` to the front
    pub async fn switch_tab(&self, index: usize) -> Result<()> {
        let targets = self.browser.connection().get_targets().await?;
        let pages: Vec<_> = targets.into_iter().filter(|t| t.r#type == "page").collect();
        let target = pages.get(index).ok_or(Error::TabIndex(index))?;
        self.browser.connection().activate_target(&target.target_id).await
    }

    // === Cookies and storage ===

    /// Install cookies from a credential source, domain-matched to the URL.
    /// Best-effort: failures are logged, never fatal. Returns the count
    /// actually installed.
    pub async fn inject_cookies(&self, url: &str, source: &dyn CookieSource) -> usize {
        let host = cookies::normalized_host(url);
        let batch: Vec<Cookie> = source
            .cookies_for(&host)
            .into_iter()
            .filter(|c| cookies::domain_matches(&c.domain, &host))
            .collect();

        match cookies::install(&self.session, &batch).await {
            Ok(installed) => {
                tracing::debug!("installed {}/{} cookies for {}", installed, batch.len(), host);
                installed
            }
            Err(e) => {
                tracing::debug!("cookie injection failed for {}: {}", host, e);
                0
            }
        }
    }

    /// Export all cookies and the page's local key/value store
    pub async fn save_state(&self, path: &Path) -> Result<()> {
        let cookies: Vec<Cookie> = self
            .session
            .get_cookies(None)
            .await?
            .into_iter()
            .map(Cookie::from)
            .collect();

        let dump = self
            .session
            .evaluate(
                r#"(() => {
                    const out = {};
                    for (let i = 0; i < localStorage.length; i++) {
                        const key = localStorage.key(i);
                        out[key] = localStorage.getItem(key);
                    }
                    return out;
                })()"#,
            )
            .await?;
        let local_storage = dump
            .result
            .value
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        StorageState {
            cookies,
            local_storage,
        }
        .save(path)
    }

    // === Logs ===

    /// Every dialog auto-dismissed so far
    pub fn dialog_log(&self) -> Vec<DialogRecord> {
        self.logs.dialogs.lock().unwrap().clone()
    }

    /// Console calls captured from the page
    pub fn console_log(&self) -> Vec<ConsoleRecord> {
        self.logs.console.lock().unwrap().clone()
    }

    /// Network requests observed on this session
    pub fn request_log(&self) -> Vec<RequestRecord> {
        self.logs.requests.lock().unwrap().clone()
    }

    // === Teardown ===

    /// Close the page target, the transport, and the owned child process
    pub async fn close(mut self) {
        self.subscriptions.clear();
        let _ = self
            .browser
            .connection()
            .close_target(self.session.target_id())
            .await;
        self.browser.close().await;
    }
}

fn escape_single_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Page factory: create the target, attach flattened, enable domains, apply
/// stealth and viewport, deny permission prompts, and install the background
/// subscriptions (dialogs, console, network counters).
async fn build_page(
    browser: &Browser,
    config: &SessionConfig,
    logs: &SharedLogs,
) -> Result<(Session, Vec<Subscription>)> {
    let connection = browser.connection();

    let target_id = connection.create_target("about:blank").await?;
    let session = connection.attach_to_target(&target_id).await?;

    session.page_enable().await?;
    session.network_enable().await?;
    session.dom_enable().await?;
    session.runtime_enable().await?;

    if browser.owns_process() {
        session.add_script_on_new_document(&stealth::stealth_script()).await?;
    }

    if let Some((width, height)) = config.viewport {
        session.set_viewport(width, height).await?;
    }

    // Permission types this browser version does not know are skipped
    for permission in DENIED_PERMISSIONS {
        if let Err(e) = connection.set_permission(permission, "denied").await {
            tracing::debug!("permission {} not recognized: {}", permission, e);
        }
    }

    let subscriptions = install_subscriptions(&session, logs);
    Ok((session, subscriptions))
}

fn install_subscriptions(session: &Session, logs: &SharedLogs) -> Vec<Subscription> {
    let mut subs = Vec::new();

    // Every dialog gets an answer so scripts never hang; beforeunload is
    // declined to let navigation proceed
    let dialogs = Arc::clone(&logs.dialogs);
    let dialog_session = session.clone();
    subs.push(session.on("Page.javascriptDialogOpening", move |params: &Value, _| {
        let event: PageJavascriptDialogOpeningEvent = match serde_json::from_value(params.clone())
        {
            Ok(event) => event,
            Err(_) => return,
        };

        dialogs.lock().unwrap().push(DialogRecord {
            kind: event.r#type.clone(),
            message: event.message,
            timestamp: SystemTime::now(),
        });

        let session = dialog_session.clone();
        let accept = event.r#type != "beforeunload";
        tokio::spawn(async move {
            if let Err(e) = session.handle_dialog(accept).await {
                tracing::debug!("dialog ack failed: {}", e);
            }
        });
    }));

    let console = Arc::clone(&logs.console);
    subs.push(session.on("Runtime.consoleAPICalled", move |params: &Value, _| {
        let event: RuntimeConsoleApiCalledEvent = match serde_json::from_value(params.clone()) {
            Ok(event) => event,
            Err(_) => return,
        };
        let text = event
            .args
            .iter()
            .filter_map(|a| a.value.as_ref())
            .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(" ");
        console.lock().unwrap().push(ConsoleRecord {
            kind: event.r#type,
            text,
        });
    }));

    let inflight = Arc::clone(&logs.inflight);
    let requests = Arc::clone(&logs.requests);
    subs.push(session.on("Network.requestWillBeSent", move |params: &Value, _| {
        inflight.fetch_add(1, Ordering::SeqCst);
        if let Ok(event) =
            serde_json::from_value::<NetworkRequestWillBeSentEvent>(params.clone())
        {
            requests.lock().unwrap().push(RequestRecord {
                url: event.request.url,
                method: event.request.method,
            });
        }
    }));

    for event in ["Network.loadingFinished", "Network.loadingFailed"] {
        let inflight = Arc::clone(&logs.inflight);
        subs.push(session.on(event, move |_, _| {
            // Clamp to zero on underflow
            let _ = inflight.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some((n - 1).max(0))
            });
        }));
    }

    subs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64, role: &str, name: &str, children: Vec<AxNode>) -> AxNode {
        AxNode {
            id,
            role: role.to_string(),
            name: name.to_string(),
            children,
            ..Default::default()
        }
    }

    #[test]
    fn challenge_vocabulary_matches_interstitials() {
        let tree = node(
            1,
            "RootWebArea",
            "",
            vec![node(2, "heading", "Just a moment...", vec![])],
        );
        assert!(looks_like_challenge(&tree));

        let tree = node(
            1,
            "RootWebArea",
            "",
            vec![node(2, "heading", "Checking your browser before accessing", vec![])],
        );
        assert!(looks_like_challenge(&tree));

        let normal = node(
            1,
            "RootWebArea",
            "",
            vec![node(2, "heading", "Example Domain", vec![])],
        );
        assert!(!looks_like_challenge(&normal));
    }

    #[test]
    fn wait_condition_expressions_escape_quotes() {
        assert_eq!(escape_single_quotes("it's"), "it\\'s");
        assert_eq!(escape_single_quotes("a\\b"), "a\\\\b");
    }
}
