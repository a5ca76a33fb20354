//! Browser host
//!
//! Finds an installed Chromium-family binary, launches it headless with a
//! deterministic flag set, or attaches to an already-running browser through
//! its HTTP discovery endpoint.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde::Deserialize;

use crate::cdp::{Connection, Transport};
use crate::error::{Error, Result};
use crate::SessionConfig;

/// How long the child has to print its DevTools URL on stderr
const LAUNCH_DEADLINE: Duration = Duration::from_secs(10);

/// Locate a Chromium-family binary from a short ordered candidate list
pub fn find_browser() -> Result<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/microsoft-edge",
            "/usr/bin/brave-browser",
            "/snap/bin/chromium",
        ]
    };

    for candidate in candidates {
        let path = Path::new(candidate);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    Err(Error::NoBrowser)
}

/// Deterministic flag set: never prompts, never phones home
fn launch_args(config: &SessionConfig, user_data_dir: &Path) -> Vec<String> {
    let mut args = vec![
        // Debug port assigned by the OS; URL is scraped from stderr
        "--remote-debugging-port=0".into(),
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--disable-sync".into(),
        "--disable-translate".into(),
        "--disable-background-networking".into(),
        "--mute-audio".into(),
        "--hide-scrollbars".into(),
        "--disable-notifications".into(),
        "--autoplay-policy=no-user-gesture-required".into(),
        "--use-fake-device-for-media-stream".into(),
        "--use-fake-ui-for-media-stream".into(),
        "--disable-features=MediaRouter".into(),
        format!("--user-data-dir={}", user_data_dir.display()),
    ];

    if config.mode.is_headless() {
        args.push("--headless=new".into());
    }
    if let Some(proxy) = &config.proxy {
        args.push(format!("--proxy-server={}", proxy));
    }
    if let Some((width, height)) = config.viewport {
        args.push(format!("--window-size={},{}", width, height));
    }

    args
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryVersion {
    web_socket_debugger_url: String,
}

/// A running browser endpoint: the transport plus, when we launched it
/// ourselves, the child process and its profile directory.
pub struct Browser {
    connection: Connection,
    child: Option<Child>,
    user_data_dir: Option<PathBuf>,
    port: u16,
}

impl Browser {
    /// Launch a fresh headless browser owned by this handle
    pub async fn launch(config: &SessionConfig) -> Result<Self> {
        let binary = match &config.browser_path {
            Some(path) => PathBuf::from(path),
            None => find_browser()?,
        };

        // A caller-provided profile is reused as-is; otherwise a unique
        // per-process temp path so two instances never contend
        let (profile_dir, owned_profile) = match &config.user_data_dir {
            Some(dir) => (dir.clone(), false),
            None => {
                let dir = std::env::temp_dir().join(format!(
                    "canopy-profile-{}-{}",
                    std::process::id(),
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_millis())
                        .unwrap_or(0)
                ));
                (dir, true)
            }
        };
        std::fs::create_dir_all(&profile_dir)?;

        let args = launch_args(config, &profile_dir);
        tracing::info!("Launching browser from {:?}", binary);

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::LaunchFailed(format!("spawn failed: {}", e)))?;

        let ws_url = match scrape_ws_url(&mut child) {
            Ok(url) => url,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                if owned_profile {
                    let _ = std::fs::remove_dir_all(&profile_dir);
                }
                return Err(e);
            }
        };

        let port = parse_port(&ws_url).unwrap_or(0);
        tracing::info!("Browser DevTools at {}", ws_url);

        let transport = Transport::connect(&ws_url).await?;
        let connection = Connection::new(transport);

        let version = connection.version().await?;
        tracing::debug!("Connected to {}", version.product);

        Ok(Self {
            connection,
            child: Some(child),
            user_data_dir: owned_profile.then_some(profile_dir),
            port,
        })
    }

    /// Attach to an already-running browser exposing a debug port.
    /// The browser is external and is never terminated by `close`.
    pub async fn connect_existing(port: u16) -> Result<Self> {
        let discovery = format!("http://127.0.0.1:{}/json/version", port);
        tracing::debug!("Discovering browser at {}", discovery);

        let version: DiscoveryVersion = reqwest::get(&discovery)
            .await
            .map_err(|e| Error::LaunchFailed(format!("discovery at port {}: {}", port, e)))?
            .json()
            .await
            .map_err(|e| Error::LaunchFailed(format!("discovery at port {}: {}", port, e)))?;

        let transport = Transport::connect(&version.web_socket_debugger_url).await?;

        Ok(Self {
            connection: Connection::new(transport),
            child: None,
            user_data_dir: None,
            port,
        })
    }

    /// Browser-level connection
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Debug port of the endpoint
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether this handle owns the child process
    pub fn owns_process(&self) -> bool {
        self.child.is_some()
    }

    /// Tear down: close the browser, kill the owned child, drop the profile
    pub async fn close(mut self) {
        self.connection.close().await;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(dir) = self.user_data_dir.take() {
            let _ = std::fs::remove_dir_all(&dir);
        }
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
        }
        if let Some(dir) = self.user_data_dir.take() {
            let _ = std::fs::remove_dir_all(&dir);
        }
    }
}

/// Read the child's stderr until the first `ws://` token, within the launch
/// deadline. The reader runs on its own thread so the deadline holds even if
/// the child prints nothing.
fn scrape_ws_url(child: &mut Child) -> Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::LaunchFailed("no stderr from child".into()))?;

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let reader = BufReader::new(stderr);
        let mut captured = Vec::new();
        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            tracing::trace!("browser stderr: {}", line);
            if let Some(start) = line.find("ws://") {
                let url = line[start..].trim().to_string();
                let _ = tx.send(Ok(url));
                return;
            }
            captured.push(line);
        }
        let _ = tx.send(Err(captured.join("\n")));
    });

    match rx.recv_timeout(LAUNCH_DEADLINE) {
        Ok(Ok(url)) => Ok(url),
        Ok(Err(stderr_tail)) => Err(Error::LaunchFailed(format!(
            "child exited before printing a DevTools URL; stderr:\n{}",
            stderr_tail
        ))),
        Err(_) => Err(Error::LaunchFailed(format!(
            "no DevTools URL within {:?}",
            LAUNCH_DEADLINE
        ))),
    }
}

/// Extract the port from `ws://host:port/...`
fn parse_port(ws_url: &str) -> Option<u16> {
    let rest = ws_url.strip_prefix("ws://")?;
    let host_port = rest.split('/').next()?;
    host_port.rsplit(':').next()?.parse().ok()
}
