//! CDP connection and session management
//!
//! `Connection` speaks to the browser process at top level (targets,
//! permissions, version). `Session` is the projection of the transport onto
//! one flattened page session; everything page-scoped goes through it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::transport::{Subscription, Transport};
use super::types::*;
use crate::error::{Error, Result};

/// A CDP connection to the browser endpoint
#[derive(Clone)]
pub struct Connection {
    transport: Arc<Transport>,
}

impl Connection {
    /// Wrap a transport
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// The underlying transport
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Get browser version info
    pub async fn version(&self) -> Result<BrowserGetVersionResult> {
        self.transport
            .send("Browser.getVersion", &BrowserGetVersion {})
            .await
    }

    /// Create a new page target
    pub async fn create_target(&self, url: &str) -> Result<String> {
        let result: TargetCreateTargetResult = self
            .transport
            .send(
                "Target.createTarget",
                &TargetCreateTarget {
                    url: url.to_string(),
                },
            )
            .await?;
        Ok(result.target_id)
    }

    /// Flat-attach to a target and obtain a session view
    pub async fn attach_to_target(&self, target_id: &str) -> Result<Session> {
        let result: TargetAttachToTargetResult = self
            .transport
            .send(
                "Target.attachToTarget",
                &TargetAttachToTarget {
                    target_id: target_id.to_string(),
                    flatten: Some(true),
                },
            )
            .await?;

        Ok(Session {
            transport: Arc::clone(&self.transport),
            session_id: result.session_id,
            target_id: target_id.to_string(),
        })
    }

    /// Close a target
    pub async fn close_target(&self, target_id: &str) -> Result<bool> {
        let result: TargetCloseTargetResult = self
            .transport
            .send(
                "Target.closeTarget",
                &TargetCloseTarget {
                    target_id: target_id.to_string(),
                },
            )
            .await?;
        Ok(result.success)
    }

    /// List all targets
    pub async fn get_targets(&self) -> Result<Vec<TargetInfo>> {
        let result: TargetGetTargetsResult = self
            .transport
            .send("Target.getTargets", &TargetGetTargets {})
            .await?;
        Ok(result.target_infos)
    }

    /// Activate (focus) a target
    pub async fn activate_target(&self, target_id: &str) -> Result<()> {
        self.transport
            .send::<_, Value>(
                "Target.activateTarget",
                &TargetActivateTarget {
                    target_id: target_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// Set a permission category to the given setting ("granted"/"denied").
    /// Returns Err for permission names this browser version does not know.
    pub async fn set_permission(&self, name: &str, setting: &str) -> Result<()> {
        self.transport
            .send::<_, Value>(
                "Browser.setPermission",
                &BrowserSetPermission {
                    permission: PermissionDescriptor {
                        name: name.to_string(),
                    },
                    setting: setting.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// Ask the browser to shut down, then drop the socket
    pub async fn close(&self) {
        let _ = self
            .transport
            .send::<_, Value>("Browser.close", &BrowserClose {})
            .await;
        self.transport.close().await;
    }
}

/// A CDP session attached to one page target
#[derive(Clone)]
pub struct Session {
    transport: Arc<Transport>,
    session_id: String,
    target_id: String,
}

impl Session {
    /// The flattened session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The attached target id
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Send a command scoped to this session
    pub async fn send<C, R>(&self, method: &str, params: &C) -> Result<R>
    where
        C: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        self.transport
            .send_to_session(&self.session_id, method, params)
            .await
    }

    /// Subscribe to an event on this session
    pub fn on<F>(&self, method: &str, handler: F) -> Subscription
    where
        F: Fn(&Value, Option<&str>) + Send + Sync + 'static,
    {
        self.transport.on(method, Some(&self.session_id), handler)
    }

    /// One-shot wait for an event on this session
    pub fn once(
        &self,
        method: &str,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<Value>> + Send {
        self.transport.once(method, Some(&self.session_id), timeout)
    }

    // === Domain enablement ===

    /// Enable page events
    pub async fn page_enable(&self) -> Result<()> {
        self.send::<_, Value>("Page.enable", &PageEnable {}).await?;
        Ok(())
    }

    /// Enable network events
    pub async fn network_enable(&self) -> Result<()> {
        self.send::<_, Value>("Network.enable", &NetworkEnable {})
            .await?;
        Ok(())
    }

    /// Enable the DOM domain
    pub async fn dom_enable(&self) -> Result<()> {
        self.send::<_, Value>("DOM.enable", &DomEnable {}).await?;
        Ok(())
    }

    /// Enable the Runtime domain (console capture)
    pub async fn runtime_enable(&self) -> Result<()> {
        self.send::<_, Value>("Runtime.enable", &RuntimeEnable {})
            .await?;
        Ok(())
    }

    // === Navigation ===

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<PageNavigateResult> {
        self.send(
            "Page.navigate",
            &PageNavigate {
                url: url.to_string(),
            },
        )
        .await
    }

    /// Reload the page
    pub async fn reload(&self, ignore_cache: bool) -> Result<()> {
        self.send::<_, Value>(
            "Page.reload",
            &PageReload {
                ignore_cache: Some(ignore_cache),
            },
        )
        .await?;
        Ok(())
    }

    /// Read the navigation history
    pub async fn get_navigation_history(&self) -> Result<PageGetNavigationHistoryResult> {
        self.send("Page.getNavigationHistory", &PageGetNavigationHistory {})
            .await
    }

    /// Navigate to a specific history entry
    pub async fn navigate_to_history_entry(&self, entry_id: i32) -> Result<()> {
        self.send::<_, Value>(
            "Page.navigateToHistoryEntry",
            &PageNavigateToHistoryEntry { entry_id },
        )
        .await?;
        Ok(())
    }

    /// Install a script that runs before any page script on new documents
    pub async fn add_script_on_new_document(&self, source: &str) -> Result<String> {
        let result: PageAddScriptToEvaluateOnNewDocumentResult = self
            .send(
                "Page.addScriptToEvaluateOnNewDocument",
                &PageAddScriptToEvaluateOnNewDocument {
                    source: source.to_string(),
                },
            )
            .await?;
        Ok(result.identifier)
    }

    // === Export ===

    /// Capture a screenshot, returned as base64
    pub async fn capture_screenshot(
        &self,
        format: Option<&str>,
        quality: Option<u8>,
    ) -> Result<String> {
        let result: PageCaptureScreenshotResult = self
            .send(
                "Page.captureScreenshot",
                &PageCaptureScreenshot {
                    format: format.map(String::from),
                    quality,
                },
            )
            .await?;
        Ok(result.data)
    }

    /// Print to PDF with background graphics, returned as base64
    pub async fn print_to_pdf(&self, landscape: bool) -> Result<String> {
        let result: PagePrintToPdfResult = self
            .send(
                "Page.printToPDF",
                &PagePrintToPdf {
                    landscape: Some(landscape),
                    print_background: Some(true),
                },
            )
            .await?;
        Ok(result.data)
    }

    // === Dialogs ===

    /// Acknowledge an open JavaScript dialog
    pub async fn handle_dialog(&self, accept: bool) -> Result<()> {
        self.send::<_, Value>(
            "Page.handleJavaScriptDialog",
            &PageHandleJavaScriptDialog { accept },
        )
        .await?;
        Ok(())
    }

    // === Emulation ===

    /// Override device metrics (scale 1, non-mobile)
    pub async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.send::<_, Value>(
            "Emulation.setDeviceMetricsOverride",
            &EmulationSetDeviceMetricsOverride {
                width,
                height,
                device_scale_factor: 1.0,
                mobile: false,
            },
        )
        .await?;
        Ok(())
    }

    // === Accessibility ===

    /// Fetch the full accessibility tree as a flat record batch
    pub async fn get_full_ax_tree(&self) -> Result<Vec<RawAxNode>> {
        let result: AccessibilityGetFullAxTreeResult = self
            .send("Accessibility.getFullAXTree", &AccessibilityGetFullAxTree {})
            .await?;
        Ok(result.nodes)
    }

    // === DOM ===

    /// Scroll a node into the viewport if it is not already visible
    pub async fn scroll_into_view(&self, backend_node_id: i64) -> Result<()> {
        self.send::<_, Value>(
            "DOM.scrollIntoViewIfNeeded",
            &DomScrollIntoViewIfNeeded {
                backend_node_id: Some(backend_node_id),
            },
        )
        .await?;
        Ok(())
    }

    /// Box model for a node
    pub async fn get_box_model(&self, backend_node_id: i64) -> Result<BoxModel> {
        let result: DomGetBoxModelResult = self
            .send(
                "DOM.getBoxModel",
                &DomGetBoxModel {
                    backend_node_id: Some(backend_node_id),
                },
            )
            .await?;
        Ok(result.model)
    }

    /// Focus a node
    pub async fn focus(&self, backend_node_id: i64) -> Result<()> {
        self.send::<_, Value>(
            "DOM.focus",
            &DomFocus {
                backend_node_id: Some(backend_node_id),
            },
        )
        .await?;
        Ok(())
    }

    /// Assign files to a file input
    pub async fn set_file_input_files(
        &self,
        backend_node_id: i64,
        files: Vec<String>,
    ) -> Result<()> {
        self.send::<_, Value>(
            "DOM.setFileInputFiles",
            &DomSetFileInputFiles {
                files,
                backend_node_id: Some(backend_node_id),
            },
        )
        .await?;
        Ok(())
    }

    /// Resolve a DOM node to a Runtime remote object id
    pub async fn resolve_node(&self, backend_node_id: i64) -> Result<String> {
        let result: DomResolveNodeResult = self
            .send(
                "DOM.resolveNode",
                &DomResolveNode {
                    backend_node_id: Some(backend_node_id),
                    object_group: Some("canopy".to_string()),
                },
            )
            .await?;
        result.object.object_id.ok_or_else(|| {
            Error::protocol("DOM.resolveNode", -1, "no objectId returned")
        })
    }

    // === Runtime ===

    /// Evaluate a JavaScript expression, returning the value
    pub async fn evaluate(&self, expression: &str) -> Result<RuntimeEvaluateResult> {
        self.send(
            "Runtime.evaluate",
            &RuntimeEvaluate {
                expression: expression.to_string(),
                return_by_value: Some(true),
                await_promise: Some(true),
            },
        )
        .await
    }

    /// Call a function with `this` bound to a remote object
    pub async fn call_function_on(
        &self,
        object_id: &str,
        function_declaration: &str,
        arguments: Option<Vec<CallArgument>>,
    ) -> Result<RuntimeCallFunctionOnResult> {
        self.send(
            "Runtime.callFunctionOn",
            &RuntimeCallFunctionOn {
                function_declaration: function_declaration.to_string(),
                object_id: Some(object_id.to_string()),
                arguments,
                return_by_value: Some(true),
                await_promise: Some(true),
            },
        )
        .await
    }

    // === Input ===

    /// Dispatch a mouse event
    pub async fn dispatch_mouse_event(&self, event: &InputDispatchMouseEvent) -> Result<()> {
        self.send::<_, Value>("Input.dispatchMouseEvent", event)
            .await?;
        Ok(())
    }

    /// Dispatch a key event
    pub async fn dispatch_key_event(&self, event: &InputDispatchKeyEvent) -> Result<()> {
        self.send::<_, Value>("Input.dispatchKeyEvent", event).await?;
        Ok(())
    }

    /// Insert text at the current cursor in one batch
    pub async fn insert_text(&self, text: &str) -> Result<()> {
        self.send::<_, Value>(
            "Input.insertText",
            &InputInsertText {
                text: text.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    // === Cookies ===

    /// All cookies visible to this session
    pub async fn get_cookies(&self, urls: Option<Vec<String>>) -> Result<Vec<CookieRecord>> {
        let result: NetworkGetCookiesResult = self
            .send("Network.getCookies", &NetworkGetCookies { urls })
            .await?;
        Ok(result.cookies)
    }

    /// Install one cookie on this session
    pub async fn set_cookie(&self, cookie: &NetworkSetCookie) -> Result<bool> {
        let result: NetworkSetCookieResult =
            self.send("Network.setCookie", cookie).await?;
        Ok(result.success)
    }
}
