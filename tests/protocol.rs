//! Protocol-level tests against an in-process fake CDP endpoint: a WebSocket
//! server that scripts responses per method and records everything it
//! receives, plus an HTTP discovery endpoint so attach-by-port works.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use canopy::{
    Cookie, CookieSource, Error, Page, SessionConfig, SnapshotMode, TypeOptions, WaitCondition,
};

type Log = Arc<Mutex<Vec<(String, Value)>>>;

struct FakeCdp {
    http_port: u16,
    log: Log,
}

impl FakeCdp {
    fn methods(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    fn calls(&self, method: &str) -> Vec<Value> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn index_of(&self, method: &str) -> Option<usize> {
        self.methods().iter().position(|m| m == method)
    }
}

fn content_tree() -> Value {
    json!({"nodes": [
        {"nodeId": "1", "ignored": false,
         "role": {"value": "RootWebArea"}, "name": {"value": "One"}},
        {"nodeId": "2", "parentId": "1", "ignored": false,
         "role": {"value": "main"}, "name": {"value": ""}},
        {"nodeId": "3", "parentId": "2", "backendDOMNodeId": 33, "ignored": false,
         "role": {"value": "heading"}, "name": {"value": "Welcome to One"},
         "properties": [{"name": "level", "value": {"value": 1}}]},
        {"nodeId": "4", "parentId": "2", "backendDOMNodeId": 44, "ignored": false,
         "role": {"value": "button"}, "name": {"value": "Buy now"}},
    ]})
}

fn challenge_tree() -> Value {
    json!({"nodes": [
        {"nodeId": "1", "ignored": false,
         "role": {"value": "RootWebArea"}, "name": {"value": "Just a moment..."}},
        {"nodeId": "2", "parentId": "1", "backendDOMNodeId": 21, "ignored": false,
         "role": {"value": "heading"}, "name": {"value": "Just a moment..."},
         "properties": [{"name": "level", "value": {"value": 1}}]},
    ]})
}

fn respond(method: &str, params: &Value, tree: &Value) -> Value {
    match method {
        "Browser.getVersion" => json!({"product": "FakeChrome/126.0", "userAgent": "Mozilla/5.0"}),
        "Target.createTarget" => json!({"targetId": "T1"}),
        "Target.attachToTarget" => json!({"sessionId": "S1"}),
        "Target.closeTarget" => json!({"success": true}),
        "Target.getTargets" => json!({"targetInfos": [
            {"targetId": "T1", "type": "page", "title": "One", "url": "https://one.test/", "attached": true},
            {"targetId": "T2", "type": "page", "title": "Two", "url": "https://two.test/", "attached": false},
            {"targetId": "W1", "type": "service_worker", "title": "", "url": "", "attached": false},
        ]}),
        "Page.navigate" => json!({"frameId": "F1"}),
        "Page.getNavigationHistory" => json!({
            "currentIndex": 0,
            "entries": [{"id": 7, "url": "https://one.test/", "title": "One"}],
        }),
        "Accessibility.getFullAXTree" => tree.clone(),
        "DOM.getBoxModel" => json!({"model": {"content": [0.0, 0.0, 100.0, 0.0, 100.0, 50.0, 0.0, 50.0]}}),
        "DOM.resolveNode" => json!({"object": {"type": "object", "objectId": "obj-1"}}),
        "Runtime.callFunctionOn" => json!({"result": {"type": "boolean", "value": true}}),
        "Network.getCookies" => json!({"cookies": [
            {"name": "sid", "value": "abc", "domain": ".one.test", "path": "/",
             "expires": 1999999999.0, "httpOnly": false, "secure": true, "session": false},
        ]}),
        "Network.setCookie" => json!({"success": true}),
        "Runtime.evaluate" => {
            let expr = params["expression"].as_str().unwrap_or("");
            if expr.contains("localStorage") {
                json!({"result": {"type": "object", "value": {"theme": "dark"}}})
            } else if expr.contains("location.href") {
                json!({"result": {"type": "string", "value": "https://one.test/"}})
            } else if expr.contains("innerText.includes") || expr.contains("querySelector") {
                json!({"result": {"type": "boolean", "value": true}})
            } else {
                json!({"result": {"type": "undefined"}})
            }
        }
        _ => json!({}),
    }
}

/// Spin up the fake endpoint. Discovery answers on `http_port`; the
/// WebSocket side serves any number of sequential connections.
async fn spawn_fake(tree: Value) -> FakeCdp {
    let http = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_port = http.local_addr().unwrap().port();
    let ws_port = ws.local_addr().unwrap().port();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = http.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf).await;
                let body = json!({
                    "Browser": "FakeChrome/126.0",
                    "webSocketDebuggerUrl":
                        format!("ws://127.0.0.1:{}/devtools/browser/fake", ws_port),
                })
                .to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    let conn_log = Arc::clone(&log);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = ws.accept().await else { break };
            let log = Arc::clone(&conn_log);
            let tree = tree.clone();
            tokio::spawn(async move {
                let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = socket.next().await {
                    let Message::Text(text) = msg else { continue };
                    let Ok(req) = serde_json::from_str::<Value>(&text) else { continue };
                    let id = req["id"].as_u64().unwrap_or(0);
                    let method = req["method"].as_str().unwrap_or("").to_string();
                    let params = req.get("params").cloned().unwrap_or(json!({}));
                    let session = req.get("sessionId").cloned().unwrap_or(Value::Null);

                    log.lock().unwrap().push((method.clone(), params.clone()));

                    let result = respond(&method, &params, &tree);
                    let reply = json!({"id": id, "result": result}).to_string();
                    if socket.send(Message::Text(reply)).await.is_err() {
                        break;
                    }

                    if method == "Page.navigate" {
                        let event = json!({
                            "method": "Page.loadEventFired",
                            "params": {"timestamp": 1.0},
                            "sessionId": session,
                        })
                        .to_string();
                        let _ = socket.send(Message::Text(event)).await;
                    }

                    let expr = params["expression"].as_str().unwrap_or("");
                    if method == "Runtime.evaluate" && expr.contains("__trigger_dialogs") {
                        for (kind, message) in [("alert", "session expired"), ("beforeunload", "")] {
                            let event = json!({
                                "method": "Page.javascriptDialogOpening",
                                "params": {"type": kind, "message": message, "url": "https://one.test/"},
                                "sessionId": session,
                            })
                            .to_string();
                            let _ = socket.send(Message::Text(event)).await;
                        }
                    }
                    if method == "Runtime.evaluate" && expr.contains("__trigger_network") {
                        for event in [
                            json!({"method": "Network.requestWillBeSent",
                                   "params": {"requestId": "R1",
                                              "request": {"url": "https://one.test/api", "method": "GET", "headers": {}}},
                                   "sessionId": session}),
                            json!({"method": "Network.loadingFinished",
                                   "params": {"requestId": "R1"}, "sessionId": session}),
                            // Spurious second completion; the counter must clamp
                            json!({"method": "Network.loadingFailed",
                                   "params": {"requestId": "R1", "errorText": "net::ERR"}, "sessionId": session}),
                        ] {
                            let _ = socket.send(Message::Text(event.to_string())).await;
                        }
                    }
                }
            });
        }
    });

    FakeCdp { http_port, log }
}

async fn connect_page(fake: &FakeCdp) -> Page {
    let mut page = Page::connect(SessionConfig::headed(fake.http_port))
        .await
        .expect("connect");
    page.goto("https://one.test/").await.expect("goto");
    page
}

#[tokio::test]
async fn page_factory_enables_domains_and_denies_permissions() {
    let fake = spawn_fake(content_tree()).await;
    let page = connect_page(&fake).await;

    let methods = fake.methods();
    for expected in [
        "Target.createTarget",
        "Target.attachToTarget",
        "Page.enable",
        "Network.enable",
        "DOM.enable",
        "Runtime.enable",
        "Browser.setPermission",
        "Page.navigate",
    ] {
        assert!(methods.iter().any(|m| m == expected), "missing {}", expected);
    }

    let attaches = fake.calls("Target.attachToTarget");
    assert_eq!(attaches[0]["flatten"], json!(true));

    let denied = fake.calls("Browser.setPermission");
    assert!(denied.len() >= 9);
    assert!(denied.iter().all(|p| p["setting"] == json!("denied")));
    assert!(denied.iter().any(|p| p["permission"]["name"] == json!("geolocation")));

    // Headed attach: no stealth script on an external browser
    assert!(!methods.iter().any(|m| m == "Page.addScriptToEvaluateOnNewDocument"));

    page.close().await;
}

#[tokio::test]
async fn snapshot_produces_refs_that_drive_clicks() {
    let fake = spawn_fake(content_tree()).await;
    let mut page = connect_page(&fake).await;

    let text = page.snapshot_with_mode(SnapshotMode::Act).await.unwrap();
    assert!(text.contains("heading \"Welcome to One\""));
    assert!(text.contains("button \"Buy now\" [ref=4]"));

    page.click(4).await.unwrap();

    // Off-screen correction: scroll into view before measuring
    let scroll = fake.index_of("DOM.scrollIntoViewIfNeeded").unwrap();
    let box_model = fake.index_of("DOM.getBoxModel").unwrap();
    assert!(scroll < box_model);

    assert_eq!(
        fake.calls("DOM.scrollIntoViewIfNeeded")[0]["backendNodeId"],
        json!(44)
    );

    let mouse = fake.calls("Input.dispatchMouseEvent");
    assert_eq!(mouse.len(), 2);
    assert_eq!(mouse[0]["type"], json!("mousePressed"));
    assert_eq!(mouse[1]["type"], json!("mouseReleased"));
    assert_eq!(mouse[0]["button"], json!("left"));
    assert_eq!(mouse[0]["clickCount"], json!(1));
    // Midpoint of the 100x50 content quad
    assert_eq!(mouse[0]["x"], json!(50.0));
    assert_eq!(mouse[0]["y"], json!(25.0));

    page.close().await;
}

#[tokio::test]
async fn unknown_refs_fail_without_touching_the_wire() {
    let fake = spawn_fake(content_tree()).await;
    let mut page = connect_page(&fake).await;

    let _ = page.snapshot_with_mode(SnapshotMode::Act).await.unwrap();
    match page.click(999).await {
        Err(Error::ReferenceUnknown(999)) => {}
        other => panic!("expected ReferenceUnknown, got {:?}", other.is_ok()),
    }
    assert!(fake.index_of("DOM.scrollIntoViewIfNeeded").is_none());

    page.close().await;
}

#[tokio::test]
async fn typing_with_clear_emits_select_all_then_backspace() {
    let fake = spawn_fake(content_tree()).await;
    let mut page = connect_page(&fake).await;
    let _ = page.snapshot_with_mode(SnapshotMode::Act).await.unwrap();

    page.type_text(4, "hello", TypeOptions { clear: true, key_events: false })
        .await
        .unwrap();

    assert_eq!(fake.calls("DOM.focus")[0]["backendNodeId"], json!(44));

    let keys = fake.calls("Input.dispatchKeyEvent");
    assert_eq!(keys.len(), 4);
    assert_eq!(keys[0]["type"], json!("keyDown"));
    assert_eq!(keys[0]["key"], json!("a"));
    assert_eq!(keys[0]["modifiers"], json!(2));
    assert_eq!(keys[1]["type"], json!("keyUp"));
    assert_eq!(keys[2]["key"], json!("Backspace"));
    assert_eq!(keys[3]["type"], json!("keyUp"));

    let inserted = fake.calls("Input.insertText");
    assert_eq!(inserted[0]["text"], json!("hello"));

    page.close().await;
}

#[tokio::test]
async fn typing_with_key_events_emits_per_character_pairs() {
    let fake = spawn_fake(content_tree()).await;
    let mut page = connect_page(&fake).await;
    let _ = page.snapshot_with_mode(SnapshotMode::Act).await.unwrap();

    page.type_text(4, "hi", TypeOptions { clear: false, key_events: true })
        .await
        .unwrap();

    assert!(fake.calls("Input.insertText").is_empty());
    let keys = fake.calls("Input.dispatchKeyEvent");
    assert_eq!(keys.len(), 4);
    assert_eq!(keys[0]["text"], json!("h"));
    assert_eq!(keys[2]["text"], json!("i"));

    page.close().await;
}

#[tokio::test]
async fn pressing_enter_carries_carriage_return_text() {
    let fake = spawn_fake(content_tree()).await;
    let page = connect_page(&fake).await;

    page.press("Enter").await.unwrap();

    let keys = fake.calls("Input.dispatchKeyEvent");
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0]["type"], json!("keyDown"));
    assert_eq!(keys[0]["text"], json!("\r"));
    assert_eq!(keys[0]["windowsVirtualKeyCode"], json!(13));
    assert_eq!(keys[1]["type"], json!("keyUp"));
    assert!(keys[1].get("text").is_none());

    match page.press("Hyper").await {
        Err(Error::UnknownKey { key, valid }) => {
            assert_eq!(key, "Hyper");
            assert!(valid.contains("Enter"));
        }
        other => panic!("expected UnknownKey, got {:?}", other.is_ok()),
    }

    page.close().await;
}

#[tokio::test]
async fn dragging_presses_moves_and_releases_between_midpoints() {
    let fake = spawn_fake(content_tree()).await;
    let mut page = connect_page(&fake).await;
    let _ = page.snapshot_with_mode(SnapshotMode::Act).await.unwrap();

    // Heading (3) to button (4); both share the fake's box model
    page.drag(3, 4).await.unwrap();

    let mouse = fake.calls("Input.dispatchMouseEvent");
    assert_eq!(mouse.len(), 4);
    assert_eq!(mouse[0]["type"], json!("mousePressed"));
    assert_eq!(mouse[1]["type"], json!("mouseMoved"));
    assert_eq!(mouse[2]["type"], json!("mouseMoved"));
    assert_eq!(mouse[3]["type"], json!("mouseReleased"));

    page.close().await;
}

#[tokio::test]
async fn wheel_scroll_defaults_to_the_viewport_point() {
    let fake = spawn_fake(content_tree()).await;
    let page = connect_page(&fake).await;

    page.scroll(600.0, None, None).await.unwrap();

    let mouse = fake.calls("Input.dispatchMouseEvent");
    assert_eq!(mouse[0]["type"], json!("mouseWheel"));
    assert_eq!(mouse[0]["x"], json!(400.0));
    assert_eq!(mouse[0]["y"], json!(300.0));
    assert_eq!(mouse[0]["deltaY"], json!(600.0));

    page.close().await;
}

#[tokio::test]
async fn selecting_on_a_native_select_skips_the_dropdown_dance() {
    let fake = spawn_fake(content_tree()).await;
    let mut page = connect_page(&fake).await;
    let _ = page.snapshot_with_mode(SnapshotMode::Act).await.unwrap();

    // The fake's callFunctionOn answers true: tag was SELECT, handled in JS
    page.select(4, "Medium").await.unwrap();

    assert!(fake.index_of("DOM.resolveNode").is_some());
    assert!(fake.index_of("Runtime.callFunctionOn").is_some());
    assert!(fake.calls("Input.dispatchMouseEvent").is_empty());

    page.close().await;
}

#[tokio::test]
async fn history_edges_fail_with_no_history() {
    let fake = spawn_fake(content_tree()).await;
    let mut page = connect_page(&fake).await;

    // currentIndex 0 of 1 entry: no neighbor either way
    assert!(matches!(page.go_back().await, Err(Error::NoHistory)));
    assert!(matches!(page.go_forward().await, Err(Error::NoHistory)));

    page.close().await;
}

#[tokio::test]
async fn tabs_enumerate_pages_and_activate_by_index() {
    let fake = spawn_fake(content_tree()).await;
    let page = connect_page(&fake).await;

    let tabs = page.tabs().await.unwrap();
    assert_eq!(tabs.len(), 2);
    assert_eq!(tabs[1].title, "Two");

    page.switch_tab(1).await.unwrap();
    assert_eq!(
        fake.calls("Target.activateTarget")[0]["targetId"],
        json!("T2")
    );

    assert!(matches!(page.switch_tab(9).await, Err(Error::TabIndex(9))));

    page.close().await;
}

#[tokio::test]
async fn dialogs_are_logged_and_answered() {
    let fake = spawn_fake(content_tree()).await;
    let page = connect_page(&fake).await;

    let _ = page.session().evaluate("__trigger_dialogs").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let dialogs = page.dialog_log();
    assert_eq!(dialogs.len(), 2);
    assert_eq!(dialogs[0].kind, "alert");
    assert_eq!(dialogs[0].message, "session expired");
    assert_eq!(dialogs[1].kind, "beforeunload");

    let answers = fake.calls("Page.handleJavaScriptDialog");
    assert_eq!(answers.len(), 2);
    // The alert is accepted; beforeunload is declined so navigation proceeds
    assert!(answers.iter().any(|a| a["accept"] == json!(true)));
    assert!(answers.iter().any(|a| a["accept"] == json!(false)));

    page.close().await;
}

#[tokio::test]
async fn network_idle_waits_through_events_and_clamps_underflow() {
    let fake = spawn_fake(content_tree()).await;
    let page = connect_page(&fake).await;

    let _ = page.session().evaluate("__trigger_network").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // One request, one finish, one spurious failure: clamped to zero, idle
    page.wait_for_network_idle(Duration::from_secs(2), Duration::from_millis(100))
        .await
        .unwrap();

    let requests = page.request_log();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://one.test/api");
    assert_eq!(requests[0].method, "GET");

    page.close().await;
}

#[tokio::test]
async fn wait_for_polls_text_and_selector_conditions() {
    let fake = spawn_fake(content_tree()).await;
    let page = connect_page(&fake).await;

    page.wait_for(
        WaitCondition::Text("Welcome".into()),
        Duration::from_secs(2),
    )
    .await
    .unwrap();
    page.wait_for(
        WaitCondition::Selector("#checkout".into()),
        Duration::from_secs(2),
    )
    .await
    .unwrap();

    page.close().await;
}

struct VecSource(Vec<Cookie>);

impl CookieSource for VecSource {
    fn cookies_for(&self, _domain: &str) -> Vec<Cookie> {
        self.0.clone()
    }
}

#[tokio::test]
async fn cookie_injection_filters_by_domain() {
    let fake = spawn_fake(content_tree()).await;
    let page = connect_page(&fake).await;

    let source = VecSource(vec![
        Cookie {
            name: "sid".into(),
            value: "abc".into(),
            domain: ".example.com".into(),
            path: "/".into(),
            expires: None,
            secure: true,
            http_only: false,
            same_site: Some("Lax".into()),
        },
        Cookie {
            name: "other".into(),
            value: "zzz".into(),
            domain: "unrelated.net".into(),
            path: "/".into(),
            expires: None,
            secure: false,
            http_only: false,
            same_site: None,
        },
    ]);

    let installed = page.inject_cookies("https://www.example.com/cart", &source).await;
    assert_eq!(installed, 1);

    let set = fake.calls("Network.setCookie");
    assert_eq!(set.len(), 1);
    assert_eq!(set[0]["name"], json!("sid"));
    assert_eq!(set[0]["domain"], json!(".example.com"));

    page.close().await;
}

#[tokio::test]
async fn storage_state_round_trips_through_the_page() {
    let fake = spawn_fake(content_tree()).await;
    let page = connect_page(&fake).await;

    let dir = std::env::temp_dir().join(format!("canopy-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("state.json");

    page.save_state(&path).await.unwrap();

    let state = canopy::StorageState::load(&path).unwrap();
    assert_eq!(state.cookies.len(), 1);
    assert_eq!(state.cookies[0].name, "sid");
    assert_eq!(state.local_storage["theme"], "dark");

    let _ = std::fs::remove_dir_all(&dir);
    page.close().await;
}

#[tokio::test]
async fn storage_state_seeds_cookies_at_connect() {
    let fake = spawn_fake(content_tree()).await;

    let dir = std::env::temp_dir().join(format!("canopy-seed-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("seed.json");
    std::fs::write(
        &path,
        r#"{"cookies": [{"name": "seed", "value": "1", "domain": ".one.test"}], "localStorage": {}}"#,
    )
    .unwrap();

    let mut config = SessionConfig::headed(fake.http_port);
    config.storage_state = Some(path.clone());
    let page = Page::connect(config).await.unwrap();

    let set = fake.calls("Network.setCookie");
    assert_eq!(set.len(), 1);
    assert_eq!(set[0]["name"], json!("seed"));

    let _ = std::fs::remove_dir_all(&dir);
    page.close().await;
}

#[tokio::test]
async fn malformed_storage_state_fails_connect() {
    let fake = spawn_fake(content_tree()).await;

    let dir = std::env::temp_dir().join(format!("canopy-bad-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bad.json");
    std::fs::write(&path, "{not json").unwrap();

    let mut config = SessionConfig::headed(fake.http_port);
    config.storage_state = Some(path.clone());
    match Page::connect(config).await {
        Err(Error::StorageStateInvalid(_)) => {}
        other => panic!("expected StorageStateInvalid, got {:?}", other.is_ok()),
    }

    let _ = std::fs::remove_dir_all(&dir);
}

/// Scenario: headless snapshot reads "Just a moment..."; the pipeline tears
/// down and re-runs against the external endpoint, whose snapshot is the one
/// returned. The headless browser is a stub script that prints a DevTools
/// URL pointing at the first fake server.
#[cfg(unix)]
#[tokio::test]
async fn hybrid_mode_falls_back_to_the_external_browser() {
    use std::os::unix::fs::PermissionsExt;

    let headless_fake = spawn_fake(challenge_tree()).await;
    let external_fake = spawn_fake(content_tree()).await;

    // Discover the headless fake's ws URL via its own discovery endpoint
    let discovery: Value = reqwest::get(format!(
        "http://127.0.0.1:{}/json/version",
        headless_fake.http_port
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();
    let headless_ws = discovery["webSocketDebuggerUrl"].as_str().unwrap().to_string();

    let dir = std::env::temp_dir().join(format!("canopy-hybrid-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let script = dir.join("fake-chrome.sh");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"DevTools listening on {}\" >&2\nexec sleep 600\n",
            headless_ws
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = SessionConfig::hybrid(external_fake.http_port);
    config.browser_path = Some(script.display().to_string());

    let mut page = Page::connect(config).await.unwrap();
    page.goto("https://one.test/").await.unwrap();

    // One teardown on the headless side, one attach on the external side
    assert!(headless_fake.methods().iter().any(|m| m == "Target.closeTarget"));
    assert!(headless_fake.methods().iter().any(|m| m == "Browser.close"));
    assert!(external_fake.methods().iter().any(|m| m == "Target.attachToTarget"));
    assert!(external_fake.methods().iter().any(|m| m == "Page.navigate"));

    // The snapshot the caller sees is the external browser's
    let text = page.snapshot_with_mode(SnapshotMode::Act).await.unwrap();
    assert!(text.contains("Welcome to One"));
    assert!(!text.contains("Just a moment"));

    let _ = std::fs::remove_dir_all(&dir);
    page.close().await;
}
