//! CDP transport layer
//!
//! A single multiplexed WebSocket to the browser. Requests are correlated by
//! numeric id through a pending table; events are routed to per-session
//! subscribers first, then to global subscribers. Flattened-session dispatch:
//! the session identifier rides at the top level of outbound requests and
//! inbound events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

/// Handler invoked from the reader task; must not block.
type EventHandler = Box<dyn Fn(&Value, Option<&str>) + Send + Sync>;

/// (method, session) - a `None` session means a global subscription.
type HandlerKey = (String, Option<String>);

type HandlerMap = HashMap<HandlerKey, HashMap<u64, EventHandler>>;
type PendingMap = HashMap<u64, oneshot::Sender<Result<Value>>>;

/// CDP transport over one WebSocket
pub struct Transport {
    writer: Mutex<futures::stream::SplitSink<WsStream, Message>>,
    next_id: AtomicU64,
    next_sub_id: AtomicU64,
    pending: Arc<StdMutex<PendingMap>>,
    handlers: Arc<StdMutex<HandlerMap>>,
    alive: Arc<AtomicBool>,
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Removes its handler from the transport's registry when dropped, so
/// timed-out waits can never leave listeners behind.
pub struct Subscription {
    handlers: Arc<StdMutex<HandlerMap>>,
    key: HandlerKey,
    id: u64,
}

impl Subscription {
    /// Remove the handler now instead of at end of scope
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut handlers = self.handlers.lock().unwrap();
        if let Some(set) = handlers.get_mut(&self.key) {
            set.remove(&self.id);
            if set.is_empty() {
                handlers.remove(&self.key);
            }
        }
    }
}

impl Transport {
    /// Connect to the browser's DevTools WebSocket
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| Error::transport(format!("WebSocket connect failed: {}", e)))?;

        tracing::debug!("WebSocket connected to {}", ws_url);

        let (writer, reader) = stream.split();

        let pending: Arc<StdMutex<PendingMap>> = Arc::new(StdMutex::new(HashMap::new()));
        let handlers: Arc<StdMutex<HandlerMap>> = Arc::new(StdMutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::reader_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&handlers),
            Arc::clone(&alive),
        ));

        Ok(Self {
            writer: Mutex::new(writer),
            next_id: AtomicU64::new(1),
            next_sub_id: AtomicU64::new(1),
            pending,
            handlers,
            alive,
        })
    }

    /// Reader task: correlates responses, dispatches events
    async fn reader_loop(
        mut reader: futures::stream::SplitStream<WsStream>,
        pending: Arc<StdMutex<PendingMap>>,
        handlers: Arc<StdMutex<HandlerMap>>,
        alive: Arc<AtomicBool>,
    ) {
        while let Some(msg) = reader.next().await {
            let text = match msg {
                Ok(Message::Text(t)) => t,
                Ok(Message::Close(_)) => {
                    tracing::debug!("WebSocket closed by browser");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("WebSocket read error: {}", e);
                    break;
                }
            };

            let msg: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Unparseable CDP message: {}", e);
                    continue;
                }
            };

            if let Some(id) = msg.get("id").and_then(|v| v.as_u64()) {
                let result = if let Some(error) = msg.get("error") {
                    Err(Error::protocol(
                        msg.get("method").and_then(|m| m.as_str()).unwrap_or(""),
                        error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1),
                        error
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("unknown"),
                    ))
                } else {
                    Ok(msg.get("result").cloned().unwrap_or(json!({})))
                };

                let sender = pending.lock().unwrap().remove(&id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => tracing::trace!("Response for unknown id {}", id),
                }
            } else if let Some(method) = msg.get("method").and_then(|m| m.as_str()) {
                let params = msg.get("params").cloned().unwrap_or(json!({}));
                let session_id = msg.get("sessionId").and_then(|s| s.as_str());
                Self::dispatch_event(&handlers, method, &params, session_id);
            }
        }

        alive.store(false, Ordering::SeqCst);

        // Fail everything still in flight
        let drained: Vec<_> = pending.lock().unwrap().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(Error::transport("connection lost")));
        }

        tracing::debug!("CDP reader loop ended");
    }

    /// Session-scoped handlers fire first, then global handlers (which also
    /// receive the event's session id).
    fn dispatch_event(
        handlers: &Arc<StdMutex<HandlerMap>>,
        method: &str,
        params: &Value,
        session_id: Option<&str>,
    ) {
        let guard = handlers.lock().unwrap();
        if let Some(sid) = session_id {
            if let Some(set) = guard.get(&(method.to_string(), Some(sid.to_string()))) {
                for handler in set.values() {
                    handler(params, Some(sid));
                }
            }
        }
        if let Some(set) = guard.get(&(method.to_string(), None)) {
            for handler in set.values() {
                handler(params, session_id);
            }
        }
    }

    /// Whether the socket is still up
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send a CDP command at browser level and wait for the response
    pub async fn send<C, R>(&self, method: &str, params: &C) -> Result<R>
    where
        C: Serialize,
        R: DeserializeOwned,
    {
        self.send_inner(None, method, params).await
    }

    /// Send a CDP command to a specific flattened session
    pub async fn send_to_session<C, R>(
        &self,
        session_id: &str,
        method: &str,
        params: &C,
    ) -> Result<R>
    where
        C: Serialize,
        R: DeserializeOwned,
    {
        self.send_inner(Some(session_id), method, params).await
    }

    async fn send_inner<C, R>(&self, session_id: Option<&str>, method: &str, params: &C) -> Result<R>
    where
        C: Serialize,
        R: DeserializeOwned,
    {
        if !self.is_alive() {
            return Err(Error::transport("connection closed"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let mut msg = json!({
            "id": id,
            "method": method,
            "params": serde_json::to_value(params)?,
        });
        if let Some(sid) = session_id {
            msg["sessionId"] = json!(sid);
        }
        let data = serde_json::to_string(&msg)?;

        let write_result = {
            let mut writer = self.writer.lock().await;
            writer.send(Message::Text(data)).await
        };
        if let Err(e) = write_result {
            self.pending.lock().unwrap().remove(&id);
            return Err(Error::transport(format!("WebSocket write failed: {}", e)));
        }

        tracing::trace!("Sent {} (id={}, session={:?})", method, id, session_id);

        let result = rx
            .await
            .map_err(|_| Error::transport("connection closed before response"))??;

        serde_json::from_value(result).map_err(Into::into)
    }

    /// Register a handler for a named event, optionally scoped to a session
    pub fn on<F>(&self, method: &str, session_id: Option<&str>, handler: F) -> Subscription
    where
        F: Fn(&Value, Option<&str>) + Send + Sync + 'static,
    {
        let key = (method.to_string(), session_id.map(String::from));
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);

        self.handlers
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .insert(id, Box::new(handler));

        Subscription {
            handlers: Arc::clone(&self.handlers),
            key,
            id,
        }
    }

    /// One-shot event wait with a deadline.
    ///
    /// The handler is registered before this returns, so the event cannot be
    /// missed between issuing a command and awaiting the future. The
    /// subscription is removed on success and on timeout alike.
    pub fn once(
        &self,
        method: &str,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<Value>> + Send {
        let (tx, rx) = oneshot::channel();
        let slot = StdMutex::new(Some(tx));
        let sub = self.on(method, session_id, move |params, _| {
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(params.clone());
            }
        });

        let method = method.to_string();
        async move {
            let outcome = tokio::time::timeout(timeout, rx).await;
            drop(sub);
            match outcome {
                Ok(Ok(params)) => Ok(params),
                Ok(Err(_)) => Err(Error::transport(format!(
                    "connection closed while waiting for {}",
                    method
                ))),
                Err(_) => Err(Error::timeout(format!(
                    "{} did not fire within {:?}",
                    method, timeout
                ))),
            }
        }
    }

    /// Send the close frame and drop the socket
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.send(Message::Close(None)).await;
        self.alive.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().values().map(|s| s.len()).sum()
    }
}
