//! Input dispatcher
//!
//! Turns a snapshot reference plus an intent into CDP Input events. Every
//! coordinate-using operation scrolls the node into view first and aims at
//! the midpoint of its content quad.

use std::collections::HashMap;
use std::time::Duration;

use crate::cdp::types::{
    modifiers, CallArgument, InputDispatchKeyEvent, InputDispatchMouseEvent, KeyEventType,
    MouseButton, MouseEventType,
};
use crate::cdp::Session;
use crate::error::{Error, Result};

/// Symbolic key definition
struct KeyDef {
    name: &'static str,
    key: &'static str,
    code: &'static str,
    virtual_key_code: i32,
    text: Option<&'static str>,
}

/// The fixed key table; anything else is UnknownKey
const KEYS: &[KeyDef] = &[
    KeyDef { name: "Enter", key: "Enter", code: "Enter", virtual_key_code: 13, text: Some("\r") },
    KeyDef { name: "Tab", key: "Tab", code: "Tab", virtual_key_code: 9, text: Some("\t") },
    KeyDef { name: "Escape", key: "Escape", code: "Escape", virtual_key_code: 27, text: None },
    KeyDef { name: "Backspace", key: "Backspace", code: "Backspace", virtual_key_code: 8, text: None },
    KeyDef { name: "Delete", key: "Delete", code: "Delete", virtual_key_code: 46, text: None },
    KeyDef { name: "ArrowUp", key: "ArrowUp", code: "ArrowUp", virtual_key_code: 38, text: None },
    KeyDef { name: "ArrowDown", key: "ArrowDown", code: "ArrowDown", virtual_key_code: 40, text: None },
    KeyDef { name: "ArrowLeft", key: "ArrowLeft", code: "ArrowLeft", virtual_key_code: 37, text: None },
    KeyDef { name: "ArrowRight", key: "ArrowRight", code: "ArrowRight", virtual_key_code: 39, text: None },
    KeyDef { name: "Home", key: "Home", code: "Home", virtual_key_code: 36, text: None },
    KeyDef { name: "End", key: "End", code: "End", virtual_key_code: 35, text: None },
    KeyDef { name: "PageUp", key: "PageUp", code: "PageUp", virtual_key_code: 33, text: None },
    KeyDef { name: "PageDown", key: "PageDown", code: "PageDown", virtual_key_code: 34, text: None },
    KeyDef { name: "Space", key: " ", code: "Space", virtual_key_code: 32, text: Some(" ") },
];

fn lookup_key(name: &str) -> Result<&'static KeyDef> {
    KEYS.iter().find(|k| k.name == name).ok_or_else(|| {
        let valid: Vec<&str> = KEYS.iter().map(|k| k.name).collect();
        Error::UnknownKey {
            key: name.to_string(),
            valid: valid.join(", "),
        }
    })
}

/// Options for `type_text`
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeOptions {
    /// Select-all + Backspace before typing
    pub clear: bool,
    /// Emit per-character key events instead of one insertText batch
    pub key_events: bool,
}

/// Escape a string for a single-quoted JavaScript literal
fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('"', "\\\"")
        .replace('`', "\\`")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace("${", "\\${")
}

/// Reference-based input over one page session
pub struct Input<'a> {
    session: &'a Session,
    refs: &'a HashMap<u64, i64>,
}

impl<'a> Input<'a> {
    /// Bind the dispatcher to a session and the current reference map
    pub fn new(session: &'a Session, refs: &'a HashMap<u64, i64>) -> Self {
        Self { session, refs }
    }

    fn resolve(&self, reference: u64) -> Result<i64> {
        self.refs
            .get(&reference)
            .copied()
            .ok_or(Error::ReferenceUnknown(reference))
    }

    /// Scroll the node into the viewport and return its content midpoint
    async fn midpoint(&self, backend_node_id: i64) -> Result<(f64, f64)> {
        self.session.scroll_into_view(backend_node_id).await?;
        let model = self.session.get_box_model(backend_node_id).await?;
        Ok(model.center())
    }

    async fn mouse(
        &self,
        event_type: MouseEventType,
        x: f64,
        y: f64,
        button: Option<MouseButton>,
        click_count: Option<i32>,
    ) -> Result<()> {
        self.session
            .dispatch_mouse_event(&InputDispatchMouseEvent {
                r#type: event_type,
                x,
                y,
                button,
                click_count,
                delta_x: None,
                delta_y: None,
            })
            .await
    }

    /// Left-click the referenced element
    pub async fn click(&self, reference: u64) -> Result<()> {
        let backend = self.resolve(reference)?;
        let (x, y) = self.midpoint(backend).await?;
        self.mouse(MouseEventType::MousePressed, x, y, Some(MouseButton::Left), Some(1))
            .await?;
        self.mouse(MouseEventType::MouseReleased, x, y, Some(MouseButton::Left), Some(1))
            .await
    }

    /// Move the pointer over the referenced element
    pub async fn hover(&self, reference: u64) -> Result<()> {
        let backend = self.resolve(reference)?;
        let (x, y) = self.midpoint(backend).await?;
        self.mouse(MouseEventType::MouseMoved, x, y, None, None).await
    }

    /// Focus the element and type into it
    pub async fn type_text(&self, reference: u64, text: &str, opts: TypeOptions) -> Result<()> {
        let backend = self.resolve(reference)?;
        self.session.focus(backend).await?;

        if opts.clear {
            // Ctrl+A, then Backspace
            self.key_event(KeyEventType::KeyDown, "a", "KeyA", 65, None, Some(modifiers::CTRL))
                .await?;
            self.key_event(KeyEventType::KeyUp, "a", "KeyA", 65, None, Some(modifiers::CTRL))
                .await?;
            let backspace = lookup_key("Backspace")?;
            self.press_def(backspace).await?;
        }

        if opts.key_events {
            for ch in text.chars() {
                let ch = ch.to_string();
                self.session
                    .dispatch_key_event(&InputDispatchKeyEvent {
                        r#type: KeyEventType::KeyDown,
                        key: Some(ch.clone()),
                        text: Some(ch.clone()),
                        ..Default::default()
                    })
                    .await?;
                self.session
                    .dispatch_key_event(&InputDispatchKeyEvent {
                        r#type: KeyEventType::KeyUp,
                        key: Some(ch),
                        ..Default::default()
                    })
                    .await?;
            }
            Ok(())
        } else {
            // Fast path; does not trigger per-key handlers
            self.session.insert_text(text).await
        }
    }

    async fn key_event(
        &self,
        event_type: KeyEventType,
        key: &str,
        code: &str,
        virtual_key_code: i32,
        text: Option<&str>,
        key_modifiers: Option<i32>,
    ) -> Result<()> {
        self.session
            .dispatch_key_event(&InputDispatchKeyEvent {
                r#type: event_type,
                modifiers: key_modifiers,
                text: text.map(String::from),
                key: Some(key.to_string()),
                code: Some(code.to_string()),
                windows_virtual_key_code: Some(virtual_key_code),
                native_virtual_key_code: Some(virtual_key_code),
            })
            .await
    }

    async fn press_def(&self, def: &KeyDef) -> Result<()> {
        self.key_event(
            KeyEventType::KeyDown,
            def.key,
            def.code,
            def.virtual_key_code,
            def.text,
            None,
        )
        .await?;
        self.key_event(
            KeyEventType::KeyUp,
            def.key,
            def.code,
            def.virtual_key_code,
            None,
            None,
        )
        .await
    }

    /// Press a symbolic key from the fixed table
    pub async fn press(&self, key: &str) -> Result<()> {
        let def = lookup_key(key)?;
        self.press_def(def).await
    }

    /// Mouse-wheel scroll at the given point, defaulting to (400, 300)
    pub async fn scroll(&self, delta_y: f64, x: Option<f64>, y: Option<f64>) -> Result<()> {
        self.session
            .dispatch_mouse_event(&InputDispatchMouseEvent {
                r#type: MouseEventType::MouseWheel,
                x: x.unwrap_or(400.0),
                y: y.unwrap_or(300.0),
                button: None,
                click_count: None,
                delta_x: Some(0.0),
                delta_y: Some(delta_y),
            })
            .await
    }

    /// Choose an option by value or visible text.
    ///
    /// Native selects get their value assigned and a bubbling change event;
    /// custom widgets are opened by click, then the matching role=option or
    /// role=menuitem is clicked.
    pub async fn select(&self, reference: u64, value: &str) -> Result<()> {
        let backend = self.resolve(reference)?;
        let object_id = self.session.resolve_node(backend).await?;

        let handled = self
            .session
            .call_function_on(
                &object_id,
                r#"function(value) {
                    if (this.tagName === 'SELECT') {
                        for (const opt of this.options) {
                            if (opt.value === value || opt.textContent.trim() === value) {
                                this.value = opt.value;
                                this.dispatchEvent(new Event('change', { bubbles: true }));
                                break;
                            }
                        }
                        return true;
                    }
                    return false;
                }"#,
                Some(vec![CallArgument {
                    value: Some(serde_json::json!(value)),
                }]),
            )
            .await?;

        if handled.result.value.and_then(|v| v.as_bool()).unwrap_or(false) {
            return Ok(());
        }

        // Custom dropdown: open it, give it a moment to render, pick by text
        self.click(reference).await?;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let escaped = escape_js_string(value);
        let picker = format!(
            r#"(() => {{
                const wanted = '{}';
                const candidates = document.querySelectorAll('[role="option"], [role="menuitem"]');
                for (const el of candidates) {{
                    if ((el.textContent || '').trim() === wanted) {{
                        el.click();
                        return true;
                    }}
                }}
                return false;
            }})()"#,
            escaped
        );
        self.session.evaluate(&picker).await?;
        Ok(())
    }

    /// Press at the source, move through the midpoint, release at the target.
    ///
    /// Synthetic mouse events do not populate the HTML5 drag-and-drop
    /// data-transfer payload; pages listening for dragstart may not see this.
    pub async fn drag(&self, from_reference: u64, to_reference: u64) -> Result<()> {
        let from_backend = self.resolve(from_reference)?;
        let to_backend = self.resolve(to_reference)?;

        let (fx, fy) = self.midpoint(from_backend).await?;
        let (tx, ty) = self.midpoint(to_backend).await?;

        self.mouse(MouseEventType::MousePressed, fx, fy, Some(MouseButton::Left), Some(1))
            .await?;
        self.mouse(
            MouseEventType::MouseMoved,
            (fx + tx) / 2.0,
            (fy + ty) / 2.0,
            Some(MouseButton::Left),
            None,
        )
        .await?;
        self.mouse(MouseEventType::MouseMoved, tx, ty, Some(MouseButton::Left), None)
            .await?;
        self.mouse(MouseEventType::MouseReleased, tx, ty, Some(MouseButton::Left), Some(1))
            .await
    }

    /// Assign absolute file paths to a file input
    pub async fn upload(&self, reference: u64, files: Vec<String>) -> Result<()> {
        let backend = self.resolve(reference)?;
        self.session.set_file_input_files(backend, files).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_table_covers_the_symbolic_names() {
        for name in [
            "Enter", "Tab", "Escape", "Backspace", "Delete", "ArrowUp", "ArrowDown", "ArrowLeft",
            "ArrowRight", "Home", "End", "PageUp", "PageDown", "Space",
        ] {
            assert!(lookup_key(name).is_ok(), "missing key {}", name);
        }
    }

    #[test]
    fn enter_and_tab_carry_control_characters() {
        assert_eq!(lookup_key("Enter").unwrap().text, Some("\r"));
        assert_eq!(lookup_key("Tab").unwrap().text, Some("\t"));
        assert_eq!(lookup_key("Enter").unwrap().virtual_key_code, 13);
    }

    #[test]
    fn unknown_keys_list_the_valid_names() {
        match lookup_key("Meta") {
            Err(Error::UnknownKey { key, valid }) => {
                assert_eq!(key, "Meta");
                assert!(valid.contains("Enter"));
                assert!(valid.contains("PageDown"));
            }
            other => panic!("expected UnknownKey, got {:?}", other.map(|k| k.name)),
        }
    }

    #[test]
    fn js_string_escaping_covers_quotes_and_newlines() {
        assert_eq!(escape_js_string("a'b"), "a\\'b");
        assert_eq!(escape_js_string("a\nb"), "a\\nb");
        assert_eq!(escape_js_string("${x}"), "\\${x}");
    }
}
