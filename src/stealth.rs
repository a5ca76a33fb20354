//! Stealth patching
//!
//! A small, fixed set of scripts installed before any page script runs on the
//! target. They redefine the identifying properties headless builds leak:
//! the webdriver flag, the empty plugins list, the languages list, the
//! missing Chrome runtime object, and the notifications branch of the
//! permissions query.

/// Hide the automation flag
const WEBDRIVER_PATCH: &str = r#"
Object.defineProperty(Object.getPrototypeOf(navigator), 'webdriver', {
    get: () => false,
    configurable: true,
    enumerable: true
});
"#;

/// Headless builds report an empty plugin list; give it the usual three
const PLUGINS_PATCH: &str = r#"
Object.defineProperty(navigator, 'plugins', {
    get: () => {
        const plugins = [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
            { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }
        ];
        plugins.item = i => plugins[i] || null;
        plugins.namedItem = n => plugins.find(p => p.name === n) || null;
        plugins.refresh = () => {};
        return plugins;
    },
    configurable: true
});
"#;

/// Languages list
const LANGUAGES_PATCH: &str = r#"
Object.defineProperty(navigator, 'languages', {
    get: () => ['en-US', 'en'],
    configurable: true
});
"#;

/// Headless builds lack window.chrome
const CHROME_RUNTIME_PATCH: &str = r#"
if (!window.chrome) {
    window.chrome = {};
}
if (!window.chrome.runtime) {
    window.chrome.runtime = {
        connect: () => {},
        sendMessage: () => {},
        id: undefined
    };
}
"#;

/// Notifications permission query must agree with Notification.permission
const PERMISSIONS_PATCH: &str = r#"
if (navigator.permissions && navigator.permissions.query) {
    const originalQuery = navigator.permissions.query.bind(navigator.permissions);
    navigator.permissions.query = (descriptor) => {
        if (descriptor && descriptor.name === 'notifications') {
            return Promise.resolve({ state: Notification.permission, onchange: null });
        }
        return originalQuery(descriptor);
    };
}
"#;

/// The combined script installed on new documents
pub fn stealth_script() -> String {
    let mut script = String::from("(() => {\n");
    for patch in [
        WEBDRIVER_PATCH,
        PLUGINS_PATCH,
        LANGUAGES_PATCH,
        CHROME_RUNTIME_PATCH,
        PERMISSIONS_PATCH,
    ] {
        script.push_str(patch);
        script.push('\n');
    }
    script.push_str("})();");
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_covers_the_fixed_property_set() {
        let script = stealth_script();
        assert!(script.contains("webdriver"));
        assert!(script.contains("plugins"));
        assert!(script.contains("languages"));
        assert!(script.contains("chrome.runtime"));
        assert!(script.contains("notifications"));
        assert!(script.starts_with("(() => {"));
        assert!(script.ends_with("})();"));
    }
}
