//! Cookies, credential sources, and persisted storage state
//!
//! The credential source is a capability boundary: anything that can produce
//! cookies for a domain can seed a session. The core never decrypts or
//! mutates cookie records, it only filters and installs them.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cdp::types::{CookieRecord, NetworkSetCookie};
use crate::cdp::Session;
use crate::error::{Error, Result};

/// A cookie as the core passes it around
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    /// Absolute epoch seconds; `None` is a session cookie
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

fn root_path() -> String {
    "/".to_string()
}

impl From<CookieRecord> for Cookie {
    fn from(record: CookieRecord) -> Self {
        Self {
            name: record.name,
            value: record.value,
            domain: record.domain,
            path: record.path,
            expires: if record.expires > 0.0 {
                Some(record.expires)
            } else {
                None
            },
            secure: record.secure,
            http_only: record.http_only,
            same_site: record.same_site,
        }
    }
}

/// Anything that can produce cookies for a domain
pub trait CookieSource: Send + Sync {
    /// Cookies applicable to the given (already normalized) domain
    fn cookies_for(&self, domain: &str) -> Vec<Cookie>;
}

/// Host part of a URL with the `www.` prefix stripped, so
/// registrable-domain cookies stay visible
pub fn normalized_host(url: &str) -> String {
    let rest = url.split("://").nth(1).unwrap_or(url);
    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(rest)
        .split('@')
        .next_back()
        .unwrap_or(rest);
    let host = host.split(':').next().unwrap_or(host);
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

/// RFC 6265 style domain match, tolerant of a leading dot
pub fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    let domain = cookie_domain.trim_start_matches('.');
    if domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Install a cookie batch on the session before navigation
pub async fn install(session: &Session, cookies: &[Cookie]) -> Result<usize> {
    let mut installed = 0;
    for cookie in cookies {
        let params = NetworkSetCookie {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            url: None,
            domain: Some(cookie.domain.clone()),
            path: Some(cookie.path.clone()),
            secure: Some(cookie.secure),
            http_only: Some(cookie.http_only),
            same_site: cookie.same_site.clone(),
            expires: cookie.expires,
        };
        if session.set_cookie(&params).await? {
            installed += 1;
        }
    }
    Ok(installed)
}

/// A page's exported cookies and local key/value store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default, rename = "localStorage")]
    pub local_storage: HashMap<String, String>,
}

impl StorageState {
    /// Parse a storage state document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::StorageStateInvalid(e.to_string()))
    }

    /// Load from disk
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write to disk as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl CookieSource for StorageState {
    fn cookies_for(&self, domain: &str) -> Vec<Cookie> {
        self.cookies
            .iter()
            .filter(|c| domain_matches(&c.domain, domain))
            .cloned()
            .collect()
    }
}
