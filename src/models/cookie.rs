//! Browser session cookies persisted after a CAPTCHA challenge was passed.

use serde::{Deserialize, Serialize};

/// Cookie `SameSite` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    /// Parse a sameSite value, returning `None` for anything unrecognised
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "strict" => Some(SameSite::Strict),
            "lax" => Some(SameSite::Lax),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }
}

/// A single cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,

    /// Expiry in epoch seconds (-1 for session cookies)
    #[serde(default = "session_expiry")]
    pub expires: i64,

    #[serde(default)]
    pub http_only: bool,

    #[serde(default)]
    pub secure: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
}

fn session_expiry() -> i64 {
    -1
}

impl SessionCookie {
    /// Whether the cookie has every attribute needed to be replayed
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty()
            && !self.value.is_empty()
            && !self.domain.is_empty()
            && !self.path.is_empty()
    }

    /// Build a cookie from a loosely-typed JSON object, normalizing as we go.
    ///
    /// Fractional expirations are truncated and unknown `sameSite` values are
    /// dropped. Returns `None` when a required attribute is missing.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let text = |key: &str| value.get(key).and_then(|v| v.as_str()).map(str::to_string);

        let expires = match value.get("expires") {
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .unwrap_or(-1),
            _ => -1,
        };

        let cookie = SessionCookie {
            name: text("name")?,
            value: text("value")?,
            domain: text("domain")?,
            path: text("path")?,
            expires,
            http_only: value.get("httpOnly").and_then(|v| v.as_bool()).unwrap_or(false),
            secure: value.get("secure").and_then(|v| v.as_bool()).unwrap_or(false),
            same_site: value
                .get("sameSite")
                .and_then(|v| v.as_str())
                .and_then(SameSite::parse),
        };

        cookie.is_complete().then_some(cookie)
    }
}

/// An ordered cookie list with its creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookieSet {
    pub cookies: Vec<SessionCookie>,

    /// Creation time in epoch seconds
    pub timestamp: i64,
}

impl SessionCookieSet {
    pub fn new(cookies: Vec<SessionCookie>) -> Self {
        Self {
            cookies,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Whether the set is older than `ttl_secs` at `now`
    pub fn is_expired_at(&self, now: i64, ttl_secs: u64) -> bool {
        now - self.timestamp > ttl_secs as i64
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_normalizes() {
        let raw = json!({
            "name": "cf_clearance",
            "value": "abc",
            "domain": ".dergipark.org.tr",
            "path": "/",
            "expires": 1767225600.75,
            "sameSite": "weird",
        });

        let cookie = SessionCookie::from_json(&raw).unwrap();
        assert_eq!(cookie.expires, 1767225600);
        assert!(cookie.same_site.is_none());
    }

    #[test]
    fn test_from_json_rejects_incomplete() {
        let raw = json!({"name": "x", "value": "", "domain": "d", "path": "/"});
        assert!(SessionCookie::from_json(&raw).is_none());

        let raw = json!({"name": "x", "value": "v", "domain": "d"});
        assert!(SessionCookie::from_json(&raw).is_none());
    }

    #[test]
    fn test_set_expiry() {
        let set = SessionCookieSet {
            cookies: vec![],
            timestamp: 1_000,
        };
        assert!(!set.is_expired_at(2_800, 1800));
        assert!(set.is_expired_at(2_801, 1800));
    }
}
