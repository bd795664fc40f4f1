//! Two-tier store for session cookies obtained after passing a challenge.
//!
//! The memory tier is a [`TtlCache`]; the durable tier is a JSON file of the
//! shape `{"cookies": [...], "timestamp": <epoch seconds>}` so a restarted
//! process can reuse a still-valid session.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{CacheStore, TtlCache};
use crate::config::CacheConfig;
use crate::error::ScrapeError;
use crate::models::{SessionCookie, SessionCookieSet};

const MEMORY_KEY: &str = "session";
const MEMORY_MAX_ENTRIES: usize = 10;

/// Session cookie store backed by memory and a durable file
#[derive(Debug)]
pub struct SessionCookieStore {
    memory: TtlCache<String, SessionCookieSet>,
    ttl_secs: u64,
    path: PathBuf,
}

impl SessionCookieStore {
    pub fn new(ttl: Duration, path: impl Into<PathBuf>) -> Self {
        Self {
            memory: TtlCache::new(ttl, MEMORY_MAX_ENTRIES),
            ttl_secs: ttl.as_secs(),
            path: path.into(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(config.cookies_ttl_secs),
            config.cookie_file.clone(),
        )
    }

    /// Location of the durable file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a still-valid cookie set, memory tier first
    pub fn load(&self) -> Option<SessionCookieSet> {
        let now = chrono::Utc::now().timestamp();

        if let Some(set) = self.memory.get(&MEMORY_KEY.to_string()) {
            if !set.is_expired_at(now, self.ttl_secs) {
                tracing::debug!("Session cookies loaded from memory ({})", set.cookies.len());
                return Some(set);
            }
            self.memory.remove(&MEMORY_KEY.to_string());
        }

        let set = match self.read_durable() {
            Ok(Some(set)) => set,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read cookie file {}: {}", self.path.display(), e);
                return None;
            }
        };

        if set.is_expired_at(now, self.ttl_secs) {
            tracing::info!(
                "Stored session cookies expired ({}s old), removing {}",
                now - set.timestamp,
                self.path.display()
            );
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove expired cookie file: {}", e);
            }
            return None;
        }

        if set.is_empty() {
            return None;
        }

        tracing::info!(
            "Session cookies loaded from {} ({} cookies)",
            self.path.display(),
            set.cookies.len()
        );
        self.memory.set(MEMORY_KEY.to_string(), set.clone());
        Some(set)
    }

    /// Normalize and store cookies in both tiers.
    ///
    /// Incomplete cookies are dropped. Returns the number of cookies kept.
    pub fn save(&self, cookies: Vec<SessionCookie>) -> Result<usize, ScrapeError> {
        let kept: Vec<SessionCookie> = cookies.into_iter().filter(|c| c.is_complete()).collect();
        if kept.is_empty() {
            tracing::debug!("No valid cookies to save");
            return Ok(0);
        }

        let set = SessionCookieSet::new(kept);
        let count = set.cookies.len();
        self.memory.set(MEMORY_KEY.to_string(), set.clone());
        self.write_durable(&set)?;

        tracing::info!(
            "Saved {} session cookies to {}",
            count,
            self.path.display()
        );
        Ok(count)
    }

    /// Forget the session in both tiers
    pub fn clear(&self) -> Result<(), ScrapeError> {
        self.memory.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse the durable file, tolerating foreign number formats and bad entries
    fn read_durable(&self) -> Result<Option<SessionCookieSet>, ScrapeError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let raw: serde_json::Value = serde_json::from_str(&content)?;

        let timestamp = raw
            .get("timestamp")
            .and_then(|t| t.as_i64().or_else(|| t.as_f64().map(|f| f.trunc() as i64)))
            .ok_or_else(|| ScrapeError::Parse("cookie file has no timestamp".to_string()))?;

        let cookies = raw
            .get("cookies")
            .and_then(|c| c.as_array())
            .map(|items| items.iter().filter_map(SessionCookie::from_json).collect())
            .unwrap_or_default();

        Ok(Some(SessionCookieSet { cookies, timestamp }))
    }

    fn write_durable(&self, set: &SessionCookieSet) -> Result<(), ScrapeError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(set)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SameSite;
    use tempfile::TempDir;

    fn cookie(name: &str) -> SessionCookie {
        SessionCookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: ".dergipark.org.tr".to_string(),
            path: "/".to_string(),
            expires: 1_900_000_000,
            http_only: true,
            secure: true,
            same_site: Some(SameSite::Lax),
        }
    }

    #[test]
    fn test_save_and_load_from_memory() {
        let dir = TempDir::new().unwrap();
        let store = SessionCookieStore::new(Duration::from_secs(1800), dir.path().join("c.json"));

        let saved = store.save(vec![cookie("cf_clearance"), cookie("PHPSESSID")]).unwrap();
        assert_eq!(saved, 2);

        let set = store.load().unwrap();
        assert_eq!(set.cookies.len(), 2);
        assert_eq!(set.cookies[0].name, "cf_clearance");
    }

    #[test]
    fn test_durable_file_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cookies.json");

        let first = SessionCookieStore::new(Duration::from_secs(1800), &path);
        first.save(vec![cookie("cf_clearance")]).unwrap();
        assert!(path.exists());

        let second = SessionCookieStore::new(Duration::from_secs(1800), &path);
        let set = second.load().unwrap();
        assert_eq!(set.cookies.len(), 1);
    }

    #[test]
    fn test_incomplete_cookies_dropped() {
        let dir = TempDir::new().unwrap();
        let store = SessionCookieStore::new(Duration::from_secs(1800), dir.path().join("c.json"));

        let mut broken = cookie("x");
        broken.value.clear();
        assert_eq!(store.save(vec![broken]).unwrap(), 0);
        assert!(store.load().is_none());
    }

    #[test]
    fn test_expired_durable_file_is_deleted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.json");
        let stale = serde_json::json!({
            "cookies": [{"name": "a", "value": "b", "domain": "dergipark.org.tr", "path": "/"}],
            "timestamp": chrono::Utc::now().timestamp() - 4000,
        });
        fs::write(&path, stale.to_string()).unwrap();

        let store = SessionCookieStore::new(Duration::from_secs(1800), &path);
        assert!(store.load().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_durable_file_with_float_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.json");
        let raw = serde_json::json!({
            "cookies": [
                {"name": "a", "value": "b", "domain": "dergipark.org.tr", "path": "/",
                 "expires": 1893456000.5, "sameSite": "Lax"},
                {"name": "broken", "domain": "dergipark.org.tr", "path": "/"}
            ],
            "timestamp": chrono::Utc::now().timestamp() as f64 + 0.25,
        });
        fs::write(&path, raw.to_string()).unwrap();

        let store = SessionCookieStore::new(Duration::from_secs(1800), &path);
        let set = store.load().unwrap();
        assert_eq!(set.cookies.len(), 1);
        assert_eq!(set.cookies[0].expires, 1893456000);
        assert_eq!(set.cookies[0].same_site, Some(SameSite::Lax));
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.json");
        let store = SessionCookieStore::new(Duration::from_secs(1800), &path);
        store.save(vec![cookie("a")]).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();
    }
}
