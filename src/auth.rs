//! Session credentials loaded from a browser cookie export.
//!
//! The Gemini web interface authenticates with two session cookies. They
//! are read once from a cookie-export JSON file (an array of objects with
//! at least `name` and `value` fields) and never written back.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Primary session cookie name.
pub const PSID_COOKIE: &str = "__Secure-1PSID";
/// Secondary session cookie name.
pub const PSIDTS_COOKIE: &str = "__Secure-1PSIDTS";

/// One entry in the cookie-export file. Extra fields (domain, path,
/// expiry) are ignored.
#[derive(Debug, Deserialize)]
struct CookieEntry {
    name: String,
    value: String,
}

/// The two opaque session tokens. Immutable after loading.
#[derive(Clone)]
pub struct SessionCredentials {
    pub psid: String,
    pub psidts: String,
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("psid", &"[REDACTED]")
            .field("psidts", &"[REDACTED]")
            .finish()
    }
}

/// Load and validate the two required cookies from `path`.
///
/// Fails with [`Error::Config`] if the file is missing, is not valid JSON,
/// or lacks either required cookie. No network calls are made here.
pub fn load_cookies(path: &Path) -> Result<SessionCredentials> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cookie file {}: {e}", path.display())))?;

    let entries: Vec<CookieEntry> = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("cookie file is not valid JSON: {e}")))?;

    let find = |name: &str| {
        entries
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.clone())
            .ok_or_else(|| Error::Config(format!("required cookie {name} not found")))
    };

    Ok(SessionCredentials {
        psid: find(PSID_COOKIE)?,
        psidts: find(PSIDTS_COOKIE)?,
    })
}
