use crate::error::{Error, Result};
use crate::protocol;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Browser cookie-export JSON file holding the session cookies.
    pub cookie_path: PathBuf,
    /// Combined connect+read timeout per request, in seconds.
    pub timeout_secs: u64,
    /// Service origin. Overridable for testing against a local server.
    pub base_url: String,
    /// Fixed User-Agent. None picks a random browser string per session.
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cookie_path: PathBuf::from("cookie.json"),
            timeout_secs: 30,
            base_url: protocol::BASE_URL.to_string(),
            user_agent: None,
        }
    }
}

impl Config {
    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Load configuration from a TOML file. Missing keys fall back to
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("config file {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }
}
