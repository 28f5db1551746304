//! Remote sheet configuration.

use serde::{Deserialize, Serialize};

use crate::infrastructure::sheets::DEFAULT_SHEETS_BASE_URL;

/// Remote sheet settings.
///
/// Key, credential and worksheet fall back to the `SPREADSHEET_KEY`,
/// `SERVICE_JSON` and `WORKSHEET_NAME` environment variables.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Publish to the remote sheet at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Spreadsheet key.
    #[serde(default)]
    pub spreadsheet_key: Option<String>,
    /// Service credential JSON document.
    #[serde(default)]
    pub credential: Option<String>,
    /// Worksheet name.
    #[serde(default)]
    pub worksheet: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            spreadsheet_key: None,
            credential: None,
            worksheet: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("spreadsheet_key", &self.spreadsheet_key)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .field("worksheet", &self.worksheet)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

const fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    DEFAULT_SHEETS_BASE_URL.to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}
