//! Data source settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings shared by every command a data source prepares and executes.
///
/// ```
/// use sqlweave_core::DataSourceSettings;
///
/// let settings = DataSourceSettings::from_json(r#"{"strict_mode": true}"#).unwrap();
/// assert!(settings.strict_mode);
/// assert_eq!(settings.command_timeout_secs, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceSettings {
    /// Treat unmatched properties, filter keys and desired columns as errors.
    pub strict_mode: bool,
    /// Schema used to qualify unqualified object names.
    ///
    /// Falls back to the dialect's default schema when unset.
    pub default_schema: Option<String>,
    /// Per-command timeout.
    pub command_timeout_secs: Option<u64>,
    /// Hint for drivers that can stream large columns sequentially.
    pub sequential_access: bool,
}

impl DataSourceSettings {
    /// Parses settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Enables or disables strict mode.
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Sets the default schema.
    #[must_use]
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Sets the command timeout in seconds.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout_secs = Some(secs);
        self
    }

    /// The command timeout as a [`Duration`].
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}
