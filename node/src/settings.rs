//! Per-node overlay settings.
//!
//! A fixed table of named integer parameters and named durations, each with
//! a compile-time default. Values can be overridden from `.properties` text,
//! from an overwrite string (`NAME:value;NAME:value`) or from a TOML file
//! with `[params]` and `[times]` tables. Every node gets its own clone so
//! per-node tuning never leaks across nodes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use flood_utils::parse_duration;

use crate::NodeError;

/// Integer parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Param {
    /// Target degree `D` used to size the admission budgets.
    MaxNumConnections,
    /// Cap on the contacts a tracker returns per join.
    MaxNumNewNeighbors,
    /// Non-zero: attach the connected neighbors to outgoing ConnectPeers
    /// requests and harvest the ones received.
    ShareNeighbors,
    /// Join retries after a bootstrap failure; `0` disables retrying.
    MaxJoinRetries,
}

impl Param {
    pub const ALL: [Param; 4] = [
        Param::MaxNumConnections,
        Param::MaxNumNewNeighbors,
        Param::ShareNeighbors,
        Param::MaxJoinRetries,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxNumConnections => "MAX_NUM_CONNECTIONS",
            Self::MaxNumNewNeighbors => "MAX_NUM_NEW_NEIGHBORS",
            Self::ShareNeighbors => "SHARE_NEIGHBORS",
            Self::MaxJoinRetries => "MAX_JOIN_RETRIES",
        }
    }

    pub fn default_value(&self) -> u64 {
        match self {
            Self::MaxNumConnections => 5,
            Self::MaxNumNewNeighbors => 10,
            Self::ShareNeighbors => 0,
            Self::MaxJoinRetries => 3,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Duration settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeSetting {
    /// Timeout for join and connect request/reply exchanges.
    MsgTimeout,
    /// Period between maintenance cycles.
    MaintenanceInterval,
    /// Delay before the first join retry; doubles on each further retry.
    JoinRetryBackoff,
}

impl TimeSetting {
    pub const ALL: [TimeSetting; 3] = [
        TimeSetting::MsgTimeout,
        TimeSetting::MaintenanceInterval,
        TimeSetting::JoinRetryBackoff,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::MsgTimeout => "MSG_TIMEOUT",
            Self::MaintenanceInterval => "MAINTENANCE_INTERVAL",
            Self::JoinRetryBackoff => "JOIN_RETRY_BACKOFF",
        }
    }

    pub fn default_value(&self) -> Duration {
        match self {
            Self::MsgTimeout => Duration::from_secs(1),
            Self::MaintenanceInterval => Duration::from_secs(10),
            Self::JoinRetryBackoff => Duration::from_secs(2),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for TimeSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// On-disk layout of a TOML settings file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default)]
    params: BTreeMap<String, u64>,
    #[serde(default)]
    times: BTreeMap<String, String>,
}

/// Settings of one overlay node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    params: [u64; Param::ALL.len()],
    times: [Duration; TimeSetting::ALL.len()],
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            params: Param::ALL.map(|p| p.default_value()),
            times: TimeSetting::ALL.map(|t| t.default_value()),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(&self, param: Param) -> u64 {
        self.params[param as usize]
    }

    pub fn set_param(&mut self, param: Param, value: u64) {
        self.params[param as usize] = value;
    }

    pub fn time(&self, setting: TimeSetting) -> Duration {
        self.times[setting as usize]
    }

    pub fn set_time(&mut self, setting: TimeSetting, value: Duration) {
        self.times[setting as usize] = value;
    }

    /// Builder-style [`set_param`](Settings::set_param).
    pub fn with_param(mut self, param: Param, value: u64) -> Self {
        self.set_param(param, value);
        self
    }

    /// Builder-style [`set_time`](Settings::set_time).
    pub fn with_time(mut self, setting: TimeSetting, value: Duration) -> Self {
        self.set_time(setting, value);
        self
    }

    // -- Typed accessors -------------------------------------------------------

    pub fn max_num_connections(&self) -> usize {
        self.param(Param::MaxNumConnections) as usize
    }

    pub fn max_num_new_neighbors(&self) -> usize {
        self.param(Param::MaxNumNewNeighbors) as usize
    }

    pub fn share_neighbors(&self) -> bool {
        self.param(Param::ShareNeighbors) != 0
    }

    pub fn max_join_retries(&self) -> u32 {
        u32::try_from(self.param(Param::MaxJoinRetries)).unwrap_or(u32::MAX)
    }

    pub fn msg_timeout(&self) -> Duration {
        self.time(TimeSetting::MsgTimeout)
    }

    pub fn maintenance_interval(&self) -> Duration {
        self.time(TimeSetting::MaintenanceInterval)
    }

    pub fn join_retry_backoff(&self) -> Duration {
        self.time(TimeSetting::JoinRetryBackoff)
    }

    // -- Overrides -------------------------------------------------------------

    /// Set the parameter or duration called `name` from its textual value.
    pub fn apply(&mut self, name: &str, value: &str) -> Result<(), NodeError> {
        let name = name.trim();
        let value = value.trim();
        if let Some(param) = Param::from_name(name) {
            let parsed = value
                .parse::<u64>()
                .map_err(|e| NodeError::Config(format!("{name}: {e}")))?;
            self.set_param(param, parsed);
        } else if let Some(setting) = TimeSetting::from_name(name) {
            let parsed =
                parse_duration(value).map_err(|e| NodeError::Config(format!("{name}: {e}")))?;
            self.set_time(setting, parsed);
        } else {
            return Err(NodeError::Config(format!("unknown setting {name}")));
        }
        Ok(())
    }

    /// Apply every override in `f` or none of them.
    fn apply_all(
        &mut self,
        f: impl FnOnce(&mut Settings) -> Result<(), NodeError>,
    ) -> Result<(), NodeError> {
        let mut staged = self.clone();
        f(&mut staged)?;
        *self = staged;
        Ok(())
    }

    /// Apply `NAME=value` lines. Blank lines and lines starting with `#` or
    /// `!` are skipped; `NAME: value` is accepted as well. On error nothing
    /// is applied.
    pub fn apply_properties(&mut self, text: &str) -> Result<(), NodeError> {
        self.apply_all(|staged| staged.apply_property_lines(text))
    }

    fn apply_property_lines(&mut self, text: &str) -> Result<(), NodeError> {
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (name, value) = line
                .split_once(['=', ':'])
                .ok_or_else(|| NodeError::Config(format!("line {}: expected NAME=value", lineno + 1)))?;
            self.apply(name, value)?;
        }
        Ok(())
    }

    /// Apply an overwrite string of the form `NAME:value;NAME:value`. On
    /// error nothing is applied.
    pub fn apply_overwrite(&mut self, overwrite: &str) -> Result<(), NodeError> {
        self.apply_all(|staged| {
            for entry in overwrite.split(';').map(str::trim).filter(|e| !e.is_empty()) {
                let (name, value) = entry.split_once(':').ok_or_else(|| {
                    NodeError::Config(format!("expected NAME:value, got {entry:?}"))
                })?;
                staged.apply(name, value)?;
            }
            Ok(())
        })
    }

    /// Apply the `[params]` and `[times]` tables of a TOML document. On
    /// error nothing is applied.
    pub fn apply_toml_str(&mut self, s: &str) -> Result<(), NodeError> {
        let file: SettingsFile = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        self.apply_all(|staged| {
            for (name, value) in &file.params {
                let param = Param::from_name(name)
                    .ok_or_else(|| NodeError::Config(format!("unknown param {name}")))?;
                staged.set_param(param, *value);
            }
            for (name, value) in &file.times {
                let setting = TimeSetting::from_name(name)
                    .ok_or_else(|| NodeError::Config(format!("unknown time {name}")))?;
                let parsed = parse_duration(value)
                    .map_err(|e| NodeError::Config(format!("{name}: {e}")))?;
                staged.set_time(setting, parsed);
            }
            Ok(())
        })
    }

    /// Defaults overridden by a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let mut settings = Self::default();
        settings.apply_toml_str(s)?;
        Ok(settings)
    }

    /// Defaults overridden by a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        Self::from_toml_str(&read_settings_file(path.as_ref())?)
    }

    /// Defaults overridden by a `.properties` file.
    pub fn from_properties_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = read_settings_file(path.as_ref())?;
        let mut settings = Self::default();
        settings.apply_properties(&content)?;
        Ok(settings)
    }

    /// Defaults overridden by a settings file: `.properties` files hold
    /// `NAME=value` lines, anything else is read as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("properties") => Self::from_properties_file(path),
            _ => Self::from_toml_file(path),
        }
    }
}

fn read_settings_file(path: &Path) -> Result<String, NodeError> {
    std::fs::read_to_string(path)
        .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))
}
