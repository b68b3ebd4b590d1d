use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{Department, Lead};

/// Top-level configuration loaded from `~/.leadflow/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub sla: SlaConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Config {
    /// Load config from `~/.leadflow/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.routing.validate()?;
        self.sla.validate()?;
        self.escalation.validate()?;
        if self.notifications.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "notifications.channel_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".leadflow")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_service_name() -> String {
    "leadflow".into()
}
fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            in_memory: false,
        }
    }
}

impl StoreConfig {
    /// The database path with a leading `~/` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        match self.path.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest),
            None => PathBuf::from(&self.path),
        }
    }
}

fn default_store_path() -> String {
    "~/.leadflow/leadflow.db".into()
}

/// Score thresholds used when routing a lead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Leads scoring at or above this open a deal.
    #[serde(default = "default_hot_threshold")]
    pub hot_lead_threshold: u8,
    /// Leads scoring at or above this get urgent priority.
    #[serde(default = "default_urgent_threshold")]
    pub urgent_score_threshold: u8,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            hot_lead_threshold: default_hot_threshold(),
            urgent_score_threshold: default_urgent_threshold(),
        }
    }
}

impl RoutingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hot_lead_threshold > 100 || self.urgent_score_threshold > 100 {
            return Err(ConfigError::Validation(
                "routing thresholds must be within 0..=100".into(),
            ));
        }
        if self.hot_lead_threshold > self.urgent_score_threshold {
            return Err(ConfigError::Validation(format!(
                "routing.hot_lead_threshold ({}) must not exceed routing.urgent_score_threshold ({})",
                self.hot_lead_threshold, self.urgent_score_threshold
            )));
        }
        Ok(())
    }

    pub fn is_hot(&self, lead: &Lead) -> bool {
        lead.lead_score >= self.hot_lead_threshold
    }
}

fn default_hot_threshold() -> u8 {
    50
}
fn default_urgent_threshold() -> u8 {
    75
}

/// First-response windows, in hours.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlaConfig {
    #[serde(default = "default_recruiting_hours")]
    pub recruiting_hours: u32,
    #[serde(default = "default_insurance_hot_hours")]
    pub insurance_hot_hours: u32,
    #[serde(default = "default_insurance_hours")]
    pub insurance_default_hours: u32,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            recruiting_hours: default_recruiting_hours(),
            insurance_hot_hours: default_insurance_hot_hours(),
            insurance_default_hours: default_insurance_hours(),
        }
    }
}

impl SlaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recruiting_hours == 0
            || self.insurance_hot_hours == 0
            || self.insurance_default_hours == 0
        {
            return Err(ConfigError::Validation(
                "sla windows must be at least one hour".into(),
            ));
        }
        Ok(())
    }

    /// Response window for a lead landing in `department` with `score`.
    pub fn window_hours(&self, department: Department, score: u8, urgent_threshold: u8) -> u32 {
        match department {
            Department::Recruiting => self.recruiting_hours,
            Department::Insurance if score >= urgent_threshold => self.insurance_hot_hours,
            Department::Insurance => self.insurance_default_hours,
        }
    }
}

fn default_recruiting_hours() -> u32 {
    4
}
fn default_insurance_hot_hours() -> u32 {
    2
}
fn default_insurance_hours() -> u32 {
    24
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_max_level")]
    pub max_level: u8,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            max_level: default_max_level(),
        }
    }
}

impl EscalationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "escalation.sweep_interval_secs must be greater than 0".into(),
            ));
        }
        if !(1..=MAX_ESCALATION_LEVEL).contains(&self.max_level) {
            return Err(ConfigError::Validation(format!(
                "escalation.max_level must be within 1..={MAX_ESCALATION_LEVEL}, got {}",
                self.max_level
            )));
        }
        Ok(())
    }
}

/// Highest escalation level; reaching it flags the assignment for a human.
pub const MAX_ESCALATION_LEVEL: u8 = 3;

fn default_sweep_interval() -> u64 {
    300
}
fn default_max_level() -> u8 {
    MAX_ESCALATION_LEVEL
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sla_windows_follow_department_and_score() {
        let sla = SlaConfig::default();
        assert_eq!(sla.window_hours(Department::Recruiting, 99, 75), 4);
        assert_eq!(sla.window_hours(Department::Insurance, 75, 75), 2);
        assert_eq!(sla.window_hours(Department::Insurance, 74, 75), 24);
    }
}
