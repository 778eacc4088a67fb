use std::path::{Path, PathBuf};

use chrono::{Duration, FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::handover::ShiftRotation;
use crate::models::ShiftDefinition;

/// Application-level constants
pub const APP_NAME: &str = "ShiftHandover";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest UTC offset chrono accepts, in minutes.
const MAX_OFFSET_MINUTES: i32 = 18 * 60;

/// Get the application data directory
/// ~/ShiftHandover/, or ./ShiftHandover when no home directory is known
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the handover database
pub fn database_path() -> PathBuf {
    app_data_dir().join("handovers.db")
}

/// Default location of the settings file
pub fn settings_path() -> PathBuf {
    app_data_dir().join("settings.json")
}

/// Log filter used when `RUST_LOG` is unset
pub fn default_log_filter() -> &'static str {
    "info,shift_handover_lib=debug"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Site-level settings for the handover service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverSettings {
    /// Offset of the hospital wall clock from UTC; shift hours are local.
    pub site_utc_offset_minutes: i32,
    /// Days after its window date before a `Ready` handover is expired.
    pub expiry_grace_days: i64,
    pub shifts: Vec<ShiftDefinition>,
}

impl Default for HandoverSettings {
    fn default() -> Self {
        let seven = NaiveTime::MIN + Duration::hours(7);
        let nineteen = NaiveTime::MIN + Duration::hours(19);
        Self {
            site_utc_offset_minutes: 0,
            expiry_grace_days: 1,
            shifts: vec![
                ShiftDefinition {
                    id: "day".into(),
                    name: "Day".into(),
                    start_time: seven,
                    end_time: nineteen,
                    order_index: 0,
                },
                ShiftDefinition {
                    id: "night".into(),
                    name: "Night".into(),
                    start_time: nineteen,
                    end_time: seven,
                    order_index: 1,
                },
            ],
        }
    }
}

impl HandoverSettings {
    /// Read and validate settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "No settings file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.site_offset()?;
        if self.expiry_grace_days < 0 {
            return Err(ConfigError::Invalid(format!(
                "expiry_grace_days must not be negative, got {}",
                self.expiry_grace_days
            )));
        }
        self.rotation().map(|_| ())
    }

    pub fn site_offset(&self) -> Result<FixedOffset, ConfigError> {
        if self.site_utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "site_utc_offset_minutes out of range: {}",
                self.site_utc_offset_minutes
            )));
        }
        FixedOffset::east_opt(self.site_utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "site_utc_offset_minutes out of range: {}",
                self.site_utc_offset_minutes
            ))
        })
    }

    pub fn rotation(&self) -> Result<ShiftRotation, ConfigError> {
        ShiftRotation::new(self.shifts.clone())
    }
}
