//! Poll-cycle configuration.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, WatchResult};
use crate::feed::FeedCategory;
use crate::state::DEFAULT_RETENTION_LIMIT;

/// Tunables for one dispatch coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// How many ids that left the feed stay tracked.
    pub retention_limit: usize,
    /// Parallel delivery workers per cycle.
    pub delivery_workers: usize,
    /// Bound on queued delivery jobs.
    pub delivery_queue_capacity: usize,
    /// Also poll announced-but-not-started maintenance.
    pub include_upcoming_maintenance: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            retention_limit: DEFAULT_RETENTION_LIMIT,
            delivery_workers: 8,
            delivery_queue_capacity: 1024,
            include_upcoming_maintenance: true,
        }
    }
}

impl CycleConfig {
    const MAX_DELIVERY_WORKERS: usize = 256;

    /// Check bounds and hand the config back.
    ///
    /// # Errors
    /// `ValidationError::InvalidConfig` for zero-sized limits or an excessive worker count.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.retention_limit == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "retention_limit must be at least 1".to_string(),
            });
        }
        if self.delivery_workers == 0 || self.delivery_workers > Self::MAX_DELIVERY_WORKERS {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "delivery_workers must be between 1 and {} (got {})",
                    Self::MAX_DELIVERY_WORKERS,
                    self.delivery_workers
                ),
            });
        }
        if self.delivery_queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "delivery_queue_capacity must be at least 1".to_string(),
            });
        }
        Ok(self)
    }

    /// Feed categories to poll each cycle.
    #[must_use]
    pub fn categories(&self) -> Vec<FeedCategory> {
        FeedCategory::polled(self.include_upcoming_maintenance)
    }

    /// Load a JSON config file; a missing file yields the defaults.
    ///
    /// # Errors
    /// `ValidationError::InvalidConfig` for unreadable files (other than "not found"),
    /// invalid JSON, or failed validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> WatchResult<Self> {
        let path = path.as_ref();
        let body = match fs::read_to_string(path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ValidationError::InvalidConfig {
                    reason: format!("reading {}: {e}", path.display()),
                }
                .into())
            }
        };
        let cfg: Self = serde_json::from_str(&body).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("{}: {e}", path.display()),
        })?;
        Ok(cfg.validate()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = CycleConfig::default().validate().unwrap();
        assert_eq!(cfg.retention_limit, 50);
        assert_eq!(cfg.categories().len(), 3);
    }

    #[test]
    fn rejects_zero_limits() {
        let cfg = CycleConfig {
            retention_limit: 0,
            ..CycleConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = CycleConfig {
            delivery_workers: 0,
            ..CycleConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statuscast.json");
        fs::write(&path, r#"{"include_upcoming_maintenance": false, "delivery_workers": 2}"#).unwrap();
        let cfg = CycleConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.delivery_workers, 2);
        assert_eq!(cfg.retention_limit, 50);
        assert_eq!(cfg.categories(), vec![FeedCategory::Incidents, FeedCategory::ActiveMaintenance]);

        let missing = CycleConfig::from_json_file(dir.path().join("absent.json")).unwrap();
        assert_eq!(missing, CycleConfig::default());

        fs::write(&path, r#"{"retention_limit": 0}"#).unwrap();
        assert!(CycleConfig::from_json_file(&path).unwrap_err().is_validation());
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file.
        let err = CycleConfig::from_json_file(dir.path()).unwrap_err();
        assert!(err.is_validation());
        assert!(!err.is_state());
        assert!(!err.is_retryable());
    }
}
