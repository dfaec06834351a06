//! Dispatch configuration

use crate::core::error::{DispatchError, DispatchResult};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Longest accepted suppression window (one day)
pub const MAX_SUPPRESSION_WINDOW_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 1 frame out of `frame_skip` goes to full inference
    pub frame_skip: u64,
    /// Detector score floor, in [0, 1]
    pub confidence_threshold: f32,
    /// Detector input size (the exported model is square)
    pub input_size: u32,
    pub suppression_window_secs: u64,
    /// Nominal payload booked for every pass (t)
    pub nominal_tonnage: u32,
    pub db_path: PathBuf,
    pub model_path: PathBuf,
    /// `None` = unbounded queue between the callback thread and the consumer
    pub queue_capacity: Option<usize>,
    /// Extra attempts after a failed durable append
    pub append_retries: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            frame_skip: 4,
            confidence_threshold: 0.75,
            input_size: 640,
            suppression_window_secs: 300,
            nominal_tonnage: 200,
            db_path: PathBuf::from("haul_detections.db"),
            model_path: PathBuf::from("best_float32.tflite"),
            queue_capacity: None,
            append_retries: 1,
        }
    }
}

impl DispatchConfig {
    pub fn from_json5_str(text: &str) -> DispatchResult<Self> {
        let config: DispatchConfig = json5::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json5_file<P: AsRef<Path>>(path: P) -> DispatchResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json5_str(&text)
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.frame_skip == 0 {
            return Err(DispatchError::InvalidConfig(
                "frame_skip must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DispatchError::InvalidConfig(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.suppression_window_secs == 0 {
            return Err(DispatchError::InvalidConfig(
                "suppression_window_secs must be positive".to_string(),
            ));
        }
        if self.suppression_window_secs > MAX_SUPPRESSION_WINDOW_SECS {
            return Err(DispatchError::InvalidConfig(format!(
                "suppression_window_secs {} exceeds {}",
                self.suppression_window_secs, MAX_SUPPRESSION_WINDOW_SECS
            )));
        }
        if self.input_size == 0 {
            return Err(DispatchError::InvalidConfig(
                "input_size must be positive".to_string(),
            ));
        }
        if self.queue_capacity == Some(0) {
            return Err(DispatchError::InvalidConfig(
                "queue_capacity must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn suppression_window(&self) -> TimeDelta {
        TimeDelta::seconds(self.suppression_window_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_field_setup() {
        let config = DispatchConfig::default();
        assert_eq!(config.frame_skip, 4);
        assert_eq!(config.suppression_window(), TimeDelta::minutes(5));
        assert_eq!(config.nominal_tonnage, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json5_partial_override() {
        let text = r#"{
            // phone is slow on night shift
            frame_skip: 6,
            queue_capacity: 32,
        }"#;
        let config = DispatchConfig::from_json5_str(text).unwrap();
        assert_eq!(config.frame_skip, 6);
        assert_eq!(config.queue_capacity, Some(32));
        assert_eq!(config.suppression_window_secs, 300);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = DispatchConfig::from_json5_str("{ frame_skip: 0 }");
        assert!(matches!(result, Err(DispatchError::InvalidConfig(_))));

        let result = DispatchConfig::from_json5_str("{ confidence_threshold: 1.5 }");
        assert!(matches!(result, Err(DispatchError::InvalidConfig(_))));

        let result = DispatchConfig::from_json5_str("{ queue_capacity: 0 }");
        assert!(matches!(result, Err(DispatchError::InvalidConfig(_))));
    }

    #[test]
    fn test_suppression_window_upper_bound() {
        let result =
            DispatchConfig::from_json5_str("{ suppression_window_secs: 1000000000000000 }");
        assert!(matches!(result, Err(DispatchError::InvalidConfig(_))));

        let result = DispatchConfig::from_json5_str("{ suppression_window_secs: 86401 }");
        assert!(matches!(result, Err(DispatchError::InvalidConfig(_))));

        let config = DispatchConfig::from_json5_str("{ suppression_window_secs: 86400 }").unwrap();
        assert_eq!(config.suppression_window(), TimeDelta::days(1));
    }

    #[test]
    fn test_config_file_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.json5");
        std::fs::write(&path, "{ nominal_tonnage: 220, db_path: 'site.db' }").unwrap();

        let config = DispatchConfig::from_json5_file(&path).unwrap();
        assert_eq!(config.nominal_tonnage, 220);
        assert_eq!(config.db_path, PathBuf::from("site.db"));
    }

    #[test]
    fn test_missing_config_file_is_io_error() {
        let result = DispatchConfig::from_json5_file("/nonexistent/dispatch.json5");
        assert!(matches!(result, Err(DispatchError::Io(_))));
    }
}
