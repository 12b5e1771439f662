//! Config - コントローラの設定
//!
//! 実行中に変えられるのは start/stop の 2 操作だけ。
//! ここの値は起動時に一度だけ読む。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LivingError, Result};

pub const DEFAULT_DISPATCH_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_LABEL_LENGTH: usize = 5;
pub const DEFAULT_SEPARATOR: &str = "----------------";

/// LivingConfig はワーカーとディスパッチャの設定
///
/// JSON の欠けたフィールドは `Default` の値で埋める。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivingConfig {
    /// Period of the task dispatcher.
    pub dispatch_interval_ms: u64,

    /// Length of the random worker label (also the thread name).
    pub label_length: usize,

    /// Line appended between sessions, i.e. before every start but the first.
    pub separator: String,

    /// Stack size of the worker thread in bytes. `None` keeps the platform default.
    pub worker_stack_size: Option<usize>,
}

impl Default for LivingConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: DEFAULT_DISPATCH_INTERVAL_MS,
            label_length: DEFAULT_LABEL_LENGTH,
            separator: DEFAULT_SEPARATOR.to_string(),
            worker_stack_size: None,
        }
    }
}

impl LivingConfig {
    /// JSON から読み込んで検証する
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_dispatch_interval(mut self, interval: Duration) -> Self {
        self.dispatch_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    /// tokio の interval は 0 周期で panic するので、ここで弾く
    pub fn validate(&self) -> Result<()> {
        if self.dispatch_interval_ms == 0 {
            return Err(LivingError::InvalidConfig(
                "dispatch_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.label_length == 0 {
            return Err(LivingError::InvalidConfig(
                "label_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_match_the_two_second_period() {
        let config = LivingConfig::default();
        assert_eq!(config.dispatch_interval(), Duration::from_secs(2));
        assert_eq!(config.label_length, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = LivingConfig::from_json_str(r#"{ "dispatch_interval_ms": 250 }"#).unwrap();
        assert_eq!(config.dispatch_interval(), Duration::from_millis(250));
        assert_eq!(config.label_length, DEFAULT_LABEL_LENGTH);
        assert_eq!(config.separator, DEFAULT_SEPARATOR);
        assert_eq!(config.worker_stack_size, None);
    }

    #[rstest]
    #[case::zero_interval(r#"{ "dispatch_interval_ms": 0 }"#)]
    #[case::zero_label(r#"{ "label_length": 0 }"#)]
    fn rejects_zero_values(#[case] json: &str) {
        let err = LivingConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, LivingError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = LivingConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, LivingError::ConfigParse(_)));
    }

    #[test]
    fn with_dispatch_interval_overrides_period() {
        let config = LivingConfig::default().with_dispatch_interval(Duration::from_millis(40));
        assert_eq!(config.dispatch_interval_ms, 40);
    }
}
