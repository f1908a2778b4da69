//! Coordinator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::strategy::StrategyKind;

/// Default bound on the blocking wait, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;

/// Largest accepted wait bound, in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 60_000;

/// Response header read by the header strategy.
pub const DEFAULT_HEADER_NAME: &str = "X-Adblock-Key";

/// Document element attribute read by the script strategy.
pub const DEFAULT_KEY_ATTRIBUTE: &str = "data-adblockkey";

/// Settings for an [`ExtractionCoordinator`](crate::ExtractionCoordinator).
///
/// Every field has a default, so partial JSON documents are accepted.
///
/// # Examples
///
/// ```
/// use sitekey_core::{CoordinatorConfig, StrategyKind};
///
/// let config = CoordinatorConfig::from_json(r#"{ "strategy": "script", "timeout_ms": 500 }"#)
///     .expect("valid config");
///
/// assert_eq!(config.strategy, StrategyKind::Script);
/// assert_eq!(config.timeout().as_millis(), 500);
/// assert_eq!(config.header_name, "X-Adblock-Key");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Bound on the blocking wait, in milliseconds
    pub timeout_ms: u64,
    /// Whether checks start enabled
    pub enabled: bool,
    /// Which extraction strategy to build
    pub strategy: StrategyKind,
    /// Response header carrying the key (header strategy)
    pub header_name: String,
    /// Document element attribute carrying the key (script strategy)
    pub key_attribute: String,
    /// Only extract for main-frame requests; others wait for the page's check
    pub main_frame_only: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            enabled: true,
            strategy: StrategyKind::default(),
            header_name: DEFAULT_HEADER_NAME.to_string(),
            key_attribute: DEFAULT_KEY_ATTRIBUTE.to_string(),
            main_frame_only: true,
        }
    }
}

impl CoordinatorConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for malformed JSON, unknown fields or
    /// values rejected by [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| Error::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 || self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(Error::InvalidConfig(format!(
                "timeout_ms must be between 1 and {}, got {}",
                MAX_TIMEOUT_MS, self.timeout_ms
            )));
        }
        if !is_header_token(&self.header_name) {
            return Err(Error::InvalidConfig(format!(
                "header_name '{}' is not a valid header name",
                self.header_name
            )));
        }
        if self.key_attribute.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "key_attribute must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The wait bound as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Sets the wait bound.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets whether checks start enabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Selects the strategy.
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the response header name.
    pub fn with_header_name(mut self, header_name: impl Into<String>) -> Self {
        self.header_name = header_name.into();
        self
    }

    /// Sets the document element attribute.
    pub fn with_key_attribute(mut self, key_attribute: impl Into<String>) -> Self {
        self.key_attribute = key_attribute.into();
        self
    }

    /// Sets whether only main-frame requests are checked.
    pub fn with_main_frame_only(mut self, main_frame_only: bool) -> Self {
        self.main_frame_only = main_frame_only;
        self
    }
}

// RFC 7230 token characters.
fn is_header_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^'
                        | b'_' | b'`' | b'|' | b'~'
                )
        })
}
