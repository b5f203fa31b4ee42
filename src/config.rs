//! Service cache configuration.

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER;
use crate::strategy::RefreshScope;
use serde::{Deserialize, Serialize};

/// Setup-time configuration for a [`ServiceCache`](crate::ServiceCache).
///
/// # Example
///
/// ```
/// use live_cache::config::ServiceConfig;
/// use live_cache::strategy::RefreshScope;
///
/// let config = ServiceConfig::default()
///     .with_name("messages")
///     .with_event_buffer(1024)
///     .with_refresh_scope(RefreshScope::Subscribed);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name of the remote service, used in logs.
    pub service_name: String,

    /// Capacity of the change notification channel.
    ///
    /// Receivers that fall further behind than this see a lag and should
    /// re-read everything they display.
    pub event_buffer: usize,

    /// Keys re-fetched after a successful mutation.
    pub refresh_scope: RefreshScope,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            service_name: "service".to_string(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            refresh_scope: RefreshScope::default(),
        }
    }
}

impl ServiceConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn with_refresh_scope(mut self, scope: RefreshScope) -> Self {
        self.refresh_scope = scope;
        self
    }

    /// Check the configuration before building a cache.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` for an empty name or a zero event buffer.
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(Error::ConfigError("service_name must not be empty".to_string()));
        }
        if self.event_buffer == 0 {
            return Err(Error::ConfigError(
                "event_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh_scope, RefreshScope::AllCached);
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let err = ServiceConfig::default()
            .with_event_buffer(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(ServiceConfig::default().with_name("  ").validate().is_err());
    }

    #[test]
    fn test_config_from_json_uses_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"service_name": "todos"}"#).unwrap();
        assert_eq!(config.service_name, "todos");
        assert_eq!(config.event_buffer, DEFAULT_EVENT_BUFFER);
    }
}
