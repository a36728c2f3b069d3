// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Client configuration.

/// Environment variable read by [`ClientConfig::from_env`] to enable
/// debug-usage-after-release mode.
pub const ENV_DEBUG_USAGE_AFTER_RELEASE: &str = "VENEER_DEBUG_USAGE_AFTER_RELEASE";

/// Environment variable read by [`ClientConfig::from_env`] to force
/// backtrace capture in release records.
pub const ENV_CAPTURE_BACKTRACES: &str = "VENEER_CAPTURE_BACKTRACES";

/// Settings for a [`Client`](crate::Client).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Name used in logs and traces.
    pub name: String,
    /// Initial state of debug-usage-after-release mode.
    ///
    /// While enabled, releasing a handle captures a
    /// [`ReleaseRecord`](crate::ReleaseRecord) and later misuse of the
    /// handle reports it as the error's cause.
    pub debug_usage_after_release: bool,
    /// Capture a backtrace in every release record regardless of
    /// `RUST_BACKTRACE`.
    pub capture_backtraces: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "client".to_owned(),
            debug_usage_after_release: false,
            capture_backtraces: false,
        }
    }
}

impl ClientConfig {
    /// Default configuration overridden by `VENEER_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).is_some_and(|v| parse_flag(&v));
        Self {
            debug_usage_after_release: flag(ENV_DEBUG_USAGE_AFTER_RELEASE),
            capture_backtraces: flag(ENV_CAPTURE_BACKTRACES),
            ..Self::default()
        }
    }

    /// Sets the client name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the initial debug-usage-after-release mode.
    #[must_use]
    pub fn with_debug_usage_after_release(mut self, enabled: bool) -> Self {
        self.debug_usage_after_release = enabled;
        self
    }

    /// Sets whether release records always carry a backtrace.
    #[must_use]
    pub fn with_capture_backtraces(mut self, enabled: bool) -> Self {
        self.capture_backtraces = enabled;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_off() {
        let config = ClientConfig::default();
        assert!(!config.debug_usage_after_release);
        assert!(!config.capture_backtraces);
    }

    #[test]
    fn lookup_parses_flags() {
        let config = ClientConfig::from_lookup(|key| match key {
            ENV_DEBUG_USAGE_AFTER_RELEASE => Some(" TRUE ".to_owned()),
            ENV_CAPTURE_BACKTRACES => Some("0".to_owned()),
            _ => None,
        });
        assert!(config.debug_usage_after_release);
        assert!(!config.capture_backtraces);
        assert_eq!(config.name, "client");
    }

    #[test]
    fn builder_methods_chain() {
        let config = ClientConfig::default()
            .with_name("wm")
            .with_debug_usage_after_release(true)
            .with_capture_backtraces(true);
        assert_eq!(config.name, "wm");
        assert!(config.debug_usage_after_release && config.capture_backtraces);
    }
}
