//! Process-wide stream configuration.

use crate::{Error, Result};

use logbuch_backend::BackendKind;

/// Environment variable selecting the backend (`thread` or `native-async`).
pub const BACKEND_ENV: &str = "LOGBUCH_STREAM_BACKEND";

/// Environment variable controlling internal error reporting.
pub const RAISE_EXCEPTIONS_ENV: &str = "LOGBUCH_RAISE_EXCEPTIONS";

/// Stream configuration. Read-only once a manager has been built from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Backend used for newly registered sinks.
    pub backend: BackendKind,

    /// Whether handlers report their internal failures on the error stream.
    pub raise_on_internal_error: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Thread,
            raise_on_internal_error: true,
        }
    }
}

impl Config {
    /// Creates a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedBackend`] for an unknown backend name.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedBackend`] for an unknown backend name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend = match lookup(BACKEND_ENV) {
            Some(value) => value.parse().map_err(Error::UnsupportedBackend)?,
            None => defaults.backend,
        };

        let raise_on_internal_error = lookup(RAISE_EXCEPTIONS_ENV)
            .map_or(defaults.raise_on_internal_error, |value| parse_bool(&value));

        Ok(Self {
            backend,
            raise_on_internal_error,
        })
    }
}

/// Digits are read as an integer (non-zero is true); anything else is true
/// only when it spells `true`.
fn parse_bool(value: &str) -> bool {
    let value = value.trim().to_lowercase();

    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        return !value.trim_start_matches('0').is_empty();
    }

    value == "true"
}

/// Builder for [`Config`].
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    backend: Option<BackendKind>,
    raise_on_internal_error: Option<bool>,
}

impl ConfigBuilder {
    /// Sets the backend.
    #[must_use]
    pub const fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets whether internal errors are reported.
    #[must_use]
    pub const fn raise_on_internal_error(mut self, raise: bool) -> Self {
        self.raise_on_internal_error = Some(raise);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        let defaults = Config::default();

        Config {
            backend: self.backend.unwrap_or(defaults.backend),
            raise_on_internal_error: self
                .raise_on_internal_error
                .unwrap_or(defaults.raise_on_internal_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use assert_matches::assert_matches;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.backend, BackendKind::Thread);
        assert!(config.raise_on_internal_error);
    }

    #[test]
    fn test_backend_from_environment() {
        let config = Config::from_lookup(lookup(&[(BACKEND_ENV, " Native-Async ")])).unwrap();

        assert_eq!(config.backend, BackendKind::NativeAsync);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result = Config::from_lookup(lookup(&[(BACKEND_ENV, "aiofile")]));

        assert_matches!(result, Err(Error::UnsupportedBackend(name)) if name == "aiofile");
    }

    #[test]
    fn test_raise_exceptions_parsing() {
        let cases = [
            ("true", true),
            (" TRUE ", true),
            ("1", true),
            ("0010", true),
            ("0", false),
            ("000", false),
            ("false", false),
            ("yes", false),
            ("", false),
        ];

        for (value, expected) in cases {
            let config = Config::from_lookup(lookup(&[(RAISE_EXCEPTIONS_ENV, value)])).unwrap();
            assert_eq!(config.raise_on_internal_error, expected, "value {value:?}");
        }
    }

    #[test]
    fn test_builder() {
        let config = Config::builder()
            .backend(BackendKind::NativeAsync)
            .raise_on_internal_error(false)
            .build();

        assert_eq!(config.backend, BackendKind::NativeAsync);
        assert!(!config.raise_on_internal_error);
        assert_eq!(Config::builder().build(), Config::default());
    }
}
