//! Validated listener configuration.
//!
//! A listener instance is configured from a loose `settings` table in the
//! descriptor.  The table is intentionally untyped (`toml::Value`) because
//! operators write it by hand: integers may be given either as TOML integers
//! or as numeric strings (`port = "9000"`).  [`ListenerConfig::from_settings`]
//! turns that table into a typed, validated value or a [`ConfigError`] that
//! names the offending parameter.

use std::collections::BTreeMap;

use thiserror::Error;

/// Setting key: interface to bind.  Empty or absent means all interfaces.
pub const SETTING_INTERFACE: &str = "ifc";
/// Setting key: TCP port to listen on.
pub const SETTING_PORT: &str = "port";
/// Setting key: listen backlog.
pub const SETTING_BACKLOG: &str = "backof";
/// Setting key: per-read buffer size in bytes.
pub const SETTING_BUFSIZE: &str = "bufsize";

/// Errors raised while configuring a listener instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing mandatory parameter {0}")]
    MissingParameter(&'static str),

    #[error("invalid value for parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("missing client endpoint \"{0}\"")]
    MissingEndpoint(&'static str),
}

/// Typed configuration for one listener instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Interface name or address.  Empty means all interfaces.
    pub interface: String,
    /// Port to bind.  `0` asks the OS for an ephemeral port.
    pub port: u16,
    /// Maximum number of pending connections.
    pub backlog: u32,
    /// Size of the buffer each session reads into.  Always greater than zero.
    pub bufsize: usize,
}

impl ListenerConfig {
    /// Builds a config from a descriptor `settings` table.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingParameter`] when `port`, `backof` or `bufsize`
    ///   is absent, or `bufsize` is zero or negative.
    /// - [`ConfigError::InvalidParameter`] when a value has the wrong type or
    ///   is out of range.
    pub fn from_settings(settings: &BTreeMap<String, toml::Value>) -> Result<Self, ConfigError> {
        let interface = setting_string(settings, SETTING_INTERFACE)?.unwrap_or_default();

        let port = setting_int(settings, SETTING_PORT)?
            .ok_or(ConfigError::MissingParameter(SETTING_PORT))?;
        let port = u16::try_from(port).map_err(|_| ConfigError::InvalidParameter {
            name: SETTING_PORT,
            reason: format!("{port} is not a valid TCP port"),
        })?;

        let backlog = setting_int(settings, SETTING_BACKLOG)?
            .ok_or(ConfigError::MissingParameter(SETTING_BACKLOG))?;
        let backlog = u32::try_from(backlog).map_err(|_| ConfigError::InvalidParameter {
            name: SETTING_BACKLOG,
            reason: format!("{backlog} is not a valid backlog"),
        })?;

        // A non-positive buffer size is treated the same as a missing one.
        let bufsize = setting_int(settings, SETTING_BUFSIZE)?
            .filter(|size| *size > 0)
            .ok_or(ConfigError::MissingParameter(SETTING_BUFSIZE))?;
        let bufsize = usize::try_from(bufsize).map_err(|_| ConfigError::InvalidParameter {
            name: SETTING_BUFSIZE,
            reason: format!("{bufsize} is too large"),
        })?;

        Ok(Self {
            interface,
            port,
            backlog,
            bufsize,
        })
    }

    /// Returns `true` when the listener binds every interface.
    pub fn binds_all_interfaces(&self) -> bool {
        self.interface.is_empty()
    }
}

/// Reads an integer setting, accepting numeric strings.
fn setting_int(
    settings: &BTreeMap<String, toml::Value>,
    name: &'static str,
) -> Result<Option<i64>, ConfigError> {
    match settings.get(name) {
        None => Ok(None),
        Some(toml::Value::Integer(value)) => Ok(Some(*value)),
        Some(toml::Value::String(text)) => {
            text.trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidParameter {
                    name,
                    reason: format!("\"{text}\" is not an integer"),
                })
        }
        Some(other) => Err(ConfigError::InvalidParameter {
            name,
            reason: format!("expected an integer, found {}", other.type_str()),
        }),
    }
}

fn setting_string(
    settings: &BTreeMap<String, toml::Value>,
    name: &'static str,
) -> Result<Option<String>, ConfigError> {
    match settings.get(name) {
        None => Ok(None),
        Some(toml::Value::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(ConfigError::InvalidParameter {
            name,
            reason: format!("expected a string, found {}", other.type_str()),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(entries: &[(&str, toml::Value)]) -> BTreeMap<String, toml::Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn complete() -> BTreeMap<String, toml::Value> {
        settings(&[
            ("ifc", toml::Value::from("127.0.0.1")),
            ("port", toml::Value::from(9000)),
            ("backof", toml::Value::from(16)),
            ("bufsize", toml::Value::from(1024)),
        ])
    }

    #[test]
    fn test_complete_settings_produce_config() {
        let config = ListenerConfig::from_settings(&complete()).unwrap();

        assert_eq!(
            config,
            ListenerConfig {
                interface: "127.0.0.1".to_string(),
                port: 9000,
                backlog: 16,
                bufsize: 1024,
            }
        );
        assert!(!config.binds_all_interfaces());
    }

    #[test]
    fn test_missing_interface_binds_all_interfaces() {
        // Arrange
        let mut table = complete();
        table.remove("ifc");

        // Act
        let config = ListenerConfig::from_settings(&table).unwrap();

        // Assert
        assert_eq!(config.interface, "");
        assert!(config.binds_all_interfaces());
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        // Arrange
        let mut table = complete();
        table.insert("port".to_string(), toml::Value::from("9100"));
        table.insert("bufsize".to_string(), toml::Value::from(" 64 "));

        // Act
        let config = ListenerConfig::from_settings(&table).unwrap();

        // Assert
        assert_eq!(config.port, 9100);
        assert_eq!(config.bufsize, 64);
    }

    #[test]
    fn test_each_mandatory_parameter_is_reported_by_name() {
        for key in ["port", "backof", "bufsize"] {
            // Arrange
            let mut table = complete();
            table.remove(key);

            // Act
            let err = ListenerConfig::from_settings(&table).unwrap_err();

            // Assert
            assert_eq!(err, ConfigError::MissingParameter(key));
            assert_eq!(err.to_string(), format!("missing mandatory parameter {key}"));
        }
    }

    #[test]
    fn test_zero_or_negative_bufsize_is_missing() {
        for size in [0, -8] {
            let mut table = complete();
            table.insert("bufsize".to_string(), toml::Value::from(size));

            let err = ListenerConfig::from_settings(&table).unwrap_err();

            assert_eq!(err, ConfigError::MissingParameter("bufsize"));
        }
    }

    #[test]
    fn test_port_zero_is_allowed() {
        let mut table = complete();
        table.insert("port".to_string(), toml::Value::from(0));

        let config = ListenerConfig::from_settings(&table).unwrap();

        assert_eq!(config.port, 0);
    }

    #[test]
    fn test_out_of_range_port_is_invalid() {
        let mut table = complete();
        table.insert("port".to_string(), toml::Value::from(70_000));

        let err = ListenerConfig::from_settings(&table).unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidParameter { name: "port", .. }
        ));
    }

    #[test]
    fn test_negative_backlog_is_invalid() {
        let mut table = complete();
        table.insert("backof".to_string(), toml::Value::from(-1));

        let err = ListenerConfig::from_settings(&table).unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidParameter { name: "backof", .. }
        ));
    }

    #[test]
    fn test_non_numeric_string_is_invalid_not_missing() {
        let mut table = complete();
        table.insert("port".to_string(), toml::Value::from("http"));

        let err = ListenerConfig::from_settings(&table).unwrap_err();

        assert_eq!(
            err,
            ConfigError::InvalidParameter {
                name: "port",
                reason: "\"http\" is not an integer".to_string(),
            }
        );
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        let mut table = complete();
        table.insert("ifc".to_string(), toml::Value::from(42));

        let err = ListenerConfig::from_settings(&table).unwrap_err();

        assert_eq!(
            err.to_string(),
            "invalid value for parameter ifc: expected a string, found integer"
        );
    }
}
