//! Connection-related data models.
//!
//! This module defines types for database connection configuration.

use serde::{Deserialize, Serialize};

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Connection parameters handed verbatim to the driver for every session.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub db_type: DatabaseType,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub connection_string: String,
}

impl ConnectionConfig {
    /// Create a new connection configuration.
    pub fn new(connection_string: impl Into<String>) -> Result<Self, ConnectionConfigError> {
        let connection_string = connection_string.into();

        if connection_string.trim().is_empty() {
            return Err(ConnectionConfigError::Empty);
        }

        let db_type = DatabaseType::from_connection_string(&connection_string)
            .ok_or_else(|| ConnectionConfigError::UnknownDatabaseType(connection_string.clone()))?;

        Ok(Self {
            db_type,
            connection_string,
        })
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        let s = &self.connection_string;
        let userinfo_start = s.find("://").map(|p| p + 3).unwrap_or(0);
        if let Some(at_pos) = s[userinfo_start..].find('@').map(|p| p + userinfo_start) {
            if let Some(colon_pos) = s[userinfo_start..at_pos].rfind(':') {
                let colon_pos = colon_pos + userinfo_start;
                return format!("{}****{}", &s[..colon_pos + 1], &s[at_pos..]);
            }
        }
        s.clone()
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("db_type", &self.db_type)
            .field("connection_string", &self.masked_connection_string())
            .finish()
    }
}

/// Errors that can occur when creating a connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionConfigError {
    #[error("Connection string cannot be empty")]
    Empty,

    /// Could not determine database type from connection string
    #[error("Unknown database type in connection string: {0}")]
    UnknownDatabaseType(String),

    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid value for option '{key}': {value}")]
    InvalidOption { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_detection() {
        assert_eq!(
            DatabaseType::from_connection_string("mysql://root@localhost/app"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("MariaDB://root@localhost/app"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("sqlite:data.db"),
            Some(DatabaseType::SQLite)
        );
        assert_eq!(
            DatabaseType::from_connection_string("postgres://localhost/app"),
            None
        );
    }

    #[test]
    fn test_default_port() {
        assert_eq!(DatabaseType::MySQL.default_port(), Some(3306));
        assert_eq!(DatabaseType::SQLite.default_port(), None);
    }

    #[test]
    fn test_config_rejects_unknown_scheme() {
        let err = ConnectionConfig::new("redis://localhost").unwrap_err();
        assert!(matches!(err, ConnectionConfigError::UnknownDatabaseType(_)));
        assert!(matches!(
            ConnectionConfig::new("  ").unwrap_err(),
            ConnectionConfigError::Empty
        ));
    }

    #[test]
    fn test_masked_connection_string() {
        let config = ConnectionConfig::new("mysql://app:secret@db:3306/shop").unwrap();
        assert_eq!(
            config.masked_connection_string(),
            "mysql://app:****@db:3306/shop"
        );
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_masked_connection_string_without_password() {
        let config = ConnectionConfig::new("mysql://app@db/shop").unwrap();
        assert_eq!(config.masked_connection_string(), "mysql://app@db/shop");
    }
}
