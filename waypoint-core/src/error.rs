//! Core error types shared by both services

use thiserror::Error;

/// Errors raised by the protocol spine and configuration loading.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Missing required configuration field: {field}")]
    MissingConfig { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Protocol violation: {reason}")]
    Protocol { reason: String },
}

impl CoreError {
    pub fn missing_config(field: impl Into<String>) -> Self {
        Self::MissingConfig {
            field: field.into(),
        }
    }

    pub fn invalid_config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_field_names() {
        let err = CoreError::missing_config("WAYPOINT_JWT_PUBLIC_KEY");
        assert!(err.to_string().contains("WAYPOINT_JWT_PUBLIC_KEY"));

        let err = CoreError::invalid_value("limit", "must be positive");
        assert!(err.to_string().contains("limit"));
        assert!(err.to_string().contains("must be positive"));
    }
}
