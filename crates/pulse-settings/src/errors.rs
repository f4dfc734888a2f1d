use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// Bad JSON syntax, or a value of the wrong type for its key.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),

    /// Well-formed but unusable, e.g. a zero capacity or duplicate service.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_keeps_cause() {
        let err: SettingsError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, SettingsError::Io(_)));
        assert_eq!(err.to_string(), "cannot read settings file: denied");
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("duplicate service name: claude".into());
        assert_eq!(
            err.to_string(),
            "invalid settings value: duplicate service name: claude"
        );
    }
}
