use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Short stable class name for structured log fields.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ApplicationError;

    #[test]
    fn error_class_is_stable_per_variant() {
        assert_eq!(
            ApplicationError::Persistence("kv down".to_owned()).error_class(),
            "persistence"
        );
        assert_eq!(ApplicationError::Internal("template".to_owned()).error_class(), "internal");
    }

    #[test]
    fn display_includes_detail() {
        let error = ApplicationError::Integration("provider chain misconfigured".to_owned());
        assert_eq!(error.to_string(), "integration failure: provider chain misconfigured");
    }
}
