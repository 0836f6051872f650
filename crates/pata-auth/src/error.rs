use thiserror::Error;

/// Failure taxonomy for credential validation.
///
/// Callers at the HTTP boundary collapse everything except
/// [`AuthError::Configuration`] into a single unauthorized outcome.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential, or an empty one, was presented.
    #[error("no credential presented")]
    Unauthenticated,
    /// The credential is unknown, of the wrong kind, or expired.
    #[error("credential rejected")]
    InvalidCredential,
    /// The backing store failed to answer.
    #[error("authentication backend failed: {0}")]
    Backend(String),
    /// A validator ran before the registry was initialized.
    #[error("authentication layer not configured: {0}")]
    Configuration(&'static str),
}

impl AuthError {
    /// Whether this error should surface as a plain unauthorized response.
    pub fn is_unauthorized(&self) -> bool {
        !matches!(self, AuthError::Configuration(_))
    }

    pub fn backend(error: impl std::fmt::Display) -> Self {
        AuthError::Backend(error.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for AuthError {
    fn from(error: sqlx::Error) -> Self {
        AuthError::backend(error)
    }
}
