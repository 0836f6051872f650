use std::sync::Arc;

use crate::error::AuthError;
use crate::extract::{extract, CredentialRequest, Lookup};
use crate::now_epoch;
use crate::record::Principal;
use crate::registry::AuthRegistry;

/// Validates session tokens against the store bound in an [`AuthRegistry`].
#[derive(Debug, Clone)]
pub struct AccessTokenValidator {
    registry: Arc<AuthRegistry>,
}

impl AccessTokenValidator {
    pub fn new(registry: Arc<AuthRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AuthRegistry> {
        &self.registry
    }

    /// Header the access token is read from, which is also its token type.
    pub fn field_name(&self) -> String {
        self.registry.access_token_field_name()
    }

    pub async fn validate_request(
        &self,
        request: &CredentialRequest<'_>,
    ) -> Result<Principal, AuthError> {
        let field = self.field_name();
        let token = extract(request, &field, Lookup::HeaderOnly);
        self.validate_at(token.as_deref(), now_epoch()).await
    }

    pub async fn validate(&self, token: Option<&str>) -> Result<Principal, AuthError> {
        self.validate_at(token, now_epoch()).await
    }

    /// Validate `token` as of `now` (epoch seconds).
    ///
    /// Unknown, mistyped and expired tokens all yield
    /// [`AuthError::InvalidCredential`].
    pub async fn validate_at(&self, token: Option<&str>, now: i64) -> Result<Principal, AuthError> {
        let store = self.registry.current_db_handler()?;
        let token_type = self.registry.access_token_field_name();

        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::Unauthenticated),
        };

        let record = store
            .find_token(token, &token_type)
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        if !record.is_valid_at(&token_type, now) {
            tracing::debug!(
                token_type = %token_type,
                expiration = record.expiration,
                now,
                "access token expired"
            );
            return Err(AuthError::InvalidCredential);
        }

        Ok(record.principal())
    }
}
