use std::sync::Arc;

use crate::error::AuthError;
use crate::extract::{extract, CredentialRequest, Lookup};
use crate::store::AppTokenTable;

/// Header and parameter name carrying an application token.
pub const APP_TOKEN_FIELD: &str = "token";

/// Validates first-party application tokens by existence alone.
///
/// App tokens have no expiration; a positive row count authorizes.
#[derive(Clone)]
pub struct AppTokenValidator {
    table: Arc<dyn AppTokenTable>,
}

impl std::fmt::Debug for AppTokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppTokenValidator").finish_non_exhaustive()
    }
}

impl AppTokenValidator {
    pub fn new(table: Arc<dyn AppTokenTable>) -> Self {
        Self { table }
    }

    pub async fn validate_request(&self, request: &CredentialRequest<'_>) -> Result<(), AuthError> {
        let token = extract(request, APP_TOKEN_FIELD, Lookup::HeaderThenParams);
        self.validate(token.as_deref()).await
    }

    pub async fn validate(&self, token: Option<&str>) -> Result<(), AuthError> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::Unauthenticated),
        };

        if self.table.count_where(token, 1).await? > 0 {
            Ok(())
        } else {
            Err(AuthError::InvalidCredential)
        }
    }
}
