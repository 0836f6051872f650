use chrono::{Duration, Utc};

use crate::error::AuthError;
use crate::record::TokenRecord;
use crate::registry::AuthRegistry;

/// Mint and persist an access token for `user_id` valid for `ttl`.
///
/// The token type is the registry's current access-token name, so records
/// issued here are exactly the ones the access-token validator accepts.
pub async fn issue_access_token(
    registry: &AuthRegistry,
    user_id: i64,
    sid: impl Into<String>,
    ttl: Duration,
) -> Result<TokenRecord, AuthError> {
    let store = registry.current_db_handler()?;
    let now = Utc::now();
    let record = TokenRecord {
        token: uuid::Uuid::new_v4().simple().to_string(),
        token_type: registry.access_token_field_name(),
        user_id,
        sid: sid.into(),
        created: now,
        modified: now,
        expiration: (now + ttl).timestamp(),
    };

    let record = store.create_token(record).await?;
    tracing::debug!(user_id, token_type = %record.token_type, "access token issued");
    Ok(record)
}

/// Check `secret` against the stored hash with the bound hash handler, then
/// issue an access token.
pub async fn login(
    registry: &AuthRegistry,
    user_id: i64,
    sid: impl Into<String>,
    secret: &str,
    stored_hash: &str,
    ttl: Duration,
) -> Result<TokenRecord, AuthError> {
    let hasher = registry.current_hash_handler()?;
    if secret.is_empty() || !hasher.verify(secret, stored_hash) {
        tracing::debug!(user_id, "login refused");
        return Err(AuthError::InvalidCredential);
    }
    issue_access_token(registry, user_id, sid, ttl).await
}
