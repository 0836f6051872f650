use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored credential, unique per `(token, token_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token: String,
    pub token_type: String,
    pub user_id: i64,
    pub sid: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Epoch seconds after which the token no longer authenticates.
    pub expiration: i64,
}

impl TokenRecord {
    /// Expiration is strict: a token expiring exactly at `now` is rejected.
    pub fn is_valid_at(&self, token_type: &str, now: i64) -> bool {
        self.token_type == token_type && self.expiration > now
    }

    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            sid: self.sid.clone(),
        }
    }
}

/// Identity exposed to handlers after a successful access-token check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: i64,
    pub sid: String,
}
