use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::AuthError;
use crate::record::TokenRecord;

/// Read/write access to stored access-token records.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn find_token(
        &self,
        token: &str,
        token_type: &str,
    ) -> Result<Option<TokenRecord>, AuthError>;

    async fn create_token(&self, record: TokenRecord) -> Result<TokenRecord, AuthError>;
}

/// Existence lookups against the application-token table.
#[async_trait]
pub trait AppTokenTable: Send + Sync {
    /// Number of rows whose token equals `token`, capped at `limit`.
    async fn count_where(&self, token: &str, limit: u32) -> Result<u64, AuthError>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<(String, String), TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn find_token(
        &self,
        token: &str,
        token_type: &str,
    ) -> Result<Option<TokenRecord>, AuthError> {
        let key = (token.to_string(), token_type.to_string());
        Ok(self.records.read().get(&key).cloned())
    }

    async fn create_token(&self, record: TokenRecord) -> Result<TokenRecord, AuthError> {
        let key = (record.token.clone(), record.token_type.clone());
        let mut records = self.records.write();
        if records.contains_key(&key) {
            return Err(AuthError::backend(format!(
                "token of type {} already exists",
                record.token_type
            )));
        }
        records.insert(key, record.clone());
        Ok(record)
    }
}

#[derive(Debug, Default)]
pub struct MemoryAppTokenTable {
    rows: RwLock<Vec<String>>,
}

impl MemoryAppTokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: RwLock::new(tokens.into_iter().map(Into::into).collect()),
        }
    }

    pub fn insert(&self, token: impl Into<String>) {
        self.rows.write().push(token.into());
    }
}

#[async_trait]
impl AppTokenTable for MemoryAppTokenTable {
    async fn count_where(&self, token: &str, limit: u32) -> Result<u64, AuthError> {
        let matches = self
            .rows
            .read()
            .iter()
            .filter(|row| row.as_str() == token)
            .take(limit as usize)
            .count();
        Ok(matches as u64)
    }
}
