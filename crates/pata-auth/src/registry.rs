use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::AuthError;
use crate::hash::SecretHasher;
use crate::store::TokenStore;

pub const DEFAULT_ACCESS_TOKEN_NAME: &str = "accessToken";

/// Bindings handed to [`AuthRegistry::init`].
#[derive(Clone)]
pub struct AuthOptions {
    pub db_handler: Arc<dyn TokenStore>,
    pub hash_handler: Arc<dyn SecretHasher>,
    /// Header and token-type name for access tokens.
    pub access_token_name: Option<String>,
}

impl AuthOptions {
    pub fn new(db_handler: Arc<dyn TokenStore>, hash_handler: Arc<dyn SecretHasher>) -> Self {
        Self {
            db_handler,
            hash_handler,
            access_token_name: None,
        }
    }

    pub fn with_access_token_name(mut self, name: impl Into<String>) -> Self {
        self.access_token_name = Some(name.into());
        self
    }
}

struct Bindings {
    db_handler: Arc<dyn TokenStore>,
    hash_handler: Arc<dyn SecretHasher>,
    access_token_name: Option<String>,
}

/// Holder for the adapters the validators use.
///
/// Construct one per process (or per test), share it behind an `Arc`, and call
/// [`init`](Self::init) before validating. Each `init` replaces every binding.
pub struct AuthRegistry {
    default_access_token_name: String,
    bindings: RwLock<Option<Bindings>>,
}

impl Default for AuthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AuthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRegistry")
            .field("initialized", &self.is_initialized())
            .field("access_token_name", &self.access_token_field_name())
            .finish()
    }
}

impl AuthRegistry {
    pub fn new() -> Self {
        Self::with_default_name(DEFAULT_ACCESS_TOKEN_NAME)
    }

    /// Registry whose fallback field name is `name` instead of `accessToken`.
    pub fn with_default_name(name: impl Into<String>) -> Self {
        Self {
            default_access_token_name: name.into(),
            bindings: RwLock::new(None),
        }
    }

    /// Registry already bound to `options`.
    pub fn initialized(options: AuthOptions) -> Self {
        let registry = Self::new();
        registry.init(options);
        registry
    }

    pub fn init(&self, options: AuthOptions) {
        let access_token_name = options.access_token_name.filter(|name| !name.is_empty());
        tracing::debug!(
            access_token_name = access_token_name
                .as_deref()
                .unwrap_or(&self.default_access_token_name),
            "auth registry initialized"
        );
        *self.bindings.write() = Some(Bindings {
            db_handler: options.db_handler,
            hash_handler: options.hash_handler,
            access_token_name,
        });
    }

    /// Drop all bindings, returning the registry to its uninitialized state.
    pub fn reset(&self) {
        *self.bindings.write() = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.bindings.read().is_some()
    }

    pub fn current_db_handler(&self) -> Result<Arc<dyn TokenStore>, AuthError> {
        self.bindings
            .read()
            .as_ref()
            .map(|bindings| bindings.db_handler.clone())
            .ok_or(AuthError::Configuration("no token store bound"))
    }

    pub fn current_hash_handler(&self) -> Result<Arc<dyn SecretHasher>, AuthError> {
        self.bindings
            .read()
            .as_ref()
            .map(|bindings| bindings.hash_handler.clone())
            .ok_or(AuthError::Configuration("no hash handler bound"))
    }

    pub fn access_token_field_name(&self) -> String {
        self.bindings
            .read()
            .as_ref()
            .and_then(|bindings| bindings.access_token_name.clone())
            .unwrap_or_else(|| self.default_access_token_name.clone())
    }
}
