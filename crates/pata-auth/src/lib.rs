//! Token validation core shared by PATA services.
//!
//! Two protocols live here:
//!
//! * the access-token protocol (`withAuth`), which looks a session token up in a
//!   [`TokenStore`] and checks its kind and expiration;
//! * the app-token protocol (`withLoginApp`), which only asks an
//!   [`AppTokenTable`] whether the presented token exists.
//!
//! Adapters are bound through an [`AuthRegistry`] that callers construct and
//! share explicitly; validators read the latest bindings on every call.

pub mod access;
pub mod app;
pub mod error;
pub mod extract;
pub mod hash;
pub mod issue;
pub mod record;
pub mod registry;
#[cfg(feature = "sqlite")]
pub mod sql;
pub mod store;

pub use access::AccessTokenValidator;
pub use app::{AppTokenValidator, APP_TOKEN_FIELD};
pub use error::AuthError;
pub use extract::{extract, CredentialRequest, Lookup};
pub use hash::{Argon2Hasher, FakeHash, SecretHasher};
pub use issue::{issue_access_token, login};
pub use record::{Principal, TokenRecord};
pub use registry::{AuthOptions, AuthRegistry, DEFAULT_ACCESS_TOKEN_NAME};
pub use store::{AppTokenTable, MemoryAppTokenTable, MemoryTokenStore, TokenStore};

/// Current time in epoch seconds, the unit token expirations are stored in.
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
