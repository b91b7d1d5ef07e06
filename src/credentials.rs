//! Credential sources read by the client before every attempt.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

/// Key under which the authentication module stores the session token.
pub const AUTH_TOKEN_KEY: &str = "token";

/// Supplies the credential attached to outgoing requests.
///
/// Called once per physical attempt, so a provider backed by mutable state
/// hands out refreshed tokens on retries.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<String>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn credential(&self) -> Option<String> {
        self()
    }
}

/// Never supplies a credential.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn credential(&self) -> Option<String> {
        None
    }
}

/// Fixed token, e.g. read once from the environment.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken").field(&"<redacted>").finish()
    }
}

impl CredentialProvider for StaticToken {
    fn credential(&self) -> Option<String> {
        non_empty(&self.0)
    }
}

/// Shared key-value store holding the session token.
///
/// The authentication module writes and clears entries; the client only reads
/// [`AUTH_TOKEN_KEY`]. Clones share the same storage.
#[derive(Clone, Default)]
pub struct TokenStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key)
    }

    /// Stores the session token under [`AUTH_TOKEN_KEY`].
    pub fn set_token(&self, token: impl Into<String>) {
        self.set(AUTH_TOKEN_KEY, token);
    }

    pub fn clear_token(&self) {
        self.remove(AUTH_TOKEN_KEY);
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        f.debug_struct("TokenStore").field("keys", &keys).finish()
    }
}

impl CredentialProvider for TokenStore {
    fn credential(&self) -> Option<String> {
        self.get(AUTH_TOKEN_KEY).as_deref().and_then(non_empty)
    }
}

fn non_empty(token: &str) -> Option<String> {
    let trimmed = token.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
