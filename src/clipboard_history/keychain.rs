//! Database key handle
//!
//! The at-rest key for the history database lives in the system keyring
//! (keychain on macOS). It is fetched, or generated and stored on first use,
//! once at startup and handed to `Persistence::open`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use tracing::{info, warn};

/// Keyring service name for the database key
pub const KEYCHAIN_SERVICE: &str = "com.clipboard-history";

/// Keyring account name for the database key
pub const KEYCHAIN_ACCOUNT: &str = "db-key";

const KEY_BYTES: usize = 32;

/// Secret used to key the history database
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseKey(String);

impl DatabaseKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Fresh random key: 32 bytes from the OS RNG, base64-encoded
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(BASE64.encode(bytes))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// SQL string literal for `PRAGMA key`, with quotes escaped
    pub(crate) fn pragma_literal(&self) -> String {
        format!("'{}'", self.0.replace('\'', "''"))
    }
}

impl std::fmt::Debug for DatabaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DatabaseKey(<redacted>)")
    }
}

/// Fetch the database key from the system keyring, creating it if absent.
///
/// Returns `None` when the keyring is unavailable; the database is then
/// opened without a key.
pub fn fetch_or_create_key() -> Option<DatabaseKey> {
    fetch_or_create_key_for(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
}

pub fn fetch_or_create_key_for(service: &str, account: &str) -> Option<DatabaseKey> {
    let entry = match keyring::Entry::new(service, account) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(service, account, error = %e, "Error creating keyring entry for database key");
            return None;
        }
    };

    match entry.get_password() {
        Ok(secret) if !secret.is_empty() => {
            info!(service, account, "Loaded database key from keyring");
            return Some(DatabaseKey::new(secret));
        }
        Ok(_) | Err(keyring::Error::NoEntry) => {}
        Err(e) => {
            warn!(service, account, error = %e, "Error retrieving database key");
            return None;
        }
    }

    let key = DatabaseKey::generate();
    match entry.set_password(key.expose()) {
        Ok(()) => {
            info!(service, account, "Stored new database key in keyring");
            Some(key)
        }
        Err(e) => {
            warn!(service, account, error = %e, "Failed to store database key");
            None
        }
    }
}
