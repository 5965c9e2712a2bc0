use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "landmarkcache";

/// Keychain account under which the places API key is stored.
const API_KEY_ACCOUNT: &str = "places-api-key";

/// OS keychain storage for the places API key.
pub struct CredentialStore;

impl CredentialStore {
    /// Retrieve the places API key, `None` when nothing is stored
    pub fn get_api_key() -> Result<Option<String>> {
        let entry = Entry::new(SERVICE_NAME, API_KEY_ACCOUNT)
            .context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve API key from keychain"),
        }
    }
}
