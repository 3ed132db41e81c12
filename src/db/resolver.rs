//! Name-to-provider and name-to-connection-string resolution.
//!
//! Both resolvers fill their cache once per database name. Only successful
//! resolutions are stored, so a failure is re-evaluated on the next call.
//! Cache keys are the normalized name, the same form the configuration
//! uses for lookups and duplicate detection.

use crate::db::provider::{ConnectionFactory, SharedProviders};
use crate::db::registry::ConfigRegistry;
use crate::error::{DbError, DbResult};
use crate::models::normalize_name;
use crate::security::{Cipher, KeyPair};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves a database name to its provider handle.
pub struct ProviderResolver {
    config: Arc<ConfigRegistry>,
    providers: SharedProviders,
    cache: Mutex<HashMap<String, Arc<dyn ConnectionFactory>>>,
}

impl ProviderResolver {
    pub fn new(config: Arc<ConfigRegistry>, providers: SharedProviders) -> Self {
        Self {
            config,
            providers,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Provider handle for `name`.
    ///
    /// The first successful call fixes the handle for this name: later calls
    /// return the same `Arc` even if the provider registry changes.
    pub fn resolve(&self, name: &str) -> DbResult<Arc<dyn ConnectionFactory>> {
        let key = normalize_name(name);
        // Held across the fill so concurrent first calls resolve once.
        let mut cache = self.cache.lock();
        if let Some(factory) = cache.get(&key) {
            return Ok(Arc::clone(factory));
        }

        let entry = self.config.get(name)?;
        let factory = self
            .providers
            .read()
            .get(&entry.provider)
            .ok_or_else(|| DbError::provider_resolution(&entry.name, &entry.provider))?;

        info!(
            database = %entry.name,
            provider = %entry.provider,
            db_type = %factory.database_type(),
            "Provider resolved"
        );
        cache.insert(key, Arc::clone(&factory));
        Ok(factory)
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.lock().contains_key(&normalize_name(name))
    }
}

impl fmt::Debug for ProviderResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached: Vec<String> = self.cache.lock().keys().cloned().collect();
        f.debug_struct("ProviderResolver")
            .field("cached", &cached)
            .finish()
    }
}

/// Resolves a database name to a usable connection string.
pub struct ConnectionStringResolver {
    config: Arc<ConfigRegistry>,
    cipher: Option<Arc<dyn Cipher>>,
    keys: Option<KeyPair>,
    cache: Mutex<HashMap<String, String>>,
}

impl ConnectionStringResolver {
    pub fn new(
        config: Arc<ConfigRegistry>,
        cipher: Option<Arc<dyn Cipher>>,
        keys: Option<KeyPair>,
    ) -> Self {
        Self {
            config,
            cipher,
            keys,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Connection string for `name`, decrypted when the entry is marked
    /// `Encrypt`. Only the plain value is cached.
    pub fn resolve(&self, name: &str) -> DbResult<String> {
        let key = normalize_name(name);
        let mut cache = self.cache.lock();
        if let Some(value) = cache.get(&key) {
            return Ok(value.clone());
        }

        let entry = self.config.get(name)?;
        if entry.connection_string.trim().is_empty() {
            return Err(DbError::connection_string_missing(&entry.name));
        }

        let value = if entry.encrypted {
            self.decrypt(&entry.name, &entry.connection_string)?
        } else {
            entry.connection_string.clone()
        };

        debug!(
            database = %entry.name,
            encrypted = entry.encrypted,
            "Connection string resolved"
        );
        cache.insert(key, value.clone());
        Ok(value)
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.lock().contains_key(&normalize_name(name))
    }

    fn decrypt(&self, name: &str, cipher_text: &str) -> DbResult<String> {
        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| DbError::decryption_failure(name, "no cipher configured"))?;
        let private_key = self
            .keys
            .as_ref()
            .map(|k| k.private_key.as_str())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DbError::decryption_failure(name, "no private key configured"))?;

        let plain = cipher
            .decrypt(cipher_text.trim(), private_key)
            .map_err(|e| DbError::decryption_failure(name, e.to_string()))?;
        if plain.trim().is_empty() {
            return Err(DbError::decryption_failure(
                name,
                "decrypted connection string is empty",
            ));
        }
        Ok(plain)
    }
}

impl fmt::Debug for ConnectionStringResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionStringResolver")
            .field("has_cipher", &self.cipher.is_some())
            .field("keys", &self.keys)
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}
