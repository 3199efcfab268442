//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::config::Config;
use crate::crypto::FileCipher;
use crate::db::Database;
use crate::error::Result;
use crate::server::ratelimit::RateLimiter;
use crate::storage::FileStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Book file cipher.
    pub cipher: FileCipher,
    /// Upload directories.
    pub store: FileStore,
    /// Per-client request budgets for the auth endpoints.
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Build state from a validated config and an open database.
    ///
    /// Creates the upload directories if they are missing.
    pub fn new(config: Config, db: Database) -> Result<Self> {
        config.validate()?;

        let cipher = FileCipher::from_base64(&config.storage.encryption_key)?;
        let store = FileStore::new(&config.storage);
        store.ensure_dirs()?;

        let auth = AuthService::new(db.clone(), &config.auth.jwt_secret, config.auth.token_days);

        tracing::debug!(
            files_dir = %store.files_dir().display(),
            covers_dir = %store.covers_dir().display(),
            "Upload directories ready"
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            cipher,
            store,
            limiter: Arc::new(RateLimiter::new()),
        })
    }
}
