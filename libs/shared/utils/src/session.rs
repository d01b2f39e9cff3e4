//! Explicit session/cache context handed to every component at
//! construction. Initialised on sign-in, cleared on sign-out.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use shared_models::auth::{Session, User};

use crate::jwt::{validate_token, TokenError};

#[derive(Debug, Default)]
struct SessionState {
    session: Option<Session>,
    cache: HashMap<String, Value>,
}

#[derive(Debug, Default)]
pub struct SessionContext {
    state: RwLock<SessionState>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that is already signed in, as built per request by the
    /// auth middleware.
    pub fn signed_in(session: Session) -> Arc<Self> {
        let context = Self::new();
        context.install(session);
        Arc::new(context)
    }

    /// Validate `access_token` and make it the current session.
    pub fn sign_in(&self, access_token: &str, jwt_secret: &str) -> Result<User, TokenError> {
        let user = validate_token(access_token, jwt_secret)?;
        self.install(Session::new(user.clone(), access_token));
        info!("User {} signed in", user.id);
        Ok(user)
    }

    fn install(&self, session: Session) {
        let mut state = self.write();
        // Cached data belongs to whoever was signed in before.
        state.cache.clear();
        state.session = Some(session);
    }

    pub fn sign_out(&self) {
        let mut state = self.write();
        if let Some(session) = state.session.take() {
            info!("User {} signed out", session.user.id);
        }
        state.cache.clear();
    }

    pub fn current(&self) -> Option<Session> {
        self.read().session.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.read().session.is_some()
    }

    pub fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let state = self.read();
        let value = state.cache.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub fn store<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.write().cache.insert(key.to_string(), value);
            }
            Err(e) => warn!("Not caching {}: {}", key, e),
        }
    }

    /// Drop every cache entry whose key starts with `prefix`.
    pub fn invalidate(&self, prefix: &str) {
        let mut state = self.write();
        let before = state.cache.len();
        state.cache.retain(|key, _| !key.starts_with(prefix));
        debug!("Invalidated {} cache entries under {}", before - state.cache.len(), prefix);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
