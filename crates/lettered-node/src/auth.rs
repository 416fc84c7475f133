//! Management console authentication.
//!
//! A single shared password unlocks the console; each successful login
//! mints a random bearer token that stays valid for the configured
//! session timeout.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("incorrect password")]
    IncorrectPassword,

    #[error("session store poisoned")]
    SessionStore,
}

pub struct Auth {
    password: String,
    session_timeout: Duration,
    sessions: Mutex<HashMap<String, Instant>>,
}

impl Auth {
    pub fn new(password: impl Into<String>, session_timeout: Duration) -> Self {
        Self {
            password: password.into(),
            session_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a new access token if the password matches.
    pub fn login(&self, password: &str) -> Result<String, AuthError> {
        if password != self.password {
            return Err(AuthError::IncorrectPassword);
        }

        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let mut sessions = self.sessions.lock().map_err(|_| AuthError::SessionStore)?;
        sessions.insert(token.clone(), Instant::now() + self.session_timeout);
        Ok(token)
    }

    /// Whether an access token is still usable. Expired sessions are
    /// evicted as a side effect.
    pub fn access_token_valid(&self, token: &str) -> Result<bool, AuthError> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().map_err(|_| AuthError::SessionStore)?;
        sessions.retain(|_, expires_at| *expires_at > now);
        Ok(sessions.contains_key(token))
    }
}
