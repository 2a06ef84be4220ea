//! Account passwords and bearer tokens.
//!
//! Passwords are kept as SHA-256 hex digests. Tokens are opaque random hex
//! strings mapped to the client they were issued to and an expiry.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use crate::ServerError;

/// Token length in bytes (produces 64 hex characters).
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct Session {
    client_id: String,
    expires: DateTime<Utc>,
}

/// Login state shared by the HTTP endpoints and the upgrade check.
pub struct SessionStore {
    accounts: RwLock<HashMap<String, String>>,
    tokens: RwLock<HashMap<String, Session>>,
    lifetime: Duration,
}

impl SessionStore {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            tokens: RwLock::new(HashMap::new()),
            lifetime,
        }
    }

    /// Adds or replaces an account.
    pub fn add_account(&self, client_id: &str, password: &str) {
        self.accounts
            .write()
            .insert(client_id.to_string(), hash_password(password));
    }

    pub fn remove_account(&self, client_id: &str) {
        self.accounts.write().remove(client_id);
        self.revoke_client(client_id);
    }

    /// Checks the password and issues a new token.
    pub fn login(&self, client_id: &str, password: &str) -> Result<String, ServerError> {
        let valid = self
            .accounts
            .read()
            .get(client_id)
            .is_some_and(|digest| constant_time_eq(digest, &hash_password(password)));
        if !valid {
            debug!(client = %client_id, "login rejected");
            return Err(ServerError::InvalidCredentials);
        }
        info!(client = %client_id, "login");
        Ok(self.issue(client_id))
    }

    /// Returns the client a token belongs to.
    pub fn validate(&self, token: &str) -> Result<String, ServerError> {
        let tokens = self.tokens.read();
        let session = tokens
            .iter()
            .find(|(t, _)| constant_time_eq(t, token))
            .map(|(_, s)| s.clone())
            .ok_or(ServerError::Unauthenticated)?;
        if session.expires <= Utc::now() {
            return Err(ServerError::SessionExpired);
        }
        Ok(session.client_id)
    }

    /// Exchanges a valid token for a fresh one. The old token stops working.
    pub fn refresh(&self, token: &str) -> Result<String, ServerError> {
        let client_id = self.validate(token)?;
        self.tokens.write().remove(token);
        debug!(client = %client_id, "token refreshed");
        Ok(self.issue(&client_id))
    }

    /// Revokes every token of the client owning `token`. Returns that client.
    pub fn logout(&self, token: &str) -> Result<String, ServerError> {
        let client_id = self.validate(token)?;
        self.revoke_client(&client_id);
        info!(client = %client_id, "logout");
        Ok(client_id)
    }

    /// Revokes all tokens issued to a client.
    pub fn revoke_client(&self, client_id: &str) {
        self.tokens.write().retain(|_, s| s.client_id != client_id);
    }

    /// Drops expired tokens.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, s| s.expires > now);
        before - tokens.len()
    }

    /// Stores a fresh token. Expired tokens are dropped on the way.
    fn issue(&self, client_id: &str) -> String {
        let token = generate_token();
        let lifetime = chrono::Duration::from_std(self.lifetime).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let expires = now
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut tokens = self.tokens.write();
        tokens.retain(|_, s| s.expires > now);
        tokens.insert(
            token.clone(),
            Session {
                client_id: client_id.to_string(),
                expires,
            },
        );
        token
    }
}

/// Generates a CSPRNG token as a lowercase hex string.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Hex SHA-256 of a password.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        let store = SessionStore::new(Duration::from_secs(60));
        store.add_account("alice", "secret");
        store
    }

    #[test]
    fn generated_token_is_hex() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn password_digest_is_sha256() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn login_then_validate() {
        let store = store();
        let token = store.login("alice", "secret").unwrap();
        assert_eq!(store.validate(&token).unwrap(), "alice");
    }

    #[test]
    fn wrong_password_or_unknown_account_is_rejected() {
        let store = store();
        assert!(matches!(
            store.login("alice", "nope"),
            Err(ServerError::InvalidCredentials)
        ));
        assert!(matches!(
            store.login("bob", "secret"),
            Err(ServerError::InvalidCredentials)
        ));
        assert!(matches!(
            store.validate("garbage"),
            Err(ServerError::Unauthenticated)
        ));
    }

    #[test]
    fn refresh_replaces_the_token() {
        let store = store();
        let old = store.login("alice", "secret").unwrap();
        let new = store.refresh(&old).unwrap();
        assert_ne!(old, new);
        assert!(store.validate(&old).is_err());
        assert_eq!(store.validate(&new).unwrap(), "alice");
    }

    #[test]
    fn logout_revokes_every_token_of_the_client() {
        let store = store();
        store.add_account("bob", "pw");
        let a1 = store.login("alice", "secret").unwrap();
        let a2 = store.login("alice", "secret").unwrap();
        let b = store.login("bob", "pw").unwrap();

        assert_eq!(store.logout(&a1).unwrap(), "alice");
        assert!(store.validate(&a2).is_err());
        assert_eq!(store.validate(&b).unwrap(), "bob");
    }

    #[test]
    fn expired_tokens_are_rejected_and_purged() {
        let store = SessionStore::new(Duration::ZERO);
        store.add_account("alice", "secret");
        let token = store.login("alice", "secret").unwrap();
        assert!(matches!(
            store.validate(&token),
            Err(ServerError::SessionExpired)
        ));
        assert_eq!(store.purge_expired(), 1);
        assert!(matches!(
            store.validate(&token),
            Err(ServerError::Unauthenticated)
        ));
    }

    #[test]
    fn issuing_a_token_drops_expired_ones() {
        let store = SessionStore::new(Duration::from_millis(20));
        store.add_account("alice", "secret");
        store.add_account("bob", "pw");
        let stale: Vec<_> = (0..5).map(|_| store.login("alice", "secret").unwrap()).collect();
        std::thread::sleep(Duration::from_millis(40));

        let fresh = store.login("bob", "pw").unwrap();
        assert_eq!(store.tokens.read().len(), 1);
        for token in &stale {
            assert!(matches!(
                store.validate(token),
                Err(ServerError::Unauthenticated)
            ));
        }
        assert_eq!(store.validate(&fresh).unwrap(), "bob");
        assert_eq!(store.purge_expired(), 0);
    }
}
