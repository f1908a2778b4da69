//! Site key verification.
//!
//! The coordinator only depends on the [`KeyVerifier`] trait. This module
//! also provides [`SignedKeyVerifier`], an Ed25519 check of the
//! `<public-key>_<signature>` format against the request it came with, and
//! [`VerificationConfig`], the replaceable bundle the coordinator reads at
//! resolution time.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use parking_lot::RwLock;
use url::Url;

use crate::error::{Error, Result};
use crate::session::SessionId;

/// Length of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Checks a claimed site key against the request it was extracted for.
///
/// Implementations must be pure with respect to the coordinator: no shared
/// mutable state beyond a read-only trust registry. They may be slow
/// (hashing, signature math); the coordinator calls them outside its lock.
pub trait KeyVerifier: Send + Sync {
    /// Returns `true` if `candidate` is a valid site key for `domain` and `url`.
    fn verify(&self, candidate: &str, domain: &str, url: &Url) -> bool;
}

impl<F> KeyVerifier for F
where
    F: Fn(&str, &str, &Url) -> bool + Send + Sync,
{
    fn verify(&self, candidate: &str, domain: &str, url: &Url) -> bool {
        self(candidate, domain, url)
    }
}

/// Which public keys a [`SignedKeyVerifier`] is willing to accept.
#[derive(Debug, Clone, Default)]
pub enum TrustRegistry {
    /// Any correctly signed key
    #[default]
    Any,
    /// Only the listed keys
    Allowlist(HashSet<[u8; PUBLIC_KEY_LEN]>),
}

impl TrustRegistry {
    /// Builds an allowlist from base64-encoded public keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a key is not valid base64 or not
    /// 32 bytes long.
    pub fn allowlist<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = HashSet::new();
        for key in keys {
            let key = key.as_ref();
            let bytes = decode_fixed::<PUBLIC_KEY_LEN>(key).ok_or_else(|| {
                Error::InvalidConfig(format!("trusted key '{}' is not a base64 Ed25519 key", key))
            })?;
            set.insert(bytes);
        }
        Ok(TrustRegistry::Allowlist(set))
    }

    /// Returns `true` if `key` may be used.
    pub fn trusts(&self, key: &[u8; PUBLIC_KEY_LEN]) -> bool {
        match self {
            TrustRegistry::Any => true,
            TrustRegistry::Allowlist(keys) => keys.contains(key),
        }
    }
}

/// Ed25519 verifier for `<base64 public key>_<base64 signature>` site keys.
///
/// The signed message binds the key to the exact request:
///
/// ```text
/// <path>[?<query>] NUL <host> NUL <user agent>
/// ```
///
/// # Examples
///
/// ```
/// use sitekey_core::{KeyVerifier, SignedKeyVerifier, TrustRegistry, Url};
///
/// let verifier = SignedKeyVerifier::new("TestBrowser/1.0", TrustRegistry::Any);
/// let url = Url::parse("https://example.com/").unwrap();
///
/// // Malformed keys are rejected, never panicking
/// assert!(!verifier.verify("not-a-key", "example.com", &url));
/// ```
#[derive(Debug, Clone)]
pub struct SignedKeyVerifier {
    user_agent: String,
    registry: TrustRegistry,
}

impl SignedKeyVerifier {
    /// Creates a verifier for requests sent with `user_agent`.
    pub fn new(user_agent: impl Into<String>, registry: TrustRegistry) -> Self {
        Self {
            user_agent: user_agent.into(),
            registry,
        }
    }

    /// Returns the user agent included in signed messages.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Builds the message a site owner signs for `url` served from `domain`.
    pub fn signed_message(domain: &str, url: &Url, user_agent: &str) -> Vec<u8> {
        let mut message = String::with_capacity(url.as_str().len() + user_agent.len() + 2);
        message.push_str(url.path());
        if let Some(query) = url.query() {
            message.push('?');
            message.push_str(query);
        }
        message.push('\0');
        message.push_str(domain);
        message.push('\0');
        message.push_str(user_agent);
        message.into_bytes()
    }
}

impl KeyVerifier for SignedKeyVerifier {
    fn verify(&self, candidate: &str, domain: &str, url: &Url) -> bool {
        let Some((key_part, signature_part)) = candidate.split_once('_') else {
            tracing::debug!(domain, "site key has no signature separator");
            return false;
        };
        let Some(key_bytes) = decode_fixed::<PUBLIC_KEY_LEN>(key_part) else {
            tracing::debug!(domain, "site key public key is malformed");
            return false;
        };
        let Some(signature_bytes) = decode_fixed::<SIGNATURE_LEN>(signature_part) else {
            tracing::debug!(domain, "site key signature is malformed");
            return false;
        };
        if !self.registry.trusts(&key_bytes) {
            tracing::debug!(domain, "site key is not in the trust registry");
            return false;
        }
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            tracing::debug!(domain, "site key public key is not a curve point");
            return false;
        };

        let signature = Signature::from_bytes(&signature_bytes);
        let message = Self::signed_message(domain, url, &self.user_agent);
        verifying_key.verify(&message, &signature).is_ok()
    }
}

fn decode_fixed<const N: usize>(encoded: &str) -> Option<[u8; N]> {
    let bytes = B64.decode(encoded).ok()?;
    bytes.try_into().ok()
}

/// Site keys verified for each page session, by URL.
///
/// The coordinator records every accepted key under the session it was
/// verified for, so the filter engine can later look up which `$sitekey`
/// exemptions apply to a URL on that page. A session's entries are dropped
/// when it navigates or is detached; nothing outlives the page it belongs to.
#[derive(Debug, Default)]
pub struct VerifiedKeys {
    by_session: RwLock<HashMap<SessionId, HashMap<String, String>>>,
}

impl VerifiedKeys {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `public_key` as verified for `url` in `session`.
    pub fn record(&self, session: SessionId, url: &Url, public_key: &str) {
        self.by_session
            .write()
            .entry(session)
            .or_default()
            .insert(normalize(url), public_key.to_string());
    }

    /// Returns the public key verified for `url` in `session`, ignoring the
    /// fragment.
    pub fn public_key_for(&self, session: SessionId, url: &Url) -> Option<String> {
        self.by_session
            .read()
            .get(&session)
            .and_then(|keys| keys.get(&normalize(url)).cloned())
    }

    /// Forgets every key recorded for `session`.
    pub fn clear_session(&self, session: SessionId) {
        self.by_session.write().remove(&session);
    }

    /// Number of recorded URLs across all sessions.
    pub fn len(&self) -> usize {
        self.by_session.read().values().map(HashMap::len).sum()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every recorded key.
    pub fn clear(&self) {
        self.by_session.write().clear();
    }
}

fn normalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// The replaceable verification capability handed to the coordinator.
///
/// Cloning is cheap; clones share the verifier and the verified-key record.
#[derive(Clone)]
pub struct VerificationConfig {
    verifier: Arc<dyn KeyVerifier>,
    verified_keys: Arc<VerifiedKeys>,
}

impl VerificationConfig {
    /// Creates a config with a fresh verified-key record.
    pub fn new(verifier: Arc<dyn KeyVerifier>) -> Self {
        Self {
            verifier,
            verified_keys: Arc::new(VerifiedKeys::new()),
        }
    }

    /// Shares an existing verified-key record, e.g. when swapping verifiers
    /// within one session.
    pub fn with_verified_keys(mut self, verified_keys: Arc<VerifiedKeys>) -> Self {
        self.verified_keys = verified_keys;
        self
    }

    /// Returns the verifier.
    pub fn verifier(&self) -> &dyn KeyVerifier {
        self.verifier.as_ref()
    }

    /// Returns the verified-key record.
    pub fn verified_keys(&self) -> &Arc<VerifiedKeys> {
        &self.verified_keys
    }
}

impl fmt::Debug for VerificationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationConfig")
            .field("verified_keys", &self.verified_keys.len())
            .finish_non_exhaustive()
    }
}
