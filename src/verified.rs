use std::fmt;

/// A site key that passed signature verification.
///
/// `VerifiedSiteKey` is the payload of [`Verdict::Verified`](crate::Verdict)
/// and proves that the configured verifier accepted the key for the request
/// it was extracted for.
///
/// # Construction Invariants
///
/// There is no public constructor and no `From` conversion. The coordinator
/// creates one only after [`KeyVerifier::verify`](crate::KeyVerifier::verify)
/// returned `true` for a non-empty candidate.
///
/// ```compile_fail
/// use sitekey_core::VerifiedSiteKey;
///
/// // Does not compile - no public constructor:
/// let key = VerifiedSiteKey::new_unchecked("forged".to_string());
/// ```
///
/// # Wire format
///
/// Site keys travel as `<public-key>_<signature>`. [`public_key`](Self::public_key)
/// returns the part before the first `_`, which is what `$sitekey` filter
/// options are matched against.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifiedSiteKey {
    raw: String,
}

impl VerifiedSiteKey {
    /// Wraps a value the verifier accepted.
    ///
    /// Callers must have run the configured verifier on `raw` first; this
    /// constructor performs no check of its own.
    pub(crate) fn new_unchecked(raw: String) -> Self {
        Self { raw }
    }

    /// The full key as extracted, signature included.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The public-key part of the key.
    pub fn public_key(&self) -> &str {
        match self.raw.split_once('_') {
            Some((key, _)) => key,
            None => &self.raw,
        }
    }

    /// Consumes the key and returns the full value.
    pub fn into_inner(self) -> String {
        self.raw
    }
}

impl AsRef<str> for VerifiedSiteKey {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for VerifiedSiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedSiteKey")
            .field("public_key", &self.public_key())
            .finish()
    }
}
