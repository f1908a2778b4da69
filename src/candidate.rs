use std::fmt;

/// An untrusted site key candidate reported by an extraction strategy.
///
/// `KeyCandidate` marks material that came straight from a response header
/// or from page markup. Nothing about it has been checked yet, so it only
/// travels from a strategy to the coordinator, which hands it to the
/// configured [`KeyVerifier`](crate::KeyVerifier). Only a successful
/// verification turns it into a [`VerifiedSiteKey`](crate::VerifiedSiteKey).
///
/// # Properties
///
/// - Never empty: surrounding whitespace is trimmed and blank input is refused
/// - The raw value is not readable outside this crate
/// - `Debug` shows only the length, so candidates are safe to log
///
/// # Examples
///
/// ```
/// use sitekey_core::KeyCandidate;
///
/// let candidate = KeyCandidate::new("  MCowBQYDK2VwAyEA_c2lnbmF0dXJl \n").expect("non-empty");
/// assert_eq!(candidate.len(), 29);
/// assert_eq!(format!("{:?}", candidate), "KeyCandidate(29 bytes)");
///
/// assert!(KeyCandidate::new("   ").is_none());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct KeyCandidate {
    // Must stay private: the value is attacker-controlled.
    raw: String,
}

impl KeyCandidate {
    /// Wraps a raw value, returning `None` when nothing but whitespace remains.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self {
                raw: trimmed.to_string(),
            })
        }
    }

    /// Length of the trimmed value in bytes.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Borrows the raw value for verification.
    pub(crate) fn as_raw(&self) -> &str {
        &self.raw
    }

    pub(crate) fn into_raw(self) -> String {
        self.raw
    }
}

impl fmt::Debug for KeyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyCandidate({} bytes)", self.raw.len())
    }
}
