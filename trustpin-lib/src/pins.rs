//! Global pin registry and chain-wide pin matching.

use crate::fingerprint::Fingerprint;
use crate::TrustError;
use parking_lot::RwLock;
use x509_parser::prelude::*;

/// The first certificate in a presented chain whose fingerprint is pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMatch {
    /// Position of the certificate in the presented chain.
    pub index: usize,
    pub fingerprint: Fingerprint,
}

/// Find the first certificate in `chain` whose SHA-256 fingerprint is in
/// `pins`.
///
/// Every presented certificate is checked, not only the leaf. Entries that
/// do not parse as X.509 never match.
pub fn find_pin_match<C: AsRef<[u8]>>(chain: &[C], pins: &[Fingerprint]) -> Option<PinMatch> {
    if pins.is_empty() {
        return None;
    }
    chain.iter().enumerate().find_map(|(index, der)| {
        let der = der.as_ref();
        if X509Certificate::from_der(der).is_err() {
            return None;
        }
        let fingerprint = Fingerprint::of_der(der);
        pins.contains(&fingerprint)
            .then_some(PinMatch { index, fingerprint })
    })
}

/// Whether any certificate in `chain` matches any of `pins`.
pub fn matches<C: AsRef<[u8]>>(chain: &[C], pins: &[Fingerprint]) -> bool {
    find_pin_match(chain, pins).is_some()
}

/// Process-wide set of trusted fingerprints.
///
/// Additions take the write lock; [`PinRegistry::snapshot`] copies the set
/// under the read lock so matching never observes a partial update.
#[derive(Debug, Default)]
pub struct PinRegistry {
    pins: RwLock<Vec<Fingerprint>>,
}

impl PinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fingerprint. Duplicates are ignored.
    pub fn add_global_fingerprint(&self, fingerprint: Fingerprint) {
        let mut pins = self.pins.write();
        if !pins.contains(&fingerprint) {
            pins.push(fingerprint);
            tracing::debug!(%fingerprint, total = pins.len(), "added global pin");
        }
    }

    /// Parse `text` and add it. The registry is left untouched on error.
    pub fn add_global_fingerprint_text(&self, text: &str) -> Result<Fingerprint, TrustError> {
        let fingerprint = Fingerprint::parse(text)?;
        self.add_global_fingerprint(fingerprint);
        Ok(fingerprint)
    }

    pub fn snapshot(&self) -> Vec<Fingerprint> {
        self.pins.read().clone()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.pins.read().contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.pins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.read().is_empty()
    }

    /// [`find_pin_match`] against the current global set.
    pub fn find_match<C: AsRef<[u8]>>(&self, chain: &[C]) -> Option<PinMatch> {
        find_pin_match(chain, &self.pins.read())
    }
}
