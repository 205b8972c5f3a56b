//! Path building from a presented leaf to a trust anchor.
//!
//! Issuer candidates are explored depth-first. A (subject, public key) pair
//! already on the current path is never entered again, and every issuer
//! attempt and signature check is charged to a [`PathBudget`].

use super::helpers::is_self_issued;
use super::TrustStore;
use crate::TrustError;
use x509_parser::prelude::*;

/// Longest path the builder constructs, leaf included.
pub(crate) const MAX_CHAIN_DEPTH: usize = 32;

/// Work allowance for path building.
///
/// A single budget is meant to span one whole peer evaluation, including
/// every presented certificate tried as a candidate leaf.
#[derive(Debug, Clone)]
pub(crate) struct PathBudget {
    signatures: usize,
    attempts: usize,
}

impl PathBudget {
    pub(crate) const SIGNATURES: usize = 100;
    pub(crate) const ATTEMPTS: usize = 200;

    #[cfg(test)]
    pub(crate) fn with_limits(signatures: usize, attempts: usize) -> Self {
        Self {
            signatures,
            attempts,
        }
    }

    fn charge_attempt(&mut self) -> Result<(), TrustError> {
        self.attempts = self.attempts.checked_sub(1).ok_or_else(exhausted)?;
        Ok(())
    }

    fn signed_by(
        &mut self,
        child: &X509Certificate,
        issuer: &X509Certificate,
    ) -> Result<bool, TrustError> {
        self.signatures = self.signatures.checked_sub(1).ok_or_else(exhausted)?;
        Ok(child.verify_signature(Some(issuer.public_key())).is_ok())
    }
}

impl Default for PathBudget {
    fn default() -> Self {
        Self {
            signatures: Self::SIGNATURES,
            attempts: Self::ATTEMPTS,
        }
    }
}

fn exhausted() -> TrustError {
    TrustError::ChainValidationFailed("path building budget exceeded".into())
}

type NodeKey<'a> = (&'a [u8], &'a [u8]);

fn node_key<'a>(cert: &X509Certificate<'a>) -> NodeKey<'a> {
    (cert.tbs_certificate.subject.as_raw(), cert.tbs_certificate.subject_pki.raw)
}

struct Search<'s, 'a> {
    intermediates: &'s [(&'a [u8], X509Certificate<'a>)],
    store: &'s TrustStore,
    budget: &'s mut PathBudget,
    path: Vec<&'a [u8]>,
    on_path: Vec<NodeKey<'a>>,
}

impl<'s, 'a> Search<'s, 'a> {
    /// Try to reach an anchor from `current`, the last certificate of `path`.
    fn extend(&mut self, current: &X509Certificate<'a>, current_der: &[u8]) -> Result<bool, TrustError> {
        // Trusted self-issued certificate: the path is already anchored.
        if is_self_issued(current) && self.store.contains(current_der) {
            return Ok(true);
        }

        let issuer_raw = current.issuer().as_raw();
        if let Some(anchors) = self.store.find_by_subject_raw(issuer_raw) {
            for anchor_der in anchors {
                self.budget.charge_attempt()?;
                let Ok((_, anchor)) = X509Certificate::from_der(anchor_der) else {
                    continue;
                };
                if self.budget.signed_by(current, &anchor)? {
                    return Ok(true);
                }
            }
        }

        if self.path.len() >= MAX_CHAIN_DEPTH {
            return Ok(false);
        }

        let intermediates = self.intermediates;
        for (der, cert) in intermediates {
            if cert.subject().as_raw() != issuer_raw {
                continue;
            }
            let key = node_key(cert);
            if self.on_path.contains(&key) {
                continue;
            }
            self.budget.charge_attempt()?;
            if !self.budget.signed_by(current, cert)? {
                continue;
            }

            self.path.push(*der);
            self.on_path.push(key);
            if self.extend(cert, der)? {
                return Ok(true);
            }
            self.path.pop();
            self.on_path.pop();
        }

        Ok(false)
    }
}

/// Find a path from `leaf_der` through `intermediates` to an anchor in
/// `trust_store`, charging the work to `budget`.
///
/// The returned path starts with the leaf and holds only presented
/// certificates. When no path exists the leaf alone is returned, and
/// anchoring fails later with a descriptive error. Running out of budget is
/// an error of its own.
pub(crate) fn build_path<'a>(
    leaf_der: &'a [u8],
    intermediates: &[(&'a [u8], X509Certificate<'a>)],
    trust_store: &TrustStore,
    budget: &mut PathBudget,
) -> Result<Vec<Vec<u8>>, TrustError> {
    let Ok((_, leaf)) = X509Certificate::from_der(leaf_der) else {
        return Ok(vec![leaf_der.to_vec()]);
    };

    let mut search = Search {
        intermediates,
        store: trust_store,
        budget,
        path: vec![leaf_der],
        on_path: vec![node_key(&leaf)],
    };
    if search.extend(&leaf, leaf_der)? {
        return Ok(search.path.iter().map(|der| der.to_vec()).collect());
    }
    Ok(vec![leaf_der.to_vec()])
}
