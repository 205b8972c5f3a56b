//! Certificate chain verification against a trust store.
//!
//! Verifies X.509 chains by checking signatures, validity dates, basic
//! constraints and trust anchoring against a [`TrustStore`]. [`verify_leaf`]
//! first builds a path from a leaf through untrusted intermediates, then
//! hands the path to [`verify_chain`].

mod chain;
mod checks;
mod helpers;
mod names;
mod trust_store;

use crate::TrustError;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use x509_parser::prelude::*;

use chain::{build_path, MAX_CHAIN_DEPTH};
pub(crate) use chain::PathBudget;
pub(crate) use names::matches_host;

use checks::{
    check_chain_basic_constraints, check_chain_critical_extensions, check_chain_key_cert_sign,
    check_chain_name_constraints, check_chain_signatures, check_chain_time_validity,
    check_trusted_root, verify_trust_anchoring,
};

pub use trust_store::{find_system_ca_bundle, TrustStore};

use helpers::{extract_serial_hex, extract_short_name, is_self_issued};

/// Result of certificate chain verification.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    /// Whether the entire chain verified successfully.
    pub is_valid: bool,
    /// Information about each certificate in the verified chain (leaf to root).
    pub chain: Vec<ChainCertInfo>,
    /// List of verification errors encountered (empty if `is_valid` is true).
    pub errors: Vec<String>,
}

impl VerificationResult {
    /// Convert a failed result into [`TrustError::ChainValidationFailed`].
    pub fn into_result(self) -> Result<Self, TrustError> {
        if self.is_valid {
            Ok(self)
        } else {
            Err(TrustError::ChainValidationFailed(self.errors.join("; ")))
        }
    }
}

impl std::fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: [short_name], [serial], [OK/FAIL], [optional reason]
        if let Some(leaf) = self.chain.first() {
            write!(f, "{}, {}, ", leaf.short_name, leaf.serial)?;
        }
        if self.is_valid {
            write!(f, "OK")?;
        } else {
            write!(f, "FAIL")?;
            if !self.errors.is_empty() {
                write!(f, ", {}", self.errors.join("; "))?;
            }
        }
        Ok(())
    }
}

/// Information about a certificate in the verified chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainCertInfo {
    /// Position in chain (0 = leaf).
    pub depth: usize,
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Short human-readable name derived from CN, O, or OU.
    pub short_name: String,
    /// Serial number as colon-separated hex.
    pub serial: String,
}

impl ChainCertInfo {
    /// Describe a DER-encoded certificate placed at `depth`.
    pub fn from_der(depth: usize, der: &[u8]) -> Result<Self, TrustError> {
        let (_, x509) = X509Certificate::from_der(der)
            .map_err(|e| TrustError::MalformedCertificate(e.to_string()))?;
        Ok(Self::from_x509(depth, &x509))
    }

    pub(crate) fn from_x509(depth: usize, x509: &X509Certificate) -> Self {
        Self {
            depth,
            subject: x509.subject().to_string(),
            issuer: x509.issuer().to_string(),
            short_name: extract_short_name(x509),
            serial: extract_serial_hex(x509),
        }
    }
}

/// Options controlling verification behavior.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Whether to check certificate validity dates.
    pub check_time: bool,
    /// Verify at a specific Unix timestamp instead of the current time.
    pub at_time: Option<i64>,
    /// Maximum number of non-self-issued intermediates. Defaults to 32.
    pub verify_depth: Option<usize>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            check_time: true,
            at_time: None,
            verify_depth: None,
        }
    }
}

impl VerifyOptions {
    fn now_ts(&self) -> i64 {
        self.at_time.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64
        })
    }
}

/// Verify `leaf_der` against `trust_store`, using `intermediates` as the
/// untrusted pool for path building.
///
/// Intermediates that fail to parse are ignored. The leaf itself is never
/// used as its own intermediate. Path building runs on a bounded work
/// budget; exhausting it fails with [`TrustError::ChainValidationFailed`].
pub fn verify_leaf<I>(
    leaf_der: &[u8],
    intermediates: I,
    trust_store: &TrustStore,
    options: &VerifyOptions,
) -> Result<VerificationResult, TrustError>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    verify_leaf_within(
        leaf_der,
        intermediates,
        trust_store,
        options,
        &mut PathBudget::default(),
    )
}

/// [`verify_leaf`] charging path building to a caller-owned budget.
pub(crate) fn verify_leaf_within<I>(
    leaf_der: &[u8],
    intermediates: I,
    trust_store: &TrustStore,
    options: &VerifyOptions,
    budget: &mut PathBudget,
) -> Result<VerificationResult, TrustError>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let owned: Vec<I::Item> = intermediates.into_iter().collect();
    let ders: Vec<&[u8]> = owned.iter().map(|c| c.as_ref()).collect();
    let pool: Vec<(&[u8], X509Certificate)> = ders
        .into_iter()
        .filter(|der| *der != leaf_der)
        .filter_map(|der| X509Certificate::from_der(der).ok().map(|(_, x)| (der, x)))
        .collect();

    let path = build_path(leaf_der, &pool, trust_store, budget)?;
    verify_chain(&path, trust_store, options)
}

/// Verify a certificate chain provided as a list of DER-encoded certificates.
///
/// The chain should be ordered leaf-first: `[leaf, intermediate..., (optional root)]`.
///
/// Checks performed:
/// 1. Chain depth limit
/// 2. Validity dates for all certificates, unless `options.check_time` is off
/// 3. Basic constraints and keyCertSign on every issuer
/// 4. Unknown critical extensions
/// 5. Name constraints of every CA, the trusted root included
/// 6. Signature verification at each link in the chain
/// 7. Trust anchoring (the chain must terminate at a trusted root)
#[allow(clippy::indexing_slicing)]
pub fn verify_chain(
    chain_der: &[Vec<u8>],
    trust_store: &TrustStore,
    options: &VerifyOptions,
) -> Result<VerificationResult, TrustError> {
    if chain_der.is_empty() {
        return Err(TrustError::ChainValidationFailed(
            "empty certificate chain".into(),
        ));
    }

    let max_depth = options.verify_depth.unwrap_or(MAX_CHAIN_DEPTH);
    let now_ts = options.now_ts();

    let parsed: Vec<(&[u8], X509Certificate)> = chain_der
        .iter()
        .enumerate()
        .map(|(i, der)| {
            X509Certificate::from_der(der)
                .map(|(_, x509)| (der.as_slice(), x509))
                .map_err(|e| {
                    TrustError::ChainValidationFailed(format!(
                        "failed to parse certificate at depth {}: {}",
                        i, e
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    // RFC 5280 Section 6.1: self-issued certificates do not count toward
    // the depth limit.
    let num_intermediates = parsed
        .iter()
        .skip(1)
        .filter(|(_, cert)| !is_self_issued(cert))
        .count();
    if num_intermediates > max_depth {
        return Err(TrustError::ChainValidationFailed(format!(
            "certificate chain exceeds maximum depth of {} (has {} non-self-issued intermediates)",
            max_depth, num_intermediates
        )));
    }

    let mut chain_info: Vec<ChainCertInfo> = parsed
        .iter()
        .enumerate()
        .map(|(i, (_, x509))| ChainCertInfo::from_x509(i, x509))
        .collect();
    let subjects: Vec<String> = chain_info.iter().map(|c| c.subject.clone()).collect();
    let issuers: Vec<String> = chain_info.iter().map(|c| c.issuer.clone()).collect();

    let mut errors = Vec::new();

    if options.check_time {
        check_chain_time_validity(&parsed, &subjects, now_ts, &mut errors);
    }
    check_chain_basic_constraints(&parsed, &subjects, &mut errors);
    check_chain_critical_extensions(&parsed, &subjects, &mut errors);
    check_chain_name_constraints(&parsed, &subjects, &mut errors);
    check_chain_key_cert_sign(&parsed, &subjects, &mut errors);
    check_chain_signatures(&parsed, &subjects, &mut errors);

    let trusted_root_der = verify_trust_anchoring(
        &parsed,
        &subjects,
        &issuers,
        trust_store,
        &mut chain_info,
        &mut errors,
    )?;

    if let Some(ref root_der) = trusted_root_der {
        let at = options.check_time.then_some(now_ts);
        check_trusted_root(root_der, &parsed, &subjects, at, &mut errors);
    }

    Ok(VerificationResult {
        is_valid: errors.is_empty(),
        chain: chain_info,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};

    struct Issued {
        cert: rcgen::Certificate,
        key: KeyPair,
    }

    fn root(cn: &str) -> Issued {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        Issued { cert, key }
    }

    fn issue(issuer: &Issued, cn: &str, ca: bool) -> Issued {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![format!("{cn}.test")]).unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        if ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        }
        let cert = params
            .signed_by(&key, &issuer.cert, &issuer.key)
            .unwrap();
        Issued { cert, key }
    }

    fn store_with(certs: &[&Issued]) -> TrustStore {
        let mut store = TrustStore::new();
        for c in certs {
            store.add_der(c.cert.der()).unwrap();
        }
        store
    }

    #[test]
    fn leaf_signed_by_trusted_root() {
        let ca = root("Test Root");
        let leaf = issue(&ca, "leaf", false);
        let store = store_with(&[&ca]);

        let result = verify_leaf(
            leaf.cert.der(),
            Vec::<Vec<u8>>::new(),
            &store,
            &VerifyOptions::default(),
        )
        .unwrap();
        assert!(result.is_valid, "{:?}", result.errors);
        assert_eq!(result.chain.len(), 2);
        assert_eq!(result.chain[1].short_name, "Test Root");
    }

    #[test]
    fn intermediate_from_pool_completes_path() {
        let ca = root("Test Root");
        let inter = issue(&ca, "Intermediate", true);
        let leaf = issue(&inter, "leaf", false);
        let store = store_with(&[&ca]);

        let pool = vec![inter.cert.der().to_vec()];
        let result = verify_leaf(leaf.cert.der(), &pool, &store, &VerifyOptions::default())
            .unwrap();
        assert!(result.is_valid, "{:?}", result.errors);
        assert_eq!(result.chain.len(), 3);
    }

    #[test]
    fn missing_intermediate_fails() {
        let ca = root("Test Root");
        let inter = issue(&ca, "Intermediate", true);
        let leaf = issue(&inter, "leaf", false);
        let store = store_with(&[&ca]);

        let result = verify_leaf(
            leaf.cert.der(),
            Vec::<Vec<u8>>::new(),
            &store,
            &VerifyOptions::default(),
        )
        .unwrap();
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("unable to find trusted root"));
        assert!(result.into_result().is_err());
    }

    #[test]
    fn untrusted_root_fails() {
        let ca = root("Untrusted Root");
        let leaf = issue(&ca, "leaf", false);
        let result = verify_leaf(
            leaf.cert.der(),
            Vec::<Vec<u8>>::new(),
            &TrustStore::new(),
            &VerifyOptions::default(),
        )
        .unwrap();
        assert!(!result.is_valid);
    }

    #[test]
    fn trusted_self_signed_leaf_is_accepted() {
        let ca = root("Pinned Self Signed");
        let store = store_with(&[&ca]);
        let result = verify_chain(
            &[ca.cert.der().to_vec()],
            &store,
            &VerifyOptions::default(),
        )
        .unwrap();
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn non_ca_issuer_is_rejected() {
        let ca = root("Test Root");
        let not_ca = issue(&ca, "NotCA", false);
        let leaf = issue(&not_ca, "leaf", false);
        let store = store_with(&[&ca]);

        let chain = vec![leaf.cert.der().to_vec(), not_ca.cert.der().to_vec()];
        let result = verify_chain(&chain, &store, &VerifyOptions::default()).unwrap();
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("not a CA")));
    }

    #[test]
    fn expired_leaf_is_rejected() {
        let ca = root("Test Root");
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["old.test".to_string()]).unwrap();
        params.not_before = rcgen::date_time_ymd(2000, 1, 1);
        params.not_after = rcgen::date_time_ymd(2001, 1, 1);
        let leaf = params.signed_by(&key, &ca.cert, &ca.key).unwrap();
        let store = store_with(&[&ca]);

        let result = verify_leaf(
            leaf.der(),
            Vec::<Vec<u8>>::new(),
            &store,
            &VerifyOptions::default(),
        )
        .unwrap();
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("expired")));

        let lenient = VerifyOptions {
            check_time: false,
            ..VerifyOptions::default()
        };
        let result = verify_leaf(leaf.der(), Vec::<Vec<u8>>::new(), &store, &lenient).unwrap();
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn empty_chain_is_an_error() {
        assert!(matches!(
            verify_chain(&[], &TrustStore::new(), &VerifyOptions::default()),
            Err(TrustError::ChainValidationFailed(_))
        ));
    }

    #[test]
    fn display_reports_status() {
        let ca = root("Display Root");
        let leaf = issue(&ca, "display", false);
        let store = store_with(&[&ca]);
        let result = verify_leaf(
            leaf.cert.der(),
            Vec::<Vec<u8>>::new(),
            &store,
            &VerifyOptions::default(),
        )
        .unwrap();
        let text = result.to_string();
        assert!(text.starts_with("display, "));
        assert!(text.ends_with("OK"));
    }

    fn constrained_ca(issuer: &Issued, cn: &str, permitted: &str) -> Issued {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.name_constraints = Some(rcgen::NameConstraints {
            permitted_subtrees: vec![rcgen::GeneralSubtree::DnsName(permitted.to_string())],
            excluded_subtrees: vec![],
        });
        let cert = params
            .signed_by(&key, &issuer.cert, &issuer.key)
            .unwrap();
        Issued { cert, key }
    }

    fn leaf_for(issuer: &Issued, host: &str) -> Vec<u8> {
        let key = KeyPair::generate().unwrap();
        CertificateParams::new(vec![host.to_string()])
            .unwrap()
            .signed_by(&key, &issuer.cert, &issuer.key)
            .unwrap()
            .der()
            .to_vec()
    }

    #[test]
    fn name_constraints_of_intermediate_are_enforced() {
        let ca = root("Test Root");
        let inter = constrained_ca(&ca, "Constrained Intermediate", "good.test");
        let store = store_with(&[&ca]);
        let pool = vec![inter.cert.der().to_vec()];

        let inside = leaf_for(&inter, "www.good.test");
        let result = verify_leaf(&inside, &pool, &store, &VerifyOptions::default()).unwrap();
        assert!(result.is_valid, "{:?}", result.errors);

        let outside = leaf_for(&inter, "bank.example");
        let result = verify_leaf(&outside, &pool, &store, &VerifyOptions::default()).unwrap();
        assert!(!result.is_valid);
        assert!(
            result
                .errors
                .iter()
                .any(|e| e.contains("'bank.example' is outside every permitted subtree")),
            "{:?}",
            result.errors
        );
    }

    #[test]
    fn name_constraints_of_trusted_root_are_enforced() {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, "Constrained Root");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.name_constraints = Some(rcgen::NameConstraints {
            permitted_subtrees: vec![rcgen::GeneralSubtree::DnsName("good.test".to_string())],
            excluded_subtrees: vec![],
        });
        let ca = Issued {
            cert: params.self_signed(&key).unwrap(),
            key,
        };
        let store = store_with(&[&ca]);

        let outside = leaf_for(&ca, "bank.example");
        let result = verify_leaf(&outside, Vec::<Vec<u8>>::new(), &store, &VerifyOptions::default())
            .unwrap();
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("trusted root")));
    }

    #[test]
    fn precertificate_poison_is_rejected() {
        let ca = root("Test Root");
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["precert.test".to_string()]).unwrap();
        let mut poison =
            rcgen::CustomExtension::from_oid_content(&[1, 3, 6, 1, 4, 1, 11129, 2, 4, 3], vec![0x05, 0x00]);
        poison.set_criticality(true);
        params.custom_extensions = vec![poison];
        let leaf = params.signed_by(&key, &ca.cert, &ca.key).unwrap();
        let store = store_with(&[&ca]);

        let result = verify_leaf(leaf.der(), Vec::<Vec<u8>>::new(), &store, &VerifyOptions::default())
            .unwrap();
        assert!(!result.is_valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("unrecognized critical extension")));
    }
}
