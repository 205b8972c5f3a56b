//! Individual verification check functions.
//!
//! Each check appends human-readable failures to `errors`; the caller
//! decides validity from whether anything was appended.

use super::helpers::{is_known_extension, is_self_issued, is_self_signed};
use super::names::name_constraint_violations;
use super::{ChainCertInfo, TrustStore};
use crate::TrustError;
use x509_parser::prelude::*;

pub(crate) type ParsedChain<'a> = [(&'a [u8], X509Certificate<'a>)];

fn check_time(x509: &X509Certificate, label: &str, now_ts: i64, errors: &mut Vec<String>) {
    if now_ts < x509.validity().not_before.timestamp() {
        errors.push(format!("{} is not yet valid", label));
    }
    if now_ts > x509.validity().not_after.timestamp() {
        errors.push(format!("{} has expired", label));
    }
}

/// Check validity dates for all certificates in the chain.
#[allow(clippy::indexing_slicing)] // subjects[i] is safe: same length as parsed
pub(crate) fn check_chain_time_validity(
    parsed: &ParsedChain,
    subjects: &[String],
    now_ts: i64,
    errors: &mut Vec<String>,
) {
    for (i, (_, x509)) in parsed.iter().enumerate() {
        let label = format!("certificate at depth {} ({})", i, subjects[i]);
        check_time(x509, &label, now_ts, errors);
    }
}

/// Check BasicConstraints for CA certificates (all except leaf at depth 0).
#[allow(clippy::indexing_slicing)] // subjects[i] is safe: same length as parsed
pub(crate) fn check_chain_basic_constraints(
    parsed: &ParsedChain,
    subjects: &[String],
    errors: &mut Vec<String>,
) {
    for (i, (_, x509)) in parsed.iter().enumerate().skip(1) {
        let bc = x509.basic_constraints().ok().flatten().map(|bc| bc.value);
        match bc {
            Some(constraints) => {
                if !constraints.ca {
                    errors.push(format!(
                        "certificate at depth {} ({}) is not a CA but is used as issuer",
                        i, subjects[i]
                    ));
                }
                if let Some(pathlen) = constraints.path_len_constraint {
                    // RFC 5280 Section 6.1.4(h): self-issued intermediates
                    // do not count toward pathLenConstraint.
                    let intermediates_below = parsed
                        .iter()
                        .skip(1)
                        .take(i.saturating_sub(1))
                        .filter(|(_, c)| !is_self_issued(c))
                        .count() as u32;
                    if intermediates_below > pathlen {
                        errors.push(format!(
                            "certificate at depth {} ({}) path length constraint violated \
                             (pathlen={}, intermediates below={})",
                            i, subjects[i], pathlen, intermediates_below
                        ));
                    }
                }
            }
            None => {
                if x509.version().0 >= 2 {
                    errors.push(format!(
                        "certificate at depth {} ({}) is not a CA but is used as issuer",
                        i, subjects[i]
                    ));
                }
            }
        }
    }
}

/// RFC 5280 Section 4.2: Reject certificates with unknown critical extensions.
#[allow(clippy::indexing_slicing)] // subjects[i] is safe: same length as parsed
pub(crate) fn check_chain_critical_extensions(
    parsed: &ParsedChain,
    subjects: &[String],
    errors: &mut Vec<String>,
) {
    for (i, (_, x509)) in parsed.iter().enumerate() {
        for ext in x509.extensions() {
            if ext.critical && !is_known_extension(ext.oid.to_id_string().as_str()) {
                errors.push(format!(
                    "certificate at depth {} ({}) has unrecognized critical extension {}",
                    i, subjects[i], ext.oid
                ));
            }
        }
    }
}

/// Apply one CA's name constraints to `below`, the certificates it issued
/// directly or through intermediates.
///
/// RFC 5280 Section 6.1.4(b): self-issued intermediates are exempt; the leaf
/// never is.
#[allow(clippy::indexing_slicing)] // subjects covers at least below
fn constrain_names(
    nc: &x509_parser::extensions::NameConstraints,
    below: &ParsedChain,
    subjects: &[String],
    source: &str,
    errors: &mut Vec<String>,
) {
    for (depth, (_, cert)) in below.iter().enumerate() {
        if depth > 0 && is_self_issued(cert) {
            continue;
        }
        for violation in name_constraint_violations(nc, cert) {
            errors.push(format!(
                "certificate at depth {} ({}) {} of {}",
                depth, subjects[depth], violation, source
            ));
        }
    }
}

/// RFC 5280 Section 4.2.1.10: name constraints of every CA in the chain.
pub(crate) fn check_chain_name_constraints(
    parsed: &ParsedChain,
    subjects: &[String],
    errors: &mut Vec<String>,
) {
    for (ca_depth, (_, ca)) in parsed.iter().enumerate().skip(1) {
        if let Ok(Some(nc)) = ca.name_constraints() {
            let below = parsed.get(..ca_depth).unwrap_or_default();
            let source = format!("CA at depth {}", ca_depth);
            constrain_names(&nc.value, below, subjects, &source, errors);
        }
    }
}

/// RFC 5280 Section 4.2.1.3: CA certificates must have keyCertSign.
#[allow(clippy::indexing_slicing)] // subjects has same length as parsed
pub(crate) fn check_chain_key_cert_sign(
    parsed: &ParsedChain,
    subjects: &[String],
    errors: &mut Vec<String>,
) {
    for (i, (_, x509)) in parsed.iter().enumerate().skip(1) {
        if let Ok(Some(ku)) = x509.key_usage() {
            if !ku.value.key_cert_sign() {
                errors.push(format!(
                    "certificate at depth {} ({}) is a CA but Key Usage does not \
                     include keyCertSign",
                    i, subjects[i]
                ));
            }
        }
    }
}

/// Verify signatures along the chain (each cert signed by the next).
#[allow(clippy::indexing_slicing)] // subjects has same length as parsed
pub(crate) fn check_chain_signatures(
    parsed: &ParsedChain,
    subjects: &[String],
    errors: &mut Vec<String>,
) {
    for (i, (child, parent)) in parsed.iter().zip(parsed.iter().skip(1)).enumerate() {
        let (_, child_x509) = child;
        let (_, parent_x509) = parent;
        if let Err(e) = child_x509.verify_signature(Some(parent_x509.public_key())) {
            errors.push(format!(
                "signature verification failed ({} -> {}): {}",
                subjects[i],
                subjects[i + 1],
                e
            ));
        }
    }
}

/// Verify trust anchoring: find the root in the trust store.
///
/// Returns `Some(root_der)` if a trusted root was found, `None` otherwise.
#[allow(clippy::indexing_slicing)] // subjects/issuers have same length as parsed
pub(crate) fn verify_trust_anchoring(
    parsed: &ParsedChain,
    subjects: &[String],
    issuers: &[String],
    trust_store: &TrustStore,
    chain_info: &mut Vec<ChainCertInfo>,
    errors: &mut Vec<String>,
) -> Result<Option<Vec<u8>>, TrustError> {
    let Some((last_der, last_x509)) = parsed.last() else {
        return Err(TrustError::ChainValidationFailed(
            "empty certificate chain".into(),
        ));
    };
    let last_idx = parsed.len() - 1;

    if is_self_signed(last_x509) {
        if trust_store.contains(last_der) {
            return Ok(Some(last_der.to_vec()));
        }
        errors.push(format!(
            "root certificate ({}) is not in the trust store",
            subjects[last_idx]
        ));
        return Ok(None);
    }

    let issuer_raw = last_x509.issuer().as_raw();
    if let Some(candidates) = trust_store.find_by_subject_raw(issuer_raw) {
        for root_der in candidates {
            if let Ok((_, root_x509)) = X509Certificate::from_der(root_der) {
                if last_x509
                    .verify_signature(Some(root_x509.public_key()))
                    .is_ok()
                {
                    chain_info.push(ChainCertInfo::from_x509(parsed.len(), &root_x509));
                    return Ok(Some(root_der.clone()));
                }
            }
        }
    }

    errors.push(format!(
        "unable to find trusted root for issuer: {}",
        issuers[last_idx]
    ));
    Ok(None)
}

/// Validate the trusted root itself (validity period, critical extensions)
/// and apply its name constraints to the presented chain.
pub(crate) fn check_trusted_root(
    root_der: &[u8],
    parsed: &ParsedChain,
    subjects: &[String],
    now_ts: Option<i64>,
    errors: &mut Vec<String>,
) {
    // A root that was part of the presented chain was already checked.
    if parsed.iter().any(|(der, _)| *der == root_der) {
        return;
    }
    let Ok((_, root)) = X509Certificate::from_der(root_der) else {
        errors.push("trusted root certificate could not be parsed".into());
        return;
    };
    let label = format!("trusted root ({})", root.subject());
    if let Some(now_ts) = now_ts {
        check_time(&root, &label, now_ts, errors);
    }
    for ext in root.extensions() {
        if ext.critical && !is_known_extension(ext.oid.to_id_string().as_str()) {
            errors.push(format!(
                "{} has unrecognized critical extension {}",
                label, ext.oid
            ));
        }
    }
    if let Ok(Some(nc)) = root.name_constraints() {
        constrain_names(&nc.value, parsed, subjects, &label, errors);
    }
}
