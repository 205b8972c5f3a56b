//! Small helper functions for certificate verification.

use crate::oid;
use crate::util;
use x509_parser::prelude::*;

/// Check if a certificate is self-issued (subject == issuer).
///
/// RFC 5280 Section 6.1: self-issued certificates do not count toward chain
/// depth or pathLenConstraint.
pub(crate) fn is_self_issued(cert: &X509Certificate) -> bool {
    cert.subject().as_raw() == cert.issuer().as_raw()
}

/// Whether `cert` is self-issued and verifies under its own key.
pub(crate) fn is_self_signed(cert: &X509Certificate) -> bool {
    is_self_issued(cert) && cert.verify_signature(None).is_ok()
}

fn first_attr(cert: &X509Certificate, attr_oid: &str) -> Option<String> {
    cert.subject()
        .iter()
        .flat_map(|rdn| rdn.iter())
        .find(|attr| attr.attr_type().to_id_string() == attr_oid)
        .and_then(|attr| attr.as_str().ok().map(str::to_string))
}

/// Extract the Common Name from the certificate subject.
pub(crate) fn extract_cn(cert: &X509Certificate) -> Option<String> {
    first_attr(cert, oid::COMMON_NAME)
}

/// Extract a short human-readable identifier from a certificate.
///
/// Tries in order: CN, O, OU. Returns "Unknown" if none are present.
pub(crate) fn extract_short_name(cert: &X509Certificate) -> String {
    extract_cn(cert)
        .or_else(|| first_attr(cert, oid::ORGANIZATION))
        .or_else(|| first_attr(cert, oid::ORGANIZATIONAL_UNIT))
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Serial number as a colon-separated hex string.
pub(crate) fn extract_serial_hex(cert: &X509Certificate) -> String {
    util::hex_colon_upper(&cert.serial.to_bytes_be())
}

/// Check if an extension OID is one we recognize and process.
/// RFC 5280 Section 4.2 requires that implementations reject certificates
/// containing unrecognized critical extensions.
///
/// Policy processing is not implemented, so critical policyMappings,
/// policyConstraints and inhibitAnyPolicy are rejected. So is the CT
/// precertificate poison.
pub(crate) fn is_known_extension(oid: &str) -> bool {
    matches!(
        oid,
        // RFC 5280 standard extensions
        oid::EXT_SUBJECT_KEY_ID
        | oid::EXT_KEY_USAGE
        | oid::EXT_SUBJECT_ALT_NAME
        | oid::EXT_ISSUER_ALT_NAME
        | oid::EXT_BASIC_CONSTRAINTS
        | oid::EXT_NAME_CONSTRAINTS
        | oid::EXT_CRL_DISTRIBUTION_POINTS
        | oid::EXT_CERTIFICATE_POLICIES
        | oid::EXT_AUTHORITY_KEY_ID
        | oid::EXT_EXTENDED_KEY_USAGE
        | oid::EXT_FRESHEST_CRL
        | oid::EXT_AUTHORITY_INFO_ACCESS
        | oid::EXT_SUBJECT_INFO_ACCESS
        | oid::EXT_TLS_FEATURE
        | oid::EXT_SCT_LIST
        | oid::EXT_NETSCAPE_CERT_TYPE
    )
}
