//! OID string constants used by the chain validator.
//!
//! Object Identifiers are referenced by RFC 5280 (X.509). Keeping them
//! here avoids magic strings in the verification helpers.

// ── Distinguished Name attributes (RFC 4519 / X.520) ─────────────────────

pub const COMMON_NAME: &str = "2.5.4.3";
pub const ORGANIZATION: &str = "2.5.4.10";
pub const ORGANIZATIONAL_UNIT: &str = "2.5.4.11";

// ── X.509v3 extensions (RFC 5280 Section 4.2) ───────────────────────────

pub const EXT_SUBJECT_KEY_ID: &str = "2.5.29.14";
pub const EXT_KEY_USAGE: &str = "2.5.29.15";
pub const EXT_SUBJECT_ALT_NAME: &str = "2.5.29.17";
pub const EXT_ISSUER_ALT_NAME: &str = "2.5.29.18";
pub const EXT_BASIC_CONSTRAINTS: &str = "2.5.29.19";
pub const EXT_NAME_CONSTRAINTS: &str = "2.5.29.30";
pub const EXT_CRL_DISTRIBUTION_POINTS: &str = "2.5.29.31";
pub const EXT_CERTIFICATE_POLICIES: &str = "2.5.29.32";
pub const EXT_AUTHORITY_KEY_ID: &str = "2.5.29.35";
pub const EXT_EXTENDED_KEY_USAGE: &str = "2.5.29.37";
pub const EXT_FRESHEST_CRL: &str = "2.5.29.46";

// ── PKIX information access and TLS feature ─────────────────────────────

pub const EXT_AUTHORITY_INFO_ACCESS: &str = "1.3.6.1.5.5.7.1.1";
pub const EXT_SUBJECT_INFO_ACCESS: &str = "1.3.6.1.5.5.7.1.11";
pub const EXT_TLS_FEATURE: &str = "1.3.6.1.5.5.7.1.12";

// ── Certificate Transparency (RFC 6962) ──────────────────────────────────

pub const EXT_SCT_LIST: &str = "1.3.6.1.4.1.11129.2.4.2";

// ── Netscape extensions (legacy) ─────────────────────────────────────────

pub const EXT_NETSCAPE_CERT_TYPE: &str = "2.16.840.1.113730.1.1";
