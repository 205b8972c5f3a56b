//! trustpin-lib: trust decisions for TLS peer certificates.
//!
//! Decides, at handshake time, whether a peer's presented certificate chain
//! should be accepted. Two trust sources are combined:
//!
//! - chain validation against a composed root pool (OS roots, the
//!   compiled-in Mozilla bundle, and operator-supplied CA certificates), and
//! - SHA-256 certificate pinning, either for a single connection or through
//!   a process-wide allow-list.
//!
//! The TLS handshake itself is not performed here. A [`TrustContext`] hands
//! out [`PeerVerification`] settings holding a [`PeerCertificateVerifier`]
//! that the TLS layer invokes with the raw DER chain.

mod callback;
mod config;
mod context;
mod fingerprint;
mod oid;
mod pem;
mod pins;
mod policy;
mod pool;
#[cfg(feature = "rustls")]
mod rustls_verifier;
mod util;
pub mod verify;

pub use callback::{PeerCertificateVerifier, VerificationOutcome, VerifyPeerFn};
pub use config::{CustomCa, TrustConfig, ENV_DISABLE_EMBED_CA, ENV_DISABLE_SYSTEM_CA};
pub use context::TrustContext;
pub use fingerprint::Fingerprint;
pub use pem::{parse_pem_chain, parse_single_certificate};
pub use pins::{find_pin_match, matches, PinMatch, PinRegistry};
pub use policy::{ChainCandidates, PeerVerification, PolicyOptions, TrustMode};
pub use pool::{BundleReport, PoolSummary, SystemRootSource, TrustPool};
#[cfg(feature = "rustls")]
pub use rustls_verifier::TrustpinServerVerifier;
pub use verify::{
    find_system_ca_bundle, verify_chain, verify_leaf, ChainCertInfo, TrustStore,
    VerificationResult, VerifyOptions,
};

/// Errors returned by trustpin-lib.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("Invalid fingerprint format: {0}")]
    InvalidFingerprintFormat(String),

    #[error("Certificate input is empty")]
    EmptyInput,

    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("Failed to read CA file {path}: {source}")]
    CaFileUnreadable {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid CA certificate string: {0}")]
    CaStringInvalid(String),

    #[error("Certificate chain validation failed: {0}")]
    ChainValidationFailed(String),

    #[error("Certificate fingerprints do not match")]
    FingerprintMismatch,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
