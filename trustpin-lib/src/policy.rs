//! Per-connection trust mode composition.
//!
//! Precedence, highest first:
//!
//! 1. an explicit fingerprint gives [`TrustMode::PinOnly`];
//! 2. an explicit skip-verification request gives [`TrustMode::Insecure`];
//! 3. a non-empty global pin set gives [`TrustMode::ChainWithPinFallback`];
//! 4. otherwise [`TrustMode::ChainOnly`].
//!
//! The transport's own verification is bypassed only when a verifier that
//! makes the decision itself is installed, or in the explicit insecure case.

use crate::callback::{Anchors, PeerCertificateVerifier, PinScope};
use crate::config::{CustomCa, TrustConfig};
use crate::fingerprint::Fingerprint;
use crate::pins::PinRegistry;
use crate::pool::TrustPool;
use crate::verify::TrustStore;
use crate::TrustError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The effective trust decision rule for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustMode {
    /// Accept iff the chain validates against the root pool.
    ChainOnly,
    /// Chain validation first, then the global pins.
    ChainWithPinFallback,
    /// Accept iff a presented certificate matches the explicit pin.
    PinOnly,
    /// Caller opted out of verification entirely.
    Insecure,
}

impl fmt::Display for TrustMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrustMode::ChainOnly => "chain-only",
            TrustMode::ChainWithPinFallback => "chain-with-pin-fallback",
            TrustMode::PinOnly => "pin-only",
            TrustMode::Insecure => "insecure",
        })
    }
}

/// Which presented certificates may act as the end of a validated path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainCandidates {
    /// Try every presented certificate in order; each must validate end to
    /// end, using the others as intermediates.
    #[default]
    AnyPresented,
    /// Only the first presented certificate may validate.
    LeafOnly,
}

/// Per-connection inputs to [`crate::TrustContext::peer_verification`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolicyOptions {
    /// Pin for this connection only. Empty means none.
    pub fingerprint: Option<String>,
    pub custom_ca: CustomCa,
    pub insecure_skip_verify: bool,
    pub chain_candidates: ChainCandidates,
}

impl PolicyOptions {
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_custom_ca(mut self, custom_ca: CustomCa) -> Self {
        self.custom_ca = custom_ca;
        self
    }

    pub fn insecure(mut self, insecure_skip_verify: bool) -> Self {
        self.insecure_skip_verify = insecure_skip_verify;
        self
    }

    pub fn with_chain_candidates(mut self, chain_candidates: ChainCandidates) -> Self {
        self.chain_candidates = chain_candidates;
        self
    }
}

/// Settings handed to the TLS layer for one connection.
#[derive(Debug, Clone)]
pub struct PeerVerification {
    /// Whether the transport should skip its own chain verification.
    pub insecure_skip_verify: bool,
    pub mode: TrustMode,
    /// Roots the transport uses when it verifies on its own.
    pub root_pool: Arc<TrustStore>,
    /// Absent only in [`TrustMode::Insecure`].
    pub verifier: Option<Arc<PeerCertificateVerifier>>,
}

impl PeerVerification {
    /// Run the installed verifier, or accept when verification was opted out.
    pub fn verify_peer_certificate<C: AsRef<[u8]>>(&self, raw_certs: &[C]) -> Result<(), TrustError> {
        match &self.verifier {
            Some(verifier) => verifier.verify_peer_certificate(raw_certs, &[]),
            None => Ok(()),
        }
    }
}

pub(crate) fn compose(
    config: &TrustConfig,
    pool: &Arc<TrustPool>,
    pins: &Arc<PinRegistry>,
    options: &PolicyOptions,
) -> Result<PeerVerification, TrustError> {
    let explicit = options
        .fingerprint
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(Fingerprint::parse)
        .transpose()?;

    let anchors = match options.custom_ca.load(config)? {
        Some(pem) => {
            let store = TrustStore::from_pem(&pem)?;
            tracing::debug!(certificates = store.len(), "using per-connection CA pool");
            Anchors::Fixed(Arc::new(store))
        }
        None => Anchors::Shared(Arc::clone(pool)),
    };
    let root_pool = anchors.current();

    let (mode, skip, pin_scope) = if let Some(fp) = explicit {
        (TrustMode::PinOnly, true, Some(PinScope::Explicit(fp)))
    } else if options.insecure_skip_verify {
        (TrustMode::Insecure, true, None)
    } else if !pins.is_empty() {
        (
            TrustMode::ChainWithPinFallback,
            true,
            Some(PinScope::Global(Arc::clone(pins))),
        )
    } else {
        (TrustMode::ChainOnly, options.insecure_skip_verify, Some(PinScope::None))
    };

    if mode == TrustMode::Insecure {
        tracing::warn!("certificate verification disabled for this connection");
    }

    let verifier = pin_scope.map(|scope| {
        Arc::new(PeerCertificateVerifier::new(
            mode,
            anchors,
            scope,
            options.chain_candidates,
        ))
    });

    Ok(PeerVerification {
        insecure_skip_verify: skip,
        mode,
        root_pool,
        verifier,
    })
}
