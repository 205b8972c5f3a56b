//! The per-handshake peer certificate check.

use crate::fingerprint::Fingerprint;
use crate::pins::{find_pin_match, PinMatch, PinRegistry};
use crate::policy::{ChainCandidates, TrustMode};
use crate::pool::TrustPool;
use crate::verify::{
    matches_host, verify_leaf_within, PathBudget, TrustStore, VerificationResult, VerifyOptions,
};
use crate::TrustError;
use std::sync::Arc;
use x509_parser::prelude::*;

/// Signature of the hook a TLS layer calls with the raw presented chain and
/// whatever chains it validated itself (ignored here).
pub type VerifyPeerFn =
    Arc<dyn Fn(&[Vec<u8>], &[Vec<Vec<u8>>]) -> Result<(), TrustError> + Send + Sync>;

/// Result of one peer evaluation. Each acceptance names the single path
/// that produced it.
#[derive(Debug)]
pub enum VerificationOutcome {
    /// The certificate at `index` chained to a trusted root.
    AcceptedByChain { index: usize },
    /// A presented certificate matched a pin.
    AcceptedByPin(PinMatch),
    Rejected(TrustError),
}

impl VerificationOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, VerificationOutcome::Rejected(_))
    }

    pub fn into_result(self) -> Result<(), TrustError> {
        match self {
            VerificationOutcome::Rejected(e) => Err(e),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Anchors {
    /// Read the pool's derived store on every handshake.
    Shared(Arc<TrustPool>),
    /// A pool built from per-connection CA material.
    Fixed(Arc<TrustStore>),
}

impl Anchors {
    pub(crate) fn current(&self) -> Arc<TrustStore> {
        match self {
            Anchors::Shared(pool) => pool.derived_pool(),
            Anchors::Fixed(store) => Arc::clone(store),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum PinScope {
    None,
    Explicit(Fingerprint),
    /// Read the registry on every handshake.
    Global(Arc<PinRegistry>),
}

impl PinScope {
    fn find_match<C: AsRef<[u8]>>(&self, chain: &[C]) -> Option<PinMatch> {
        match self {
            PinScope::None => None,
            PinScope::Explicit(fp) => find_pin_match(chain, std::slice::from_ref(fp)),
            PinScope::Global(registry) => registry.find_match(chain),
        }
    }
}

/// Decides whether a presented chain is trusted, following one [`TrustMode`].
///
/// Evaluation touches only in-memory state.
#[derive(Debug, Clone)]
pub struct PeerCertificateVerifier {
    mode: TrustMode,
    anchors: Anchors,
    pins: PinScope,
    candidates: ChainCandidates,
    options: VerifyOptions,
}

impl PeerCertificateVerifier {
    pub(crate) fn new(
        mode: TrustMode,
        anchors: Anchors,
        pins: PinScope,
        candidates: ChainCandidates,
    ) -> Self {
        Self {
            mode,
            anchors,
            pins,
            candidates,
            options: VerifyOptions::default(),
        }
    }

    /// Override the validation options (fixed validation instant, depth).
    pub fn with_verify_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn mode(&self) -> TrustMode {
        self.mode
    }

    /// Evaluate `raw_certs` at the configured instant (the current time
    /// unless overridden).
    pub fn evaluate<C: AsRef<[u8]>>(&self, raw_certs: &[C]) -> VerificationOutcome {
        self.evaluate_with(raw_certs, &self.options, self.candidates, None)
    }

    /// Evaluate `raw_certs` at Unix time `at`.
    pub fn evaluate_at<C: AsRef<[u8]>>(&self, raw_certs: &[C], at: i64) -> VerificationOutcome {
        let options = VerifyOptions {
            at_time: Some(at),
            ..self.options.clone()
        };
        self.evaluate_with(raw_certs, &options, self.candidates, None)
    }

    /// Evaluate a server chain exactly as a TLS client received it.
    ///
    /// `raw_certs[0]` is the end-entity whose key signed the handshake, so
    /// only that certificate may be accepted by chain validation, and only
    /// when its subjectAltName covers `host` (a DNS name or IP literal). The
    /// pin step is unchanged.
    pub fn evaluate_server<C: AsRef<[u8]>>(
        &self,
        raw_certs: &[C],
        host: &str,
        at: i64,
    ) -> VerificationOutcome {
        let options = VerifyOptions {
            at_time: Some(at),
            ..self.options.clone()
        };
        self.evaluate_with(raw_certs, &options, ChainCandidates::LeafOnly, Some(host))
    }

    fn evaluate_with<C: AsRef<[u8]>>(
        &self,
        raw_certs: &[C],
        options: &VerifyOptions,
        candidates: ChainCandidates,
        host: Option<&str>,
    ) -> VerificationOutcome {
        let ders: Vec<&[u8]> = raw_certs.iter().map(|c| c.as_ref()).collect();
        let mut chain_error = None;

        if self.mode != TrustMode::PinOnly {
            let store = self.anchors.current();
            let mut budget = PathBudget::default();
            let limit = match candidates {
                ChainCandidates::AnyPresented => ders.len(),
                ChainCandidates::LeafOnly => ders.len().min(1),
            };
            for (index, der) in ders.iter().enumerate().take(limit) {
                let Ok((_, candidate)) = X509Certificate::from_der(der) else {
                    tracing::debug!(index, "skipping unparseable presented certificate");
                    continue;
                };
                let others = ders
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != index)
                    .map(|(_, d)| *d);
                let validated = verify_leaf_within(der, others, &store, options, &mut budget)
                    .and_then(VerificationResult::into_result);
                match (validated, host) {
                    (Err(e), _) => chain_error = Some(e),
                    (Ok(_), Some(host)) if !matches_host(&candidate, host) => {
                        chain_error = Some(TrustError::ChainValidationFailed(format!(
                            "certificate is not valid for host '{}'",
                            host
                        )));
                    }
                    (Ok(_), _) => {
                        tracing::debug!(index, mode = %self.mode, "peer accepted by chain validation");
                        return VerificationOutcome::AcceptedByChain { index };
                    }
                }
            }
        }

        if let Some(found) = self.pins.find_match(&ders) {
            tracing::info!(
                index = found.index,
                fingerprint = %found.fingerprint,
                mode = %self.mode,
                "peer accepted by certificate pin"
            );
            return VerificationOutcome::AcceptedByPin(found);
        }

        let reason = chain_error.unwrap_or_else(|| match self.mode {
            TrustMode::ChainOnly => TrustError::ChainValidationFailed(
                "no parseable certificate in presented chain".into(),
            ),
            _ => TrustError::FingerprintMismatch,
        });
        tracing::debug!(error = %reason, mode = %self.mode, "peer rejected");
        VerificationOutcome::Rejected(reason)
    }

    /// The TLS-layer hook: accept with `Ok(())` or reject with the reason.
    ///
    /// `_verified_chains` is whatever the transport validated on its own; the
    /// decision is always made against this verifier's anchors and pins.
    pub fn verify_peer_certificate<C: AsRef<[u8]>>(
        &self,
        raw_certs: &[C],
        _verified_chains: &[Vec<Vec<u8>>],
    ) -> Result<(), TrustError> {
        self.evaluate(raw_certs).into_result()
    }

    /// Wrap into the boxed hook form.
    pub fn into_fn(self: Arc<Self>) -> VerifyPeerFn {
        Arc::new(move |raw, verified| self.verify_peer_certificate(raw, verified))
    }
}
