//! rustls client-side hook.
//!
//! [`TrustpinServerVerifier`] replaces rustls' own chain verification with a
//! [`PeerCertificateVerifier`]. Chain acceptance is limited to the
//! end-entity and requires it to cover the server name; pins still match any
//! presented certificate. Handshake signatures are checked with the crypto
//! provider's algorithms.

use crate::callback::PeerCertificateVerifier;
use crate::policy::PeerVerification;
use crate::TrustError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, Error, OtherError, SignatureScheme};
use std::sync::Arc;

#[derive(Debug)]
pub struct TrustpinServerVerifier {
    /// `None` accepts any presented chain.
    verifier: Option<Arc<PeerCertificateVerifier>>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl TrustpinServerVerifier {
    /// Use `verifier` with the ring provider's signature algorithms.
    pub fn new(verifier: Arc<PeerCertificateVerifier>) -> Self {
        Self {
            verifier: Some(verifier),
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        }
    }

    /// Adapter for composed connection settings, including the insecure
    /// opt-out.
    pub fn from_verification(verification: &PeerVerification) -> Arc<Self> {
        Arc::new(Self {
            verifier: verification.verifier.clone(),
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        })
    }

    pub fn with_algorithms(mut self, algorithms: WebPkiSupportedAlgorithms) -> Self {
        self.algorithms = algorithms;
        self
    }
}

/// The name the end-entity must cover. Unknown name kinds yield an empty
/// string, which no certificate covers.
fn expected_host(server_name: &ServerName<'_>) -> String {
    match server_name {
        ServerName::DnsName(name) => name.as_ref().to_string(),
        ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
        _ => String::new(),
    }
}

fn to_rustls_error(e: TrustError) -> Error {
    Error::InvalidCertificate(CertificateError::Other(OtherError(Arc::new(e))))
}

impl ServerCertVerifier for TrustpinServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        let Some(verifier) = &self.verifier else {
            return Ok(ServerCertVerified::assertion());
        };

        let presented: Vec<&[u8]> = std::iter::once(end_entity.as_ref())
            .chain(intermediates.iter().map(|c| c.as_ref()))
            .collect();
        let at = i64::try_from(now.as_secs()).unwrap_or(i64::MAX);

        verifier
            .evaluate_server(&presented, &expected_host(server_name), at)
            .into_result()
            .map(|()| ServerCertVerified::assertion())
            .map_err(to_rustls_error)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
