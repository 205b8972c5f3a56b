//! PEM decoding for trust material.
//!
//! Only as much PEM handling as the trust pool needs: split a bundle into
//! DER certificates, decode a single certificate, and recognize a private
//! key block.

use crate::TrustError;
use x509_parser::pem::{parse_x509_pem, Pem};
use x509_parser::prelude::*;

/// Parse a PEM-encoded buffer containing one or more certificates into
/// individual DER-encoded certificates.
///
/// Non-certificate blocks (keys, parameters) are skipped. Trailing garbage
/// after at least one certificate is ignored.
pub fn parse_pem_chain(input: &[u8]) -> Result<Vec<Vec<u8>>, TrustError> {
    let mut certs = Vec::new();

    for pem_result in Pem::iter_from_buffer(input) {
        match pem_result {
            Ok(pem) => {
                if pem.label == "CERTIFICATE" || pem.label == "TRUSTED CERTIFICATE" {
                    certs.push(pem.contents);
                }
            }
            Err(e) => {
                if !certs.is_empty() {
                    break;
                }
                return Err(TrustError::MalformedCertificate(format!(
                    "failed to parse PEM: {}",
                    e
                )));
            }
        }
    }

    if certs.is_empty() {
        return Err(TrustError::MalformedCertificate(
            "no certificates found in PEM input".into(),
        ));
    }

    Ok(certs)
}

/// Certificates recovered from a bundle, plus one message per block that
/// could not be decoded.
#[derive(Debug, Default)]
pub(crate) struct BundleBlocks {
    pub(crate) certs: Vec<Vec<u8>>,
    pub(crate) skipped: Vec<String>,
}

/// Split a bundle without stopping at bad blocks.
///
/// A block whose body does not decode is reported and the scan resumes after
/// its END line. Non-certificate blocks are ignored.
pub(crate) fn split_pem_bundle(input: &[u8]) -> BundleBlocks {
    let mut blocks = BundleBlocks::default();
    for (i, pem_result) in Pem::iter_from_buffer(input).enumerate() {
        match pem_result {
            Ok(pem) if pem.label == "CERTIFICATE" || pem.label == "TRUSTED CERTIFICATE" => {
                blocks.certs.push(pem.contents);
            }
            Ok(_) => {}
            Err(e) => blocks
                .skipped
                .push(format!("skipping undecodable PEM block {}: {}", i, e)),
        }
    }
    blocks
}

/// Decode the first PEM block of `pem_text` and parse it as an X.509
/// certificate, returning its DER bytes.
pub fn parse_single_certificate(pem_text: &str) -> Result<Vec<u8>, TrustError> {
    if pem_text.trim().is_empty() {
        return Err(TrustError::EmptyInput);
    }

    let (_, pem) = parse_x509_pem(pem_text.as_bytes()).map_err(|e| {
        TrustError::MalformedCertificate(format!("failed to decode PEM block: {}", e))
    })?;

    X509Certificate::from_der(&pem.contents).map_err(|e| {
        TrustError::MalformedCertificate(format!("failed to parse X.509 certificate: {}", e))
    })?;

    Ok(pem.contents)
}

/// Whether `input` holds at least one PEM private key block
/// (`PRIVATE KEY`, `RSA PRIVATE KEY`, `EC PRIVATE KEY`, ...).
pub(crate) fn contains_private_key(input: &[u8]) -> bool {
    Pem::iter_from_buffer(input)
        .map_while(Result::ok)
        .any(|pem| pem.label.ends_with("PRIVATE KEY") && !pem.contents.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed_pem() -> String {
        let key = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["pem.test".to_string()]).unwrap();
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn single_certificate_roundtrip() {
        let pem = self_signed_pem();
        let der = parse_single_certificate(&pem).unwrap();
        assert!(X509Certificate::from_der(&der).is_ok());
    }

    #[test]
    fn single_certificate_rejects_empty() {
        assert!(matches!(
            parse_single_certificate(""),
            Err(TrustError::EmptyInput)
        ));
        assert!(matches!(
            parse_single_certificate("  \n"),
            Err(TrustError::EmptyInput)
        ));
    }

    #[test]
    fn single_certificate_rejects_garbage() {
        assert!(matches!(
            parse_single_certificate("not a certificate"),
            Err(TrustError::MalformedCertificate(_))
        ));
    }

    #[test]
    fn single_certificate_rejects_non_certificate_payload() {
        let pem = "-----BEGIN CERTIFICATE-----\naGVsbG8gd29ybGQ=\n-----END CERTIFICATE-----\n";
        assert!(matches!(
            parse_single_certificate(pem),
            Err(TrustError::MalformedCertificate(_))
        ));
    }

    #[test]
    fn chain_collects_every_certificate() {
        let bundle = format!("{}{}", self_signed_pem(), self_signed_pem());
        assert_eq!(parse_pem_chain(bundle.as_bytes()).unwrap().len(), 2);
    }

    #[test]
    fn chain_without_certificates_fails() {
        let key = rcgen::KeyPair::generate().unwrap();
        let err = parse_pem_chain(key.serialize_pem().as_bytes()).unwrap_err();
        assert!(matches!(err, TrustError::MalformedCertificate(_)));
    }

    #[test]
    fn private_key_detection() {
        let key = rcgen::KeyPair::generate().unwrap();
        assert!(contains_private_key(key.serialize_pem().as_bytes()));
        assert!(!contains_private_key(self_signed_pem().as_bytes()));
        assert!(!contains_private_key(b"garbage"));
    }

    #[test]
    fn bundle_split_continues_past_bad_block() {
        let broken = "-----BEGIN CERTIFICATE-----\n!!not base64!!\n-----END CERTIFICATE-----\n";
        let bundle = format!("{}{}{}", self_signed_pem(), broken, self_signed_pem());

        let blocks = split_pem_bundle(bundle.as_bytes());
        assert_eq!(blocks.certs.len(), 2);
        assert_eq!(blocks.skipped.len(), 1);
        assert!(blocks.skipped[0].starts_with("skipping undecodable PEM block 1"));

        // The strict splitter still stops at the first bad block.
        assert_eq!(parse_pem_chain(bundle.as_bytes()).unwrap().len(), 1);
    }
}
