//! Root certificate sets used as chain-validation anchors.
//!
//! Provides [`TrustStore`], plus loaders for the operating system store
//! (discovered the way OpenSSL does it) and for the compiled-in Mozilla
//! bundle.

use crate::TrustError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use x509_parser::prelude::*;

/// Well-known CA bundle file paths, in order of preference.
pub(crate) const KNOWN_CA_BUNDLE_PATHS: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt", // Debian/Ubuntu
    "/etc/pki/tls/certs/ca-bundle.crt",   // RHEL/CentOS/Fedora
    "/etc/ssl/ca-bundle.pem",             // openSUSE
    "/etc/ssl/cert.pem",                  // macOS, Alpine
];

/// Well-known CA certificate directory paths.
pub(crate) const KNOWN_CA_DIR_PATHS: &[&str] = &["/etc/ssl/certs"];

/// Check if a file looks like a PEM certificate file for trust store loading.
///
/// Matches `.pem`, `.crt`, `.cer` extensions and OpenSSL hash-linked files
/// (`XXXXXXXX.N` where the extension is a single digit).
fn is_pem_cert_file(path: &std::path::Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e,
        None => return false,
    };
    matches!(ext, "pem" | "crt" | "cer")
        || (ext.len() == 1 && ext.bytes().next().is_some_and(|b| b.is_ascii_digit()))
}

/// A set of trusted root certificates, indexed by subject.
///
/// Adding a certificate that is already present (same DER bytes) is a no-op,
/// so composing overlapping sources never double-counts.
#[derive(Clone, Default)]
pub struct TrustStore {
    /// Map from raw DER-encoded subject name to list of DER-encoded certificates.
    certs_by_subject: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    count: usize,
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore")
            .field("count", &self.count)
            .finish()
    }
}

impl TrustStore {
    /// Create an empty trust store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the operating system trust store.
    ///
    /// Uses `openssl-probe` and environment variables to find the CA bundle,
    /// matching the same locations OpenSSL searches:
    /// 1. `SSL_CERT_FILE` environment variable
    /// 2. Path discovered by `openssl-probe`
    /// 3. Well-known bundle file paths ([`KNOWN_CA_BUNDLE_PATHS`])
    /// 4. `SSL_CERT_DIR` environment variable
    /// 5. Directory discovered by `openssl-probe`
    /// 6. Well-known certificate directories ([`KNOWN_CA_DIR_PATHS`])
    pub fn system() -> Result<Self, TrustError> {
        let mut store = TrustStore::new();

        if let Some(bundle_path) = find_system_ca_bundle() {
            if let Ok(data) = std::fs::read(&bundle_path) {
                let added = store.add_pem_bundle(&data).unwrap_or(0);
                if added > 0 {
                    tracing::debug!(path = %bundle_path.display(), added, "loaded system CA bundle");
                    return Ok(store);
                }
            }
        }

        let openssl_dirs = openssl_probe::probe();
        let dir_candidates = std::env::var("SSL_CERT_DIR")
            .ok()
            .into_iter()
            .chain(
                openssl_dirs
                    .cert_dir
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned()),
            )
            .chain(KNOWN_CA_DIR_PATHS.iter().map(|s| (*s).to_string()));

        for dir in dir_candidates {
            let dir_path = std::path::Path::new(&dir);
            if let Ok(added) = store.add_pem_directory(dir_path) {
                if added > 0 {
                    tracing::debug!(dir = %dir_path.display(), added, "loaded system CA directory");
                    return Ok(store);
                }
            }
        }

        Err(TrustError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no system trust store found",
        )))
    }

    /// The compiled-in Mozilla root bundle, parsed once per process.
    ///
    /// # Panics
    ///
    /// Panics if none of the bundled certificates parse, which can only
    /// happen with a broken build.
    pub fn embedded() -> &'static TrustStore {
        static EMBEDDED: OnceLock<TrustStore> = OnceLock::new();
        EMBEDDED.get_or_init(|| {
            let mut store = TrustStore::new();
            for der in webpki_root_certs::TLS_SERVER_ROOT_CERTS {
                if let Err(e) = store.add_der(der.as_ref()) {
                    tracing::warn!(error = %e, "skipping unparseable embedded root certificate");
                }
            }
            assert!(
                !store.is_empty(),
                "BUG: compiled-in root bundle contains no parseable certificate"
            );
            store
        })
    }

    /// Create a trust store from a PEM bundle (e.g., a CA certificates file).
    ///
    /// Fails with [`TrustError::CaStringInvalid`] when no certificate in the
    /// bundle could be added.
    pub fn from_pem(pem_data: &[u8]) -> Result<Self, TrustError> {
        let mut store = TrustStore::new();
        let added = store
            .add_pem_bundle(pem_data)
            .map_err(|e| TrustError::CaStringInvalid(e.to_string()))?;
        if added == 0 {
            return Err(TrustError::CaStringInvalid(
                "no parseable certificate in CA bundle".into(),
            ));
        }
        Ok(store)
    }

    /// Add a DER-encoded certificate to the trust store.
    ///
    /// Returns `false` if the exact certificate was already present.
    pub fn add_der(&mut self, der: &[u8]) -> Result<bool, TrustError> {
        let (_, x509) = X509Certificate::from_der(der)
            .map_err(|e| TrustError::MalformedCertificate(format!("{}", e)))?;

        let entry = self
            .certs_by_subject
            .entry(x509.subject().as_raw().to_vec())
            .or_default();
        if entry.iter().any(|c| c == der) {
            return Ok(false);
        }
        entry.push(der.to_vec());
        self.count += 1;

        Ok(true)
    }

    /// Add every certificate of `other` to this store. Returns how many were new.
    pub fn extend_from(&mut self, other: &TrustStore) -> usize {
        let mut added = 0;
        for (subject, certs) in &other.certs_by_subject {
            let entry = self.certs_by_subject.entry(subject.clone()).or_default();
            for der in certs {
                if !entry.contains(der) {
                    entry.push(der.clone());
                    added += 1;
                }
            }
        }
        self.count += added;
        added
    }

    /// Add all certificates from a PEM bundle. Returns the number of
    /// certificates actually added (skipping those that fail to parse).
    pub fn add_pem_bundle(&mut self, pem_data: &[u8]) -> Result<usize, TrustError> {
        let certs = crate::pem::parse_pem_chain(pem_data)?;
        let mut added = 0;
        for cert_der in certs {
            // Some bundles carry non-certificate entries.
            if let Ok(true) = self.add_der(&cert_der) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Load certificates from a directory of PEM files (like OpenSSL's -CApath).
    pub fn add_pem_directory(&mut self, dir: &std::path::Path) -> Result<usize, TrustError> {
        let mut total = 0;
        let entries = std::fs::read_dir(dir).map_err(|e| {
            TrustError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", dir.display(), e),
            ))
        })?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_pem_cert_file(&path) {
                if let Ok(data) = std::fs::read(&path) {
                    if let Ok(added) = self.add_pem_bundle(&data) {
                        total += added;
                    }
                }
            }
        }
        Ok(total)
    }

    /// Find trusted certificates whose subject matches the given issuer name.
    pub(crate) fn find_by_subject_raw(&self, subject_raw: &[u8]) -> Option<&Vec<Vec<u8>>> {
        self.certs_by_subject.get(subject_raw)
    }

    /// Number of certificates in the store.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if a DER-encoded certificate is in the trust store.
    ///
    /// Matches by subject and raw DER content.
    pub fn contains(&self, der: &[u8]) -> bool {
        if let Ok((_, x509)) = X509Certificate::from_der(der) {
            if let Some(certs) = self.find_by_subject_raw(x509.subject().as_raw()) {
                return certs.iter().any(|c| c == der);
            }
        }
        false
    }

    /// Iterate over the DER encoding of every certificate in the store.
    pub fn iter_der(&self) -> impl Iterator<Item = &[u8]> {
        self.certs_by_subject
            .values()
            .flat_map(|certs| certs.iter().map(Vec::as_slice))
    }
}

/// Find the system CA bundle path (same location OpenSSL uses).
///
/// Checks, in order:
/// 1. `SSL_CERT_FILE` environment variable
/// 2. Path discovered by `openssl-probe`
/// 3. Well-known bundle file paths ([`KNOWN_CA_BUNDLE_PATHS`])
pub fn find_system_ca_bundle() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SSL_CERT_FILE") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Some(p);
        }
    }

    let openssl_dirs = openssl_probe::probe();
    if let Some(file) = openssl_dirs.cert_file {
        let path = PathBuf::from(&file);
        if path.exists() {
            return Some(path);
        }
    }

    KNOWN_CA_BUNDLE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
