//! The composed trust pool: OS roots, embedded roots and custom certificates.
//!
//! Readers get an `Arc<TrustStore>` snapshot. Mutations build a new store
//! and swap it in under the write lock, so a snapshot is always either the
//! complete pre-mutation or the complete post-mutation pool.

use crate::config::TrustConfig;
use crate::pem::{contains_private_key, parse_single_certificate, split_pem_bundle};
use crate::verify::TrustStore;
use crate::TrustError;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of [`TrustPool::add_certificate_key_pair`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleReport {
    /// Certificates that were parsed and added.
    pub added: usize,
    /// One message per entry that was skipped.
    pub warnings: Vec<String>,
}

/// How many certificates each source contributes to the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub system: usize,
    pub embedded: usize,
    pub custom: usize,
    /// Distinct certificates in the derived pool.
    pub total: usize,
}

/// Loader for the operating system's root certificates.
pub type SystemRootSource = fn() -> Result<TrustStore, TrustError>;

#[derive(Default)]
struct PoolState {
    system: Arc<TrustStore>,
    custom: Vec<Vec<u8>>,
    derived: Option<Arc<TrustStore>>,
}

/// Process-wide trust material.
pub struct TrustPool {
    config: TrustConfig,
    system_source: SystemRootSource,
    state: RwLock<PoolState>,
}

impl std::fmt::Debug for TrustPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("TrustPool")
            .field("config", &self.config)
            .field("system", &state.system.len())
            .field("custom", &state.custom.len())
            .field("derived", &state.derived.as_ref().map(|d| d.len()))
            .finish()
    }
}

fn load_system_roots(config: &TrustConfig, source: SystemRootSource) -> Arc<TrustStore> {
    if config.disable_system_ca {
        return Arc::default();
    }
    match source() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "failed to load system root certificates, continuing without them");
            Arc::default()
        }
    }
}

impl TrustPool {
    /// Create a pool for `config`. OS roots are read here, never during
    /// verification.
    pub fn new(config: TrustConfig) -> Self {
        Self::with_system_source(config, TrustStore::system)
    }

    /// Like [`TrustPool::new`], but OS roots come from `source`, both here
    /// and on every [`TrustPool::reset`]. A failing source leaves the OS
    /// part of the pool empty.
    pub fn with_system_source(config: TrustConfig, source: SystemRootSource) -> Self {
        let system = load_system_roots(&config, source);
        Self {
            config,
            system_source: source,
            state: RwLock::new(PoolState {
                system,
                ..PoolState::default()
            }),
        }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    fn compose(&self, state: &PoolState) -> TrustStore {
        let mut store = TrustStore::clone(&state.system);
        if !self.config.disable_embedded_ca {
            store.extend_from(TrustStore::embedded());
        }
        for der in &state.custom {
            if let Err(e) = store.add_der(der) {
                tracing::warn!(error = %e, "dropping custom certificate from derived pool");
            }
        }
        tracing::debug!(
            certificates = store.len(),
            custom = state.custom.len(),
            "composed derived trust pool"
        );
        store
    }

    /// The current composed pool for chain verification.
    ///
    /// Built on first access after construction or [`TrustPool::reset`] and
    /// cached until the next mutation.
    pub fn derived_pool(&self) -> Arc<TrustStore> {
        if let Some(derived) = &self.state.read().derived {
            return Arc::clone(derived);
        }
        let mut state = self.state.write();
        if let Some(derived) = &state.derived {
            return Arc::clone(derived);
        }
        let derived = Arc::new(self.compose(&state));
        state.derived = Some(Arc::clone(&derived));
        derived
    }

fn check_certificate(der: &[u8]) -> Result<(), TrustError> {
        x509_parser::parse_x509_certificate(der)
            .map(|_| ())
            .map_err(|e| TrustError::MalformedCertificate(e.to_string()))
    }

    /// Append already-parsed certificates. A cached derived pool is copied
    /// once and swapped in whole.
    fn append_custom(state: &mut PoolState, ders: Vec<Vec<u8>>) {
        if let Some(derived) = state.derived.as_mut() {
            let mut next = TrustStore::clone(derived);
            for der in &ders {
                if let Err(e) = next.add_der(der) {
                    tracing::warn!(error = %e, "dropping custom certificate from derived pool");
                }
            }
            *derived = Arc::new(next);
        }
        state.custom.extend(ders);
    }

    /// Decode one PEM certificate and add it to the custom set and to the
    /// live derived pool.
    pub fn add_certificate(&self, pem_text: &str) -> Result<(), TrustError> {
        let der = parse_single_certificate(pem_text)?;
        Self::check_certificate(&der)?;
        let mut state = self.state.write();
        Self::append_custom(&mut state, vec![der]);
        tracing::debug!(custom = state.custom.len(), "added custom certificate");
        Ok(())
    }

    /// Add every certificate of a certificate/key bundle.
    ///
    /// Each argument is inline PEM or a path resolved against the configured
    /// base directory. Entries that fail are logged and reported in the
    /// returned [`BundleReport`]; the remaining entries are still added.
    pub fn add_certificate_key_pair(&self, cert_input: &str, key_input: &str) -> BundleReport {
        let mut report = BundleReport::default();
        let mut warn = |message: String| {
            tracing::warn!("{}", message);
            report.warnings.push(message);
        };

        match self.config.load_pem_or_path(key_input) {
            Ok(key) if contains_private_key(&key) => {}
            Ok(_) => warn("private key input holds no PEM private key".to_string()),
            Err(e) => warn(format!("failed to read private key: {}", e)),
        }

        let mut certs = Vec::new();
        match self.config.load_pem_or_path(cert_input) {
            Ok(data) => {
                let blocks = split_pem_bundle(&data);
                if blocks.certs.is_empty() && blocks.skipped.is_empty() {
                    warn("no certificates found in certificate bundle".to_string());
                }
                blocks.skipped.into_iter().for_each(&mut warn);
                for (i, der) in blocks.certs.into_iter().enumerate() {
                    match Self::check_certificate(&der) {
                        Ok(()) => certs.push(der),
                        Err(e) => warn(format!("skipping certificate {} in bundle: {}", i, e)),
                    }
                }
            }
            Err(e) => warn(format!("failed to read certificate bundle: {}", e)),
        }

        let added = certs.len();
        if added > 0 {
            Self::append_custom(&mut self.state.write(), certs);
        }
        report.added = added;
        tracing::debug!(added, skipped = report.warnings.len(), "added certificate bundle");
        report
    }

    /// Discard custom certificates and reload the OS roots.
    pub fn reset(&self) {
        let system = load_system_roots(&self.config, self.system_source);
        let mut state = self.state.write();
        *state = PoolState {
            system,
            ..PoolState::default()
        };
        tracing::debug!("trust pool reset");
    }

    /// DER encodings of every custom certificate, in insertion order.
    pub fn custom_certificates(&self) -> Vec<Vec<u8>> {
        self.state.read().custom.clone()
    }

    pub fn summary(&self) -> PoolSummary {
        let derived = self.derived_pool();
        let state = self.state.read();
        PoolSummary {
            system: state.system.len(),
            embedded: if self.config.disable_embedded_ca {
                0
            } else {
                TrustStore::embedded().len()
            },
            custom: state.custom.len(),
            total: derived.len(),
        }
    }
}

impl Default for TrustPool {
    fn default() -> Self {
        Self::new(TrustConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated() -> TrustPool {
        TrustPool::new(TrustConfig {
            disable_embedded_ca: true,
            disable_system_ca: true,
            base_dir: None,
        })
    }

    fn self_signed_pem(cn: &str) -> String {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(rcgen::DnType::CommonName, cn);
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn disabled_sources_give_empty_pool() {
        let pool = isolated();
        assert!(pool.derived_pool().is_empty());
        assert_eq!(pool.summary(), PoolSummary::default());
    }

    #[test]
    fn embedded_roots_are_included_by_default() {
        let pool = TrustPool::new(TrustConfig {
            disable_system_ca: true,
            ..TrustConfig::default()
        });
        let summary = pool.summary();
        assert_eq!(summary.system, 0);
        assert!(summary.embedded > 0);
        assert_eq!(summary.total, summary.embedded);
    }

    #[test]
    fn add_certificate_updates_cached_pool() {
        let pool = isolated();
        let before = pool.derived_pool();
        pool.add_certificate(&self_signed_pem("Added")).unwrap();
        let after = pool.derived_pool();
        assert_eq!(before.len(), 0);
        assert_eq!(after.len(), 1);
        assert_eq!(pool.custom_certificates().len(), 1);
    }

    #[test]
    fn add_certificate_rejects_empty_without_mutation() {
        let pool = isolated();
        assert!(matches!(pool.add_certificate(""), Err(TrustError::EmptyInput)));
        assert!(matches!(
            pool.add_certificate("garbage"),
            Err(TrustError::MalformedCertificate(_))
        ));
        assert!(pool.custom_certificates().is_empty());
        assert!(pool.derived_pool().is_empty());
    }

    #[test]
    fn custom_certificates_survive_disable_flags() {
        let pool = isolated();
        pool.add_certificate(&self_signed_pem("Custom")).unwrap();
        assert_eq!(pool.summary().custom, 1);
        assert_eq!(pool.summary().total, 1);
    }

    #[test]
    fn reset_discards_custom_certificates() {
        let pool = isolated();
        pool.add_certificate(&self_signed_pem("One")).unwrap();
        pool.add_certificate(&self_signed_pem("Two")).unwrap();
        assert_eq!(pool.derived_pool().len(), 2);
        pool.reset();
        assert!(pool.custom_certificates().is_empty());
        assert!(pool.derived_pool().is_empty());
    }

    #[test]
    fn key_pair_adds_every_certificate() {
        let pool = isolated();
        let key = rcgen::KeyPair::generate().unwrap();
        let bundle = format!("{}{}", self_signed_pem("A"), self_signed_pem("B"));
        let report = pool.add_certificate_key_pair(&bundle, &key.serialize_pem());
        assert_eq!(report.added, 2);
        assert!(report.warnings.is_empty());
        assert_eq!(pool.derived_pool().len(), 2);
    }

    #[test]
    fn key_pair_bad_key_only_warns() {
        let pool = isolated();
        let report = pool.add_certificate_key_pair(&self_signed_pem("A"), "not a key");
        assert_eq!(report.added, 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn key_pair_reads_paths_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let key = rcgen::KeyPair::generate().unwrap();
        std::fs::write(dir.path().join("cert.pem"), self_signed_pem("File")).unwrap();
        std::fs::write(dir.path().join("key.pem"), key.serialize_pem()).unwrap();

        let pool = TrustPool::new(TrustConfig {
            disable_embedded_ca: true,
            disable_system_ca: true,
            base_dir: Some(dir.path().to_path_buf()),
        });
        let report = pool.add_certificate_key_pair("cert.pem", "key.pem");
        assert_eq!(report, BundleReport { added: 1, warnings: vec![] });
    }

    #[test]
    fn bundle_is_published_as_one_snapshot() {
        let pool = isolated();
        pool.add_certificate(&self_signed_pem("First")).unwrap();
        let before = pool.derived_pool();

        let key = rcgen::KeyPair::generate().unwrap();
        let bundle: String = ["B", "C", "D"].iter().map(|cn| self_signed_pem(cn)).collect();
        let report = pool.add_certificate_key_pair(&bundle, &key.serialize_pem());
        assert_eq!(report.added, 3);

        assert_eq!(before.len(), 1);
        assert_eq!(pool.derived_pool().len(), 4);
        assert_eq!(pool.custom_certificates().len(), 4);
    }

    #[test]
    fn bundle_with_corrupt_middle_block_keeps_later_certificates() {
        let pool = isolated();
        let key = rcgen::KeyPair::generate().unwrap();
        let bundle = format!(
            "{}-----BEGIN CERTIFICATE-----\n!!not base64!!\n-----END CERTIFICATE-----\n{}",
            self_signed_pem("Before"),
            self_signed_pem("After")
        );
        let report = pool.add_certificate_key_pair(&bundle, &key.serialize_pem());
        assert_eq!(report.added, 2);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(pool.derived_pool().len(), 2);
    }

    #[test]
    fn bundle_without_certificates_reports_warning() {
        let pool = isolated();
        let key = rcgen::KeyPair::generate().unwrap();
        let report = pool.add_certificate_key_pair(&key.serialize_pem(), &key.serialize_pem());
        assert_eq!(report.added, 0);
        assert_eq!(report.warnings, vec!["no certificates found in certificate bundle".to_string()]);
    }

    #[test]
    fn failing_system_source_degrades_to_empty() {
        let pool = TrustPool::with_system_source(
            TrustConfig {
                disable_embedded_ca: true,
                disable_system_ca: false,
                base_dir: None,
            },
            || Err(TrustError::ChainValidationFailed("no OS roots".into())),
        );
        assert!(pool.derived_pool().is_empty());
        pool.add_certificate(&self_signed_pem("Custom")).unwrap();
        pool.reset();
        assert_eq!(pool.summary(), PoolSummary::default());
    }

    #[test]
    fn key_pair_unreadable_bundle_reports_warning() {
        let pool = isolated();
        let key = rcgen::KeyPair::generate().unwrap();
        let report = pool.add_certificate_key_pair("/nonexistent/cert.pem", &key.serialize_pem());
        assert_eq!(report.added, 0);
        assert_eq!(report.warnings.len(), 1);
    }
}
