//! Trust pool configuration and custom CA input resolution.

use crate::util::parse_bool_flag;
use crate::TrustError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment flag: skip the compiled-in fallback root bundle.
pub const ENV_DISABLE_EMBED_CA: &str = "DISABLE_EMBED_CA";
/// Environment flag: skip the operating system root store.
pub const ENV_DISABLE_SYSTEM_CA: &str = "DISABLE_SYSTEM_CA";

/// Process-level settings for composing the trust pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TrustConfig {
    /// Leave the compiled-in Mozilla root bundle out of the pool.
    pub disable_embedded_ca: bool,
    /// Leave the operating system root store out of the pool.
    pub disable_system_ca: bool,
    /// Directory that relative certificate, key and CA file paths resolve against.
    pub base_dir: Option<PathBuf>,
}

impl TrustConfig {
    /// Read `DISABLE_EMBED_CA` and `DISABLE_SYSTEM_CA` from the environment.
    ///
    /// Unset or unrecognized values leave the flag off.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| {
            lookup(name)
                .and_then(|v| parse_bool_flag(&v))
                .unwrap_or(false)
        };
        Self {
            disable_embedded_ca: flag(ENV_DISABLE_EMBED_CA),
            disable_system_ca: flag(ENV_DISABLE_SYSTEM_CA),
            base_dir: None,
        }
    }

    /// Set the directory relative paths resolve against.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Resolve `path` against [`TrustConfig::base_dir`]. Absolute paths are
    /// returned unchanged.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Load certificate-like input that is either inline PEM or a file path.
    pub(crate) fn load_pem_or_path(&self, input: &str) -> std::io::Result<Vec<u8>> {
        if looks_like_pem(input) {
            return Ok(input.as_bytes().to_vec());
        }
        std::fs::read(self.resolve_path(Path::new(input.trim())))
    }
}

/// Whether `input` carries an inline PEM block rather than a path.
pub(crate) fn looks_like_pem(input: &str) -> bool {
    input.contains("-----BEGIN ")
}

/// CA material supplied for a single connection.
///
/// When both a file and an inline string are present, the file wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CustomCa {
    /// PEM file, relative to [`TrustConfig::base_dir`] unless absolute.
    pub file: Option<PathBuf>,
    /// Inline PEM bundle.
    pub pem: Option<String>,
}

impl CustomCa {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            pem: None,
        }
    }

    pub fn from_pem(pem: impl Into<String>) -> Self {
        Self {
            file: None,
            pem: Some(pem.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file.as_ref().map_or(true, |p| p.as_os_str().is_empty())
            && self.pem.as_ref().map_or(true, |s| s.is_empty())
    }

    /// Read the CA material as PEM bytes.
    ///
    /// Returns `Ok(None)` when no CA material was supplied.
    pub(crate) fn load(&self, config: &TrustConfig) -> Result<Option<Vec<u8>>, TrustError> {
        if let Some(file) = self.file.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            let path = config.resolve_path(file);
            let data = std::fs::read(&path)
                .map_err(|source| TrustError::CaFileUnreadable { path, source })?;
            return Ok(Some(data));
        }
        Ok(self
            .pem
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn flags_default_off() {
        let config = TrustConfig::from_lookup(lookup(&[]));
        assert!(!config.disable_embedded_ca);
        assert!(!config.disable_system_ca);
    }

    #[test]
    fn flags_read_from_env_lookup() {
        let config = TrustConfig::from_lookup(lookup(&[
            (ENV_DISABLE_EMBED_CA, "true"),
            (ENV_DISABLE_SYSTEM_CA, "1"),
        ]));
        assert!(config.disable_embedded_ca);
        assert!(config.disable_system_ca);
    }

    #[test]
    fn unrecognized_flag_value_stays_off() {
        let config = TrustConfig::from_lookup(lookup(&[(ENV_DISABLE_SYSTEM_CA, "yes")]));
        assert!(!config.disable_system_ca);
    }

    #[test]
    fn relative_paths_resolve_against_base_dir() {
        let config = TrustConfig::default().with_base_dir("/etc/trustpin");
        assert_eq!(
            config.resolve_path(Path::new("ca.pem")),
            PathBuf::from("/etc/trustpin/ca.pem")
        );
        assert_eq!(
            config.resolve_path(Path::new("/tmp/ca.pem")),
            PathBuf::from("/tmp/ca.pem")
        );
    }

    #[test]
    fn custom_ca_file_wins_over_inline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ca.pem"), b"from file").unwrap();
        let config = TrustConfig::default().with_base_dir(dir.path());
        let ca = CustomCa {
            file: Some(PathBuf::from("ca.pem")),
            pem: Some("inline".into()),
        };
        assert_eq!(ca.load(&config).unwrap().unwrap(), b"from file");
    }

    #[test]
    fn custom_ca_missing_file_is_reported() {
        let config = TrustConfig::default();
        let ca = CustomCa::from_file("/nonexistent/trustpin/ca.pem");
        assert!(matches!(
            ca.load(&config),
            Err(TrustError::CaFileUnreadable { .. })
        ));
    }

    #[test]
    fn empty_custom_ca_loads_nothing() {
        let config = TrustConfig::default();
        assert!(CustomCa::default().is_empty());
        assert!(CustomCa::default().load(&config).unwrap().is_none());
        assert!(CustomCa::from_pem("").load(&config).unwrap().is_none());
    }

    #[test]
    fn config_deserializes_kebab_case() {
        let config: TrustConfig =
            serde_json::from_str(r#"{"disable-system-ca": true, "base-dir": "/srv"}"#).unwrap();
        assert!(config.disable_system_ca);
        assert!(!config.disable_embedded_ca);
        assert_eq!(config.base_dir, Some(PathBuf::from("/srv")));
    }
}
