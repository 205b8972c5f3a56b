//! The process-owned handle tying the trust pool and global pins together.

use crate::config::TrustConfig;
use crate::pins::PinRegistry;
use crate::policy::{self, PeerVerification, PolicyOptions};
use crate::pool::TrustPool;
use crate::TrustError;
use std::sync::Arc;

/// Trust pool plus global pin set, shared by every connection that uses it.
///
/// Cloning is cheap and clones share state.
#[derive(Debug, Clone)]
pub struct TrustContext {
    config: TrustConfig,
    pool: Arc<TrustPool>,
    pins: Arc<PinRegistry>,
}

impl TrustContext {
    pub fn new(config: TrustConfig) -> Self {
        Self {
            pool: Arc::new(TrustPool::new(config.clone())),
            pins: Arc::new(PinRegistry::new()),
            config,
        }
    }

    /// Use an already constructed pool, e.g. one with its own OS root source.
    pub fn with_pool(config: TrustConfig, pool: TrustPool) -> Self {
        Self {
            pool: Arc::new(pool),
            pins: Arc::new(PinRegistry::new()),
            config,
        }
    }

    /// Build from `DISABLE_EMBED_CA` / `DISABLE_SYSTEM_CA`.
    pub fn from_env() -> Self {
        Self::new(TrustConfig::from_env())
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<TrustPool> {
        &self.pool
    }

    pub fn pins(&self) -> &Arc<PinRegistry> {
        &self.pins
    }

    /// Compose the verification settings for one connection.
    ///
    /// Malformed fingerprints and unusable CA material fail here, before
    /// any handshake.
    pub fn peer_verification(&self, options: &PolicyOptions) -> Result<PeerVerification, TrustError> {
        policy::compose(&self.config, &self.pool, &self.pins, options)
    }
}

impl Default for TrustContext {
    fn default() -> Self {
        Self::new(TrustConfig::default())
    }
}
