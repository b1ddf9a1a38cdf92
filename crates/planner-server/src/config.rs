//! Service configuration and the immutable state it loads.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use gpu_planner::{AttestationError, Catalog, Policy, SigningKey};
use tracing::{info, warn};

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Default catalog source.
pub const DEFAULT_CATALOG: &str = "data/gpu_catalog.csv";

/// Catalog sources, merged in order with later files winning.
#[derive(Debug, Clone, Args)]
pub struct CatalogArgs {
    /// Catalog CSV file (repeatable, or comma-separated `GPU_CATALOG_PATHS`).
    #[arg(
        long = "catalog",
        env = "GPU_CATALOG_PATHS",
        value_delimiter = ',',
        default_value = DEFAULT_CATALOG
    )]
    pub paths: Vec<PathBuf>,
}

impl CatalogArgs {
    /// Load and merge every configured source.
    ///
    /// # Errors
    ///
    /// Fails when a source cannot be read or the merged catalog is empty.
    pub fn load(&self) -> Result<Catalog> {
        let catalog = Catalog::load_all(&self.paths)
            .with_context(|| format!("Failed to load GPU catalog from {:?}", self.paths))?;
        if catalog.is_empty() {
            bail!("GPU catalog is empty (sources: {:?})", self.paths);
        }
        info!(sources = self.paths.len(), models = catalog.len(), "Loaded GPU catalog");
        Ok(catalog)
    }
}

/// Configuration for the HTTP service.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Address to listen on.
    #[arg(long = "bind", env = "GPU_PLANNER_BIND", default_value = DEFAULT_BIND)]
    pub bind_addr: SocketAddr,

    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Policy JSON document. Without one every submission is approved.
    #[arg(long = "policy", env = "GPU_POLICY_PATH")]
    pub policy_path: Option<PathBuf>,
}

/// Shared application state. Loaded once, never mutated.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub policy: Arc<Policy>,
    /// `None` when no signing key is configured; submissions then fail.
    pub signing_key: Option<SigningKey>,
}

impl AppState {
    #[must_use]
    pub fn new(catalog: Catalog, policy: Policy, signing_key: Option<SigningKey>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            policy: Arc::new(policy),
            signing_key,
        }
    }

    /// Load catalog, policy and signing key for `config`.
    ///
    /// A missing signing key is not fatal here: estimation and planning keep
    /// working and only the submission routes report the misconfiguration.
    ///
    /// # Errors
    ///
    /// Fails when the catalog or policy cannot be loaded.
    pub fn load(config: &Config) -> Result<Self> {
        let catalog = config.catalog.load()?;

        let policy = match &config.policy_path {
            Some(path) => Policy::from_path(path)
                .with_context(|| format!("Failed to load policy from {}", path.display()))?,
            None => {
                warn!("No policy configured; submissions are evaluated against an empty policy");
                Policy::default()
            }
        };
        info!(
            policy_version = %policy.version_id()?,
            allowed_regions = policy.allowed_regions.len(),
            class_rules = policy.class_rules.len(),
            "Loaded submission policy"
        );

        let signing_key = match SigningKey::from_env() {
            Ok(key) => Some(key),
            Err(AttestationError::MissingKey(var)) => {
                warn!("{var} not set; submissions will fail until a signing key is configured");
                None
            }
            Err(e) => return Err(e).context("Failed to read attestation signing key"),
        };

        Ok(Self::new(catalog, policy, signing_key))
    }
}
