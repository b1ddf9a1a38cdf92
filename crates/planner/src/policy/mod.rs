//! Organizational submission policy.
//!
//! A [`Policy`] is loaded once from a JSON document and held immutably; the
//! evaluator in [`check`] reads it by reference.
//!
//! ```json
//! {
//!   "version": "2025-01",
//!   "allowed_regions": ["us-east", "eu-west"],
//!   "class_rules": {
//!     "RESTRICTED": {"allow_spot": false, "max_gpus": 4, "require_region_prefix": "us-"}
//!   },
//!   "gpu_allowlist_by_class": {"RESTRICTED": ["H100-80GB"]},
//!   "global": {"max_budget_usd": 250000}
//! }
//! ```

mod check;
mod manifest;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::to_canonical_vec;
use crate::error::Result;

pub use check::{check, Violation};
pub use manifest::Manifest;

/// Restrictions attached to one data classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassRule {
    /// Whether spot capacity may be used.
    pub allow_spot: bool,
    /// Upper bound on GPUs per job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_gpus: Option<u32>,
    /// Region names must start with this prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_region_prefix: Option<String>,
}

impl Default for ClassRule {
    fn default() -> Self {
        Self {
            allow_spot: true,
            max_gpus: None,
            require_region_prefix: None,
        }
    }
}

/// Limits that apply regardless of classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_budget_usd: Option<f64>,
}

/// Submission policy document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Human-assigned version label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Regions jobs may run in. Empty means any region.
    pub allowed_regions: BTreeSet<String>,
    /// Rules keyed by classification label.
    pub class_rules: BTreeMap<String, ClassRule>,
    /// Permitted GPU models keyed by classification label.
    pub gpu_allowlist_by_class: BTreeMap<String, BTreeSet<String>>,
    pub global: GlobalLimits,
}

impl Policy {
    /// Parse a policy document.
    ///
    /// # Errors
    ///
    /// Fails when the document is not valid policy JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a policy document from disk.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Rule for an upper-cased classification label.
    #[must_use]
    pub fn class_rule(&self, classification: &str) -> Option<&ClassRule> {
        find_by_class(&self.class_rules, classification)
    }

    /// GPU allowlist for an upper-cased classification label.
    #[must_use]
    pub fn gpu_allowlist(&self, classification: &str) -> Option<&BTreeSet<String>> {
        find_by_class(&self.gpu_allowlist_by_class, classification)
    }

    /// Identifier recorded in attestations.
    ///
    /// The explicit `version` label when present, otherwise a SHA-256 digest
    /// of the canonical policy content so any edit changes the identifier.
    ///
    /// # Errors
    ///
    /// Fails only if the policy cannot be encoded as JSON.
    pub fn version_id(&self) -> Result<String> {
        if let Some(version) = self.version.as_deref().map(str::trim) {
            if !version.is_empty() {
                return Ok(version.to_string());
            }
        }
        let digest = Sha256::digest(to_canonical_vec(self)?);
        Ok(format!("sha256:{}", hex::encode(digest)))
    }
}

fn find_by_class<'a, V>(map: &'a BTreeMap<String, V>, classification: &str) -> Option<&'a V> {
    map.get(classification).or_else(|| {
        map.iter()
            .find(|(key, _)| key.to_uppercase() == classification)
            .map(|(_, value)| value)
    })
}
