//! Signed approval/rejection records.
//!
//! An [`Attestation`] is encoded as canonical JSON (keys sorted recursively,
//! no whitespace) and signed with HMAC-SHA256. The signature is carried as
//! URL-safe base64 without padding. Signatures provide tamper detection only;
//! the record itself is not encrypted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::canonical::to_canonical_vec;
use crate::plan::PlanCandidate;
use crate::policy::{Manifest, Violation};

type HmacSha256 = Hmac<Sha256>;

/// Environment variable holding the attestation signing key.
pub const SIGNING_KEY_ENV: &str = "ATTESTATION_SIGNING_KEY";

/// Algorithm label attached to every signature.
pub const SIGNATURE_ALG: &str = "HS256";

/// Errors that prevent producing or checking a signature.
///
/// These are configuration or encoding failures, never a policy decision.
#[derive(Error, Debug)]
pub enum AttestationError {
    /// No signing key is configured.
    #[error("attestation signing key not configured (set {0})")]
    MissingKey(&'static str),

    /// The key was rejected by the MAC implementation.
    #[error("invalid attestation signing key")]
    InvalidKey,

    /// The record could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Secret used to sign attestations.
#[derive(Clone)]
pub struct SigningKey(String);

impl SigningKey {
    /// Wrap a secret.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::MissingKey`] for an empty secret.
    pub fn new(secret: impl Into<String>) -> Result<Self, AttestationError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AttestationError::MissingKey(SIGNING_KEY_ENV));
        }
        Ok(Self(secret))
    }

    /// Read the key from `ATTESTATION_SIGNING_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::MissingKey`] when unset or empty.
    pub fn from_env() -> Result<Self, AttestationError> {
        let secret = std::env::var(SIGNING_KEY_ENV)
            .map_err(|_| AttestationError::MissingKey(SIGNING_KEY_ENV))?;
        Self::new(secret)
    }

    fn mac(&self) -> Result<HmacSha256, AttestationError> {
        HmacSha256::new_from_slice(self.0.as_bytes()).map_err(|_| AttestationError::InvalidKey)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Submission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationStatus {
    Approved,
    Rejected,
}

impl std::fmt::Display for AttestationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Record of a submission decision and the inputs that justify it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub status: AttestationStatus,
    pub timestamp: DateTime<Utc>,
    pub manifest: Manifest,
    pub plan: PlanCandidate,
    pub policy_version: String,
    /// Human-readable violations; empty when approved.
    #[serde(default)]
    pub violations: Vec<String>,
}

impl Attestation {
    /// Record a decision now. The status follows from `violations`.
    #[must_use]
    pub fn new(
        manifest: Manifest,
        plan: PlanCandidate,
        policy_version: impl Into<String>,
        violations: &[Violation],
    ) -> Self {
        Self::at(Utc::now(), manifest, plan, policy_version, violations)
    }

    /// Record a decision at a fixed time.
    #[must_use]
    pub fn at(
        timestamp: DateTime<Utc>,
        manifest: Manifest,
        plan: PlanCandidate,
        policy_version: impl Into<String>,
        violations: &[Violation],
    ) -> Self {
        let status = if violations.is_empty() {
            AttestationStatus::Approved
        } else {
            AttestationStatus::Rejected
        };
        Self {
            status,
            timestamp,
            manifest,
            plan,
            policy_version: policy_version.into(),
            violations: violations.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status == AttestationStatus::Approved
    }
}

/// An attestation together with its signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedAttestation {
    pub attestation: Attestation,
    pub signature: String,
    pub alg: String,
}

/// Compute the signature of any serializable record.
///
/// # Errors
///
/// Fails when the record cannot be encoded or the key is unusable.
pub fn signature_for<T: Serialize + ?Sized>(
    key: &SigningKey,
    record: &T,
) -> Result<String, AttestationError> {
    let body = to_canonical_vec(record)?;
    let mut mac = key.mac()?;
    mac.update(&body);
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Sign an attestation.
///
/// # Errors
///
/// Fails when the attestation cannot be encoded or the key is unusable.
pub fn sign_attestation(
    key: &SigningKey,
    attestation: Attestation,
) -> Result<SignedAttestation, AttestationError> {
    let signature = signature_for(key, &attestation)?;
    Ok(SignedAttestation {
        attestation,
        signature,
        alg: SIGNATURE_ALG.to_string(),
    })
}

/// Check a signature against a record in constant time.
///
/// Accepts any serializable form of the record, so a raw JSON value received
/// over the wire verifies the same as the typed [`Attestation`].
///
/// # Errors
///
/// Fails when the record cannot be encoded or the key is unusable. A
/// malformed or mismatching signature yields `Ok(false)`.
pub fn verify_signature<T: Serialize + ?Sized>(
    key: &SigningKey,
    record: &T,
    signature: &str,
) -> Result<bool, AttestationError> {
    let Ok(expected) = URL_SAFE_NO_PAD.decode(signature) else {
        return Ok(false);
    };
    let body = to_canonical_vec(record)?;
    let mut mac = key.mac()?;
    mac.update(&body);
    Ok(mac.verify_slice(&expected).is_ok())
}

/// Verify a signed attestation.
///
/// # Errors
///
/// See [`verify_signature`].
pub fn verify_attestation(
    key: &SigningKey,
    signed: &SignedAttestation,
) -> Result<bool, AttestationError> {
    if signed.alg != SIGNATURE_ALG {
        return Ok(false);
    }
    verify_signature(key, &signed.attestation, &signed.signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PriceTier;
    use crate::estimate::{Estimate, EstimateAssumptions};
    use chrono::TimeZone;

    fn key() -> SigningKey {
        SigningKey::new("test-secret").unwrap()
    }

    fn attestation(violations: &[Violation]) -> Attestation {
        let plan = PlanCandidate {
            estimate: Estimate {
                gpu_model: "H100-80GB".to_string(),
                num_gpus: 8,
                derived_num_gpus: false,
                price_tier: PriceTier::OnDemand,
                assumptions: EstimateAssumptions::default(),
                total_flops: 4.2e19,
                effective_tflops_per_gpu: 593.7,
                wall_time_hours: 3.86,
                rate_per_gpu_usd_per_hour: 6.5,
                compute_cost_usd: 200.72,
                energy_kwh: 7.56,
                energy_cost_usd: 0.91,
                total_cost_usd: 201.63,
            },
            meets_time: true,
            meets_budget: true,
        };
        let manifest = Manifest {
            classification: Some("INTERNAL".to_string()),
            region: Some("us-east".to_string()),
            budget_usd: Some(500.0),
            model_params_b: 7.0,
            tokens_b: 1.0,
            ..Manifest::default()
        };
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        Attestation::at(ts, manifest, plan, "2025-01", violations)
    }

    #[test]
    fn test_status_follows_violations() {
        assert!(attestation(&[]).is_approved());
        let rejected = attestation(&[Violation::SpotForbidden {
            classification: "INTERNAL".to_string(),
        }]);
        assert_eq!(rejected.status, AttestationStatus::Rejected);
        assert_eq!(rejected.violations, vec!["class INTERNAL forbids spot"]);
    }

    #[test]
    fn test_sign_and_verify() {
        let signed = sign_attestation(&key(), attestation(&[])).unwrap();
        assert_eq!(signed.alg, "HS256");
        assert!(!signed.signature.contains('='));
        assert!(!signed.signature.contains('+'));
        assert!(!signed.signature.contains('/'));
        assert_eq!(signed.signature.len(), 43);
        assert!(verify_attestation(&key(), &signed).unwrap());
    }

    #[test]
    fn test_signature_is_deterministic() {
        let a = sign_attestation(&key(), attestation(&[])).unwrap();
        let b = sign_attestation(&key(), attestation(&[])).unwrap();
        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn test_tampering_detected() {
        let mut signed = sign_attestation(&key(), attestation(&[])).unwrap();
        signed.attestation.manifest.budget_usd = Some(5_000_000.0);
        assert!(!verify_attestation(&key(), &signed).unwrap());

        let signed = sign_attestation(&key(), attestation(&[])).unwrap();
        let other = SigningKey::new("another-secret").unwrap();
        assert!(!verify_attestation(&other, &signed).unwrap());
    }

    #[test]
    fn test_malformed_signature_is_invalid() {
        let mut signed = sign_attestation(&key(), attestation(&[])).unwrap();
        signed.signature = "not base64!!".to_string();
        assert!(!verify_attestation(&key(), &signed).unwrap());
    }

    #[test]
    fn test_json_round_trip_still_verifies() {
        let signed = sign_attestation(&key(), attestation(&[])).unwrap();
        let wire = serde_json::to_string_pretty(&signed).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&wire).unwrap();
        assert!(verify_signature(&key(), &raw["attestation"], &signed.signature).unwrap());

        let typed: SignedAttestation = serde_json::from_str(&wire).unwrap();
        assert!(verify_attestation(&key(), &typed).unwrap());
    }

    #[test]
    fn test_empty_key_is_missing() {
        assert!(matches!(
            SigningKey::new(""),
            Err(AttestationError::MissingKey(SIGNING_KEY_ENV))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        assert_eq!(format!("{:?}", key()), "SigningKey(<redacted>)");
    }
}
