//! Submission gate: plan a manifest, evaluate the chosen plan, record the decision.

use tracing::{info, warn};

use crate::attest::Attestation;
use crate::catalog::Catalog;
use crate::error::{PlannerError, Result};
use crate::plan::{plan, PlanCandidate};
use crate::policy::{check, Manifest, Policy};

/// Outcome of evaluating a submission, before signing.
#[derive(Debug, Clone)]
pub struct SubmissionDecision {
    /// The decision record to sign.
    pub attestation: Attestation,
    /// Ranked alternatives the chosen plan was picked from.
    pub alternatives: Vec<PlanCandidate>,
}

/// Validate `manifest`, pick its best plan and evaluate it against `policy`.
///
/// The best plan is the cheapest Pareto-optimal candidate. A policy
/// violation is not an error; it yields a rejected attestation.
///
/// # Errors
///
/// Returns [`PlannerError::InvalidManifest`] for bad input,
/// [`PlannerError::GridTooLarge`] when the search space exceeds the planner
/// limit, and [`PlannerError::NoFeasiblePlan`] when no configuration can be
/// costed.
pub fn evaluate_submission(
    catalog: &Catalog,
    policy: &Policy,
    manifest: Manifest,
) -> Result<SubmissionDecision> {
    let manifest = manifest.validated()?;

    let alternatives = plan(catalog, &manifest.workload(), &manifest.plan_request())?;
    let best = alternatives
        .first()
        .cloned()
        .ok_or(PlannerError::NoFeasiblePlan)?;

    let violations = check(&manifest, &best, policy);
    let attestation = Attestation::new(manifest, best, policy.version_id()?, &violations);

    if attestation.is_approved() {
        info!(
            gpu_model = %attestation.plan.gpu_model(),
            num_gpus = attestation.plan.num_gpus(),
            tier = %attestation.plan.price_tier(),
            policy_version = %attestation.policy_version,
            "Submission approved"
        );
    } else {
        warn!(
            violations = ?attestation.violations,
            policy_version = %attestation.policy_version,
            "Submission rejected"
        );
    }

    Ok(SubmissionDecision {
        attestation,
        alternatives,
    })
}
