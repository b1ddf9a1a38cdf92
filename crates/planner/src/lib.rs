//! GPU training cost estimation, configuration planning and submission gating.
//!
//! This crate estimates what a training run costs on a given GPU fleet,
//! searches for the best GPU configurations under time and budget targets,
//! and gates job submission against an organizational policy with a signed
//! attestation:
//!
//! - **Catalog** - GPU specs and per-tier pricing, merged from CSV sources
//! - **Cost model** - time, rental cost and energy for one configuration
//! - **Planner** - grid search over model × count × tier with Pareto ranking
//! - **Policy** - rule evaluation producing an ordered violation list
//! - **Attestation** - canonical JSON records signed with HMAC-SHA256
//!
//! Everything here is synchronous and side-effect free apart from loading
//! catalog and policy files. Loaded catalogs and policies are immutable and
//! can be shared across threads by reference.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gpu_planner::{plan, Catalog, PlanRequest, Workload};
//!
//! let catalog = Catalog::load_all(["data/gpu_catalog.csv"])?;
//!
//! let plans = plan(
//!     &catalog,
//!     &Workload::new(7.0, 1000.0),
//!     &PlanRequest {
//!         target_time_days: Some(14.0),
//!         budget_usd: Some(50_000.0),
//!         ..Default::default()
//!     },
//! )?;
//!
//! for candidate in &plans {
//!     println!(
//!         "{} x{} ({}): ${:.2} in {:.1}h",
//!         candidate.gpu_model(),
//!         candidate.num_gpus(),
//!         candidate.price_tier(),
//!         candidate.cost(),
//!         candidate.hours()
//!     );
//! }
//! ```
//!
//! ## Submission
//!
//! ```rust,ignore
//! use gpu_planner::{evaluate_submission, sign_attestation, Policy, SigningKey};
//!
//! let policy = Policy::from_path("data/policy.json")?;
//! let key = SigningKey::from_env()?;
//!
//! let decision = evaluate_submission(&catalog, &policy, manifest)?;
//! let signed = sign_attestation(&key, decision.attestation)?;
//! ```

pub mod attest;
pub mod canonical;
pub mod catalog;
pub mod error;
pub mod estimate;
pub mod plan;
pub mod policy;
pub mod submit;

pub use attest::{
    sign_attestation, signature_for, verify_attestation, verify_signature, Attestation,
    AttestationError, AttestationStatus, SignedAttestation, SigningKey,
};
pub use catalog::{Catalog, GpuSpec, PriceTier, TierRates};
pub use error::{PlannerError, Result};
pub use estimate::{estimate, Estimate, EstimateAssumptions, Sizing, Workload};
pub use plan::{pareto_frontier, plan, PlanCandidate, PlanRequest, MAX_GRID_CELLS, MAX_PLANS};
pub use policy::{check, ClassRule, GlobalLimits, Manifest, Policy, Violation};
pub use submit::{evaluate_submission, SubmissionDecision};
