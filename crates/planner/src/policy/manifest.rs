//! Caller-supplied job manifest.

use serde::{Deserialize, Serialize};

use crate::catalog::PriceTier;
use crate::error::{PlannerError, Result};
use crate::estimate::{EstimateAssumptions, Workload};
use crate::plan::{PlanRequest, MAX_GRID_CELLS};

/// Description of a training job submitted for approval.
///
/// Manifests arrive from untrusted callers; run [`Manifest::validated`]
/// before planning or evaluating them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Data classification label (e.g., "RESTRICTED"). Matched case-insensitively.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    /// Target region (e.g., "us-east").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Declared compute budget in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_usd: Option<f64>,
    /// Declared wall-clock target in days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_time_days: Option<f64>,
    /// Parameter count in billions.
    pub model_params_b: f64,
    /// Training tokens in billions.
    pub tokens_b: f64,
    /// Restrict planning to these GPU models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_models: Option<Vec<String>>,
    /// Restrict planning to these GPU counts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_gpus_list: Option<Vec<u32>>,
    /// Restrict planning to these price tiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_tiers: Option<Vec<PriceTier>>,
    /// Override the default efficiency assumption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency: Option<f64>,
    /// Override the default utilization assumption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
}

impl Manifest {
    /// Normalize and validate an untrusted manifest.
    ///
    /// Blank classification and region strings become absent; numeric
    /// fields must be finite and in range, and the explicit search lists may
    /// not span more than [`MAX_GRID_CELLS`] cells.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::InvalidManifest`] describing the first bad field.
    pub fn validated(mut self) -> Result<Self> {
        self.classification = non_blank(self.classification);
        self.region = non_blank(self.region);

        if let Some(budget) = self.budget_usd {
            if !budget.is_finite() || budget < 0.0 {
                return Err(invalid(format!(
                    "budget_usd must be a non-negative number, got {budget}"
                )));
            }
        }
        if let Some(days) = self.target_time_days {
            if !days.is_finite() || days <= 0.0 {
                return Err(invalid(format!(
                    "target_time_days must be a positive number, got {days}"
                )));
            }
        }
        if let Some(value) = self.utilization {
            if !value.is_finite() {
                return Err(invalid("utilization must be a finite number".to_string()));
            }
        }
        self.assumptions()
            .validate()
            .map_err(|e| invalid(e.to_string()))?;
        if self
            .num_gpus_list
            .as_ref()
            .is_some_and(|counts| counts.contains(&0))
        {
            return Err(invalid("num_gpus_list entries must be at least 1".to_string()));
        }
        // An absent model list counts as one model here; the planner rechecks
        // against the real catalog size.
        let cells = self.plan_request().grid_cells(1);
        if cells > MAX_GRID_CELLS {
            return Err(invalid(format!(
                "search grid of {cells} cells exceeds the limit of {MAX_GRID_CELLS}"
            )));
        }

        self.workload()
            .validate()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(self)
    }

    /// Upper-cased classification used for policy lookup.
    #[must_use]
    pub fn classification_key(&self) -> Option<String> {
        self.classification.as_deref().map(str::to_uppercase)
    }

    #[must_use]
    pub const fn workload(&self) -> Workload {
        Workload::new(self.model_params_b, self.tokens_b)
    }

    /// Default assumptions with the manifest's overrides applied.
    #[must_use]
    pub fn assumptions(&self) -> EstimateAssumptions {
        let defaults = EstimateAssumptions::default();
        EstimateAssumptions {
            efficiency: self.efficiency.unwrap_or(defaults.efficiency),
            utilization: self.utilization.unwrap_or(defaults.utilization),
            ..defaults
        }
    }

    /// Planner search space described by this manifest.
    #[must_use]
    pub fn plan_request(&self) -> PlanRequest {
        PlanRequest {
            gpu_models: self.gpu_models.clone(),
            num_gpus_list: self.num_gpus_list.clone(),
            price_tiers: self.price_tiers.clone(),
            target_time_days: self.target_time_days,
            budget_usd: self.budget_usd,
            assumptions: self.assumptions(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn invalid(reason: String) -> PlannerError {
    PlannerError::InvalidManifest(reason)
}
