//! Training cost model.
//!
//! Maps a GPU spec, a workload and a GPU count onto wall-clock time, rental
//! cost and energy use. Compute demand uses the dense-transformer
//! approximation `FLOPs ≈ 6 × params × tokens`.

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, GpuSpec, PriceTier};
use crate::error::{PlannerError, Result};

/// Lower bound applied to utilization before dividing by it.
pub const MIN_UTILIZATION: f64 = 1e-6;

const SECONDS_PER_HOUR: f64 = 3600.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Model size and training data volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    /// Parameter count in billions.
    pub model_params_b: f64,
    /// Training tokens in billions.
    pub tokens_b: f64,
}

impl Workload {
    #[must_use]
    pub const fn new(model_params_b: f64, tokens_b: f64) -> Self {
        Self {
            model_params_b,
            tokens_b,
        }
    }

    /// Total training compute in FLOPs.
    #[must_use]
    pub fn total_flops(&self) -> f64 {
        6.0 * (self.model_params_b * 1e9) * (self.tokens_b * 1e9)
    }

    /// Ensure both sizes are positive finite numbers.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::InvalidWorkload`] otherwise.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("model_params_b", self.model_params_b),
            ("tokens_b", self.tokens_b),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PlannerError::InvalidWorkload(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Tunable assumptions behind an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimateAssumptions {
    /// Achieved fraction of theoretical peak throughput.
    pub efficiency: f64,
    /// Fraction of wall-clock time spent on productive work.
    pub utilization: f64,
    /// Energy price in USD per kWh.
    pub energy_cost_per_kwh: f64,
    /// Average power draw as a fraction of TDP.
    pub tdp_factor: f64,
}

impl Default for EstimateAssumptions {
    fn default() -> Self {
        Self {
            efficiency: 0.30,
            utilization: 0.85,
            energy_cost_per_kwh: 0.12,
            tdp_factor: 0.70,
        }
    }
}

impl EstimateAssumptions {
    /// Utilization clamped into `[MIN_UTILIZATION, 1.0]`.
    #[must_use]
    pub fn clamped_utilization(&self) -> f64 {
        if self.utilization.is_nan() {
            return MIN_UTILIZATION;
        }
        self.utilization.clamp(MIN_UTILIZATION, 1.0)
    }

    /// Range-check the assumptions. Utilization is clamped, not checked.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::InvalidEfficiency`] unless `0 < efficiency <= 1`,
    /// and [`PlannerError::InvalidAssumption`] for a negative or non-finite
    /// energy price or TDP factor.
    pub fn validate(&self) -> Result<()> {
        if !(self.efficiency > 0.0 && self.efficiency <= 1.0) {
            return Err(PlannerError::InvalidEfficiency {
                efficiency: self.efficiency,
            });
        }
        for (name, value) in [
            ("energy_cost_per_kwh", self.energy_cost_per_kwh),
            ("tdp_factor", self.tdp_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PlannerError::InvalidAssumption { name, value });
            }
        }
        Ok(())
    }
}

/// How the GPU count of an estimate is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sizing {
    /// Explicit GPU count. Takes precedence over the target.
    pub num_gpus: Option<u32>,
    /// Target wall-clock days used to derive the count when none is given.
    pub target_time_days: Option<f64>,
}

impl Sizing {
    /// Fixed GPU count.
    #[must_use]
    pub const fn gpus(num_gpus: u32) -> Self {
        Self {
            num_gpus: Some(num_gpus),
            target_time_days: None,
        }
    }

    /// Derive the count from a target duration.
    #[must_use]
    pub const fn target_days(days: f64) -> Self {
        Self {
            num_gpus: None,
            target_time_days: Some(days),
        }
    }
}

/// Result of the cost model for one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub gpu_model: String,
    pub num_gpus: u32,
    /// Whether `num_gpus` was derived from a target time.
    pub derived_num_gpus: bool,
    pub price_tier: PriceTier,
    pub assumptions: EstimateAssumptions,
    pub total_flops: f64,
    pub effective_tflops_per_gpu: f64,
    pub wall_time_hours: f64,
    pub rate_per_gpu_usd_per_hour: f64,
    /// Rental cost: wall-clock hours on every GPU, idle headroom included.
    pub compute_cost_usd: f64,
    pub energy_kwh: f64,
    pub energy_cost_usd: f64,
    /// Compute plus energy; cloud billing excludes the energy part.
    pub total_cost_usd: f64,
}

/// Estimate time, cost and energy for training `workload` on `spec`.
///
/// # Errors
///
/// Fails when the workload is not positive, an assumption is out of range,
/// an explicit GPU count of zero is requested, or a target time is not
/// positive. A target that would need more GPUs than a `u32` holds yields
/// [`PlannerError::GpuCountOverflow`] rather than an under-sized count.
pub fn estimate(
    spec: &GpuSpec,
    workload: &Workload,
    sizing: Sizing,
    assumptions: &EstimateAssumptions,
    tier: PriceTier,
) -> Result<Estimate> {
    workload.validate()?;
    assumptions.validate()?;
    if let Some(days) = sizing.target_time_days {
        if !days.is_finite() || days <= 0.0 {
            return Err(PlannerError::InvalidTargetTime { days });
        }
    }

    let total_flops = workload.total_flops();
    let effective_tflops = spec.tflops_fp16 * assumptions.efficiency;
    if !(effective_tflops.is_finite() && effective_tflops > 0.0) {
        return Err(PlannerError::InvalidEfficiency {
            efficiency: assumptions.efficiency,
        });
    }
    let effective_flops = effective_tflops * 1e12;
    let utilization = assumptions.clamped_utilization();

    let (num_gpus, derived) = match (sizing.num_gpus, sizing.target_time_days) {
        (Some(0), _) => return Err(PlannerError::InvalidGpuCount),
        (Some(n), _) => (n, false),
        (None, Some(days)) => {
            let target_hours = days * HOURS_PER_DAY;
            let need = total_flops / (effective_flops * SECONDS_PER_HOUR * target_hours * utilization);
            let gpus = gpus_for(need).ok_or(PlannerError::GpuCountOverflow {
                days,
                required: need.ceil(),
                max: u32::MAX,
            })?;
            (gpus, true)
        }
        (None, None) => (1, false),
    };

    let gpus = f64::from(num_gpus);
    let raw_hours = total_flops / (gpus * effective_flops) / SECONDS_PER_HOUR;
    let wall_time_hours = raw_hours / utilization;

    let rate = spec.rate(tier);
    let compute_cost_usd = wall_time_hours * gpus * rate;

    let avg_watts = spec.tdp_watts * assumptions.tdp_factor;
    let energy_kwh = avg_watts * gpus * wall_time_hours / 1000.0;
    let energy_cost_usd = energy_kwh * assumptions.energy_cost_per_kwh;

    Ok(Estimate {
        gpu_model: spec.gpu_model.clone(),
        num_gpus,
        derived_num_gpus: derived,
        price_tier: tier,
        assumptions: *assumptions,
        total_flops,
        effective_tflops_per_gpu: effective_tflops,
        wall_time_hours,
        rate_per_gpu_usd_per_hour: rate,
        compute_cost_usd,
        energy_kwh,
        energy_cost_usd,
        total_cost_usd: compute_cost_usd + energy_cost_usd,
    })
}

/// Smallest whole GPU count covering `need`, at least one. `None` when the
/// count does not fit in a `u32`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn gpus_for(need: f64) -> Option<u32> {
    let ceil = need.ceil();
    if ceil.is_nan() || ceil > f64::from(u32::MAX) {
        None
    } else if ceil < 1.0 {
        Some(1)
    } else {
        Some(ceil as u32)
    }
}

impl Catalog {
    /// Run the cost model for a catalog model by name.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::UnknownGpuModel`] for models not in the
    /// catalog, and any error of [`estimate`].
    pub fn estimate(
        &self,
        gpu_model: &str,
        workload: &Workload,
        sizing: Sizing,
        assumptions: &EstimateAssumptions,
        tier: PriceTier,
    ) -> Result<Estimate> {
        estimate(self.lookup(gpu_model)?, workload, sizing, assumptions, tier)
    }
}
