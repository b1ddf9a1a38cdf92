//! Configuration planner.
//!
//! Costs every (GPU model × GPU count × price tier) cell, flags which cells
//! meet the time and budget targets, and returns the Pareto frontier over
//! (compute cost, wall-clock time).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{Catalog, PriceTier};
use crate::error::{PlannerError, Result};
use crate::estimate::{Estimate, EstimateAssumptions, Sizing, Workload};

/// Maximum number of candidates returned by [`plan`].
pub const MAX_PLANS: usize = 10;

/// Maximum number of grid cells one planning run may cost.
pub const MAX_GRID_CELLS: usize = 10_000;

/// GPU counts tried when the caller does not narrow the grid.
pub const DEFAULT_GPU_COUNTS: [u32; 7] = [1, 2, 4, 8, 16, 32, 64];

/// Tiers tried when the caller does not narrow the grid.
pub const DEFAULT_TIERS: [PriceTier; 3] =
    [PriceTier::OnDemand, PriceTier::Reserved, PriceTier::Spot];

/// Search space and constraints for a planning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanRequest {
    /// GPU models to try. `None` or empty means every catalog model.
    pub gpu_models: Option<Vec<String>>,
    /// GPU counts to try. `None` or empty means [`DEFAULT_GPU_COUNTS`].
    pub num_gpus_list: Option<Vec<u32>>,
    /// Tiers to try. `None` or empty means [`DEFAULT_TIERS`].
    pub price_tiers: Option<Vec<PriceTier>>,
    /// Wall-clock target in days; a feasibility filter only.
    pub target_time_days: Option<f64>,
    /// Compute budget in USD; a feasibility filter only.
    pub budget_usd: Option<f64>,
    pub assumptions: EstimateAssumptions,
}

impl PlanRequest {
    /// Number of (model, count, tier) cells this request spans when the
    /// model list defaults to `catalog_models` entries. Saturates.
    #[must_use]
    pub fn grid_cells(&self, catalog_models: usize) -> usize {
        let models = non_empty(self.gpu_models.as_deref()).map_or(catalog_models, <[_]>::len);
        let counts =
            non_empty(self.num_gpus_list.as_deref()).map_or(DEFAULT_GPU_COUNTS.len(), <[_]>::len);
        let tiers = non_empty(self.price_tiers.as_deref()).map_or(DEFAULT_TIERS.len(), <[_]>::len);
        models.saturating_mul(counts).saturating_mul(tiers)
    }

    /// Reject grids larger than [`MAX_GRID_CELLS`].
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::GridTooLarge`].
    pub fn check_grid(&self, catalog: &Catalog) -> Result<()> {
        let cells = self.grid_cells(catalog.len());
        if cells > MAX_GRID_CELLS {
            return Err(PlannerError::GridTooLarge {
                cells,
                max: MAX_GRID_CELLS,
            });
        }
        Ok(())
    }
}

/// One costed configuration with its feasibility flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCandidate {
    #[serde(flatten)]
    pub estimate: Estimate,
    pub meets_time: bool,
    pub meets_budget: bool,
}

impl PlanCandidate {
    #[must_use]
    pub fn gpu_model(&self) -> &str {
        &self.estimate.gpu_model
    }

    #[must_use]
    pub const fn num_gpus(&self) -> u32 {
        self.estimate.num_gpus
    }

    #[must_use]
    pub const fn price_tier(&self) -> PriceTier {
        self.estimate.price_tier
    }

    #[must_use]
    pub const fn cost(&self) -> f64 {
        self.estimate.compute_cost_usd
    }

    #[must_use]
    pub const fn hours(&self) -> f64 {
        self.estimate.wall_time_hours
    }

    /// Whether both the time and budget targets are met.
    #[must_use]
    pub const fn is_feasible(&self) -> bool {
        self.meets_time && self.meets_budget
    }

    /// Whether `self` is no worse than `other` on cost and time and strictly
    /// better on at least one.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        self.cost() <= other.cost()
            && self.hours() <= other.hours()
            && (self.cost() < other.cost() || self.hours() < other.hours())
    }
}

/// Propose up to [`MAX_PLANS`] configurations for `workload`.
///
/// Cells the cost model rejects are skipped. When at least one candidate
/// meets both targets only those are ranked; otherwise the whole grid is
/// ranked as a best effort, so callers must inspect the `meets_*` flags.
/// An empty result means no cell could be costed.
///
/// # Errors
///
/// Returns [`PlannerError::GridTooLarge`] before costing anything when the
/// request spans more than [`MAX_GRID_CELLS`] cells.
pub fn plan(
    catalog: &Catalog,
    workload: &Workload,
    request: &PlanRequest,
) -> Result<Vec<PlanCandidate>> {
    request.check_grid(catalog)?;

    let models = non_empty(request.gpu_models.as_deref())
        .map_or_else(|| catalog.models(), <[String]>::to_vec);
    let counts =
        non_empty(request.num_gpus_list.as_deref()).unwrap_or(&DEFAULT_GPU_COUNTS[..]);
    let tiers = non_empty(request.price_tiers.as_deref()).unwrap_or(&DEFAULT_TIERS[..]);

    let target_hours = request.target_time_days.map(|days| days * 24.0);

    let mut candidates = Vec::new();
    for model in &models {
        for &num_gpus in counts {
            for &tier in tiers {
                let estimate = match catalog.estimate(
                    model,
                    workload,
                    Sizing::gpus(num_gpus),
                    &request.assumptions,
                    tier,
                ) {
                    Ok(estimate) => estimate,
                    Err(e) => {
                        debug!(
                            gpu_model = %model,
                            num_gpus,
                            tier = %tier,
                            error = %e,
                            "Skipping plan cell"
                        );
                        continue;
                    }
                };

                let meets_time =
                    target_hours.is_none_or(|hours| estimate.wall_time_hours <= hours);
                let meets_budget = request
                    .budget_usd
                    .is_none_or(|budget| estimate.compute_cost_usd <= budget);

                candidates.push(PlanCandidate {
                    estimate,
                    meets_time,
                    meets_budget,
                });
            }
        }
    }

    let costed = candidates.len();
    let feasible: Vec<PlanCandidate> = candidates
        .iter()
        .filter(|c| c.is_feasible())
        .cloned()
        .collect();
    let any_feasible = !feasible.is_empty();
    let pool = if any_feasible { feasible } else { candidates };

    let mut frontier = pareto_frontier(pool);
    frontier.truncate(MAX_PLANS);

    info!(
        costed,
        any_feasible,
        returned = frontier.len(),
        "Planned training configurations"
    );
    Ok(frontier)
}

/// Keep the candidates no other candidate dominates, sorted by
/// (cost asc, time asc).
#[must_use]
pub fn pareto_frontier(candidates: Vec<PlanCandidate>) -> Vec<PlanCandidate> {
    let keep: Vec<bool> = candidates
        .iter()
        .map(|p| !candidates.iter().any(|q| q.dominates(p)))
        .collect();

    let mut frontier: Vec<PlanCandidate> = candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(c, keep)| keep.then_some(c))
        .collect();
    frontier.sort_by(compare_cost_then_time);
    frontier
}

fn compare_cost_then_time(a: &PlanCandidate, b: &PlanCandidate) -> Ordering {
    a.cost()
        .total_cmp(&b.cost())
        .then_with(|| a.hours().total_cmp(&b.hours()))
}

fn non_empty<T>(items: Option<&[T]>) -> Option<&[T]> {
    items.filter(|items| !items.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GpuSpec, TierRates};

    fn spec(name: &str, tflops: f64, on_demand: f64, spot: f64, reserved: f64) -> GpuSpec {
        GpuSpec {
            gpu_model: name.to_string(),
            vram_gb: 80.0,
            tflops_fp16: tflops,
            tdp_watts: 350.0,
            rates: TierRates {
                on_demand,
                spot,
                reserved,
            },
        }
    }

    fn catalog() -> Catalog {
        Catalog::from_specs(
            "test",
            [
                spec("H100-80GB", 989.0, 6.5, 3.9, 5.0),
                spec("A100-80GB", 312.0, 4.1, 2.5, 3.2),
                spec("L40S", 362.0, 1.9, 0.9, 1.4),
            ],
        )
        .unwrap()
    }

    fn candidate(cost: f64, hours: f64) -> PlanCandidate {
        PlanCandidate {
            estimate: Estimate {
                gpu_model: "X".to_string(),
                num_gpus: 1,
                derived_num_gpus: false,
                price_tier: PriceTier::OnDemand,
                assumptions: EstimateAssumptions::default(),
                total_flops: 1.0,
                effective_tflops_per_gpu: 1.0,
                wall_time_hours: hours,
                rate_per_gpu_usd_per_hour: 1.0,
                compute_cost_usd: cost,
                energy_kwh: 0.0,
                energy_cost_usd: 0.0,
                total_cost_usd: cost,
            },
            meets_time: true,
            meets_budget: true,
        }
    }

    #[test]
    fn test_dominance() {
        let a = candidate(10.0, 5.0);
        assert!(a.dominates(&candidate(10.0, 6.0)));
        assert!(a.dominates(&candidate(11.0, 5.0)));
        assert!(!a.dominates(&candidate(10.0, 5.0)));
        assert!(!a.dominates(&candidate(9.0, 6.0)));
    }

    #[test]
    fn test_pareto_frontier_sorted_and_filtered() {
        let frontier = pareto_frontier(vec![
            candidate(30.0, 1.0),
            candidate(10.0, 5.0),
            candidate(12.0, 6.0),
            candidate(20.0, 2.0),
            candidate(10.0, 5.0),
        ]);
        let points: Vec<(f64, f64)> = frontier.iter().map(|c| (c.cost(), c.hours())).collect();
        assert_eq!(points, vec![(10.0, 5.0), (10.0, 5.0), (20.0, 2.0), (30.0, 1.0)]);
    }

    #[test]
    fn test_plan_default_grid() {
        let plans =
            plan(&catalog(), &Workload::new(7.0, 100.0), &PlanRequest::default()).unwrap();
        assert!(!plans.is_empty());
        assert!(plans.len() <= MAX_PLANS);
        for pair in plans.windows(2) {
            assert!(pair[0].cost() <= pair[1].cost());
        }
        for p in &plans {
            assert!(p.is_feasible());
        }
    }

    #[test]
    fn test_plan_prefers_feasible() {
        let workload = Workload::new(7.0, 10.0);
        let request = PlanRequest {
            target_time_days: Some(1.0),
            ..PlanRequest::default()
        };
        let plans = plan(&catalog(), &workload, &request).unwrap();
        assert!(!plans.is_empty());
        assert!(plans.iter().all(|p| p.meets_time && p.hours() <= 24.0));
    }

    #[test]
    fn test_plan_falls_back_to_best_effort() {
        let request = PlanRequest {
            budget_usd: Some(0.01),
            ..PlanRequest::default()
        };
        let plans = plan(&catalog(), &Workload::new(70.0, 1000.0), &request).unwrap();
        assert!(!plans.is_empty());
        assert!(plans.iter().all(|p| !p.meets_budget));
    }

    #[test]
    fn test_plan_narrowed_grid() {
        let request = PlanRequest {
            gpu_models: Some(vec!["L40S".to_string()]),
            num_gpus_list: Some(vec![8]),
            price_tiers: Some(vec![PriceTier::Spot]),
            ..PlanRequest::default()
        };
        let plans = plan(&catalog(), &Workload::new(7.0, 100.0), &request).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].gpu_model(), "L40S");
        assert_eq!(plans[0].num_gpus(), 8);
        assert_eq!(plans[0].price_tier(), PriceTier::Spot);
    }

    #[test]
    fn test_plan_skips_failing_cells() {
        let request = PlanRequest {
            gpu_models: Some(vec!["B200".to_string(), "L40S".to_string()]),
            num_gpus_list: Some(vec![0, 4]),
            ..PlanRequest::default()
        };
        let plans = plan(&catalog(), &Workload::new(7.0, 100.0), &request).unwrap();
        assert!(!plans.is_empty());
        assert!(plans.iter().all(|p| p.gpu_model() == "L40S" && p.num_gpus() == 4));
    }

    #[test]
    fn test_plan_empty_when_nothing_costs() {
        let request = PlanRequest {
            assumptions: EstimateAssumptions {
                efficiency: 0.0,
                ..EstimateAssumptions::default()
            },
            ..PlanRequest::default()
        };
        assert!(plan(&catalog(), &Workload::new(7.0, 100.0), &request)
            .unwrap()
            .is_empty());
        assert!(plan(&Catalog::default(), &Workload::new(7.0, 100.0), &PlanRequest::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_grid_cells_uses_defaults() {
        assert_eq!(PlanRequest::default().grid_cells(3), 3 * 7 * 3);
        let request = PlanRequest {
            gpu_models: Some(vec!["L40S".to_string()]),
            num_gpus_list: Some(vec![]),
            price_tiers: Some(vec![PriceTier::Spot]),
            ..PlanRequest::default()
        };
        assert_eq!(request.grid_cells(3), 7);
    }

    #[test]
    fn test_oversized_grid_rejected_before_costing() {
        let request = PlanRequest {
            gpu_models: Some((0..50_000).map(|i| format!("gpu-{i}")).collect()),
            num_gpus_list: Some((1..=50_000).collect()),
            ..PlanRequest::default()
        };
        let err = plan(&Catalog::default(), &Workload::new(7.0, 1.0), &request).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::GridTooLarge { cells, max: MAX_GRID_CELLS } if cells == 50_000 * 50_000 * 3
        ));
        assert!(err.is_validation());

        let at_limit = PlanRequest {
            gpu_models: Some(vec!["L40S".to_string()]),
            num_gpus_list: Some((1..=3_333).collect()),
            ..PlanRequest::default()
        };
        assert!(at_limit.check_grid(&catalog()).is_ok());
    }
}
