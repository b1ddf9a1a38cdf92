//! Policy evaluation for a manifest and its chosen plan.

use std::fmt;

use serde::{Serialize, Serializer};

use super::{Manifest, Policy};
use crate::catalog::PriceTier;
use crate::plan::PlanCandidate;

/// A single policy rule the submission breaks.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// Region is not in `allowed_regions`.
    RegionNotAllowed { region: String },
    /// Class forbids spot capacity.
    SpotForbidden { classification: String },
    /// Plan uses more GPUs than the class permits.
    GpuCountExceeded {
        classification: String,
        max_gpus: u32,
        requested: u32,
    },
    /// Region lacks the prefix the class requires.
    RegionPrefixRequired {
        classification: String,
        prefix: String,
    },
    /// GPU model is not on the class allowlist.
    GpuModelNotAllowed {
        classification: String,
        gpu_model: String,
    },
    /// Declared budget is above the global ceiling.
    GlobalBudgetExceeded { budget_usd: f64, max_budget_usd: f64 },
    /// Plan compute cost is above the declared budget.
    PlanOverBudget { cost_usd: f64, budget_usd: f64 },
    /// Plan wall-clock time is above the declared target.
    PlanOverTime {
        wall_time_hours: f64,
        target_time_days: f64,
    },
}

impl Violation {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RegionNotAllowed { .. } => "region_not_allowed",
            Self::SpotForbidden { .. } => "spot_forbidden",
            Self::GpuCountExceeded { .. } => "gpu_count_exceeded",
            Self::RegionPrefixRequired { .. } => "region_prefix_required",
            Self::GpuModelNotAllowed { .. } => "gpu_model_not_allowed",
            Self::GlobalBudgetExceeded { .. } => "global_budget_exceeded",
            Self::PlanOverBudget { .. } => "plan_over_budget",
            Self::PlanOverTime { .. } => "plan_over_time",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegionNotAllowed { region } => {
                write!(f, "region '{region}' not in allowed_regions")
            }
            Self::SpotForbidden { classification } => {
                write!(f, "class {classification} forbids spot")
            }
            Self::GpuCountExceeded {
                classification,
                max_gpus,
                requested,
            } => write!(
                f,
                "class {classification} max_gpus={max_gpus}, requested {requested}"
            ),
            Self::RegionPrefixRequired {
                classification,
                prefix,
            } => write!(f, "class {classification} requires region prefix '{prefix}'"),
            Self::GpuModelNotAllowed {
                classification,
                gpu_model,
            } => write!(
                f,
                "class {classification} allowlist forbids gpu_model {gpu_model}"
            ),
            Self::GlobalBudgetExceeded {
                budget_usd,
                max_budget_usd,
            } => write!(
                f,
                "budget {budget_usd:.2} exceeds global max_budget_usd {max_budget_usd:.2}"
            ),
            Self::PlanOverBudget {
                cost_usd,
                budget_usd,
            } => write!(f, "plan cost {cost_usd:.2} exceeds budget {budget_usd:.2}"),
            Self::PlanOverTime {
                wall_time_hours,
                target_time_days,
            } => write!(
                f,
                "plan time {wall_time_hours:.2}h exceeds target_time_days {target_time_days} ({:.2}h)",
                target_time_days * 24.0
            ),
        }
    }
}

impl Serialize for Violation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Evaluate a manifest and its chosen plan against `policy`.
///
/// Every rule is evaluated and every violation collected, in a fixed order:
/// region allowlist, spot restriction, GPU count cap, region prefix, GPU
/// allowlist, global budget ceiling, plan vs budget, plan vs target time.
/// An empty result means the submission is approved.
///
/// The evaluator is permissive by default. A manifest field that is absent
/// disables every rule that reads it: no region skips the allowlist, no
/// classification skips all class rules, no budget skips both budget rules,
/// no target time skips the time rule. The one exception is a class that
/// requires a region prefix, which an absent region cannot satisfy.
/// Restrictions must be stated explicitly in the policy and the manifest.
///
/// A configured limit of zero is a real cap, not "unlimited": `max_gpus: 0`
/// rejects every plan for that class and `max_budget_usd: 0` rejects any
/// positive declared budget. Omit the field to leave it uncapped.
///
/// Classification labels are upper-cased before lookup; a label with no
/// matching rule is unrestricted beyond the region and global checks.
#[must_use]
pub fn check(manifest: &Manifest, plan: &PlanCandidate, policy: &Policy) -> Vec<Violation> {
    let mut violations = Vec::new();

    let region = manifest.region.as_deref();
    let classification = manifest.classification_key();

    if let Some(region) = region {
        if !policy.allowed_regions.is_empty() && !policy.allowed_regions.contains(region) {
            violations.push(Violation::RegionNotAllowed {
                region: region.to_string(),
            });
        }
    }

    if let Some(cls) = classification.as_deref() {
        if let Some(rule) = policy.class_rule(cls) {
            if plan.price_tier() == PriceTier::Spot && !rule.allow_spot {
                violations.push(Violation::SpotForbidden {
                    classification: cls.to_string(),
                });
            }

            if let Some(max_gpus) = rule.max_gpus {
                if plan.num_gpus() > max_gpus {
                    violations.push(Violation::GpuCountExceeded {
                        classification: cls.to_string(),
                        max_gpus,
                        requested: plan.num_gpus(),
                    });
                }
            }

            if let Some(prefix) = rule.require_region_prefix.as_deref() {
                if !region.is_some_and(|r| r.starts_with(prefix)) {
                    violations.push(Violation::RegionPrefixRequired {
                        classification: cls.to_string(),
                        prefix: prefix.to_string(),
                    });
                }
            }
        }

        if let Some(allowlist) = policy.gpu_allowlist(cls) {
            if !allowlist.is_empty() && !allowlist.contains(plan.gpu_model()) {
                violations.push(Violation::GpuModelNotAllowed {
                    classification: cls.to_string(),
                    gpu_model: plan.gpu_model().to_string(),
                });
            }
        }
    }

    if let (Some(budget_usd), Some(max_budget_usd)) =
        (manifest.budget_usd, policy.global.max_budget_usd)
    {
        if budget_usd > max_budget_usd {
            violations.push(Violation::GlobalBudgetExceeded {
                budget_usd,
                max_budget_usd,
            });
        }
    }

    if let Some(budget_usd) = manifest.budget_usd {
        if plan.cost() > budget_usd {
            violations.push(Violation::PlanOverBudget {
                cost_usd: plan.cost(),
                budget_usd,
            });
        }
    }

    if let Some(target_time_days) = manifest.target_time_days {
        if plan.hours() > target_time_days * 24.0 {
            violations.push(Violation::PlanOverTime {
                wall_time_hours: plan.hours(),
                target_time_days,
            });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::{Estimate, EstimateAssumptions};

    fn plan(gpu_model: &str, num_gpus: u32, tier: PriceTier, cost: f64, hours: f64) -> PlanCandidate {
        PlanCandidate {
            estimate: Estimate {
                gpu_model: gpu_model.to_string(),
                num_gpus,
                derived_num_gpus: false,
                price_tier: tier,
                assumptions: EstimateAssumptions::default(),
                total_flops: 4.2e19,
                effective_tflops_per_gpu: 296.7,
                wall_time_hours: hours,
                rate_per_gpu_usd_per_hour: 6.5,
                compute_cost_usd: cost,
                energy_kwh: 1.0,
                energy_cost_usd: 0.12,
                total_cost_usd: cost + 0.12,
            },
            meets_time: true,
            meets_budget: true,
        }
    }

    fn manifest() -> Manifest {
        Manifest {
            model_params_b: 7.0,
            tokens_b: 1.0,
            ..Manifest::default()
        }
    }

    fn strict_policy() -> Policy {
        Policy::from_json_str(
            r#"{
                "allowed_regions": ["us-east", "eu-west"],
                "class_rules": {
                    "RESTRICTED": {"allow_spot": false, "max_gpus": 4, "require_region_prefix": "us-"}
                },
                "gpu_allowlist_by_class": {"RESTRICTED": ["H100-80GB"]},
                "global": {"max_budget_usd": 1000}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_gpu_cap_single_violation() {
        let policy = Policy::from_json_str(r#"{"class_rules": {"RESTRICTED": {"max_gpus": 4}}}"#)
            .unwrap();
        let m = Manifest {
            classification: Some("RESTRICTED".to_string()),
            ..manifest()
        };
        let violations = check(&m, &plan("H100-80GB", 8, PriceTier::OnDemand, 100.0, 10.0), &policy);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code(), "gpu_count_exceeded");
        assert_eq!(violations[0].to_string(), "class RESTRICTED max_gpus=4, requested 8");
    }

    #[test]
    fn test_zero_limits_are_caps() {
        let policy = Policy::from_json_str(
            r#"{"class_rules": {"RESTRICTED": {"max_gpus": 0}}, "global": {"max_budget_usd": 0}}"#,
        )
        .unwrap();
        let m = Manifest {
            classification: Some("RESTRICTED".to_string()),
            budget_usd: Some(50.0),
            ..manifest()
        };
        let codes: Vec<&str> = check(&m, &plan("H100-80GB", 1, PriceTier::OnDemand, 10.0, 1.0), &policy)
            .iter()
            .map(Violation::code)
            .collect();
        assert_eq!(codes, vec!["gpu_count_exceeded", "global_budget_exceeded"]);
    }

    #[test]
    fn test_empty_manifest_is_permissive() {
        let policy = strict_policy();
        for p in [
            plan("A100-80GB", 64, PriceTier::Spot, 1e9, 1e6),
            plan("H100-80GB", 1, PriceTier::OnDemand, 1.0, 1.0),
        ] {
            assert!(check(&manifest(), &p, &policy).is_empty());
        }
    }

    #[test]
    fn test_all_violations_in_order() {
        let m = Manifest {
            classification: Some("restricted".to_string()),
            region: Some("ap-south".to_string()),
            budget_usd: Some(5000.0),
            target_time_days: Some(1.0),
            ..manifest()
        };
        let p = plan("A100-80GB", 8, PriceTier::Spot, 6000.0, 30.0);
        let codes: Vec<&str> = check(&m, &p, &strict_policy()).iter().map(Violation::code).collect();
        assert_eq!(
            codes,
            vec![
                "region_not_allowed",
                "spot_forbidden",
                "gpu_count_exceeded",
                "region_prefix_required",
                "gpu_model_not_allowed",
                "global_budget_exceeded",
                "plan_over_budget",
                "plan_over_time",
            ]
        );
    }

    #[test]
    fn test_compliant_submission() {
        let m = Manifest {
            classification: Some("RESTRICTED".to_string()),
            region: Some("us-east".to_string()),
            budget_usd: Some(900.0),
            target_time_days: Some(2.0),
            ..manifest()
        };
        let p = plan("H100-80GB", 4, PriceTier::Reserved, 800.0, 47.9);
        assert!(check(&m, &p, &strict_policy()).is_empty());
    }

    #[test]
    fn test_prefix_rule_without_region() {
        let m = Manifest {
            classification: Some("RESTRICTED".to_string()),
            ..manifest()
        };
        let p = plan("H100-80GB", 2, PriceTier::OnDemand, 10.0, 1.0);
        let violations = check(&m, &p, &strict_policy());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code(), "region_prefix_required");
    }

    #[test]
    fn test_unknown_classification_unrestricted() {
        let m = Manifest {
            classification: Some("PUBLIC".to_string()),
            region: Some("eu-west".to_string()),
            ..manifest()
        };
        let p = plan("A100-80GB", 64, PriceTier::Spot, 10.0, 1.0);
        assert!(check(&m, &p, &strict_policy()).is_empty());
    }

    #[test]
    fn test_budget_message_two_decimals() {
        let m = Manifest {
            budget_usd: Some(100.0),
            ..manifest()
        };
        let p = plan("H100-80GB", 1, PriceTier::OnDemand, 123.456, 1.0);
        let violations = check(&m, &p, &Policy::default());
        assert_eq!(violations[0].to_string(), "plan cost 123.46 exceeds budget 100.00");
        assert_eq!(
            serde_json::to_value(&violations).unwrap(),
            serde_json::json!(["plan cost 123.46 exceeds budget 100.00"])
        );
    }

    #[test]
    fn test_stricter_rule_never_removes_violations() {
        let m = Manifest {
            classification: Some("RESTRICTED".to_string()),
            region: Some("us-east".to_string()),
            ..manifest()
        };
        let p = plan("H100-80GB", 8, PriceTier::Spot, 10.0, 1.0);

        let mut policy = strict_policy();
        let baseline = check(&m, &p, &policy).len();
        assert!(baseline > 0);

        for max_gpus in [4, 2, 1, 0] {
            if let Some(rule) = policy.class_rules.get_mut("RESTRICTED") {
                rule.max_gpus = Some(max_gpus);
            }
            assert!(check(&m, &p, &policy).len() >= baseline);
        }

        policy.global.max_budget_usd = Some(0.0);
        policy.allowed_regions.clear();
        policy.allowed_regions.insert("eu-west".to_string());
        assert!(check(&m, &p, &policy).len() >= baseline);
    }
}
