//! GPU catalog types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

/// GPU rental pricing tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum PriceTier {
    /// Pay-as-you-go capacity.
    OnDemand,
    /// Interruptible capacity at a discount.
    Spot,
    /// Committed-use capacity.
    Reserved,
}

impl PriceTier {
    /// Every tier a catalog entry carries a rate for.
    pub const ALL: [Self; 3] = [Self::OnDemand, Self::Spot, Self::Reserved];

    /// Canonical wire name of the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnDemand => "on_demand",
            Self::Spot => "spot",
            Self::Reserved => "reserved",
        }
    }

    fn valid_names() -> Vec<String> {
        Self::ALL.iter().map(|t| t.as_str().to_string()).collect()
    }
}

impl std::fmt::Display for PriceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceTier {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str() == normalized)
            .ok_or_else(|| PlannerError::UnknownTier {
                tier: s.to_string(),
                valid: Self::valid_names(),
            })
    }
}

impl TryFrom<String> for PriceTier {
    type Error = PlannerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Hourly USD rate per GPU for each pricing tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierRates {
    pub on_demand: f64,
    pub spot: f64,
    pub reserved: f64,
}

impl TierRates {
    /// Rate for a single GPU-hour in the given tier.
    #[must_use]
    pub const fn rate(&self, tier: PriceTier) -> f64 {
        match tier {
            PriceTier::OnDemand => self.on_demand,
            PriceTier::Spot => self.spot,
            PriceTier::Reserved => self.reserved,
        }
    }
}

/// Hardware and pricing description of one GPU model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSpec {
    /// Catalog key (e.g., "H100-80GB"). Case-sensitive.
    pub gpu_model: String,
    /// GPU memory in GB.
    pub vram_gb: f64,
    /// Peak dense FP16/BF16 throughput in TFLOPS.
    pub tflops_fp16: f64,
    /// Thermal design power in watts.
    pub tdp_watts: f64,
    /// Hourly rates per tier.
    pub rates: TierRates,
}

impl GpuSpec {
    /// Hourly rate for one GPU in the given tier.
    #[must_use]
    pub const fn rate(&self, tier: PriceTier) -> f64 {
        self.rates.rate(tier)
    }

    /// Peak throughput in FLOPs per second.
    #[must_use]
    pub fn peak_flops(&self) -> f64 {
        self.tflops_fp16 * 1e12
    }

    /// Reject entries that cannot describe real hardware.
    pub(crate) fn validate(&self) -> Result<(), PlannerError> {
        let invalid = |reason: String| PlannerError::InvalidCatalogEntry {
            model: self.gpu_model.clone(),
            reason,
        };

        if self.gpu_model.trim().is_empty() {
            return Err(invalid("gpu_model is empty".to_string()));
        }

        let fields = [
            ("vram_gb", self.vram_gb),
            ("tflops_fp16", self.tflops_fp16),
            ("tdp_watts", self.tdp_watts),
            ("on_demand_usd_per_hour", self.rates.on_demand),
            ("spot_usd_per_hour", self.rates.spot),
            ("reserved_usd_per_hour", self.rates.reserved),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} must be a non-negative number, got {value}")));
            }
        }
        Ok(())
    }
}
