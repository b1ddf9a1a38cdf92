//! Error types for estimation, planning and catalog loading.

use thiserror::Error;

/// Errors raised by the cost model, the catalog and manifest validation.
///
/// Every variant except the I/O and parse wrappers is a caller input problem
/// and maps onto a 400-class response in the service layer.
#[derive(Error, Debug)]
pub enum PlannerError {
    /// The requested GPU model is not in the catalog.
    #[error("gpu_model '{model}' not in catalog. Available: {available:?}")]
    UnknownGpuModel {
        model: String,
        available: Vec<String>,
    },

    /// The requested price tier does not exist.
    #[error("Unknown price_tier '{tier}'. Use one of: {valid:?}")]
    UnknownTier { tier: String, valid: Vec<String> },

    /// Efficiency is outside `(0, 1]` or yields no effective throughput.
    #[error("efficiency {efficiency} must be in (0, 1] and yield >0 effective TFLOPS")]
    InvalidEfficiency { efficiency: f64 },

    /// An energy assumption is negative or not finite.
    #[error("{name} must be a non-negative number, got {value}")]
    InvalidAssumption { name: &'static str, value: f64 },

    /// A target wall-clock time is not a positive finite number of days.
    #[error("target_time_days must be a positive number, got {days}")]
    InvalidTargetTime { days: f64 },

    /// Meeting the target would need more GPUs than a count can express.
    #[error("target of {days} days needs about {required:.3e} GPUs, more than the supported maximum {max}")]
    GpuCountOverflow { days: f64, required: f64, max: u32 },

    /// The planning grid has more cells than one request may cost.
    #[error("planning grid of {cells} cells exceeds the limit of {max}")]
    GridTooLarge { cells: usize, max: usize },

    /// An explicit GPU count of zero was requested.
    #[error("gpu count must be at least 1")]
    InvalidGpuCount,

    /// Workload parameters are not positive finite numbers.
    #[error("Invalid workload: {0}")]
    InvalidWorkload(String),

    /// No GPU configuration could be costed for the request.
    #[error("no feasible plan for the requested workload")]
    NoFeasiblePlan,

    /// A job manifest failed validation.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// A catalog source lists the same GPU model twice.
    #[error("Duplicate gpu_model '{model}' in catalog source {source_name}")]
    DuplicateGpuModel { model: String, source_name: String },

    /// A catalog entry carries a value that cannot describe real hardware.
    #[error("Invalid catalog entry '{model}': {reason}")]
    InvalidCatalogEntry { model: String, reason: String },

    /// Reading a catalog or policy file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A catalog CSV row could not be parsed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document could not be parsed or produced.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlannerError {
    /// Whether the error was caused by caller input rather than by the
    /// environment the planner runs in.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Self::Io(_)
                | Self::Csv(_)
                | Self::Serialization(_)
                | Self::DuplicateGpuModel { .. }
                | Self::InvalidCatalogEntry { .. }
        )
    }
}

/// Result alias for planner operations.
pub type Result<T, E = PlannerError> = std::result::Result<T, E>;
