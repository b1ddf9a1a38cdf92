//! GPU catalog: hardware specs and tier pricing keyed by model name.
//!
//! A catalog is built from one or more tabular sources. Sources are merged in
//! order and later sources win on key collision, so a vendor price sheet can
//! be layered over a hand-maintained baseline:
//!
//! ```rust,ignore
//! use gpu_planner::Catalog;
//!
//! let catalog = Catalog::load_all(["data/gpu_catalog.csv", "data/gpu_catalog_from_azure.csv"])?;
//! let h100 = catalog.lookup("H100-80GB")?;
//! ```

mod models;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlannerError, Result};

pub use models::{GpuSpec, PriceTier, TierRates};

/// One row of a catalog CSV file.
#[derive(Debug, Deserialize)]
struct CatalogRow {
    gpu_model: String,
    vram_gb: f64,
    tflops_fp16: f64,
    on_demand_usd_per_hour: f64,
    spot_usd_per_hour: f64,
    reserved_usd_per_hour: f64,
    tdp_watts: f64,
}

impl From<CatalogRow> for GpuSpec {
    fn from(row: CatalogRow) -> Self {
        Self {
            gpu_model: row.gpu_model.trim().to_string(),
            vram_gb: row.vram_gb,
            tflops_fp16: row.tflops_fp16,
            tdp_watts: row.tdp_watts,
            rates: TierRates {
                on_demand: row.on_demand_usd_per_hour,
                spot: row.spot_usd_per_hour,
                reserved: row.reserved_usd_per_hour,
            },
        }
    }
}

/// Immutable mapping from GPU model name to its spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    entries: BTreeMap<String, GpuSpec>,
}

impl Catalog {
    /// Build a catalog from specs belonging to a single source.
    ///
    /// # Errors
    ///
    /// Fails when a model appears twice or an entry carries invalid numbers.
    pub fn from_specs(
        source_name: &str,
        specs: impl IntoIterator<Item = GpuSpec>,
    ) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for spec in specs {
            spec.validate()?;
            if entries.contains_key(&spec.gpu_model) {
                return Err(PlannerError::DuplicateGpuModel {
                    model: spec.gpu_model,
                    source_name: source_name.to_string(),
                });
            }
            entries.insert(spec.gpu_model.clone(), spec);
        }
        Ok(Self { entries })
    }

    /// Parse a catalog from CSV with a header row.
    ///
    /// # Errors
    ///
    /// Fails on malformed rows, missing columns (including any tier rate
    /// column), duplicate models and invalid values.
    pub fn from_csv_reader<R: Read>(source_name: &str, reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let specs = csv_reader
            .deserialize::<CatalogRow>()
            .map(|row| row.map(GpuSpec::from))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Self::from_specs(source_name, specs)
    }

    /// Read a catalog CSV file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened or parsed.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let catalog = Self::from_csv_reader(&path.display().to_string(), file)?;
        debug!(path = %path.display(), entries = catalog.len(), "Loaded catalog source");
        Ok(catalog)
    }

    /// Load and merge catalog files in order; later files override earlier
    /// entries with the same model name.
    ///
    /// # Errors
    ///
    /// Fails on the first source that cannot be read.
    pub fn load_all<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Self> {
        let sources = paths
            .into_iter()
            .map(Self::from_csv_path)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::merge(sources))
    }

    /// Fold sources into one catalog, later sources winning on collision.
    #[must_use]
    pub fn merge(sources: impl IntoIterator<Item = Self>) -> Self {
        sources
            .into_iter()
            .fold(Self::default(), |mut acc, source| {
                acc.entries.extend(source.entries);
                acc
            })
    }

    /// Look up a model by exact name.
    #[must_use]
    pub fn get(&self, gpu_model: &str) -> Option<&GpuSpec> {
        self.entries.get(gpu_model)
    }

    /// Look up a model, failing with the list of available models.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::UnknownGpuModel`] when the model is absent.
    pub fn lookup(&self, gpu_model: &str) -> Result<&GpuSpec> {
        self.get(gpu_model)
            .ok_or_else(|| PlannerError::UnknownGpuModel {
                model: gpu_model.to_string(),
                available: self.models(),
            })
    }

    /// Model names in catalog order.
    #[must_use]
    pub fn models(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterate over all specs in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &GpuSpec> {
        self.entries.values()
    }

    /// Number of models in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no models.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "gpu_model,vram_gb,tflops_fp16,on_demand_usd_per_hour,spot_usd_per_hour,reserved_usd_per_hour,tdp_watts\n";

    fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        path
    }

    #[test]
    fn test_load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "gpu_catalog.csv", &["H100-80GB,80,800,6.5,3.9,5.0,350"]);

        let catalog = Catalog::from_csv_path(&path).unwrap();
        let h100 = catalog.get("H100-80GB").unwrap();
        assert!((h100.vram_gb - 80.0).abs() < f64::EPSILON);
        assert!((h100.rate(PriceTier::Spot) - 3.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_later_sources_override() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_csv(dir.path(), "gpu_catalog.csv", &["H100-80GB,80,800,6.5,3.9,5.0,350"]);
        let azure = write_csv(
            dir.path(),
            "gpu_catalog_from_azure.csv",
            &[
                "H100-80GB,80,800,7.0,4.0,5.5,350",
                "A100-80GB,80,312,4.1,2.5,3.2,300",
            ],
        );

        let catalog = Catalog::load_all([&base, &azure]).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!((catalog.get("H100-80GB").unwrap().rates.on_demand - 7.0).abs() < f64::EPSILON);
        assert!(catalog.get("A100-80GB").is_some());
    }

    #[test]
    fn test_missing_tier_column_is_an_error() {
        let csv = "gpu_model,vram_gb,tflops_fp16,on_demand_usd_per_hour,spot_usd_per_hour,tdp_watts\n\
                   H100-80GB,80,800,6.5,3.9,350\n";
        let err = Catalog::from_csv_reader("inline", csv.as_bytes()).unwrap_err();
        assert!(matches!(err, PlannerError::Csv(_)));
    }

    #[test]
    fn test_duplicate_model_in_one_source() {
        let csv = format!("{HEADER}L40S,48,362,1.2,0.6,0.9,350\nL40S,48,362,1.3,0.7,1.0,350\n");
        let err = Catalog::from_csv_reader("inline", csv.as_bytes()).unwrap_err();
        assert!(matches!(err, PlannerError::DuplicateGpuModel { ref model, .. } if model == "L40S"));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let csv = format!("{HEADER}H100-80GB,80,800,6.5,3.9,5.0,350\n");
        let catalog = Catalog::from_csv_reader("inline", csv.as_bytes()).unwrap();

        assert!(catalog.lookup("H100-80GB").is_ok());
        match catalog.lookup("h100-80gb") {
            Err(PlannerError::UnknownGpuModel { available, .. }) => {
                assert_eq!(available, vec!["H100-80GB".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_merge_empty() {
        assert!(Catalog::merge(Vec::new()).is_empty());
    }
}
