//! HTTP service for GPU training planning.
//!
//! Exposes the cost model, the configuration planner and the attested
//! submission gate from [`gpu_planner`] over JSON routes:
//!
//! - `GET /health`
//! - `GET /catalog`
//! - `POST /estimate`
//! - `POST /plan`
//! - `POST /submit`
//! - `POST /attestations/verify`

pub mod config;
pub mod error;
pub mod server;

pub use config::{AppState, CatalogArgs, Config};
pub use error::ApiError;
pub use server::{build_router, run};
