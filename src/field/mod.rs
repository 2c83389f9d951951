//! Gridded velocity data the particles are advected through.
//!
//! A [`FieldSet`] holds the zonal and meridional current on a shared
//! curvilinear grid. Only the time slices bracketing the current timestep are
//! kept in memory; each newly loaded slice goes through the registered
//! [`DeferredCompute`] hook before any particle samples it.

pub mod buffer;
pub mod fieldset;
pub mod grid;
pub mod time_axis;
pub mod vertical;

pub use buffer::{Field, SliceSource};
pub use fieldset::FieldSet;
pub use grid::{CellHit, CurvilinearGrid};
pub use time_axis::TimeAxis;
pub use vertical::{DeferredCompute, VerticalAverage};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: netcdf::Error,
    },

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("Missing variable `{name}` in {path:?}")]
    MissingVariable { name: String, path: PathBuf },

    #[error("Unsupported time units `{0}`")]
    TimeUnits(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Time slice {0} is not loaded")]
    SliceNotLoaded(usize),

    #[error("Time {0} s lies outside the field time range")]
    TimeExtrapolation(f64),

    #[error("Position (lon={lon}, lat={lat}, depth={depth}) is outside the field domain")]
    OutOfBounds { lon: f64, lat: f64, depth: f64 },
}
