use super::{CellHit, CurvilinearGrid, DeferredCompute, Field, FieldError, TimeAxis};
use crate::config::{FieldSetConfig, SECONDS_PER_DAY};
use crate::io::filenames::build_nemo_files;
use crate::io::netcdf::{NemoVariableFiles, read_depth, read_mesh, read_times};
use std::collections::HashMap;

/// Metres per degree of latitude (one nautical mile per arc minute).
const METRES_PER_DEGREE: f64 = 1852.0 * 60.0;

/// Zonal/meridional current on a shared grid and time axis.
pub struct FieldSet {
    pub grid: CurvilinearGrid,
    pub time: TimeAxis,
    pub u: Field,
    pub v: Field,
    constants: HashMap<String, f64>,
    compute_on_load: Option<Box<dyn DeferredCompute>>,
}

impl std::fmt::Debug for FieldSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSet")
            .field("grid", &(self.grid.ydim(), self.grid.xdim(), self.grid.depth.len()))
            .field("n_times", &self.time.n_times())
            .field("u", &self.u)
            .field("v", &self.v)
            .field("constants", &self.constants)
            .finish()
    }
}

impl FieldSet {
    pub fn new(grid: CurvilinearGrid, time: TimeAxis, u: Field, v: Field) -> Result<Self, FieldError> {
        for field in [&u, &v] {
            if field.n_times() != time.n_times() {
                return Err(FieldError::InvalidData(format!(
                    "{} has {} time slices but the time axis has {}",
                    field.name,
                    field.n_times(),
                    time.n_times()
                )));
            }
        }
        Ok(FieldSet {
            grid,
            time,
            u,
            v,
            constants: HashMap::new(),
            compute_on_load: None,
        })
    }

    /// Field set over the NEMO/MOi daily files described by `config`.
    pub fn from_nemo(config: &FieldSetConfig) -> Result<Self, FieldError> {
        let files = build_nemo_files(config).ok_or_else(|| {
            FieldError::InvalidData(format!(
                "no input dates between {} and {}",
                config.start_date, config.end_date
            ))
        })?;

        log::info!("Reading grid from {:?}", files.mesh);
        let (lon, lat) = read_mesh(&files.mesh, &config.dimensions, &config.indices)?;
        let depth = read_depth(&files.depth, &config.dimensions.depth, &config.indices.depth)?;
        let grid = CurvilinearGrid::new(lon, lat, depth)?;
        log::info!(
            "Grid: {} x {} points, {} depth levels",
            grid.ydim(),
            grid.xdim(),
            grid.depth.len()
        );

        log::info!("Reading time axis from {} daily files", files.u.len());
        let mut datetimes = Vec::with_capacity(files.u.len());
        for path in &files.u {
            let times = read_times(path, &config.dimensions.time)?;
            let first = times.first().copied().ok_or_else(|| {
                FieldError::InvalidData(format!("{:?} has an empty time axis", path))
            })?;
            datetimes.push(first);
        }
        let time = TimeAxis::from_datetimes(&datetimes, config.allow_time_extrapolation)?;

        let u = Field::new(
            "U",
            Box::new(NemoVariableFiles::new(files.u, &config.variables.u, config.indices.clone())),
        );
        let v = Field::new(
            "V",
            Box::new(NemoVariableFiles::new(files.v, &config.variables.v, config.indices.clone())),
        );

        let mut fieldset = FieldSet::new(grid, time, u, v)?;
        fieldset.add_constant("max_drift_time", config.max_drift_time_days * SECONDS_PER_DAY);
        Ok(fieldset)
    }

    pub fn add_constant(&mut self, name: impl Into<String>, value: f64) {
        self.constants.insert(name.into(), value);
    }

    pub fn constant(&self, name: &str) -> Option<f64> {
        self.constants.get(name).copied()
    }

    /// Register the hook applied to every newly loaded time slice.
    pub fn set_compute_on_load(&mut self, hook: Box<dyn DeferredCompute>) {
        self.compute_on_load = Some(hook);
    }

    /// Make sure every slice needed to sample times in `[t0, t1]` is in
    /// memory, running the load hook on the slices read by this call.
    pub fn prepare(&mut self, t0: f64, t1: f64) -> Result<(), FieldError> {
        let lower = self.time.bracket(t0.min(t1))?.lower;
        let upper = self.time.bracket(t0.max(t1))?.upper;
        let indices: Vec<usize> = (lower..=upper).collect();

        let grid_shape = (self.grid.ydim(), self.grid.xdim());
        for field in [&mut self.u, &mut self.v] {
            let loaded = field.ensure_loaded(&indices)?;
            if loaded.is_empty() {
                continue;
            }
            // Cell indices from the grid search must be valid in every slice
            for &slot in &loaded {
                let (_, ny, nx) = field.slot_data(slot)?.dim();
                if (ny, nx) != grid_shape {
                    return Err(FieldError::InvalidData(format!(
                        "{}: slice is {}x{} but the grid is {}x{}",
                        field.name, ny, nx, grid_shape.0, grid_shape.1
                    )));
                }
            }
            log::debug!(
                "{}: read {} slices, buffer holds time indices {:?}",
                field.name,
                loaded.len(),
                field.loaded_time_indices()
            );
            if let Some(hook) = &self.compute_on_load {
                hook.on_load(field, &loaded)?;
            }
        }
        Ok(())
    }

    fn sample(&self, field: &Field, time: f64, depth: f64, hit: &CellHit) -> Result<f64, FieldError> {
        let bracket = self.time.bracket(time)?;
        let lower = field.interpolate(bracket.lower, &self.grid.depth, depth, hit)?;
        if bracket.upper == bracket.lower || bracket.weight == 0.0 {
            return Ok(lower);
        }
        let upper = field.interpolate(bracket.upper, &self.grid.depth, depth, hit)?;
        Ok((1.0 - bracket.weight) * lower + bracket.weight * upper)
    }

    /// Velocity at a position in degrees per second, plus the cell the
    /// position was found in.
    pub fn sample_uv(
        &self,
        time: f64,
        depth: f64,
        lat: f64,
        lon: f64,
        hint: Option<(usize, usize)>,
    ) -> Result<(f64, f64, CellHit), FieldError> {
        let out_of_bounds = || FieldError::OutOfBounds { lon, lat, depth };
        let hit = self.grid.search(lon, lat, hint).map_err(|e| match e {
            FieldError::OutOfBounds { .. } => out_of_bounds(),
            other => other,
        })?;

        let result = self
            .sample(&self.u, time, depth, &hit)
            .and_then(|u| Ok((u, self.sample(&self.v, time, depth, &hit)?)));
        let (u, v) = match result {
            Ok(uv) => uv,
            Err(FieldError::OutOfBounds { .. }) => return Err(out_of_bounds()),
            Err(e) => return Err(e),
        };
        if !u.is_finite() || !v.is_finite() {
            return Err(out_of_bounds());
        }

        let u_deg = u / (METRES_PER_DEGREE * lat.to_radians().cos());
        let v_deg = v / METRES_PER_DEGREE;
        Ok((u_deg, v_deg, hit))
    }
}
