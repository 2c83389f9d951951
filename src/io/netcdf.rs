use super::{OutputError, TrajectorySink};
use crate::config::{DimensionNames, IndexRanges};
use crate::field::time_axis::TimeUnits;
use crate::field::{FieldError, SliceSource};
use crate::particle::Particle;
use chrono::{NaiveDateTime, Utc};
use ndarray::{Array2, Array3};
use std::ops::Range;
use std::path::{Path, PathBuf};

fn open(path: &Path) -> Result<netcdf::File, FieldError> {
    netcdf::open(path).map_err(|source| FieldError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn variable<'f>(
    file: &'f netcdf::File,
    name: &str,
    path: &Path,
) -> Result<netcdf::Variable<'f>, FieldError> {
    file.variable(name)
        .ok_or_else(|| FieldError::MissingVariable {
            name: name.to_string(),
            path: path.to_path_buf(),
        })
}

fn resolve(
    range: &Option<Range<usize>>,
    len: usize,
    what: &str,
    path: &Path,
) -> Result<Range<usize>, FieldError> {
    IndexRanges::resolve(range, len).ok_or_else(|| {
        FieldError::InvalidData(format!(
            "{} index range {:?} does not fit dimension of length {} in {:?}",
            what, range, len, path
        ))
    })
}

fn numeric_attribute(var: &netcdf::Variable, name: &str) -> Option<f64> {
    var.attribute_value(name)
        .and_then(|r| r.ok())
        .and_then(|v| match v {
            netcdf::AttributeValue::Double(d) => Some(d),
            netcdf::AttributeValue::Float(f) => Some(f as f64),
            _ => None,
        })
}

fn string_attribute(var: &netcdf::Variable, name: &str) -> Option<String> {
    var.attribute_value(name)
        .and_then(|r| r.ok())
        .and_then(|v| match v {
            netcdf::AttributeValue::Str(s) => Some(s),
            _ => None,
        })
}

/// Read the 2-D longitude and latitude arrays, cut to the configured
/// sub-ranges. Accepts `(y, x)` or `(t, y, x)` layouts.
pub fn read_mesh(
    path: &Path,
    dims: &DimensionNames,
    indices: &IndexRanges,
) -> Result<(Array2<f64>, Array2<f64>), FieldError> {
    let file = open(path)?;
    let lon = read_coordinate_2d(&file, path, &dims.lon, indices)?;
    let lat = read_coordinate_2d(&file, path, &dims.lat, indices)?;
    Ok((lon, lat))
}

fn read_coordinate_2d(
    file: &netcdf::File,
    path: &Path,
    name: &str,
    indices: &IndexRanges,
) -> Result<Array2<f64>, FieldError> {
    let var = variable(file, name, path)?;
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let nd = shape.len();
    if !(2..=3).contains(&nd) {
        return Err(FieldError::InvalidData(format!(
            "{} in {:?} has {} dimensions, expected 2 or 3",
            name, path, nd
        )));
    }

    let y = resolve(&indices.lat, shape[nd - 2], "lat", path)?;
    let x = resolve(&indices.lon, shape[nd - 1], "lon", path)?;
    let values: Vec<f64> = if nd == 2 {
        var.get_values::<f64, _>((y.clone(), x.clone()))?
    } else {
        var.get_values::<f64, _>((0, y.clone(), x.clone()))?
    };

    Array2::from_shape_vec((y.len(), x.len()), values)
        .map_err(|e| FieldError::InvalidData(format!("{} in {:?}: {}", name, path, e)))
}

/// Read the depth axis, cut to the configured depth sub-range.
pub fn read_depth(
    path: &Path,
    name: &str,
    range: &Option<Range<usize>>,
) -> Result<Vec<f64>, FieldError> {
    let file = open(path)?;
    let var = variable(&file, name, path)?;
    let depth: Vec<f64> = var.get_values::<f64, _>(..)?;
    let z = resolve(range, depth.len(), "depth", path)?;
    Ok(depth[z].to_vec())
}

/// Decode every value of the time coordinate of one file.
pub fn read_times(path: &Path, name: &str) -> Result<Vec<NaiveDateTime>, FieldError> {
    let file = open(path)?;
    let var = variable(&file, name, path)?;
    let units = string_attribute(&var, "units").ok_or_else(|| {
        FieldError::InvalidData(format!("{} in {:?} has no units attribute", name, path))
    })?;
    let units = TimeUnits::parse(&units)?;

    let values: Vec<f64> = var.get_values::<f64, _>(..)?;
    Ok(values.into_iter().map(|v| units.to_datetime(v)).collect())
}

/// One velocity variable spread over a list of daily files, one time record
/// per file.
#[derive(Debug, Clone)]
pub struct NemoVariableFiles {
    pub files: Vec<PathBuf>,
    pub variable: String,
    pub indices: IndexRanges,
}

impl NemoVariableFiles {
    pub fn new(files: Vec<PathBuf>, variable: impl Into<String>, indices: IndexRanges) -> Self {
        NemoVariableFiles {
            files,
            variable: variable.into(),
            indices,
        }
    }
}

impl SliceSource for NemoVariableFiles {
    fn n_times(&self) -> usize {
        self.files.len()
    }

    fn read_slice(&self, time_index: usize) -> Result<Array3<f32>, FieldError> {
        let path = self
            .files
            .get(time_index)
            .ok_or(FieldError::SliceNotLoaded(time_index))?;
        log::debug!("Loading {} from {:?}", self.variable, path);

        let file = open(path)?;
        let var = variable(&file, &self.variable, path)?;
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let nd = shape.len();
        if !(3..=4).contains(&nd) {
            return Err(FieldError::InvalidData(format!(
                "{} in {:?} has {} dimensions, expected (time,) depth, y, x",
                self.variable, path, nd
            )));
        }

        let z = resolve(&self.indices.depth, shape[nd - 3], "depth", path)?;
        let y = resolve(&self.indices.lat, shape[nd - 2], "lat", path)?;
        let x = resolve(&self.indices.lon, shape[nd - 1], "lon", path)?;
        let raw: Vec<f32> = if nd == 4 {
            var.get_values::<f32, _>((0, z.clone(), y.clone(), x.clone()))?
        } else {
            var.get_values::<f32, _>((z.clone(), y.clone(), x.clone()))?
        };

        // Packed data
        let scale = numeric_attribute(&var, "scale_factor").unwrap_or(1.0);
        let offset = numeric_attribute(&var, "add_offset").unwrap_or(0.0);
        let fill = numeric_attribute(&var, "_FillValue");
        let values = raw
            .into_iter()
            .map(|v| {
                if fill.is_some_and(|f| f64::from(v) == f) {
                    f32::NAN
                } else {
                    (f64::from(v) * scale + offset) as f32
                }
            })
            .collect();

        Array3::from_shape_vec((z.len(), y.len(), x.len()), values)
            .map_err(|e| FieldError::InvalidData(format!("{} in {:?}: {}", self.variable, path, e)))
    }
}

/// Trajectory file in the CF contiguous `traj × obs` layout. Row `i` holds
/// the particle with id `i`; each particle fills its own observations from 0.
pub struct NetCdfTrajectoryWriter {
    file: netcdf::FileMut,
    path: PathBuf,
    obs_count: Vec<usize>,
    snapshots: usize,
}

impl NetCdfTrajectoryWriter {
    pub fn create(path: &Path, origin: &NaiveDateTime) -> Result<Self, OutputError> {
        let mut file = netcdf::create(path)?;

        file.add_unlimited_dimension("traj")?;
        file.add_unlimited_dimension("obs")?;

        // Trajectory id
        {
            let mut traj_var = file.add_variable::<i64>("trajectory", &["traj"])?;
            traj_var.put_attribute("long_name", "Unique identifier for each particle")?;
            traj_var.put_attribute("cf_role", "trajectory_id")?;
        }

        // Time variable
        {
            let mut time_var = file.add_variable::<f64>("time", &["traj", "obs"])?;
            time_var.put_attribute("_FillValue", f64::NAN)?;
            time_var.put_attribute("long_name", "")?;
            time_var.put_attribute("standard_name", "time")?;
            time_var.put_attribute(
                "units",
                format!("seconds since {}", origin.format("%Y-%m-%d %H:%M:%S")),
            )?;
            time_var.put_attribute("calendar", "standard")?;
            time_var.put_attribute("axis", "T")?;
        }

        for (name, standard_name, units, axis) in [
            ("lat", "latitude", "degrees_north", "Y"),
            ("lon", "longitude", "degrees_east", "X"),
            ("z", "depth", "m", "Z"),
        ] {
            let mut var = file.add_variable::<f32>(name, &["traj", "obs"])?;
            var.put_attribute("_FillValue", f32::NAN)?;
            var.put_attribute("long_name", "")?;
            var.put_attribute("standard_name", standard_name)?;
            var.put_attribute("units", units)?;
            var.put_attribute("axis", axis)?;
        }

        // Drift time variable
        {
            let mut drift_var = file.add_variable::<f32>("drift_time", &["traj", "obs"])?;
            drift_var.put_attribute("_FillValue", f32::NAN)?;
            drift_var.put_attribute("long_name", "time since release")?;
            drift_var.put_attribute("units", "s")?;
        }

        // Global attributes
        file.add_attribute("feature_type", "trajectory")?;
        file.add_attribute("Conventions", "CF-1.6/CF-1.7")?;
        file.add_attribute("mesh", "spherical")?;
        file.add_attribute(
            "history",
            format!(
                "{}: Created by fad_drift {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                env!("CARGO_PKG_VERSION")
            ),
        )?;

        Ok(NetCdfTrajectoryWriter {
            file,
            path: path.to_path_buf(),
            obs_count: Vec::new(),
            snapshots: 0,
        })
    }

    #[cfg(test)]
    pub fn snapshots(&self) -> usize {
        self.snapshots
    }

    fn obs_index(&self, id: u64) -> usize {
        self.obs_count.get(id as usize).copied().unwrap_or(0)
    }

    fn put_f32(
        &mut self,
        name: &str,
        values: &[f32],
        rows: Range<usize>,
        obs: usize,
    ) -> Result<(), OutputError> {
        let mut var = self
            .file
            .variable_mut(name)
            .ok_or_else(|| OutputError::MissingVariable(name.to_string()))?;
        var.put_values(values, (rows, obs))?;
        Ok(())
    }

    /// Write a run of particles with consecutive ids that share an
    /// observation index.
    fn write_run(&mut self, time: f64, run: &[Particle], obs: usize) -> Result<(), OutputError> {
        let first = run[0].id as usize;
        let rows = first..first + run.len();

        if obs == 0 {
            let ids: Vec<i64> = run.iter().map(|p| p.id as i64).collect();
            let mut traj_var = self
                .file
                .variable_mut("trajectory")
                .ok_or_else(|| OutputError::MissingVariable("trajectory".to_string()))?;
            traj_var.put_values(&ids, rows.clone())?;
        }

        {
            let times = vec![time; run.len()];
            let mut time_var = self
                .file
                .variable_mut("time")
                .ok_or_else(|| OutputError::MissingVariable("time".to_string()))?;
            time_var.put_values(&times, (rows.clone(), obs))?;
        }

        let lat: Vec<f32> = run.iter().map(|p| p.lat as f32).collect();
        let lon: Vec<f32> = run.iter().map(|p| p.lon as f32).collect();
        let z: Vec<f32> = run.iter().map(|p| p.depth as f32).collect();
        let drift: Vec<f32> = run.iter().map(|p| p.drift_time as f32).collect();
        self.put_f32("lat", &lat, rows.clone(), obs)?;
        self.put_f32("lon", &lon, rows.clone(), obs)?;
        self.put_f32("z", &z, rows.clone(), obs)?;
        self.put_f32("drift_time", &drift, rows, obs)?;
        Ok(())
    }
}

impl TrajectorySink for NetCdfTrajectoryWriter {
    fn write_snapshot(&mut self, time: f64, particles: &[Particle]) -> Result<(), OutputError> {
        let mut start = 0;
        while start < particles.len() {
            let obs = self.obs_index(particles[start].id);
            let mut end = start + 1;
            while end < particles.len()
                && particles[end].id == particles[end - 1].id + 1
                && self.obs_index(particles[end].id) == obs
            {
                end += 1;
            }
            self.write_run(time, &particles[start..end], obs)?;
            start = end;
        }

        if let Some(last) = particles.last() {
            let needed = last.id as usize + 1;
            if self.obs_count.len() < needed {
                self.obs_count.resize(needed, 0);
            }
        }
        for p in particles {
            self.obs_count[p.id as usize] += 1;
        }
        self.snapshots += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        log::info!(
            "Wrote {} snapshots of {} trajectories to {:?}",
            self.snapshots,
            self.obs_count.len(),
            self.path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeding::ReleasePoint;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn particle(id: u64, lon: f64, lat: f64) -> Particle {
        Particle::new(id, &ReleasePoint { lon, lat, depth: 0.5 }, 0.0)
    }

    #[test]
    fn test_trajectory_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("traj.nc");
        let origin = NaiveDate::from_ymd_opt(2006, 11, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        {
            let mut writer = NetCdfTrajectoryWriter::create(&path, &origin).unwrap();
            let first = vec![particle(0, 150.0, 0.0), particle(1, 151.0, 1.0), particle(2, 152.0, 2.0)];
            writer.write_snapshot(86_400.0, &first).unwrap();

            // Particle 1 deleted, particle 3 released later
            let mut second = vec![particle(0, 150.5, 0.0), particle(2, 152.5, 2.0), particle(3, 160.0, 5.0)];
            second[0].drift_time = 43_200.0;
            writer.write_snapshot(172_800.0, &second).unwrap();
            writer.finish().unwrap();
            assert_eq!(writer.snapshots(), 2);
        }

        let file = netcdf::open(&path).unwrap();
        assert_eq!(file.dimension("traj").unwrap().len(), 4);
        assert_eq!(file.dimension("obs").unwrap().len(), 2);

        let ids: Vec<i64> = file.variable("trajectory").unwrap().get_values::<i64, _>(..).unwrap();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        let lon: Vec<f32> = file.variable("lon").unwrap().get_values::<f32, _>(..).unwrap();
        // Row-major traj x obs
        assert_eq!(lon[0], 150.0);
        assert_eq!(lon[1], 150.5);
        assert_eq!(lon[2], 151.0);
        assert!(lon[3].is_nan());
        assert_eq!(lon[5], 152.5);
        assert_eq!(lon[6], 160.0);
        assert!(lon[7].is_nan());

        let drift: Vec<f32> = file.variable("drift_time").unwrap().get_values::<f32, _>(..).unwrap();
        assert_eq!(drift[1], 43_200.0);

        let time_var = file.variable("time").unwrap();
        let units = string_attribute(&time_var, "units").unwrap();
        assert_eq!(units, "seconds since 2006-11-01 12:00:00");
        let times: Vec<f64> = time_var.get_values::<f64, _>(..).unwrap();
        assert_eq!(times[6], 172_800.0);
    }

    #[test]
    fn test_read_back_field_files() {
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("U.nc");
        let mesh_path = dir.path().join("coordinates.nc");

        {
            let mut file = netcdf::create(&data_path).unwrap();
            file.add_dimension("time_counter", 1).unwrap();
            file.add_dimension("depthu", 3).unwrap();
            file.add_dimension("y", 4).unwrap();
            file.add_dimension("x", 5).unwrap();

            let mut time = file.add_variable::<f64>("time_counter", &["time_counter"]).unwrap();
            time.put_attribute("units", "seconds since 1950-01-01 00:00:00").unwrap();
            time.put_values(&[43_200.0], ..).unwrap();

            let values: Vec<f32> = (0..60).map(|v| v as f32).collect();
            let mut u = file
                .add_variable::<f32>("vozocrtx", &["time_counter", "depthu", "y", "x"])
                .unwrap();
            u.put_values(&values, (0, .., .., ..)).unwrap();
        }
        {
            let mut file = netcdf::create(&mesh_path).unwrap();
            file.add_dimension("y", 4).unwrap();
            file.add_dimension("x", 5).unwrap();
            let lon: Vec<f64> = (0..20).map(|i| (i % 5) as f64).collect();
            let lat: Vec<f64> = (0..20).map(|i| (i / 5) as f64).collect();
            file.add_variable::<f64>("glamf", &["y", "x"]).unwrap().put_values(&lon, ..).unwrap();
            file.add_variable::<f64>("gphif", &["y", "x"]).unwrap().put_values(&lat, ..).unwrap();
        }

        let indices = IndexRanges {
            lon: None,
            lat: Some(1..3),
            depth: Some(0..2),
        };

        let (lon, lat) = read_mesh(&mesh_path, &DimensionNames::default(), &indices).unwrap();
        assert_eq!(lon.dim(), (2, 5));
        assert_eq!(lat[[0, 0]], 1.0);
        assert_eq!(lat[[1, 4]], 2.0);

        let times = read_times(&data_path, "time_counter").unwrap();
        assert_eq!(
            times,
            vec![NaiveDate::from_ymd_opt(1950, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()]
        );

        let source = NemoVariableFiles::new(vec![data_path.clone()], "vozocrtx", indices);
        assert_eq!(source.n_times(), 1);
        let slice = source.read_slice(0).unwrap();
        assert_eq!(slice.dim(), (2, 2, 5));
        // depth 1, y 2, x 3 -> 20 + 10 + 3
        assert_eq!(slice[[1, 1, 3]], 33.0);

        let missing = NemoVariableFiles::new(vec![data_path], "vomecrty", IndexRanges::default());
        assert!(matches!(
            missing.read_slice(0),
            Err(FieldError::MissingVariable { .. })
        ));
    }
}
