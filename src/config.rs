use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::Deserialize;
use std::ops::Range;
use std::path::{Path, PathBuf};

pub const SECONDS_PER_HOUR: f64 = 3600.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;

// NetCDF variable names for the velocity components
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VariableNames {
    pub u: String,
    pub v: String,
}

impl Default for VariableNames {
    fn default() -> Self {
        VariableNames {
            u: "vozocrtx".to_string(),
            v: "vomecrty".to_string(),
        }
    }
}

// NetCDF names of the coordinate variables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DimensionNames {
    pub lon: String,
    pub lat: String,
    pub depth: String,
    pub time: String,
}

impl Default for DimensionNames {
    fn default() -> Self {
        DimensionNames {
            lon: "glamf".to_string(),
            lat: "gphif".to_string(),
            depth: "depthw".to_string(),
            time: "time_counter".to_string(),
        }
    }
}

/// Index sub-ranges applied when reading the grid and the velocity data.
/// `None` keeps the whole dimension.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexRanges {
    pub lon: Option<Range<usize>>,
    pub lat: Option<Range<usize>>,
    pub depth: Option<Range<usize>>,
}

impl IndexRanges {
    /// Resolve an optional range against the length of the dimension in the file.
    pub fn resolve(range: &Option<Range<usize>>, len: usize) -> Option<Range<usize>> {
        match range {
            Some(r) if r.start < r.end && r.end <= len => Some(r.clone()),
            Some(_) => None,
            None => Some(0..len),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldSetConfig {
    pub data_root: PathBuf,
    pub velocity_dir: String,
    pub file_prefix: String,
    pub mesh_file: String,
    pub start_date: NaiveDate,
    /// Exclusive
    pub end_date: NaiveDate,
    pub variables: VariableNames,
    pub dimensions: DimensionNames,
    pub indices: IndexRanges,
    pub allow_time_extrapolation: bool,
    pub max_drift_time_days: f64,
}

impl Default for FieldSetConfig {
    fn default() -> Self {
        FieldSetConfig {
            data_root: PathBuf::from("/storage/shared/oceanparcels/input_data/"),
            velocity_dir: "MOi/psy4v3r1".to_string(),
            file_prefix: "psy4v3r1-daily".to_string(),
            mesh_file: "NEMO-MEDUSA/ORCA0083-N006/domain/coordinates.nc".to_string(),
            start_date: NaiveDate::from_ymd_opt(2006, 11, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default(),
            variables: VariableNames::default(),
            dimensions: DimensionNames::default(),
            indices: IndexRanges {
                lon: None,
                lat: Some(1100..1900),
                depth: Some(0..18),
            },
            allow_time_extrapolation: true,
            max_drift_time_days: 3.0,
        }
    }
}

// Release grid for the virtual drifters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeedingConfig {
    pub lat_min: f64,
    pub lat_max: f64,
    pub n_lat: usize,
    pub lon_min: f64,
    pub lon_max: f64,
    pub n_lon: usize,
    pub depth: f64,
    pub repeat_days: f64,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        SeedingConfig {
            lat_min: -15.0,
            lat_max: 15.0,
            n_lat: 61,
            lon_min: 140.0,
            lon_max: 285.0,
            n_lon: 291,
            depth: 0.5,
            repeat_days: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub runtime_days: f64,
    pub dt_hours: f64,
    pub output_days: f64,
    pub threads: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            runtime_days: 5539.0,
            dt_hours: 6.0,
            output_days: 1.0,
            threads: None,
        }
    }
}

impl RunConfig {
    pub fn runtime_seconds(&self) -> f64 {
        self.runtime_days * SECONDS_PER_DAY
    }

    pub fn dt_seconds(&self) -> f64 {
        self.dt_hours * SECONDS_PER_HOUR
    }

    pub fn output_seconds(&self) -> f64 {
        self.output_days * SECONDS_PER_DAY
    }

    pub fn worker_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

// Thresholds used by the particle rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub lat_cutoff: f64,
    pub drift_increment_hours: f64,
    pub max_drift_days: f64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        RuleConfig {
            lat_cutoff: 31.0,
            drift_increment_hours: 6.0,
            max_drift_days: 180.0,
        }
    }
}

// Output format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    #[value(name = "netcdf")]
    NetCdf,
    Both,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            path: PathBuf::from("20062021depth_wholepacific.nc"),
            format: OutputFormat::NetCdf,
        }
    }
}

impl OutputConfig {
    pub fn csv_path(&self) -> PathBuf {
        self.path.with_extension("csv")
    }
}

/// Complete run configuration. `Default` is the whole-Pacific FAD run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub fieldset: FieldSetConfig,
    pub seeding: SeedingConfig,
    pub run: RunConfig,
    pub rules: RuleConfig,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: SimulationConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fs = &self.fieldset;
        if fs.start_date >= fs.end_date {
            return Err(anyhow!(
                "Empty date range: {} to {}",
                fs.start_date,
                fs.end_date
            ));
        }
        for (name, range) in [
            ("lon", &fs.indices.lon),
            ("lat", &fs.indices.lat),
            ("depth", &fs.indices.depth),
        ] {
            if let Some(r) = range {
                if r.start >= r.end {
                    return Err(anyhow!("Empty {} index range {:?}", name, r));
                }
            }
        }

        let seed = &self.seeding;
        if seed.n_lat == 0 || seed.n_lon == 0 {
            return Err(anyhow!(
                "Seeding grid must be non-empty (n_lat={}, n_lon={})",
                seed.n_lat,
                seed.n_lon
            ));
        }
        if seed.repeat_days <= 0.0 {
            return Err(anyhow!(
                "Repeat interval must be positive (repeat_days={})",
                seed.repeat_days
            ));
        }

        let run = &self.run;
        if run.dt_hours <= 0.0 || run.runtime_days <= 0.0 || run.output_days <= 0.0 {
            return Err(anyhow!(
                "Run timings must be positive (runtime_days={}, dt_hours={}, output_days={})",
                run.runtime_days,
                run.dt_hours,
                run.output_days
            ));
        }
        if run.output_seconds() < run.dt_seconds() {
            return Err(anyhow!(
                "Output interval ({} days) is shorter than the timestep ({} hours)",
                run.output_days,
                run.dt_hours
            ));
        }

        if self.rules.max_drift_days <= 0.0 || self.rules.drift_increment_hours <= 0.0 {
            return Err(anyhow!("Drift-time increment and limit must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_pacific_run() {
        let config = SimulationConfig::default();
        config.validate().unwrap();

        assert_eq!(config.run.dt_seconds(), 21_600.0);
        assert_eq!(config.run.runtime_seconds(), 5539.0 * 86_400.0);
        assert_eq!(config.run.output_seconds(), 86_400.0);
        assert_eq!(config.fieldset.indices.lat, Some(1100..1900));
        assert_eq!(config.fieldset.indices.depth, Some(0..18));
        assert!(config.fieldset.indices.lon.is_none());
        assert_eq!(config.seeding.n_lat * config.seeding.n_lon, 61 * 291);
        assert_eq!(config.rules.lat_cutoff, 31.0);
        assert_eq!(config.output.format, OutputFormat::NetCdf);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[run]
runtime_days = 20.0

[output]
path = "short_run.nc"
format = "both"

[fieldset.indices]
depth = {{ start = 0, end = 5 }}
"#
        )
        .unwrap();

        let config = SimulationConfig::from_file(file.path()).unwrap();
        assert_eq!(config.run.runtime_days, 20.0);
        assert_eq!(config.run.dt_hours, 6.0);
        assert_eq!(config.output.format, OutputFormat::Both);
        assert_eq!(config.output.csv_path(), PathBuf::from("short_run.csv"));
        assert_eq!(config.fieldset.indices.depth, Some(0..5));
        assert_eq!(config.fieldset.variables.u, "vozocrtx");
    }

    #[test]
    fn test_validate_rejects_bad_timings() {
        let mut config = SimulationConfig::default();
        config.run.output_days = 0.1;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.fieldset.end_date = config.fieldset.start_date;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_index_range() {
        assert_eq!(IndexRanges::resolve(&None, 10), Some(0..10));
        assert_eq!(IndexRanges::resolve(&Some(2..5), 10), Some(2..5));
        assert_eq!(IndexRanges::resolve(&Some(2..50), 10), None);
    }
}
