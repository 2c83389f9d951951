use crate::config::FieldSetConfig;
use chrono::{Days, NaiveDate};
use std::path::PathBuf;

/// Input files of a NEMO-style daily field set.
#[derive(Debug, Clone)]
pub struct NemoFiles {
    pub u: Vec<PathBuf>,
    pub v: Vec<PathBuf>,
    /// Grid definition file holding the lon/lat coordinates
    pub mesh: PathBuf,
    /// File providing the depth axis (W file of the first date)
    pub depth: PathBuf,
}

/// Every day in `[start, end)`.
pub fn daily_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut day = start;
    while day < end {
        dates.push(day);
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

pub fn daily_file(config: &FieldSetConfig, component: &str, date: NaiveDate) -> PathBuf {
    config.data_root.join(&config.velocity_dir).join(format!(
        "{}_{}_{}.nc",
        config.file_prefix,
        component,
        date.format("%Y-%m-%d")
    ))
}

/// Build the U/V file lists over the configured date range. Returns `None`
/// when the range is empty.
pub fn build_nemo_files(config: &FieldSetConfig) -> Option<NemoFiles> {
    let dates = daily_dates(config.start_date, config.end_date);
    let first = *dates.first()?;

    let u = dates.iter().map(|&d| daily_file(config, "U", d)).collect();
    let v = dates.iter().map(|&d| daily_file(config, "V", d)).collect();

    Some(NemoFiles {
        u,
        v,
        mesh: config.data_root.join(&config.mesh_file),
        depth: daily_file(config, "W", first),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_is_half_open() {
        let start = NaiveDate::from_ymd_opt(2006, 11, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let dates = daily_dates(start, end);

        assert_eq!(dates.len(), 5540);
        assert_eq!(dates[0], start);
        assert_eq!(
            *dates.last().unwrap(),
            NaiveDate::from_ymd_opt(2021, 12, 31).unwrap()
        );
        assert!(daily_dates(end, start).is_empty());
    }

    #[test]
    fn test_nemo_file_layout() {
        let config = FieldSetConfig::default();
        let files = build_nemo_files(&config).unwrap();

        assert_eq!(files.u.len(), files.v.len());
        assert_eq!(
            files.u[0],
            PathBuf::from(
                "/storage/shared/oceanparcels/input_data/MOi/psy4v3r1/psy4v3r1-daily_U_2006-11-01.nc"
            )
        );
        assert_eq!(
            files.v[1],
            PathBuf::from(
                "/storage/shared/oceanparcels/input_data/MOi/psy4v3r1/psy4v3r1-daily_V_2006-11-02.nc"
            )
        );
        assert_eq!(
            files.depth,
            PathBuf::from(
                "/storage/shared/oceanparcels/input_data/MOi/psy4v3r1/psy4v3r1-daily_W_2006-11-01.nc"
            )
        );
        assert_eq!(
            files.mesh,
            PathBuf::from(
                "/storage/shared/oceanparcels/input_data/NEMO-MEDUSA/ORCA0083-N006/domain/coordinates.nc"
            )
        );
    }

    #[test]
    fn test_empty_range_has_no_files() {
        let mut config = FieldSetConfig::default();
        config.end_date = config.start_date;
        assert!(build_nemo_files(&config).is_none());
    }
}
