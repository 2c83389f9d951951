use crate::config::SeedingConfig;

/// Initial position of a released particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReleasePoint {
    pub lon: f64,
    pub lat: f64,
    pub depth: f64,
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Map a longitude in degrees east onto [-180, 180).
pub fn normalize_lon(lon: f64) -> f64 {
    if lon >= 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

/// Regular lon/lat release mesh. Points are ordered longitude-major: all
/// latitudes of the first longitude, then the next longitude.
pub fn seed_grid(config: &SeedingConfig) -> Vec<ReleasePoint> {
    let lats = linspace(config.lat_min, config.lat_max, config.n_lat);
    let lons = linspace(config.lon_min, config.lon_max, config.n_lon);

    lons.iter()
        .flat_map(|&lon| {
            lats.iter().map(move |&lat| ReleasePoint {
                lon: normalize_lon(lon),
                lat,
                depth: config.depth,
            })
        })
        .collect()
}
