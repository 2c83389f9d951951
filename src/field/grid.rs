use super::FieldError;
use ndarray::Array2;

const SEARCH_TOLERANCE: f64 = 1e-10;

/// A grid cell containing a point, with the point's local coordinates
/// `(xsi, eta)` in `[0, 1]²` inside the cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellHit {
    pub xi: usize,
    pub yi: usize,
    pub xsi: f64,
    pub eta: f64,
}

impl CellHit {
    pub fn cell(&self) -> (usize, usize) {
        (self.xi, self.yi)
    }
}

/// Spherical curvilinear grid: 2-D longitude and latitude arrays (`ny × nx`)
/// and a shared 1-D depth axis. The grid is periodic in the zonal direction.
#[derive(Debug, Clone)]
pub struct CurvilinearGrid {
    pub lon: Array2<f64>,
    pub lat: Array2<f64>,
    pub depth: Vec<f64>,
}

impl CurvilinearGrid {
    pub fn new(lon: Array2<f64>, lat: Array2<f64>, depth: Vec<f64>) -> Result<Self, FieldError> {
        if lon.dim() != lat.dim() {
            return Err(FieldError::InvalidData(format!(
                "lon {:?} and lat {:?} arrays differ in shape",
                lon.dim(),
                lat.dim()
            )));
        }
        let (ny, nx) = lon.dim();
        if ny < 2 || nx < 2 {
            return Err(FieldError::InvalidData(format!(
                "grid needs at least 2x2 points, got {}x{}",
                ny, nx
            )));
        }
        if depth.is_empty() {
            return Err(FieldError::InvalidData("empty depth axis".to_string()));
        }
        Ok(CurvilinearGrid { lon, lat, depth })
    }

    /// Rectilinear grid expressed as a curvilinear one.
    #[cfg(test)]
    pub fn from_axes(lon: &[f64], lat: &[f64], depth: Vec<f64>) -> Result<Self, FieldError> {
        let lon2d = Array2::from_shape_fn((lat.len(), lon.len()), |(_, i)| lon[i]);
        let lat2d = Array2::from_shape_fn((lat.len(), lon.len()), |(j, _)| lat[j]);
        CurvilinearGrid::new(lon2d, lat2d, depth)
    }

    pub fn xdim(&self) -> usize {
        self.lon.ncols()
    }

    pub fn ydim(&self) -> usize {
        self.lon.nrows()
    }

    /// Locate the cell containing `(lon, lat)` by walking from `hint`
    /// (or from the nearest node of a coarse scan when there is no hint).
    pub fn search(
        &self,
        lon: f64,
        lat: f64,
        hint: Option<(usize, usize)>,
    ) -> Result<CellHit, FieldError> {
        let out_of_bounds = || FieldError::OutOfBounds {
            lon,
            lat,
            depth: f64::NAN,
        };
        if !lon.is_finite() || !lat.is_finite() {
            return Err(out_of_bounds());
        }

        let (nx, ny) = (self.xdim(), self.ydim());
        let (mut xi, mut yi) = match hint {
            Some((x, y)) if x + 1 < nx && y + 1 < ny => (x, y),
            _ => self.coarse_guess(lon, lat),
        };

        let max_iter = 4 * (nx + ny);
        for _ in 0..max_iter {
            let (xsi, eta) = self.local_coords(xi, yi, lon, lat);
            let inside_x = (-SEARCH_TOLERANCE..=1.0 + SEARCH_TOLERANCE).contains(&xsi);
            let inside_y = (-SEARCH_TOLERANCE..=1.0 + SEARCH_TOLERANCE).contains(&eta);
            if inside_x && inside_y {
                return Ok(CellHit {
                    xi,
                    yi,
                    xsi: xsi.clamp(0.0, 1.0),
                    eta: eta.clamp(0.0, 1.0),
                });
            }

            if eta < -SEARCH_TOLERANCE {
                if yi == 0 {
                    return Err(out_of_bounds());
                }
                yi -= 1;
            } else if eta > 1.0 + SEARCH_TOLERANCE {
                if yi + 2 >= ny {
                    return Err(out_of_bounds());
                }
                yi += 1;
            }

            // Zonally periodic
            if xsi < -SEARCH_TOLERANCE {
                xi = if xi == 0 { nx - 2 } else { xi - 1 };
            } else if xsi > 1.0 + SEARCH_TOLERANCE {
                xi = if xi + 2 >= nx { 0 } else { xi + 1 };
            }
        }
        Err(out_of_bounds())
    }

    /// Inverse bilinear map of `(lon, lat)` onto cell `(xi, yi)`.
    fn local_coords(&self, xi: usize, yi: usize, x: f64, y: f64) -> (f64, f64) {
        let px = [
            self.lon[[yi, xi]],
            self.lon[[yi, xi + 1]],
            self.lon[[yi + 1, xi + 1]],
            self.lon[[yi + 1, xi]],
        ]
        .map(|c| unwrap_lon(c, x));
        let py = [
            self.lat[[yi, xi]],
            self.lat[[yi, xi + 1]],
            self.lat[[yi + 1, xi + 1]],
            self.lat[[yi + 1, xi]],
        ];

        let a = [px[0], px[1] - px[0], px[3] - px[0], px[0] - px[1] + px[2] - px[3]];
        let b = [py[0], py[1] - py[0], py[3] - py[0], py[0] - py[1] + py[2] - py[3]];

        let aa = a[3] * b[2] - a[2] * b[3];
        let bb = a[3] * b[0] - a[0] * b[3] + a[1] * b[2] - a[2] * b[1] + x * b[3] - y * a[3];
        let cc = a[1] * b[0] - a[0] * b[1] + x * b[1] - y * a[1];

        let eta = if aa.abs() < 1e-12 {
            -cc / bb
        } else {
            let det2 = bb * bb - 4.0 * aa * cc;
            if det2 < 0.0 {
                return (-1.0, -1.0);
            }
            (-bb + det2.sqrt()) / (2.0 * aa)
        };

        let denom = a[1] + a[3] * eta;
        let xsi = if denom.abs() < 1e-12 {
            ((y - py[0]) / (py[1] - py[0]) + (y - py[3]) / (py[2] - py[3])) * 0.5
        } else {
            (x - a[0] - a[2] * eta) / denom
        };
        (xsi, eta)
    }

    /// Nearest node on a strided subset of the grid, used as a walk start.
    fn coarse_guess(&self, lon: f64, lat: f64) -> (usize, usize) {
        let (nx, ny) = (self.xdim(), self.ydim());
        let sx = (nx / 64).max(1);
        let sy = (ny / 64).max(1);

        let mut best = (0, 0);
        let mut best_dist = f64::INFINITY;
        for j in (0..ny).step_by(sy) {
            for i in (0..nx).step_by(sx) {
                let dlon = unwrap_lon(self.lon[[j, i]], lon) - lon;
                let dlat = self.lat[[j, i]] - lat;
                let dist = dlon * dlon + dlat * dlat;
                if dist < best_dist {
                    best_dist = dist;
                    best = (i, j);
                }
            }
        }
        (best.0.min(nx - 2), best.1.min(ny - 2))
    }
}

/// Shift a corner longitude by ±360 so it lies within 180° of `reference`.
fn unwrap_lon(lon: f64, reference: f64) -> f64 {
    if lon - reference > 180.0 {
        lon - 360.0
    } else if lon - reference < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}
