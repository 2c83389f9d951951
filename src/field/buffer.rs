use super::{CellHit, FieldError};
use ndarray::Array3;

/// Provider of `(depth, y, x)` slices for each index of a time axis.
pub trait SliceSource: Send + Sync {
    fn n_times(&self) -> usize;
    fn read_slice(&self, time_index: usize) -> Result<Array3<f32>, FieldError>;
}

impl SliceSource for Vec<Array3<f32>> {
    fn n_times(&self) -> usize {
        self.len()
    }

    fn read_slice(&self, time_index: usize) -> Result<Array3<f32>, FieldError> {
        self.get(time_index)
            .cloned()
            .ok_or(FieldError::SliceNotLoaded(time_index))
    }
}

#[derive(Debug)]
struct LoadedSlice {
    time_index: usize,
    data: Array3<f32>,
}

/// One scalar component of the field set with its in-memory time buffer.
pub struct Field {
    pub name: String,
    source: Box<dyn SliceSource>,
    slots: Vec<LoadedSlice>,
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("n_times", &self.source.n_times())
            .field("loaded", &self.loaded_time_indices())
            .finish()
    }
}

impl Field {
    pub fn new(name: impl Into<String>, source: Box<dyn SliceSource>) -> Self {
        Field {
            name: name.into(),
            source,
            slots: Vec::new(),
        }
    }

    pub fn n_times(&self) -> usize {
        self.source.n_times()
    }

    pub fn loaded_time_indices(&self) -> Vec<usize> {
        self.slots.iter().map(|s| s.time_index).collect()
    }

    /// Keep exactly the slices for `time_indices` in memory, reading the
    /// missing ones. Returns the slots that were newly filled.
    pub fn ensure_loaded(&mut self, time_indices: &[usize]) -> Result<Vec<usize>, FieldError> {
        self.slots.retain(|s| time_indices.contains(&s.time_index));

        let mut loaded = Vec::new();
        for &time_index in time_indices {
            if self.slots.iter().any(|s| s.time_index == time_index) {
                continue;
            }
            let mut data = self.source.read_slice(time_index)?;
            // Land and missing values carry no current
            data.mapv_inplace(|v| if v.is_finite() && v.abs() < 1.0e30 { v } else { 0.0 });
            self.slots.push(LoadedSlice { time_index, data });
            loaded.push(self.slots.len() - 1);
        }
        Ok(loaded)
    }

    pub fn slot_data(&self, slot: usize) -> Result<&Array3<f32>, FieldError> {
        self.slots
            .get(slot)
            .map(|s| &s.data)
            .ok_or(FieldError::SliceNotLoaded(slot))
    }

    /// Replace a slot's data; the horizontal shape must not change.
    pub fn replace_slot_data(&mut self, slot: usize, data: Array3<f32>) -> Result<(), FieldError> {
        let current = self
            .slots
            .get_mut(slot)
            .ok_or(FieldError::SliceNotLoaded(slot))?;
        let (_, ny, nx) = current.data.dim();
        let (_, new_ny, new_nx) = data.dim();
        if (ny, nx) != (new_ny, new_nx) {
            return Err(FieldError::InvalidData(format!(
                "{}: replacement slice is {}x{}, expected {}x{}",
                self.name, new_ny, new_nx, ny, nx
            )));
        }
        current.data = data;
        Ok(())
    }

    fn slice(&self, time_index: usize) -> Result<&Array3<f32>, FieldError> {
        self.slots
            .iter()
            .find(|s| s.time_index == time_index)
            .map(|s| &s.data)
            .ok_or(FieldError::SliceNotLoaded(time_index))
    }

    /// Bilinear value at `hit` in the layer pair bracketing `depth`
    /// (linear in depth), for one loaded time index.
    pub fn interpolate(
        &self,
        time_index: usize,
        depth_axis: &[f64],
        depth: f64,
        hit: &CellHit,
    ) -> Result<f64, FieldError> {
        let data = self.slice(time_index)?;
        let nz = data.dim().0;

        let horizontal = |k: usize| {
            let (xi, yi, xsi, eta) = (hit.xi, hit.yi, hit.xsi, hit.eta);
            (1.0 - xsi) * (1.0 - eta) * f64::from(data[[k, yi, xi]])
                + xsi * (1.0 - eta) * f64::from(data[[k, yi, xi + 1]])
                + xsi * eta * f64::from(data[[k, yi + 1, xi + 1]])
                + (1.0 - xsi) * eta * f64::from(data[[k, yi + 1, xi]])
        };

        // Depth-collapsed slices hold a single layer for the whole column
        if nz == 1 {
            return Ok(horizontal(0));
        }
        if depth_axis.len() != nz {
            return Err(FieldError::InvalidData(format!(
                "{}: {} layers but depth axis has {} levels",
                self.name,
                nz,
                depth_axis.len()
            )));
        }

        let (top, bottom) = (depth_axis[0], depth_axis[nz - 1]);
        if depth < top || depth > bottom {
            return Err(FieldError::OutOfBounds {
                lon: f64::NAN,
                lat: f64::NAN,
                depth,
            });
        }
        let k = depth_axis
            .partition_point(|&z| z <= depth)
            .saturating_sub(1)
            .min(nz - 2);
        let w = (depth - depth_axis[k]) / (depth_axis[k + 1] - depth_axis[k]);
        Ok((1.0 - w) * horizontal(k) + w * horizontal(k + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_slices(n_times: usize, nz: usize) -> Vec<Array3<f32>> {
        (0..n_times)
            .map(|t| Array3::from_shape_fn((nz, 3, 3), |(k, j, i)| (t * 100 + k * 10 + j + i) as f32))
            .collect()
    }

    #[test]
    fn test_ensure_loaded_reports_new_slots_only() {
        let mut field = Field::new("U", Box::new(ramp_slices(4, 1)));

        let new = field.ensure_loaded(&[0, 1]).unwrap();
        assert_eq!(new, vec![0, 1]);
        assert_eq!(field.loaded_time_indices(), vec![0, 1]);

        let new = field.ensure_loaded(&[1, 2]).unwrap();
        assert_eq!(new, vec![1]);
        assert_eq!(field.loaded_time_indices(), vec![1, 2]);

        assert!(field.ensure_loaded(&[1, 2]).unwrap().is_empty());
        assert!(field.ensure_loaded(&[9]).is_err());
    }

    #[test]
    fn test_missing_values_become_zero() {
        let mut slice = Array3::from_elem((1, 2, 2), 1.0f32);
        slice[[0, 0, 0]] = f32::NAN;
        slice[[0, 1, 1]] = 9.96921e36;
        let mut field = Field::new("U", Box::new(vec![slice]));
        field.ensure_loaded(&[0]).unwrap();

        let data = field.slot_data(0).unwrap();
        assert_eq!(data[[0, 0, 0]], 0.0);
        assert_eq!(data[[0, 1, 1]], 0.0);
        assert_eq!(data[[0, 0, 1]], 1.0);
    }

    #[test]
    fn test_interpolate_horizontal_and_depth() {
        let mut field = Field::new("U", Box::new(ramp_slices(1, 2)));
        field.ensure_loaded(&[0]).unwrap();
        let hit = CellHit {
            xi: 1,
            yi: 0,
            xsi: 0.5,
            eta: 0.5,
        };

        // Layer 0 values around the cell: 1, 2, 2, 3
        let top = field.interpolate(0, &[0.0, 10.0], 0.0, &hit).unwrap();
        assert!((top - 2.0).abs() < 1e-9);
        let mid = field.interpolate(0, &[0.0, 10.0], 5.0, &hit).unwrap();
        assert!((mid - 7.0).abs() < 1e-9);
        assert!(matches!(
            field.interpolate(0, &[0.0, 10.0], 11.0, &hit),
            Err(FieldError::OutOfBounds { .. })
        ));
        assert!(matches!(
            field.interpolate(3, &[0.0, 10.0], 1.0, &hit),
            Err(FieldError::SliceNotLoaded(3))
        ));
    }

    #[test]
    fn test_replace_keeps_horizontal_shape() {
        let mut field = Field::new("V", Box::new(ramp_slices(1, 3)));
        field.ensure_loaded(&[0]).unwrap();
        assert!(field.replace_slot_data(0, Array3::zeros((1, 3, 3))).is_ok());
        assert!(field.replace_slot_data(0, Array3::zeros((1, 2, 3))).is_err());
        assert!(field.replace_slot_data(5, Array3::zeros((1, 3, 3))).is_err());
    }
}
