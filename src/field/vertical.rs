use super::{Field, FieldError};
use ndarray::{Array3, Axis};

/// Hook run by the field set right after it loads new time slices.
///
/// `loaded_slots` are the buffer slots of `field` that were just filled; the
/// hook must only touch those. It runs synchronously with exclusive access to
/// the field, before any particle samples the new data.
pub trait DeferredCompute: Send + Sync {
    fn on_load(&self, field: &mut Field, loaded_slots: &[usize]) -> Result<(), FieldError>;
}

/// Numerical gradient with unit spacing: central differences inside,
/// one-sided differences at both ends.
pub fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|k| {
                if k == 0 {
                    values[1] - values[0]
                } else if k == n - 1 {
                    values[n - 1] - values[n - 2]
                } else {
                    (values[k + 1] - values[k - 1]) / 2.0
                }
            })
            .collect(),
    }
}

/// Depth-weighted vertical average using layer thickness weights.
#[derive(Debug, Clone)]
pub struct VerticalAverage {
    weights: Vec<f64>,
    total: f64,
}

impl VerticalAverage {
    /// Weights are the layer thicknesses `gradient(depth)`.
    pub fn from_depth(depth: &[f64]) -> Result<Self, FieldError> {
        VerticalAverage::from_weights(gradient(depth))
    }

    pub fn from_weights(weights: Vec<f64>) -> Result<Self, FieldError> {
        let total: f64 = weights.iter().sum();
        if weights.is_empty() || !total.is_finite() || total == 0.0 {
            return Err(FieldError::InvalidData(format!(
                "depth weights {:?} do not give a usable average",
                weights
            )));
        }
        Ok(VerticalAverage { weights, total })
    }

    /// Collapse a `(depth, y, x)` slice to a single depth layer.
    pub fn average(&self, data: &Array3<f32>) -> Result<Array3<f32>, FieldError> {
        let (nz, ny, nx) = data.dim();
        if nz != self.weights.len() {
            return Err(FieldError::InvalidData(format!(
                "slice has {} depth layers but {} weights",
                nz,
                self.weights.len()
            )));
        }

        let mut sum = ndarray::Array2::<f64>::zeros((ny, nx));
        for (layer, &w) in data.axis_iter(Axis(0)).zip(&self.weights) {
            if w == 0.0 {
                continue;
            }
            sum.zip_mut_with(&layer, |acc, &v| *acc += f64::from(v) * w);
        }

        Ok(sum
            .mapv(|v| (v / self.total) as f32)
            .insert_axis(Axis(0)))
    }
}

impl DeferredCompute for VerticalAverage {
    fn on_load(&self, field: &mut Field, loaded_slots: &[usize]) -> Result<(), FieldError> {
        for &slot in loaded_slots {
            let averaged = self.average(field.slot_data(slot)?)?;
            field.replace_slot_data(slot, averaged)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_matches_edge_handling() {
        let depth = [0.0, 1.0, 3.0, 6.0];
        assert_eq!(gradient(&depth), vec![1.0, 1.5, 2.5, 3.0]);
        assert_eq!(gradient(&[4.0]), vec![0.0]);
        assert!(gradient(&[]).is_empty());
    }

    #[test]
    fn test_uniform_profile_is_preserved() {
        let avg = VerticalAverage::from_depth(&[0.0, 1.0, 3.0, 6.0, 10.0]).unwrap();
        let data = Array3::from_elem((5, 3, 4), 0.75f32);
        let out = avg.average(&data).unwrap();

        assert_eq!(out.dim(), (1, 3, 4));
        for &v in out.iter() {
            assert!((v - 0.75).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_weight_layer_contributes_nothing() {
        let avg = VerticalAverage::from_weights(vec![1.0, 0.0, 3.0]).unwrap();
        let mut data = Array3::<f32>::zeros((3, 1, 2));
        data.index_axis_mut(Axis(0), 0).fill(2.0);
        data.index_axis_mut(Axis(0), 1).fill(1000.0);
        data.index_axis_mut(Axis(0), 2).fill(6.0);

        let out = avg.average(&data).unwrap();
        // (2*1 + 6*3) / 4
        assert!((out[[0, 0, 0]] - 5.0).abs() < 1e-6);
        assert!((out[[0, 0, 1]] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_bad_weights() {
        assert!(VerticalAverage::from_weights(vec![]).is_err());
        assert!(VerticalAverage::from_weights(vec![0.0, 0.0]).is_err());
        assert!(VerticalAverage::from_depth(&[5.0]).is_err());

        let avg = VerticalAverage::from_weights(vec![1.0, 1.0]).unwrap();
        assert!(avg.average(&Array3::zeros((3, 2, 2))).is_err());
    }
}
