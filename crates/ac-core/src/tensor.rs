//! Feature tensors
//!
//! Thin owned wrapper over `ndarray::ArrayD<f32>`. All arithmetic returns a
//! new tensor; nothing here mutates `self`.

use ndarray::{ArrayD, ArrayViewD, IxDyn, Zip};

use crate::error::{CloakError, CloakResult};

/// Multi-dimensional array of spectral energies (or a perturbation of them)
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    data: ArrayD<f32>,
}

impl FeatureTensor {
    /// Wrap an existing array
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    /// Build from a shape and row-major values
    pub fn from_shape_vec(shape: &[usize], values: Vec<f32>) -> CloakResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(CloakError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![values.len()],
            });
        }
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)
            .map_err(|e| CloakError::InvalidConfig(format!("tensor shape: {}", e)))?;
        Ok(Self { data })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    pub fn from_elem(shape: &[usize], value: f32) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// Zero tensor with the same shape as `self`
    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.shape())
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn view(&self) -> ArrayViewD<'_, f32> {
        self.data.view()
    }

    pub fn as_array(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn into_array(self) -> ArrayD<f32> {
        self.data
    }

    /// Elements in logical (row-major) order
    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.data.iter()
    }

    /// Copy of the elements in logical order
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    pub fn same_shape(&self, other: &FeatureTensor) -> bool {
        self.shape() == other.shape()
    }

    /// `ShapeMismatch` unless `other` has exactly the shape of `self`
    pub fn ensure_same_shape(&self, other: &FeatureTensor) -> CloakResult<()> {
        if self.same_shape(other) {
            Ok(())
        } else {
            Err(CloakError::ShapeMismatch {
                expected: self.shape().to_vec(),
                got: other.shape().to_vec(),
            })
        }
    }

    /// Element-wise `self + other`
    pub fn add(&self, other: &FeatureTensor) -> CloakResult<Self> {
        self.ensure_same_shape(other)?;
        Ok(Self {
            data: &self.data + &other.data,
        })
    }

    /// Element-wise `self - other`
    pub fn sub(&self, other: &FeatureTensor) -> CloakResult<Self> {
        self.ensure_same_shape(other)?;
        Ok(Self {
            data: &self.data - &other.data,
        })
    }

    /// `self + alpha * other`
    pub fn scaled_add(&self, alpha: f32, other: &FeatureTensor) -> CloakResult<Self> {
        self.ensure_same_shape(other)?;
        let mut data = self.data.clone();
        data.scaled_add(alpha, &other.data);
        Ok(Self { data })
    }

    pub fn scale(&self, factor: f32) -> Self {
        self.map(|x| x * factor)
    }

    pub fn map<F: Fn(f32) -> f32>(&self, f: F) -> Self {
        Self {
            data: self.data.mapv(f),
        }
    }

    /// Element-wise combination of two same-shaped tensors
    pub fn zip_map<F: Fn(f32, f32) -> f32>(&self, other: &FeatureTensor, f: F) -> CloakResult<Self> {
        self.ensure_same_shape(other)?;
        let mut data = self.data.clone();
        Zip::from(&mut data)
            .and(&other.data)
            .for_each(|a, &b| *a = f(*a, b));
        Ok(Self { data })
    }

    /// Sign of each element with `sign(0) = 0`
    pub fn signum(&self) -> Self {
        self.map(|x| {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        })
    }

    pub fn clamp(&self, min: f32, max: f32) -> Self {
        self.map(|x| x.clamp(min, max))
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().map(|&x| x as f64).sum()
    }

    pub fn sum_squares(&self) -> f64 {
        self.data.iter().map(|&x| (x as f64) * (x as f64)).sum()
    }

    /// Euclidean (Frobenius) norm, accumulated in f64
    pub fn l2_norm(&self) -> f64 {
        self.sum_squares().sqrt()
    }

    /// Mean of absolute values (0 for an empty tensor)
    pub fn mean_abs(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&x| x.abs() as f64).sum::<f64>() / self.data.len() as f64
    }

    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, &x| m.max(x.abs()))
    }

    pub fn max(&self) -> f32 {
        self.data.iter().fold(f32::NEG_INFINITY, |m, &x| m.max(x))
    }

    pub fn min(&self) -> f32 {
        self.data.iter().fold(f32::INFINITY, |m, &x| m.min(x))
    }

    /// True when no element is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }
}

impl From<ArrayD<f32>> for FeatureTensor {
    fn from(data: ArrayD<f32>) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_arithmetic_preserves_shape() {
        let a = FeatureTensor::from_elem(&[1, 4, 3], 2.0);
        let b = FeatureTensor::from_elem(&[1, 4, 3], 0.5);

        let sum = a.add(&b).unwrap();
        assert_eq!(sum.shape(), &[1, 4, 3]);
        assert!(sum.iter().all(|&x| x == 2.5));

        let diff = a.sub(&b).unwrap();
        assert!(diff.iter().all(|&x| x == 1.5));

        let axpy = a.scaled_add(-2.0, &b).unwrap();
        assert!(axpy.iter().all(|&x| x == 1.0));

        // Inputs untouched
        assert!(a.iter().all(|&x| x == 2.0));
    }

    #[test]
    fn test_shape_mismatch() {
        let a = FeatureTensor::zeros(&[2, 3]);
        let b = FeatureTensor::zeros(&[3, 2]);
        match a.add(&b) {
            Err(CloakError::ShapeMismatch { expected, got }) => {
                assert_eq!(expected, vec![2, 3]);
                assert_eq!(got, vec![3, 2]);
            }
            other => panic!("expected shape mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_signum_zero() {
        let t = FeatureTensor::from_shape_vec(&[4], vec![-3.0, 0.0, 2.0, -0.0]).unwrap();
        assert_eq!(t.signum().to_vec(), vec![-1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_norms() {
        let t = FeatureTensor::from_shape_vec(&[2, 2], vec![3.0, -4.0, 0.0, 0.0]).unwrap();
        assert_relative_eq!(t.l2_norm(), 5.0, epsilon = 1e-9);
        assert_relative_eq!(t.mean_abs(), 1.75, epsilon = 1e-9);
        assert_eq!(t.max_abs(), 4.0);
        assert_eq!(t.clamp(-1.0, 1.0).to_vec(), vec![1.0, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_from_shape_vec_rejects_wrong_length() {
        assert!(FeatureTensor::from_shape_vec(&[2, 2], vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_finite() {
        let t = FeatureTensor::from_shape_vec(&[2], vec![1.0, f32::NAN]).unwrap();
        assert!(!t.is_finite());
        assert!(FeatureTensor::zeros(&[3]).is_finite());
    }
}
