use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::error::{DetectorError, Result};

/// Per-column standardization fitted on training rows only.
///
/// Columns with zero variance are centred but not scaled.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(matrix: &Array2<f64>) -> Result<Self> {
        if matrix.nrows() == 0 {
            return Err(DetectorError::InvalidInput("Cannot fit a scaler on zero rows".into()));
        }
        let mean = matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| DetectorError::InvalidInput("Cannot fit a scaler on zero rows".into()))?;
        let scale = matrix
            .std_axis(Axis(0), 0.0)
            .mapv(|std| if std > f64::EPSILON { std } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn from_parts(mean: Array1<f64>, scale: Array1<f64>) -> Result<Self> {
        if mean.len() != scale.len() {
            return Err(DetectorError::VocabularyMismatch {
                vocabulary: mean.len(),
                weights: scale.len(),
            });
        }
        if scale.iter().any(|&s| !(s.is_finite() && s > 0.0)) {
            return Err(DetectorError::Persistence("Scaler contains a non-positive scale".into()));
        }
        Ok(Self { mean, scale })
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, vector: ArrayView1<f64>) -> Array1<f64> {
        (&vector - &self.mean) / &self.scale
    }

    pub fn transform_matrix(&self, matrix: &Array2<f64>) -> Array2<f64> {
        (matrix - &self.mean) / &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_and_transform() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        assert_eq!(scaler.mean(), &array![2.0, 5.0]);
        // population std, constant column left unscaled
        assert_eq!(scaler.scale(), &array![1.0, 1.0]);

        let z = scaler.transform_matrix(&x);
        assert_eq!(z, array![[-1.0, 0.0], [1.0, 0.0]]);
        assert_eq!(scaler.transform(array![2.0, 7.0].view()), array![0.0, 2.0]);
    }

    #[test]
    fn test_zero_rows_rejected() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(StandardScaler::fit(&x).is_err());
    }

    #[test]
    fn test_from_parts_validates() {
        assert!(StandardScaler::from_parts(array![0.0], array![1.0, 2.0]).is_err());
        assert!(StandardScaler::from_parts(array![0.0], array![0.0]).is_err());
        assert!(StandardScaler::from_parts(array![0.0], array![2.0]).is_ok());
    }
}
