use crate::domain::error::DomainError;

/// Fails with `DimensionMismatch` when `vector` does not have `expected` components.
pub fn check_dimension(expected: usize, vector: &[f64]) -> Result<(), DomainError> {
    if vector.len() != expected {
        return Err(DomainError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Euclidean distance, accumulated in f64 and reported as f32.
pub fn euclidean(a: &[f64], b: &[f64]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(3, &[1.0, 2.0, 3.0]).is_ok());
        let err = check_dimension(6, &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            DomainError::DimensionMismatch { expected: 6, actual: 3 }
        ));
    }

    #[test]
    fn test_euclidean() {
        assert_eq!(euclidean(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert!((euclidean(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }
}
