// Feature Fusion
// Semantic embedding first, stylometric features second. The classifier is
// calibrated against exactly this order.

use crate::models::{StylometricVector, STYLOMETRIC_DIM};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedVector {
    values: Vec<f64>,
    semantic_dim: usize,
}

impl FusedVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn semantic_dim(&self) -> usize {
        self.semantic_dim
    }

    pub fn semantic_part(&self) -> &[f64] {
        &self.values[..self.semantic_dim]
    }

    pub fn stylometric_part(&self) -> &[f64] {
        &self.values[self.semantic_dim..]
    }
}

/// Concatenate a chunk's embedding (widened to f64) with its stylometric vector.
pub fn fuse_features(semantic: &[f32], stylometric: &StylometricVector) -> FusedVector {
    let mut values = Vec::with_capacity(semantic.len() + STYLOMETRIC_DIM);
    values.extend(semantic.iter().map(|&v| f64::from(v)));
    values.extend_from_slice(stylometric.as_slice());
    FusedVector {
        values,
        semantic_dim: semantic.len(),
    }
}

/// Fused length for a given embedding dimension.
pub const fn fused_dim(semantic_dim: usize) -> usize {
    semantic_dim + STYLOMETRIC_DIM
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_first_then_stylometric() {
        let semantic = vec![0.5f32, -1.25, 2.0];
        let stylometric = StylometricVector([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let fused = fuse_features(&semantic, &stylometric);

        assert_eq!(fused.len(), fused_dim(3));
        assert_eq!(fused.semantic_part(), &[0.5, -1.25, 2.0]);
        assert_eq!(fused.stylometric_part(), stylometric.as_slice());
        assert_eq!(fused.as_slice()[3], 1.0);
    }

    #[test]
    fn test_empty_semantic_keeps_stylometry() {
        let fused = fuse_features(&[], &StylometricVector::zeros());
        assert_eq!(fused.len(), STYLOMETRIC_DIM);
        assert_eq!(fused.semantic_dim(), 0);
    }
}
