//! Dense vector arithmetic over the flat `(N, DIMENSIONS)` embedding matrix.
//!
//! Cosine similarity between unit vectors reduces to a dot product, so
//! scoring a candidate set against a query vector is a single
//! matrix-vector multiply (spec.md §4.5 step 4). This module has no
//! notion of [`Block`](crate::types::Block) or indices into it -- it
//! only ever sees raw `f32` slices, so it stays reusable for both the
//! persisted index matrix and an ephemeral in-memory batch.

/// L2-normalise a vector in place. A zero vector is left as-is (its norm
/// is already 0, which the embedder's normalisation assertion catches).
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// The L2 (Euclidean) norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Dot product of two equal-length vectors. For L2-normalised inputs
/// this is exactly their cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Score every row of a row-major `(n, dims)` matrix against `query` via
/// dot product. Returns one score per row, in row order.
pub fn score_rows(matrix: &[f32], dims: usize, query: &[f32]) -> Vec<f32> {
    debug_assert_eq!(query.len(), dims);
    if dims == 0 {
        return Vec::new();
    }
    matrix
        .chunks_exact(dims)
        .map(|row| dot(row, query))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize_unit_norm() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_untouched() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn test_dot_identical_unit_vectors_is_one() {
        let mut a = vec![1.0, 2.0, 3.0];
        l2_normalize(&mut a);
        let b = a.clone();
        assert!((dot(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_score_rows() {
        let matrix = vec![1.0, 0.0, 0.0, 1.0];
        let scores = score_rows(&matrix, 2, &[1.0, 0.0]);
        assert_eq!(scores.len(), 2);
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!((scores[1] - 0.0).abs() < 1e-6);
    }
}
