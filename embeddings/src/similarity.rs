//! Cosine similarity, for one pair or a whole candidate set at once.

use ndarray::{Array2, ArrayView1, Axis};

use crate::error::{EmbeddingError, Result};

/// Compute the cosine similarity between two vectors.
///
/// Returns a value between -1.0 and 1.0. A zero-norm input scores 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a * norm_b))
}

/// Score every candidate against `query` in one matrix-vector product.
///
/// All candidates must share the query's dimension. Candidates with zero
/// norm, or any candidate when the query has zero norm, score 0.0. Scores
/// come back in candidate order.
pub fn cosine_similarity_batch(query: &[f32], candidates: &[&[f32]]) -> Result<Vec<f32>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let dim = query.len();
    let mut flat = Vec::with_capacity(candidates.len() * dim);
    for candidate in candidates {
        if candidate.len() != dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dim,
                actual: candidate.len(),
            });
        }
        flat.extend_from_slice(candidate);
    }

    let matrix = Array2::from_shape_vec((candidates.len(), dim), flat)
        .map_err(|e| EmbeddingError::InvalidInput(format!("candidate matrix: {e}")))?;
    let query = ArrayView1::from(query);

    let query_norm = query.dot(&query).sqrt();
    let dots = matrix.dot(&query);
    let norms = matrix.map_axis(Axis(1), |row| row.dot(&row).sqrt());

    Ok(dots
        .iter()
        .zip(norms.iter())
        .map(|(dot, norm)| {
            if query_norm == 0.0 || *norm == 0.0 {
                0.0
            } else {
                dot / (query_norm * norm)
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cosine_similarity_identical() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        assert!(matches!(
            cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]),
            Err(EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_batch_matches_pairwise() {
        let query = [0.3, -1.2, 2.0, 0.5];
        let candidates: Vec<Vec<f32>> = vec![
            vec![0.3, -1.2, 2.0, 0.5],
            vec![1.0, 0.0, 0.0, 0.0],
            vec![-0.3, 1.2, -2.0, -0.5],
            vec![0.0, 0.0, 0.0, 0.0],
            vec![2.5, 0.1, 0.7, -3.0],
        ];
        let views: Vec<&[f32]> = candidates.iter().map(Vec::as_slice).collect();

        let batch = cosine_similarity_batch(&query, &views).unwrap();
        assert_eq!(batch.len(), candidates.len());
        for (score, candidate) in batch.iter().zip(&candidates) {
            let pairwise = cosine_similarity(&query, candidate).unwrap();
            assert!((score - pairwise).abs() < 1e-5, "{score} vs {pairwise}");
        }
        assert_eq!(batch[3], 0.0);
    }

    #[test]
    fn test_batch_rejects_mixed_dimensions() {
        let a = [1.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        assert!(cosine_similarity_batch(&[1.0, 0.0], &[&a, &b]).is_err());
    }

    #[test]
    fn test_batch_with_zero_query() {
        let a = [1.0, 0.0];
        assert_eq!(cosine_similarity_batch(&[0.0, 0.0], &[&a]).unwrap(), vec![0.0]);
    }

    /// Embedding-sized vectors narrowed to f32 score within 1e-5 of the
    /// f64 computation, well under the 4-decimal rounding applied to scores.
    #[test]
    fn test_f32_scores_track_f64_reference() {
        let dim = 1536;
        let wave = |phase: f64| -> Vec<f64> {
            (0..dim)
                .map(|i| ((i as f64 * 0.37 + phase).sin() * 0.05) + 0.001 * phase)
                .collect()
        };
        let query = wave(0.0);
        let candidates: Vec<Vec<f64>> = [0.1, 0.7, 1.9, 3.0].into_iter().map(wave).collect();

        let narrow = |v: &[f64]| -> Vec<f32> { v.iter().map(|x| *x as f32).collect() };
        let query32 = narrow(&query);
        let candidates32: Vec<Vec<f32>> = candidates.iter().map(|c| narrow(c)).collect();
        let views: Vec<&[f32]> = candidates32.iter().map(Vec::as_slice).collect();
        let scores = cosine_similarity_batch(&query32, &views).unwrap();

        for (score, candidate) in scores.iter().zip(&candidates) {
            let dot: f64 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
            let norms = query.iter().map(|a| a * a).sum::<f64>().sqrt()
                * candidate.iter().map(|b| b * b).sum::<f64>().sqrt();
            let reference = dot / norms;
            assert!(
                (f64::from(*score) - reference).abs() < 1e-5,
                "{score} vs {reference}"
            );
        }
    }
}
