//! Density clustering capability.

use linfa::traits::Transformer;
use linfa_clustering::Dbscan;
use ndarray::Array2;

use crate::GroupingError;

/// Assigns a cluster label (or `None` for noise) to each point.
///
/// Implementations must return exactly one label per input point, in
/// input order.
pub trait Clusterer: Send + Sync {
    /// Clusters `points` given as `(x, y)` pairs in a planar coordinate
    /// system where `eps` is a distance in the same units.
    ///
    /// # Errors
    ///
    /// Returns [`GroupingError::Clustering`] if the backend rejects the
    /// input or parameters.
    fn cluster(
        &self,
        points: &[(f64, f64)],
        eps: f64,
        min_samples: usize,
    ) -> Result<Vec<Option<usize>>, GroupingError>;
}

/// DBSCAN from `linfa-clustering` using Euclidean distance.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinfaDbscan;

impl Clusterer for LinfaDbscan {
    fn cluster(
        &self,
        points: &[(f64, f64)],
        eps: f64,
        min_samples: usize,
    ) -> Result<Vec<Option<usize>>, GroupingError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let flat: Vec<f64> = points.iter().flat_map(|&(x, y)| [x, y]).collect();
        let observations = Array2::from_shape_vec((points.len(), 2), flat)
            .map_err(|e| GroupingError::Clustering(e.to_string()))?;

        // linfa needs at least two points per neighbourhood. With one, every
        // point is a core point, so noise from the two-point run becomes a
        // singleton cluster.
        let labels = Dbscan::params(min_samples.max(2))
            .tolerance(eps)
            .transform(&observations)
            .map_err(|e| GroupingError::Clustering(e.to_string()))?
            .to_vec();

        if min_samples > 1 {
            return Ok(labels);
        }

        let mut next = labels.iter().flatten().max().map_or(0, |max| max + 1);
        Ok(labels
            .into_iter()
            .map(|label| {
                label.or_else(|| {
                    let singleton = next;
                    next += 1;
                    Some(singleton)
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_two_dense_blobs_and_noise() {
        let points = [
            (0.0, 0.0),
            (1.0, 0.0),
            (0.0, 1.0),
            (100.0, 100.0),
            (101.0, 100.0),
            (100.0, 101.0),
            (500.0, -500.0),
        ];
        let labels = LinfaDbscan.cluster(&points, 5.0, 3).unwrap();
        assert_eq!(labels.len(), points.len());

        assert!(labels[0].is_some());
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert!(labels[3].is_some());
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);
        assert_eq!(labels[6], None);
    }

    #[test]
    fn min_samples_of_one_leaves_no_noise() {
        let points = [(0.0, 0.0), (1.0, 0.0), (500.0, 500.0), (-500.0, 500.0)];
        let labels = LinfaDbscan.cluster(&points, 5.0, 1).unwrap();

        assert!(labels.iter().all(Option::is_some));
        assert_ne!(labels[2], labels[0]);
        assert_ne!(labels[2], labels[1]);
        assert_ne!(labels[3], labels[0]);
        assert_ne!(labels[2], labels[3]);
    }

    #[test]
    fn empty_input_has_no_labels() {
        assert!(LinfaDbscan.cluster(&[], 5.0, 3).unwrap().is_empty());
    }
}
