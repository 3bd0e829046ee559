use serde::{Deserialize, Serialize};

/// sparse weight vector, entries kept in ascending dimension order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SparseVector {
    entries: Vec<(u32, f64)>,
}

impl SparseVector {
    /// build from (dimension, weight) pairs; pairs must already be sorted by dimension
    pub fn from_sorted(entries: Vec<(u32, f64)>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        Self { entries }
    }

    pub fn entries(&self) -> &[(u32, f64)] {
        &self.entries
    }

    /// strictly ascending dimensions below `dims` with finite weights
    pub fn fits(&self, dims: usize) -> bool {
        self.entries.windows(2).all(|w| w[0].0 < w[1].0)
            && self
                .entries
                .iter()
                .all(|(dim, w)| (*dim as usize) < dims && w.is_finite())
    }

    pub fn is_zero(&self) -> bool {
        self.entries.iter().all(|(_, w)| *w == 0.0)
    }

    pub fn norm(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt()
    }

    /// scale to unit length; the zero vector is left untouched
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm <= f64::EPSILON {
            return;
        }
        for (_, w) in &mut self.entries {
            *w /= norm;
        }
    }

    /// dot product by merging the two sorted entry lists
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (a, b) = (&self.entries, &other.entries);
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < a.len() && j < b.len() {
            match a[i].0.cmp(&b[j].0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += a[i].1 * b[j].1;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_vector_has_unit_norm() {
        let mut v = SparseVector::from_sorted(vec![(0, 3.0), (4, 4.0)]);
        v.normalize();
        assert!((v.norm() - 1.0).abs() < 1e-12);
        assert!((v.entries()[0].1 - 0.6).abs() < 1e-12);
    }

    #[test]
    fn zero_vector_survives_normalization() {
        let mut v = SparseVector::default();
        v.normalize();
        assert!(v.is_zero());
        assert_eq!(v.norm(), 0.0);
    }

    #[test]
    fn fits_checks_order_and_range() {
        assert!(SparseVector::from_sorted(vec![(0, 0.6), (3, 0.8)]).fits(4));
        assert!(!SparseVector::from_sorted(vec![(0, 0.6), (3, 0.8)]).fits(3));
        let unsorted: SparseVector = serde_json::from_str("[[2, 0.5], [1, 0.5]]").unwrap();
        assert!(!unsorted.fits(4));
        assert!(SparseVector::default().fits(0));
    }

    #[test]
    fn dot_only_counts_shared_dimensions() {
        let a = SparseVector::from_sorted(vec![(1, 2.0), (3, 1.0), (7, 5.0)]);
        let b = SparseVector::from_sorted(vec![(3, 4.0), (5, 9.0), (7, 1.0)]);
        assert_eq!(a.dot(&b), 9.0);
        assert_eq!(a.dot(&SparseVector::default()), 0.0);
    }
}
