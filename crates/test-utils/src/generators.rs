//! Generators for predictable coordinate and data values.
//!
//! These generators create verifiable patterns that can be used across
//! the test suite.

/// Creates an evenly spaced sequence.
///
/// # Example
///
/// ```
/// use test_utils::sequence;
///
/// assert_eq!(sequence(0.0, 1.0, 3), vec![0.0, 1.0, 2.0]);
/// assert_eq!(sequence(10.0, -5.0, 2), vec![10.0, 5.0]);
/// ```
pub fn sequence(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Creates flattened `(n, 2)` cell bounds around the given centres.
///
/// Interior bounds sit halfway between neighbouring centres; the outer
/// bounds mirror the nearest interior spacing. A single centre gets a
/// unit-width cell.
///
/// # Example
///
/// ```
/// use test_utils::cell_bounds;
///
/// assert_eq!(cell_bounds(&[0.5, 1.5]), vec![0.0, 1.0, 1.0, 2.0]);
/// assert_eq!(cell_bounds(&[3.0]), vec![2.5, 3.5]);
/// ```
pub fn cell_bounds(centres: &[f64]) -> Vec<f64> {
    let n = centres.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![centres[0] - 0.5, centres[0] + 0.5];
    }

    let mut edges = Vec::with_capacity(n + 1);
    edges.push(centres[0] - (centres[1] - centres[0]) / 2.0);
    for pair in centres.windows(2) {
        edges.push((pair[0] + pair[1]) / 2.0);
    }
    edges.push(centres[n - 1] + (centres[n - 1] - centres[n - 2]) / 2.0);

    edges.windows(2).flat_map(|w| [w[0], w[1]]).collect()
}

/// Adds `amplitude` to even-indexed values and subtracts it from odd ones.
///
/// Useful for building arrays that differ from the originals by less than
/// a comparison tolerance. The result is rounded, so with amplitudes near
/// machine epsilon the perturbation can exceed `amplitude` by one ulp.
///
/// # Example
///
/// ```
/// use test_utils::jitter;
///
/// let values = jitter(&[1.0, 2.0], 0.25);
/// assert_eq!(values, vec![1.25, 1.75]);
/// ```
pub fn jitter(values: &[f64], amplitude: f64) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| v + if i % 2 == 0 { amplitude } else { -amplitude })
        .collect()
}

/// Creates row-major data values for the given shape.
///
/// Each element equals its flat index, which makes it easy to check where
/// a value ended up after a join or transpose.
///
/// # Example
///
/// ```
/// use test_utils::grid_values;
///
/// let values = grid_values(&[2, 3]);
/// assert_eq!(values.len(), 6);
/// assert_eq!(values[4], 4.0);
/// ```
pub fn grid_values(shape: &[usize]) -> Vec<f64> {
    let n: usize = shape.iter().product();
    (0..n).map(|i| i as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_empty() {
        assert!(sequence(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_cell_bounds_contiguous() {
        let bounds = cell_bounds(&sequence(0.5, 1.0, 4));
        assert_eq!(bounds.len(), 8);
        for i in 0..3 {
            assert_eq!(bounds[2 * i + 1], bounds[2 * i + 2]);
        }
    }

    #[test]
    fn test_cell_bounds_decreasing() {
        let bounds = cell_bounds(&[1.5, 0.5]);
        assert_eq!(bounds, vec![2.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_jitter_below_tolerance() {
        let values = jitter(&[1.0, 2.0, 3.0], 1e-15);
        assert_ne!(values, vec![1.0, 2.0, 3.0]);
        for (v, original) in values.iter().zip([1.0, 2.0, 3.0]) {
            assert!((v - original).abs() <= 1e-15 + original * f64::EPSILON);
        }
    }

    #[test]
    fn test_grid_values_scalar() {
        assert_eq!(grid_values(&[]), vec![0.0]);
    }
}
