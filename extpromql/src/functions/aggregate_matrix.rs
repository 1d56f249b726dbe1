//! Collapse every series of a range vector into a single sample.

use std::cmp::Ordering;

use crate::value::{InstantValue, Matrix, RangeValue, Sample, Vector};

/// `aggregate_matrix_max(matrix)`: the point with the largest value.
pub fn aggregate_matrix_max(matrix: Matrix) -> Vector {
    reduce(matrix, |samples| pick(samples, Ordering::Greater))
}

/// `aggregate_matrix_min(matrix)`: the point with the smallest value.
pub fn aggregate_matrix_min(matrix: Matrix) -> Vector {
    reduce(matrix, |samples| pick(samples, Ordering::Less))
}

/// `aggregate_matrix_sum(matrix)`: the sum of all values, stamped with the
/// time of the latest point.
pub fn aggregate_matrix_sum(matrix: Matrix) -> Vector {
    reduce(matrix, |samples| {
        let timestamp = samples.iter().map(|s| s.timestamp).max()?;
        Some(Sample::new(timestamp, samples.iter().map(|s| s.value).sum()))
    })
}

fn reduce<F>(matrix: Matrix, f: F) -> Vector
where
    F: Fn(&[Sample]) -> Option<Sample>,
{
    matrix
        .into_iter()
        .filter_map(|RangeValue { labels, samples, .. }| {
            f(&samples).map(|sample| InstantValue::new(labels, sample))
        })
        .collect()
}

/// The sample whose value compares `wanted` against every other; equal
/// values resolve to the earlier timestamp. NaN never wins over a number.
fn pick(samples: &[Sample], wanted: Ordering) -> Option<Sample> {
    samples.iter().copied().reduce(|best, s| {
        let ord = match s.value.partial_cmp(&best.value) {
            Some(ord) => ord,
            None if best.value.is_nan() && !s.value.is_nan() => wanted,
            None => return best,
        };
        if ord == wanted || (ord == Ordering::Equal && s.timestamp < best.timestamp) {
            s
        } else {
            best
        }
    })
}
