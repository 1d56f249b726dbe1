use crate::{
    error::Result,
    functions::{check_label_name, pairs},
    labels::Labels,
    value::{InstantValue, Sample, Vector},
};

/// `vector_with_labels(vector, key1, value1, ...)`
///
/// Builds a single sample at `timestamp` from the value of the first row of
/// `vector`, labelled with the given pairs. An empty input yields an empty
/// vector.
pub fn vector_with_labels(timestamp: i64, vector: &Vector, args: &[&str]) -> Result<Vector> {
    const FUNC: &str = "vector_with_labels";
    let pairs = pairs(FUNC, args)?;
    let mut labels = Labels::default();
    for (key, value) in pairs {
        check_label_name(FUNC, key)?;
        labels.set(key, value);
    }
    Ok(vector
        .first()
        .map(|row| InstantValue::new(labels, Sample::new(timestamp, row.sample.value)))
        .into_iter()
        .collect())
}
