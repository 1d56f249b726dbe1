use rustc_hash::FxHashMap;

use crate::{
    error::{Error, Result},
    functions::{check_label_name, SPLIT_SYMBOL},
    labels::Labels,
    value::{format_value, Vector},
};

/// `labels_append_values("k1,k2", "n0|n1|...", v0, v1, ...)`
///
/// Correlates `v0` with every later vector on all match keys at once. Each
/// `v0` row carrying every key gets its own value as `n0` and, for each
/// later vector `vi`, the value of the first `vi` row agreeing on all keys
/// as `ni`. Rows of `v0` missing any key are dropped.
pub fn labels_append_values(match_keys: &str, new_keys: &str, vectors: Vec<Vector>) -> Result<Vector> {
    const FUNC: &str = "labels_append_values";
    let match_keys = match_keys.split(',').map(str::trim).collect::<Vec<_>>();
    for key in &match_keys {
        check_label_name(FUNC, key)?;
    }
    let new_keys = new_keys.split(SPLIT_SYMBOL).map(str::trim).collect::<Vec<_>>();
    if new_keys.len() != vectors.len() {
        return Err(Error::invalid_params(
            FUNC,
            format!(
                "{} target labels for {} vectors",
                new_keys.len(),
                vectors.len()
            ),
        ));
    }
    for key in &new_keys {
        check_label_name(FUNC, key)?;
    }

    let key_of = |labels: &Labels| -> Option<Vec<String>> {
        match_keys
            .iter()
            .map(|k| labels.get(k).filter(|v| !v.is_empty()).map(str::to_owned))
            .collect()
    };

    let mut vectors = vectors.into_iter();
    let Some(first) = vectors.next() else {
        return Ok(Vector::new());
    };
    let lookups = vectors
        .map(|vector| {
            let mut lookup = FxHashMap::default();
            for row in &vector {
                if let Some(key) = key_of(&row.labels) {
                    lookup.entry(key).or_insert(row.sample.value);
                }
            }
            lookup
        })
        .collect::<Vec<_>>();

    let mut out = Vector::with_capacity(first.len());
    for mut row in first {
        let Some(key) = key_of(&row.labels) else {
            continue;
        };
        row.labels.set(new_keys[0], &format_value(row.sample.value));
        for (lookup, new_key) in lookups.iter().zip(&new_keys[1..]) {
            if let Some(value) = lookup.get(&key) {
                row.labels.set(new_key, &format_value(*value));
            }
        }
        out.push(row);
    }
    Ok(out)
}
