use rustc_hash::FxHashMap;

use crate::{
    error::{Error, Result},
    functions::{check_label_name, SPLIT_SYMBOL},
    value::{format_value, Vector},
};

const FUNC: &str = "selectn";

/// `selectn("k0|k1|...", "n0|n1|...", v0, v1, ...)`
///
/// Positional N-ary join. A single match key is shared by every vector,
/// otherwise `vi` is matched on `ki`. Every `v0` row with a non-empty key
/// gets its own value as `n0` and, for each later vector, the value of the
/// first row whose key equals the `v0` row's key as `ni`. Rows of `v0`
/// without a key are dropped.
pub fn selectn(match_keys: &str, new_keys: &str, vectors: Vec<Vector>) -> Result<Vector> {
    let match_keys = split_names(match_keys)?;
    let new_keys = split_names(new_keys)?;
    if match_keys.len() != 1 && match_keys.len() != vectors.len() {
        return Err(Error::invalid_params(
            FUNC,
            format!(
                "{} match keys for {} vectors",
                match_keys.len(),
                vectors.len()
            ),
        ));
    }
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
    let match_key = |index: usize| match_keys.get(index).unwrap_or(&match_keys[0]);

    let mut vectors = vectors.into_iter();
    let Some(first) = vectors.next() else {
        return Ok(Vector::new());
    };
    let lookups = vectors
        .enumerate()
        .map(|(i, vector)| {
            let key = match_key(i + 1);
            let mut lookup = FxHashMap::default();
            for row in vector {
                let value = row.labels.value(key);
                if !value.is_empty() {
                    lookup.entry(value.to_owned()).or_insert(row.sample.value);
                }
            }
            lookup
        })
        .collect::<Vec<_>>();

    let key = match_key(0);
    let mut out = Vector::with_capacity(first.len());
    for mut row in first {
        let value = row.labels.value(key).to_owned();
        if value.is_empty() {
            continue;
        }
        row.labels.set(new_keys[0], &format_value(row.sample.value));
        for (lookup, new_key) in lookups.iter().zip(&new_keys[1..]) {
            if let Some(v) = lookup.get(&value) {
                row.labels.set(new_key, &format_value(*v));
            }
        }
        out.push(row);
    }
    Ok(out)
}

fn split_names(names: &str) -> Result<Vec<&str>> {
    names
        .split(SPLIT_SYMBOL)
        .map(|name| {
            let name = name.trim();
            check_label_name(FUNC, name)?;
            Ok(name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::{render, sample};

    #[test]
    fn test_shared_key() {
        let cpu = vec![
            sample(&[("pod", "b")], 0, 0.2),
            sample(&[("node", "n1")], 0, 0.9),
            sample(&[("pod", "a")], 0, 0.1),
        ];
        let mem = vec![
            sample(&[("pod", "a")], 0, 10.0),
            sample(&[("pod", "a")], 0, 11.0),
        ];
        let out = selectn("pod", "cpu|mem", vec![cpu, mem]).unwrap();
        assert_eq!(
            render(&out),
            ["{cpu=0.2,pod=b} 0.2", "{cpu=0.1,mem=10,pod=a} 0.1"]
        );
    }

    #[test]
    fn test_per_vector_keys() {
        let cpu = vec![sample(&[("pod", "a")], 0, 0.1)];
        let mem = vec![sample(&[("pod_name", "a")], 0, 10.0)];
        let disk = vec![
            sample(&[("instance", "b")], 0, 1.0),
            sample(&[("instance", "a")], 0, 2.0),
        ];
        let out = selectn(
            "pod|pod_name|instance",
            "cpu|mem|disk",
            vec![cpu, mem, disk],
        )
        .unwrap();
        assert_eq!(render(&out), ["{cpu=0.1,disk=2,mem=10,pod=a} 0.1"]);
    }

    #[test]
    fn test_count_mismatch() {
        let err = selectn("a|b", "x|y|z", vec![vec![], vec![], vec![]]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid params in selectn(): 2 match keys for 3 vectors"
        );
        let err = selectn("a", "x|y", vec![vec![]]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid params in selectn(): 2 target labels for 1 vectors"
        );
        assert!(matches!(
            selectn("a|", "x", vec![vec![]]),
            Err(Error::InvalidLabelName { func: "selectn", .. })
        ));
    }
}
