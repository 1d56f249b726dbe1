use rustc_hash::FxHashMap;

use crate::{
    error::Result,
    functions::check_label_name,
    value::{format_value, Vector},
};

/// `labels_append_value(left, right, matchKey, newKey)`
///
/// Copies the value of the first `right` row sharing `matchKey` into label
/// `newKey`. Left rows without the key pass through; keyed rows without a
/// partner are dropped. Output keeps the order of `left`.
pub fn labels_append_value(
    left: Vector,
    right: &Vector,
    match_key: &str,
    new_key: &str,
) -> Result<Vector> {
    const FUNC: &str = "labels_append_value";
    check_label_name(FUNC, match_key)?;
    check_label_name(FUNC, new_key)?;

    let mut values = FxHashMap::default();
    for row in right {
        values
            .entry(row.labels.value(match_key))
            .or_insert(row.sample.value);
    }

    Ok(left
        .into_iter()
        .filter_map(|mut row| {
            let key = row.labels.value(match_key);
            if key.is_empty() {
                return Some(row);
            }
            let value = *values.get(key)?;
            row.labels.set(new_key, &format_value(value));
            Some(row)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::{render, sample};

    #[test]
    fn test_labels_append_value() {
        let left = vec![
            sample(&[("pod", "b")], 0, 1.0),
            sample(&[("node", "n1")], 0, 2.0),
            sample(&[("pod", "a")], 0, 3.0),
            sample(&[("pod", "z")], 0, 4.0),
        ];
        let right = vec![
            sample(&[("pod", "a")], 0, 0.5),
            sample(&[("pod", "b")], 0, 1.5),
            sample(&[("pod", "a")], 0, 9.0),
        ];
        let out = labels_append_value(left, &right, "pod", "limit").unwrap();
        assert_eq!(
            render(&out),
            [
                "{limit=1.5,pod=b} 1",
                "{node=n1} 2",
                "{limit=0.5,pod=a} 3",
            ]
        );
    }

    #[test]
    fn test_overwrites_existing_target() {
        let left = vec![sample(&[("pod", "a"), ("limit", "old")], 0, 1.0)];
        let right = vec![sample(&[("pod", "a")], 0, 2.0)];
        let out = labels_append_value(left, &right, "pod", "limit").unwrap();
        assert_eq!(render(&out), ["{limit=2,pod=a} 1"]);
    }

    #[test]
    fn test_invalid_name() {
        assert!(labels_append_value(Vector::new(), &Vector::new(), "pod", "").is_err());
    }
}
