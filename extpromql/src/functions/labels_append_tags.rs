use crate::{
    error::Result,
    functions::{check_label_name, pairs},
    value::Vector,
};

/// `labels_append_tags(vector, key1, value1, key2, value2, ...)`
///
/// Sets each `key` that is missing or empty. Non-empty labels are never
/// overwritten.
pub fn labels_append_tags(mut vector: Vector, args: &[&str]) -> Result<Vector> {
    const FUNC: &str = "labels_append_tags";
    let tags = pairs(FUNC, args)?;
    for (key, _) in &tags {
        check_label_name(FUNC, key)?;
    }

    for row in &mut vector {
        for (key, value) in &tags {
            if row.labels.value(key).is_empty() && !value.is_empty() {
                row.labels.set(key, value);
            }
        }
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::{render, sample};

    #[test]
    fn test_labels_append_tags() {
        let vector = vec![
            sample(&[("env", "prod")], 0, 1.0),
            sample(&[("env", ""), ("pod", "a")], 0, 2.0),
            sample(&[], 0, 3.0),
        ];
        let out = labels_append_tags(vector, &["env", "dev", "region", "eu"]).unwrap();
        assert_eq!(
            render(&out),
            [
                "{env=prod,region=eu} 1",
                "{env=dev,pod=a,region=eu} 2",
                "{env=dev,region=eu} 3",
            ]
        );
    }

    #[test]
    fn test_invalid_params() {
        assert!(labels_append_tags(vec![], &["env"]).is_err());
        assert!(labels_append_tags(vec![], &["e-nv", "x"]).is_err());
        // values are free text
        assert!(labels_append_tags(vec![], &["env", "a b/c"]).is_ok());
    }
}
