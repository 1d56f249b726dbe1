use crate::{error::Result, functions::check_label_name, value::Vector};

/// `labels_invert(vector, name...)`: keeps only the rows that have none of
/// the listed labels.
pub fn labels_invert(mut vector: Vector, names: &[&str]) -> Result<Vector> {
    for name in names {
        check_label_name("labels_invert", name)?;
    }
    vector.retain(|row| names.iter().all(|name| row.labels.value(name).is_empty()));
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::{render, sample};

    #[test]
    fn test_labels_invert() {
        let vector = vec![
            sample(&[("pod", "a"), ("owner", "x")], 0, 1.0),
            sample(&[("pod", "b")], 0, 2.0),
            sample(&[("pod", "c"), ("team", "")], 0, 3.0),
            sample(&[("pod", "d"), ("team", "t")], 0, 4.0),
        ];
        let out = labels_invert(vector, &["owner", "team"]).unwrap();
        assert_eq!(render(&out), ["{pod=b} 2", "{pod=c,team=} 3"]);
    }
}
