use crate::{error::Result, functions::check_label_name, labels::Labels, value::Vector};

/// `labels_select(vector, name...)`
///
/// Projects every row onto the listed labels that have a value. Rows left
/// without any label are dropped.
pub fn labels_select(vector: Vector, names: &[&str]) -> Result<Vector> {
    for name in names {
        check_label_name("labels_select", name)?;
    }
    Ok(vector
        .into_iter()
        .filter_map(|mut row| {
            let projected = names
                .iter()
                .filter_map(|&name| row.labels.get(name).filter(|v| !v.is_empty()).map(|v| (name, v)))
                .collect::<Vec<_>>();
            if projected.is_empty() {
                return None;
            }
            let mut labels = Labels::default();
            for (name, value) in projected {
                labels.set(name, value);
            }
            row.labels = labels;
            Some(row)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::{render, sample};

    #[test]
    fn test_labels_select() {
        let vector = vec![
            sample(&[("pod", "a"), ("ns", "x"), ("node", "n1")], 0, 1.0),
            sample(&[("node", "n2")], 0, 2.0),
            sample(&[("ns", "y"), ("pod", "")], 0, 3.0),
        ];
        let out = labels_select(vector, &["pod", "ns", "pod"]).unwrap();
        assert_eq!(render(&out), ["{ns=x,pod=a} 1", "{ns=y} 3"]);
    }

    #[test]
    fn test_no_names_drops_everything() {
        let vector = vec![sample(&[("pod", "a")], 0, 1.0)];
        assert!(labels_select(vector, &[]).unwrap().is_empty());
    }
}
