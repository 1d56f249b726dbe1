use crate::{
    error::Result,
    functions::check_label_name,
    value::{sort_by_label, Vector},
};

/// `distinct(vector, key)`
///
/// Keeps one row per value of `key`: the one with the largest timestamp, or
/// the earliest seen on equal timestamps. Rows are returned sorted by `key`.
pub fn distinct(mut vector: Vector, key: &str) -> Result<Vector> {
    check_label_name("distinct", key)?;
    sort_by_label(&mut vector, key);

    let mut out: Vector = Vector::with_capacity(vector.len());
    for row in vector {
        if let Some(last) = out.last_mut() {
            if last.labels.value(key) == row.labels.value(key) {
                if row.sample.timestamp > last.sample.timestamp {
                    *last = row;
                }
                continue;
            }
        }
        out.push(row);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::{render, sample};

    fn input() -> Vector {
        vec![
            sample(&[("pod", "b"), ("v", "1")], 10, 1.0),
            sample(&[("pod", "a"), ("v", "2")], 10, 2.0),
            sample(&[("pod", "b"), ("v", "3")], 30, 3.0),
            sample(&[("pod", "a"), ("v", "4")], 10, 4.0),
            sample(&[("pod", "b"), ("v", "5")], 20, 5.0),
            sample(&[("v", "6")], 5, 6.0),
        ]
    }

    #[test]
    fn test_distinct() {
        let out = distinct(input(), "pod").unwrap();
        assert_eq!(
            render(&out),
            ["{v=6} 6", "{pod=a,v=2} 2", "{pod=b,v=3} 3"]
        );
    }

    #[test]
    fn test_idempotent() {
        let once = distinct(input(), "pod").unwrap();
        let twice = distinct(once.clone(), "pod").unwrap();
        assert_eq!(once, twice);
        assert!(distinct(vec![], "pod").unwrap().is_empty());
    }
}
