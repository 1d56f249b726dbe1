use crate::{
    error::Result,
    functions::{check_label_name, pairs},
    ternary::Ternary,
    value::{Vector, VALUE_SENTINEL},
};

/// `labels_append_ternary(vector, key1, expr1, key2, expr2, ...)`
///
/// Sets `key` to the result of `expr` for every row. Pairs are applied in
/// order, so later expressions see labels set by earlier ones. A key of
/// `__v__0` replaces the sample value instead, when the result is a number.
/// An empty result removes the label.
pub fn labels_append_ternary(mut vector: Vector, args: &[&str]) -> Result<Vector> {
    const FUNC: &str = "labels_append_ternary";
    let exprs = pairs(FUNC, args)?
        .into_iter()
        .map(|(key, expr)| {
            check_label_name(FUNC, key)?;
            Ok((key, expr.parse::<Ternary>()?))
        })
        .collect::<Result<Vec<_>>>()?;

    for row in &mut vector {
        for (key, expr) in &exprs {
            let value = expr.eval(row);
            if *key == VALUE_SENTINEL {
                if let Ok(v) = value.parse() {
                    row.sample.value = v;
                }
            } else if value.is_empty() {
                row.labels.remove(key);
            } else {
                row.labels.set(key, &value);
            }
        }
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Error,
        functions::tests::{render, sample},
    };

    #[test]
    fn test_labels_append_ternary() {
        let vector = vec![
            sample(&[("env", "prod")], 0, 1.0),
            sample(&[("env", "dev"), ("color", "x")], 0, 2.0),
        ];
        let out = labels_append_ternary(
            vector,
            &["color", "env==prod?blue:green", "tier", "color==blue?'gold':''"],
        )
        .unwrap();
        assert_eq!(
            render(&out),
            ["{color=blue,env=prod,tier=gold} 1", "{color=green,env=dev} 2"]
        );
    }

    #[test]
    fn test_rewrites_value() {
        let vector = vec![
            sample(&[("state", "up")], 0, 0.0),
            sample(&[("state", "down")], 0, 0.0),
        ];
        let out = labels_append_ternary(
            vector,
            &["__v__0", "state==up?'1':'0'", "__v__0", "state==up?'x':keep"],
        )
        .unwrap();
        assert_eq!(render(&out), ["{state=up} 1", "{state=down} 0"]);
    }

    #[test]
    fn test_malformed_expression_fails_call() {
        let vector = vec![sample(&[("env", "prod")], 0, 1.0)];
        assert!(matches!(
            labels_append_ternary(vector, &["color", "env=prod?x:y"]),
            Err(Error::TernaryFormat(_))
        ));
        assert!(matches!(
            labels_append_ternary(vec![], &["color"]),
            Err(Error::InvalidParams { .. })
        ));
    }
}
