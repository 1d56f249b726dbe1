use crate::{
    error::Result,
    functions::copy_specs,
    labels::Labels,
    value::{format_value, Vector, VALUE_SENTINEL},
};

/// `select1(vector, "old:new", ...)`
///
/// Projects every row onto the listed labels, renaming `old` to `new`. An
/// `old` of `__v__0` (when the row has no such label) emits the sample
/// value. Rows left without any label are dropped.
pub fn select1(vector: Vector, specs: &[&str]) -> Result<Vector> {
    let specs = copy_specs("select1", specs)?;
    Ok(vector
        .into_iter()
        .filter_map(|mut row| {
            let mut labels = Labels::default();
            for &(old, new) in &specs {
                match row.labels.get(old).filter(|v| !v.is_empty()) {
                    Some(value) => labels.set(new, value),
                    None if old == VALUE_SENTINEL => {
                        labels.set(new, &format_value(row.sample.value))
                    }
                    None => {}
                }
            }
            if labels.is_empty() {
                return None;
            }
            row.labels = labels;
            Some(row)
        })
        .collect())
}
