use crate::{
    error::Result,
    functions::{check_label_name, pairs},
    value::Vector,
};

/// `labels_rename(vector, old1, new1, old2, new2, ...)`
///
/// All renames of a row happen at once, so `a→b, b→c` moves `a` to `b` and
/// the original `b` to `c`. A renamed label replaces any label already
/// holding the new name.
pub fn labels_rename(mut vector: Vector, args: &[&str]) -> Result<Vector> {
    const FUNC: &str = "labels_rename";
    for name in args {
        check_label_name(FUNC, name)?;
    }
    let renames = pairs(FUNC, args)?;

    for row in &mut vector {
        let moved = renames
            .iter()
            .filter_map(|(old, new)| row.labels.remove(old).map(|value| (*new, value)))
            .collect::<Vec<_>>();
        for (new, value) in moved {
            row.labels.set(new, &value);
        }
    }
    Ok(vector)
}
