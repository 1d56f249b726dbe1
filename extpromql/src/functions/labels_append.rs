use crate::{
    error::Result,
    functions::{
        check_label_name,
        join::{Join, Policy},
        pairs,
    },
    value::Vector,
};

/// `labels_append(left, right, matchKey, src1, new1, src2, new2, ...)`
///
/// Left-outer join on a label both sides share: every left row is kept, and
/// rows with a partner in `right` receive its `src` labels as `new`.
pub fn labels_append(
    left: Vector,
    right: Vector,
    match_key: &str,
    args: &[&str],
) -> Result<Vector> {
    const FUNC: &str = "labels_append";
    check_label_name(FUNC, match_key)?;
    let copies = pairs(FUNC, args)?;
    for (source, target) in &copies {
        check_label_name(FUNC, source)?;
        check_label_name(FUNC, target)?;
    }
    Ok(Join {
        left_key: match_key,
        right_key: match_key,
        copies: &copies,
        policy: Policy::LeftOuter,
    }
    .run(left, right))
}
