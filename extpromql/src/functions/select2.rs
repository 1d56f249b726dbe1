use crate::{
    error::Result,
    functions::{
        check_label_name, copy_specs,
        join::{Join, Policy},
        split_pair, SPLIT_SYMBOL,
    },
    value::Vector,
};

/// `select2("srcKey|destKey", left, right, "src:new", ...)`
///
/// Joins `left` to `right` on `left[srcKey] == right[destKey]` and copies the
/// listed labels of the matched right row. Left rows without a key or
/// without a partner are dropped.
pub fn select2(match_key: &str, left: Vector, right: Vector, specs: &[&str]) -> Result<Vector> {
    run("select2", match_key, left, right, specs, Policy::Inner)
}

/// `select2_join("srcKey|destKey", left, right, "src:new", ...)`
///
/// Same as [`select2`], but left rows without a partner are kept untouched.
pub fn select2_join(
    match_key: &str,
    left: Vector,
    right: Vector,
    specs: &[&str],
) -> Result<Vector> {
    run("select2_join", match_key, left, right, specs, Policy::LeftOuter)
}

fn run(
    func: &'static str,
    match_key: &str,
    left: Vector,
    right: Vector,
    specs: &[&str],
    policy: Policy,
) -> Result<Vector> {
    let (left_key, right_key) = split_pair(match_key, SPLIT_SYMBOL);
    check_label_name(func, left_key)?;
    check_label_name(func, right_key)?;
    let copies = copy_specs(func, specs)?;
    Ok(Join {
        left_key,
        right_key,
        copies: &copies,
        policy,
    }
    .run(left, right))
}
