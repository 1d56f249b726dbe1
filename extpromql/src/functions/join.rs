//! Sort-merge join shared by `select2`, `select2_join` and `labels_append`.
//!
//! Both sides are stably sorted by their match key and walked once. The
//! right cursor only moves forward, and only past right rows whose key is
//! smaller than the current left key. Consequences:
//!
//! * left rows with equal keys all match the same right row;
//! * of several right rows with equal keys only the first is ever matched,
//!   so every left row yields at most one output row.

use crate::value::{
    format_value, sort_by_label, InstantValue, Vector, RIGHT_VALUE_SENTINEL, VALUE_SENTINEL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Policy {
    /// Left rows without a match are dropped.
    Inner,
    /// Left rows without a match are kept as they are.
    LeftOuter,
}

pub(crate) struct Join<'a> {
    pub(crate) left_key: &'a str,
    pub(crate) right_key: &'a str,
    /// `(source, target)`: copy label `source` of the matched right row into
    /// `target`. `__v__0` as the source copies the left row's own value
    /// onto every emitted left row, `__v__1` the right row's value.
    pub(crate) copies: &'a [(&'a str, &'a str)],
    pub(crate) policy: Policy,
}

impl Join<'_> {
    pub(crate) fn run(&self, mut left: Vector, mut right: Vector) -> Vector {
        sort_by_label(&mut left, self.left_key);
        sort_by_label(&mut right, self.right_key);

        let mut out = Vector::with_capacity(left.len());
        let mut cursor = 0;
        for mut row in left {
            let key = row.labels.value(self.left_key).to_owned();
            self.copy_own_value(&mut row);
            if key.is_empty() {
                self.unmatched(row, &mut out);
                continue;
            }
            while cursor < right.len() && right[cursor].labels.value(self.right_key) < key.as_str()
            {
                cursor += 1;
            }
            match right.get(cursor) {
                Some(matched) if matched.labels.value(self.right_key) == key => {
                    self.copy_matched(&mut row, matched);
                    out.push(row);
                }
                _ => self.unmatched(row, &mut out),
            }
        }
        out
    }

    fn copy_own_value(&self, row: &mut InstantValue) {
        for (_, target) in self.copies.iter().filter(|(s, _)| *s == VALUE_SENTINEL) {
            row.labels.set(target, &format_value(row.sample.value));
        }
    }

    fn copy_matched(&self, row: &mut InstantValue, matched: &InstantValue) {
        for &(source, target) in self.copies {
            match source {
                VALUE_SENTINEL => {}
                RIGHT_VALUE_SENTINEL => {
                    row.labels.set(target, &format_value(matched.sample.value))
                }
                _ => {
                    let value = matched.labels.value(source);
                    if !value.is_empty() {
                        row.labels.set(target, value);
                    }
                }
            }
        }
    }

    fn unmatched(&self, row: InstantValue, out: &mut Vector) {
        if self.policy == Policy::LeftOuter {
            out.push(row);
        }
    }
}
