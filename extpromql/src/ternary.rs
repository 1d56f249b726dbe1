//! The `key OP value ? a : b` conditional used by `labels_append_ternary`.
//!
//! ```text
//! env==prod?blue:green
//! __v__0>='10'?'high':'low'
//! ```
//!
//! All comparisons are lexicographic string comparisons, including those on
//! sample values.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use strum::EnumString;

use crate::{
    error::{Error, Result},
    value::{format_value, InstantValue, VALUE_SENTINEL},
};

static RE_TERNARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^([0-9A-Za-z_]+)",
        r"([=!><]=|[<>])",
        r"('[.0-9A-Za-z_]*'|[.0-9A-Za-z_]+)",
        r"\?('[0-9A-Za-z_]*'|[0-9A-Za-z_]+)",
        r":('[0-9A-Za-z_]*'|[0-9A-Za-z_]+)$",
    ))
    .expect("BUG: invalid ternary operator regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum Op {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<")]
    Lt,
}

impl Op {
    fn compare(self, a: &str, b: &str) -> bool {
        match self {
            Op::Eq => a == b,
            Op::Ne => a != b,
            Op::Ge => a >= b,
            Op::Le => a <= b,
            Op::Gt => a > b,
            Op::Lt => a < b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    /// `'quoted'` text.
    Literal(String),
    /// A bare token: the sample value for `__v__0`, otherwise the label of
    /// that name, falling back to the token itself.
    Bare(String),
}

impl Operand {
    fn parse(token: &str) -> Self {
        match token
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
        {
            Some(text) => Operand::Literal(text.to_owned()),
            None => Operand::Bare(token.to_owned()),
        }
    }

    fn resolve(&self, sample: &InstantValue) -> String {
        match self {
            Operand::Literal(text) => text.clone(),
            Operand::Bare(name) if name == VALUE_SENTINEL => format_value(sample.sample.value),
            Operand::Bare(name) => sample
                .labels
                .get(name)
                .map_or_else(|| name.clone(), str::to_owned),
        }
    }
}

/// A parsed `key OP value ? a : b` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ternary {
    /// The label (or `__v__0`) being tested; reads as "" when absent.
    key: String,
    op: Op,
    operand: Operand,
    then: Operand,
    otherwise: Operand,
}

impl Ternary {
    /// Evaluates the expression against `sample`, returning the chosen
    /// branch's value.
    pub fn eval(&self, sample: &InstantValue) -> String {
        let key = if self.key == VALUE_SENTINEL {
            format_value(sample.sample.value)
        } else {
            sample.labels.value(&self.key).to_owned()
        };
        let operand = self.operand.resolve(sample);
        if self.op.compare(&key, &operand) {
            self.then.resolve(sample)
        } else {
            self.otherwise.resolve(sample)
        }
    }
}

impl FromStr for Ternary {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = RE_TERNARY
            .captures(s)
            .ok_or_else(|| Error::TernaryFormat(s.to_owned()))?;
        let op = caps[2]
            .parse()
            .map_err(|_| Error::TernaryFormat(s.to_owned()))?;
        Ok(Ternary {
            key: caps[1].to_owned(),
            op,
            operand: Operand::parse(&caps[3]),
            then: Operand::parse(&caps[4]),
            otherwise: Operand::parse(&caps[5]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{labels::Labels, value::Sample};

    fn sample(labels: &[(&str, &str)], value: f64) -> InstantValue {
        InstantValue::new(Labels::new(labels.iter().copied()), Sample::new(0, value))
    }

    #[test]
    fn test_env_branches() {
        let expr: Ternary = "env==prod?blue:green".parse().unwrap();
        assert_eq!(expr.eval(&sample(&[("env", "prod")], 1.0)), "blue");
        assert_eq!(expr.eval(&sample(&[("env", "staging")], 1.0)), "green");
        assert_eq!(expr.eval(&sample(&[], 1.0)), "green");
    }

    #[test]
    fn test_absent_labels() {
        // an absent key reads as "", an absent operand label as its own name
        let expr: Ternary = "env==missing?yes:no".parse().unwrap();
        assert_eq!(expr.eval(&sample(&[("a", "1")], 1.0)), "no");
        assert_eq!(expr.eval(&sample(&[("env", "missing")], 1.0)), "yes");
        assert_eq!(expr.eval(&sample(&[("env", "x"), ("missing", "x")], 1.0)), "yes");

        let expr: Ternary = "env==''?yes:no".parse().unwrap();
        assert_eq!(expr.eval(&sample(&[("a", "1")], 1.0)), "yes");
    }

    #[test]
    fn test_malformed() {
        for s in [
            "env=prod?x:y",
            "env==prod?x",
            "env == prod ? x : y",
            "env==prod?'a.b':y",
            "==prod?x:y",
            "",
        ] {
            assert!(
                matches!(s.parse::<Ternary>(), Err(Error::TernaryFormat(_))),
                "{s:?} should not parse"
            );
        }
    }

    #[test]
    fn test_operand_resolution() {
        let s = sample(&[("env", "prod"), ("target", "prod"), ("color", "red")], 2.5);

        // a bare operand refers to a label when one exists
        let expr: Ternary = "env==target?color:'none'".parse().unwrap();
        assert_eq!(expr.eval(&s), "red");

        // quoting forces a literal
        let expr: Ternary = "env=='target'?color:'none'".parse().unwrap();
        assert_eq!(expr.eval(&s), "none");

        let expr: Ternary = "env!=prod?x:''".parse().unwrap();
        assert_eq!(expr.eval(&s), "");
    }

    #[test]
    fn test_value_sentinel_compares_as_string() {
        let expr: Ternary = "__v__0>='10'?high:low".parse().unwrap();
        assert_eq!(expr.eval(&sample(&[], 9.0)), "high");
        assert_eq!(expr.eval(&sample(&[], 10.0)), "high");
        assert_eq!(expr.eval(&sample(&[], 100.0)), "high");
        assert_eq!(expr.eval(&sample(&[], 0.5)), "low");

        let expr: Ternary = "env<m?__v__0:'x'".parse().unwrap();
        assert_eq!(expr.eval(&sample(&[("env", "dev")], 1.25)), "1.25");
    }

    #[test]
    fn test_operators() {
        let s = sample(&[("v", "b")], 0.0);
        let cases = [
            ("v=='b'?t:f", "t"),
            ("v!='b'?t:f", "f"),
            ("v>='b'?t:f", "t"),
            ("v<='a'?t:f", "f"),
            ("v>'a'?t:f", "t"),
            ("v<'c'?t:f", "t"),
        ];
        for (expr, want) in cases {
            let expr: Ternary = expr.parse().unwrap();
            assert_eq!(expr.eval(&s), want);
        }
    }
}
