use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use strum::{Display, EnumString};

use crate::labels::Labels;

pub const FIELD_TIME: &str = "_timestamp";
pub const FIELD_VALUE: &str = "value";

/// Names the sample value of the row being produced (the left side of a
/// join) wherever a label name is expected.
pub const VALUE_SENTINEL: &str = "__v__0";
/// Names the sample value of the matched right-hand row of a join.
pub const RIGHT_VALUE_SENTINEL: &str = "__v__1";

pub type Vector = Vec<InstantValue>;
pub type Matrix = Vec<RangeValue>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Time in microseconds
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl Serialize for Sample {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&(self.timestamp / 1_000_000))?;
        seq.serialize_element(&format_value(self.value))?;
        seq.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstantValue {
    #[serde(rename = "metric")]
    pub labels: Labels,
    #[serde(rename = "value")]
    pub sample: Sample,
}

impl InstantValue {
    pub fn new(labels: Labels, sample: Sample) -> Self {
        Self { labels, sample }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeValue {
    #[serde(rename = "metric")]
    pub labels: Labels,
    #[serde(rename = "values")]
    pub samples: Vec<Sample>,
    #[serde(skip_serializing)]
    pub time_range: Option<(i64, i64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ValueType {
    Vector,
    Matrix,
    Scalar,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Vector(Vector),
    Matrix(Matrix),
    Float(f64),
    String(String),
    None,
}

impl Value {
    pub fn get_type(&self) -> &str {
        match self {
            Value::Vector(_) => "vector",
            Value::Matrix(_) => "matrix",
            Value::Float(_) => "scalar",
            Value::String(_) => "string",
            Value::None => "scalar",
        }
    }

    /// Whether this value can be passed where `expected` is declared.
    /// `None` stands in for an empty vector or matrix.
    pub(crate) fn is_a(&self, expected: ValueType) -> bool {
        matches!(
            (self, expected),
            (Value::Vector(_) | Value::None, ValueType::Vector)
                | (Value::Matrix(_) | Value::None, ValueType::Matrix)
                | (Value::Float(_), ValueType::Scalar)
                | (Value::String(_), ValueType::String)
        )
    }
}

/// Formats a sample value the way it is stored in a label: the shortest
/// decimal representation that round-trips, never in exponent notation.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value == f64::INFINITY {
        "+Inf".to_owned()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_owned()
    } else {
        value.to_string()
    }
}

/// Stable sort by the value of label `key`; a missing label sorts as "".
pub(crate) fn sort_by_label(vector: &mut Vector, key: &str) {
    vector.sort_by(|a, b| a.labels.value(key).cmp(b.labels.value(key)));
}
