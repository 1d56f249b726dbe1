mod engine;
pub mod error;
pub mod functions;
pub mod labels;
pub mod rules;
mod ternary;
pub mod value;

pub use {
    engine::{BlockingQuery, QueryEngine},
    error::{Error, Result},
    functions::{Func, FunctionTable},
    labels::{Labels, LabelsBuilder},
    rules::{QueryFunc, RecordRule, RecordingRule, RuleFilter, RuleFilters},
};
