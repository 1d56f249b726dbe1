//! Label-oriented extension functions.
//!
//! Every function takes its input vectors by value and returns a new
//! vector. Arguments naming labels are validated before any row is touched;
//! a bad argument fails the whole call.

use std::{collections::BTreeMap, fmt, sync::Arc};

use itertools::Itertools;
use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{Error, Result},
    labels::is_valid_label_name,
    value::{Matrix, Value, ValueType, Vector},
};

mod aggregate_matrix;
mod distinct;
mod join;
mod labels_append;
mod labels_append_tags;
mod labels_append_ternary;
mod labels_append_value;
mod labels_append_values;
mod labels_invert;
mod labels_rename;
mod labels_select;
mod select1;
mod select2;
mod selectn;
mod vector_join;
mod vector_with_labels;

pub use aggregate_matrix::{aggregate_matrix_max, aggregate_matrix_min, aggregate_matrix_sum};
pub use distinct::distinct;
pub use labels_append::labels_append;
pub use labels_append_tags::labels_append_tags;
pub use labels_append_ternary::labels_append_ternary;
pub use labels_append_value::labels_append_value;
pub use labels_append_values::labels_append_values;
pub use labels_invert::labels_invert;
pub use labels_rename::labels_rename;
pub use labels_select::labels_select;
pub use select1::select1;
pub use select2::{select2, select2_join};
pub use selectn::selectn;
pub use vector_join::vector_join;
pub use vector_with_labels::vector_with_labels;

/// Separates the left and right halves of a match key or of a list of
/// target names.
pub(crate) const SPLIT_SYMBOL: char = '|';

/// The built-in extension functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Func {
    LabelsAppendTernary,
    LabelsAppendTags,
    LabelsRename,
    LabelsSelect,
    #[strum(serialize = "select1")]
    Select1,
    #[strum(serialize = "select2")]
    Select2,
    LabelsAppend,
    #[strum(serialize = "select2_join")]
    Select2Join,
    Distinct,
    AggregateMatrixMax,
    AggregateMatrixMin,
    AggregateMatrixSum,
    LabelsAppendValue,
    LabelsAppendValues,
    Selectn,
    LabelsInvert,
    VectorWithLabels,
    VectorJoin,
}

impl Func {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn signature(self) -> Signature {
        use ValueType::{Matrix as M, String as S, Vector as V};
        let (arg_types, variadic): (&[ValueType], bool) = match self {
            Func::LabelsAppendTernary
            | Func::LabelsAppendTags
            | Func::LabelsRename
            | Func::LabelsInvert
            | Func::VectorWithLabels => (&[V, S, S], true),
            Func::LabelsSelect | Func::Select1 => (&[V, S], true),
            Func::Select2 | Func::Select2Join => (&[S, V, V, S], true),
            Func::LabelsAppend => (&[V, V, S, S, S], true),
            Func::Distinct => (&[V, S], false),
            Func::AggregateMatrixMax | Func::AggregateMatrixMin | Func::AggregateMatrixSum => {
                (&[M], false)
            }
            Func::LabelsAppendValue => (&[V, V, S, S], false),
            Func::LabelsAppendValues | Func::Selectn => (&[S, S, V, V], true),
            Func::VectorJoin => (&[V, V], true),
        };
        Signature {
            arg_types: arg_types.to_vec(),
            variadic,
            return_type: ValueType::Vector,
        }
    }

    fn call(self, timestamp: i64, args: Vec<Value>) -> Result<Value> {
        let name = self.name();
        let mut args = Args::new(name, args);
        let vector = match self {
            Func::LabelsAppendTernary => {
                let vector = args.vector()?;
                labels_append_ternary(vector, &args.rest_strings()?.as_refs())?
            }
            Func::LabelsAppendTags => {
                let vector = args.vector()?;
                labels_append_tags(vector, &args.rest_strings()?.as_refs())?
            }
            Func::LabelsRename => {
                let vector = args.vector()?;
                labels_rename(vector, &args.rest_strings()?.as_refs())?
            }
            Func::LabelsSelect => {
                let vector = args.vector()?;
                labels_select(vector, &args.rest_strings()?.as_refs())?
            }
            Func::Select1 => {
                let vector = args.vector()?;
                select1(vector, &args.rest_strings()?.as_refs())?
            }
            Func::Select2 | Func::Select2Join => {
                let match_key = args.string()?;
                let left = args.vector()?;
                let right = args.vector()?;
                let specs = args.rest_strings()?;
                if self == Func::Select2 {
                    select2(&match_key, left, right, &specs.as_refs())?
                } else {
                    select2_join(&match_key, left, right, &specs.as_refs())?
                }
            }
            Func::LabelsAppend => {
                let left = args.vector()?;
                let right = args.vector()?;
                let match_key = args.string()?;
                labels_append(left, right, &match_key, &args.rest_strings()?.as_refs())?
            }
            Func::Distinct => {
                let vector = args.vector()?;
                distinct(vector, &args.string()?)?
            }
            Func::AggregateMatrixMax => aggregate_matrix_max(args.matrix()?),
            Func::AggregateMatrixMin => aggregate_matrix_min(args.matrix()?),
            Func::AggregateMatrixSum => aggregate_matrix_sum(args.matrix()?),
            Func::LabelsAppendValue => {
                let left = args.vector()?;
                let right = args.vector()?;
                let match_key = args.string()?;
                labels_append_value(left, &right, &match_key, &args.string()?)?
            }
            Func::LabelsAppendValues | Func::Selectn => {
                let match_keys = args.string()?;
                let new_keys = args.string()?;
                let vectors = args.rest_vectors()?;
                if self == Func::Selectn {
                    selectn(&match_keys, &new_keys, vectors)?
                } else {
                    labels_append_values(&match_keys, &new_keys, vectors)?
                }
            }
            Func::LabelsInvert => {
                let vector = args.vector()?;
                labels_invert(vector, &args.rest_strings()?.as_refs())?
            }
            Func::VectorWithLabels => {
                let vector = args.vector()?;
                vector_with_labels(timestamp, &vector, &args.rest_strings()?.as_refs())?
            }
            Func::VectorJoin => vector_join(args.rest_vectors()?),
        };
        Ok(Value::Vector(vector))
    }
}

/// Declared argument and return types of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub arg_types: Vec<ValueType>,
    /// When set, the last argument type may repeat any number of times and
    /// may also be omitted.
    pub variadic: bool,
    pub return_type: ValueType,
}

impl Signature {
    /// The declared type of argument `index`, if the function takes that
    /// many arguments.
    pub fn arg_type(&self, index: usize) -> Option<ValueType> {
        match self.arg_types.get(index) {
            Some(ty) => Some(*ty),
            None if self.variadic => self.arg_types.last().copied(),
            None => None,
        }
    }

    fn check_count(&self, func: &str, actual: usize) -> Result<()> {
        let declared = self.arg_types.len();
        let (ok, expected) = if self.variadic {
            let min = declared.saturating_sub(1);
            (actual >= min, format!("at least {min}"))
        } else {
            (actual == declared, declared.to_string())
        };
        if ok {
            Ok(())
        } else {
            Err(Error::ArgumentCount {
                func: func.to_owned(),
                expected,
                actual,
            })
        }
    }
}

type Handler = dyn Fn(i64, Vec<Value>) -> Result<Value> + Send + Sync;

#[derive(Clone)]
struct FunctionDef {
    signature: Signature,
    handler: Arc<Handler>,
}

/// A name-keyed table of callable functions, immutable once built.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: BTreeMap<String, FunctionDef>,
}

impl FunctionTable {
    pub fn builder() -> FunctionTableBuilder {
        FunctionTableBuilder::default()
    }

    /// A table holding every [`Func`].
    pub fn builtin() -> Self {
        Self::builder().with_builtins().build()
    }

    pub fn signature(&self, name: &str) -> Option<&Signature> {
        self.functions.get(name).map(|def| &def.signature)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Checks the number and types of `args` against the declared
    /// signature of `name`.
    pub fn check_args(&self, name: &str, args: &[Value]) -> Result<()> {
        let signature = self
            .signature(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_owned()))?;
        signature.check_count(name, args.len())?;
        for (index, arg) in args.iter().enumerate() {
            match signature.arg_type(index) {
                Some(expected) if arg.is_a(expected) => {}
                expected => {
                    return Err(Error::ArgumentType {
                        func: name.to_owned(),
                        index,
                        expected: expected.map_or_else(|| "no".to_owned(), |t| t.to_string()),
                        actual: arg.get_type().to_owned(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Calls function `name`.
    ///
    /// Argument types are the caller's responsibility (see
    /// [`FunctionTable::check_args`]); argument values are validated by the
    /// function itself.
    pub fn call(&self, name: &str, args: Vec<Value>, timestamp: i64) -> Result<Value> {
        let def = self
            .functions
            .get(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_owned()))?;
        (def.handler)(timestamp, args)
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

#[derive(Default)]
pub struct FunctionTableBuilder {
    functions: BTreeMap<String, FunctionDef>,
}

impl FunctionTableBuilder {
    pub fn with_builtins(self) -> Self {
        Func::iter().fold(self, Self::with_builtin)
    }

    pub fn with_builtin(self, func: Func) -> Self {
        self.register(func.name(), func.signature(), move |timestamp, args| {
            func.call(timestamp, args)
        })
    }

    /// Registers `handler` under `name`, replacing any previous entry.
    pub fn register<F>(mut self, name: &str, signature: Signature, handler: F) -> Self
    where
        F: Fn(i64, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(
            name.to_owned(),
            FunctionDef {
                signature,
                handler: Arc::new(handler),
            },
        );
        self
    }

    pub fn build(self) -> FunctionTable {
        FunctionTable {
            functions: self.functions,
        }
    }
}

/// Positional access to call arguments with type checks.
struct Args {
    func: &'static str,
    args: std::vec::IntoIter<Value>,
    index: usize,
}

impl Args {
    fn new(func: &'static str, args: Vec<Value>) -> Self {
        Self {
            func,
            args: args.into_iter(),
            index: 0,
        }
    }

    fn next(&mut self, expected: ValueType) -> Result<Value> {
        let index = self.index;
        self.index += 1;
        let arg = self.args.next().ok_or_else(|| Error::ArgumentCount {
            func: self.func.to_owned(),
            expected: format!("at least {}", index + 1),
            actual: index,
        })?;
        if arg.is_a(expected) {
            Ok(arg)
        } else {
            Err(Error::ArgumentType {
                func: self.func.to_owned(),
                index,
                expected: expected.to_string(),
                actual: arg.get_type().to_owned(),
            })
        }
    }

    fn vector(&mut self) -> Result<Vector> {
        match self.next(ValueType::Vector)? {
            Value::Vector(v) => Ok(v),
            _ => Ok(Vector::new()),
        }
    }

    fn matrix(&mut self) -> Result<Matrix> {
        match self.next(ValueType::Matrix)? {
            Value::Matrix(m) => Ok(m),
            _ => Ok(Matrix::new()),
        }
    }

    fn string(&mut self) -> Result<String> {
        match self.next(ValueType::String)? {
            Value::String(s) => Ok(s),
            _ => unreachable!("BUG: type checked above"),
        }
    }

    fn rest_strings(mut self) -> Result<Vec<String>> {
        let mut strings = Vec::new();
        while self.args.len() > 0 {
            strings.push(self.string()?);
        }
        Ok(strings)
    }

    fn rest_vectors(mut self) -> Result<Vec<Vector>> {
        let mut vectors = Vec::new();
        while self.args.len() > 0 {
            vectors.push(self.vector()?);
        }
        Ok(vectors)
    }
}

trait AsRefs {
    fn as_refs(&self) -> Vec<&str>;
}

impl AsRefs for Vec<String> {
    fn as_refs(&self) -> Vec<&str> {
        self.iter().map(String::as_str).collect()
    }
}

pub(crate) fn check_label_name(func: &'static str, name: &str) -> Result<()> {
    if is_valid_label_name(name) {
        Ok(())
    } else {
        Err(Error::InvalidLabelName {
            func,
            name: name.to_owned(),
        })
    }
}

/// Splits `s` at the first `sep` into two trimmed halves. A missing or
/// empty second half repeats the first: `"a"` and `"a:"` both give
/// `("a", "a")`.
pub(crate) fn split_pair(s: &str, sep: char) -> (&str, &str) {
    let mut parts = s.split(sep);
    let first = parts.next().unwrap_or_default().trim();
    match parts.next().map(str::trim) {
        Some(second) if !second.is_empty() => (first, second),
        _ => (first, first),
    }
}

/// Parses `source:target` copy specs, validating both names.
pub(crate) fn copy_specs<'a>(func: &'static str, specs: &[&'a str]) -> Result<Vec<(&'a str, &'a str)>> {
    specs
        .iter()
        .map(|spec| {
            let (source, target) = split_pair(spec, ':');
            check_label_name(func, source)?;
            check_label_name(func, target)?;
            Ok((source, target))
        })
        .collect()
}

/// Groups a flat `k1, v1, k2, v2, ...` argument list into pairs.
pub(crate) fn pairs<'a>(func: &'static str, args: &[&'a str]) -> Result<Vec<(&'a str, &'a str)>> {
    if args.len() % 2 != 0 {
        return Err(Error::invalid_params(
            func,
            format!("expected key/value pairs, got {} arguments", args.len()),
        ));
    }
    Ok(args.iter().copied().tuples().collect())
}
