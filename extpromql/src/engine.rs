use std::{sync::Arc, time::Duration};

use datafusion::{
    arrow::{
        array::{Array, Float64Array, Int64Array, StringArray},
        record_batch::RecordBatch,
    },
    error::DataFusionError,
    prelude::{col, lit, SessionContext},
};
use indexmap::IndexMap;
use promql_parser::{
    label::MatchOp,
    parser::{self, Expr as PromExpr, MatrixSelector, NumberLiteral, ParenExpr, StringLiteral, VectorSelector},
};
use regex::Regex;
use tokio::runtime::Handle;

use crate::{
    error::{Error, Result},
    functions::FunctionTable,
    labels::{Labels, Signature, METRIC_NAME},
    rules::{QueryFunc, RecordingRule, RuleFilters},
    value::{InstantValue, Matrix, RangeValue, Sample, Value, ValueType, Vector, FIELD_TIME, FIELD_VALUE},
};

// See https://docs.rs/indexmap/latest/indexmap/#alternate-hashers
type FxIndexMap<K, V> = IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

/// Evaluates selectors over DataFusion tables and hosts the extension
/// functions.
///
/// Every metric lives in a table named after it, with one `Utf8` column per
/// label, `_timestamp` (microseconds) and `value`.
#[derive(Clone)]
pub struct QueryEngine {
    ctx: Arc<SessionContext>,
    functions: FunctionTable,
    /// Default look back from sample search.
    lookback_delta: i64,
}

impl QueryEngine {
    pub fn new(ctx: Arc<SessionContext>, functions: FunctionTable) -> Self {
        Self {
            ctx,
            functions,
            lookback_delta: 300 * 1_000_000,
        }
    }

    /// Lookbacks beyond the representable range reach back to the earliest
    /// sample.
    pub fn with_lookback_delta(mut self, lookback_delta: Duration) -> Self {
        self.lookback_delta = micros(lookback_delta).unwrap_or(i64::MAX);
        self
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Evaluates `expr` at `timestamp` (microseconds).
    ///
    /// Only selectors and literals are understood; function calls go
    /// through [`QueryEngine::call`].
    pub async fn query(&self, expr: &str, timestamp: i64) -> Result<Value> {
        let parsed = parser::parse(expr).map_err(|reason| Error::Parse {
            expr: expr.to_owned(),
            reason,
        })?;
        let mut node = &parsed;
        while let PromExpr::Paren(ParenExpr { expr }) = node {
            node = &**expr;
        }
        Ok(match node {
            PromExpr::VectorSelector(selector) => {
                let data = self.eval_vector_selector(selector, timestamp).await?;
                if data.is_empty() {
                    Value::None
                } else {
                    Value::Vector(data)
                }
            }
            PromExpr::MatrixSelector(MatrixSelector {
                vector_selector,
                range,
            }) => {
                let data = self
                    .eval_matrix_selector(vector_selector, *range, timestamp)
                    .await?;
                if data.is_empty() {
                    Value::None
                } else {
                    Value::Matrix(data)
                }
            }
            PromExpr::NumberLiteral(NumberLiteral { val }) => Value::Float(*val),
            PromExpr::StringLiteral(StringLiteral { val }) => Value::String(val.clone()),
            _ => return Err(Error::Unsupported(expr.to_owned())),
        })
    }

    /// Like [`QueryEngine::query`], but insists on an instant vector.
    pub async fn instant_query(&self, expr: &str, timestamp: i64) -> Result<Vector> {
        match self.query(expr, timestamp).await? {
            Value::Vector(vector) => Ok(vector),
            Value::None => Ok(Vector::new()),
            other => Err(Error::Unsupported(format!(
                "{expr} evaluates to a {}, not a vector",
                other.get_type()
            ))),
        }
    }

    /// Calls function `name` at `timestamp`.
    ///
    /// Each argument is interpreted by the type the function declares for
    /// its position: selectors for vectors and matrices, numbers for
    /// scalars, optionally quoted text for strings.
    pub async fn call(&self, name: &str, args: &[&str], timestamp: i64) -> Result<Value> {
        let signature = self
            .functions
            .signature(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_owned()))?
            .clone();

        let mut values = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let value = match signature.arg_type(index) {
                Some(ValueType::Vector | ValueType::Matrix) => self.query(arg, timestamp).await?,
                Some(ValueType::Scalar) => {
                    Value::Float(arg.trim().parse().map_err(|_| Error::Parse {
                        expr: (*arg).to_owned(),
                        reason: "not a number".to_owned(),
                    })?)
                }
                Some(ValueType::String) => Value::String(unquote(arg).to_owned()),
                None => {
                    return Err(Error::ArgumentCount {
                        func: name.to_owned(),
                        expected: signature.arg_types.len().to_string(),
                        actual: args.len(),
                    })
                }
            };
            values.push(value);
        }

        self.functions.check_args(name, &values)?;
        tracing::debug!(func = name, timestamp, "calling extension function");
        self.functions.call(name, values, timestamp)
    }

    /// Computes the series recorded by `rule` at `timestamp`. Filters issue
    /// their sub-queries against this engine.
    ///
    /// Must run on a multi-threaded Tokio runtime.
    pub async fn eval_rule(
        &self,
        rule: &RecordingRule,
        filters: &RuleFilters,
        timestamp: i64,
    ) -> Result<Vector> {
        let vector = self.instant_query(rule.expr(), timestamp).await?;
        Ok(rule.eval(vector, timestamp, filters, &self.blocking()))
    }

    /// A synchronous view of [`QueryEngine::instant_query`] for rule
    /// filters.
    pub fn blocking(&self) -> BlockingQuery<'_> {
        BlockingQuery { engine: self }
    }

    async fn eval_vector_selector(
        &self,
        selector: &VectorSelector,
        timestamp: i64,
    ) -> Result<Vector> {
        let start = timestamp.saturating_sub(self.lookback_delta);
        let series = self.selector_load_from_df(selector, start, timestamp).await?;
        Ok(series
            .into_iter()
            .filter_map(|series| {
                let sample = *series.samples.last()?;
                Some(InstantValue::new(series.labels, sample))
            })
            .collect())
    }

    /// MatrixSelector is a special case of VectorSelector that returns a matrix of samples.
    async fn eval_matrix_selector(
        &self,
        selector: &VectorSelector,
        range: Duration,
        timestamp: i64,
    ) -> Result<Matrix> {
        let start = micros(range)
            .and_then(|range| timestamp.checked_sub(range))
            .ok_or_else(|| Error::Unsupported(format!("range {range:?} is too large")))?;
        let mut series = self.selector_load_from_df(selector, start, timestamp).await?;
        for s in &mut series {
            s.time_range = Some((start, timestamp));
        }
        Ok(series)
    }

    /// Loads the series matching `selector` with their samples in
    /// `(start, end]`, sorted by time. Series without samples are omitted.
    #[tracing::instrument(skip_all)]
    async fn selector_load_from_df(
        &self,
        selector: &VectorSelector,
        start: i64,
        end: i64,
    ) -> Result<Vec<RangeValue>> {
        let table_name = metric_name(selector)?;
        let matchers = selector
            .matchers
            .matchers
            .iter()
            .map(|m| LabelMatcher::new(&m.name, &m.op, &m.value))
            .collect::<Result<Vec<_>>>()?;

        let table = match self.ctx.table(table_name).await {
            Ok(table) => table,
            Err(DataFusionError::Plan(e)) => {
                tracing::debug!(table = table_name, error = %e, "no such metric");
                return Ok(vec![]);
            }
            Err(e) => return Err(e.into()),
        };
        let mut df = table.filter(
            col(FIELD_TIME)
                .gt(lit(start))
                .and(col(FIELD_TIME).lt_eq(lit(end))),
        )?;
        for matcher in &matchers {
            if let LabelMatcher::Equal(name, value) = matcher {
                if !value.is_empty() && df.schema().field_with_unqualified_name(name).is_ok() {
                    df = df.filter(col(name.as_str()).eq(lit(value.as_str())))?;
                }
            }
        }

        let batches = df.collect().await?;
        let mut metrics = FxIndexMap::<Signature, RangeValue>::default();
        for batch in &batches {
            collect_batch(batch, &mut metrics)?;
        }
        tracing::debug!(table = table_name, series = metrics.len(), "loaded metrics");

        Ok(metrics
            .into_values()
            .filter(|series| matchers.iter().all(|m| m.matches(&series.labels)))
            .map(|mut series| {
                series.samples.sort_by_key(|s| s.timestamp);
                series
            })
            .collect())
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("functions", &self.functions)
            .field("lookback_delta", &self.lookback_delta)
            .finish_non_exhaustive()
    }
}

/// Blocks the calling thread on an instant query. See
/// [`QueryEngine::blocking`].
#[derive(Debug, Clone, Copy)]
pub struct BlockingQuery<'a> {
    engine: &'a QueryEngine,
}

impl QueryFunc for BlockingQuery<'_> {
    fn query(&self, expr: &str, timestamp: i64) -> Result<Vector> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Unsupported(format!("sub-query {expr} outside a runtime: {e}")))?;
        tokio::task::block_in_place(|| handle.block_on(self.engine.instant_query(expr, timestamp)))
    }
}

enum LabelMatcher {
    Equal(String, String),
    NotEqual(String, String),
    Re(String, Regex),
    NotRe(String, Regex),
}

impl LabelMatcher {
    fn new(name: &str, op: &MatchOp, value: &str) -> Result<Self> {
        let name = name.to_owned();
        let regex = || {
            Regex::new(&format!("^(?:{value})$")).map_err(|e| Error::Parse {
                expr: value.to_owned(),
                reason: e.to_string(),
            })
        };
        Ok(match op {
            MatchOp::Equal => Self::Equal(name, value.to_owned()),
            MatchOp::NotEqual => Self::NotEqual(name, value.to_owned()),
            MatchOp::Re(_) => Self::Re(name, regex()?),
            MatchOp::NotRe(_) => Self::NotRe(name, regex()?),
        })
    }

    /// A missing label matches as the empty string.
    fn matches(&self, labels: &Labels) -> bool {
        match self {
            Self::Equal(name, value) => labels.value(name) == value,
            Self::NotEqual(name, value) => labels.value(name) != value,
            Self::Re(name, re) => re.is_match(labels.value(name)),
            Self::NotRe(name, re) => !re.is_match(labels.value(name)),
        }
    }
}

fn metric_name(selector: &VectorSelector) -> Result<&str> {
    if let Some(name) = &selector.name {
        return Ok(name);
    }
    selector
        .matchers
        .matchers
        .iter()
        .find(|m| m.name == METRIC_NAME && matches!(m.op, MatchOp::Equal))
        .map(|m| m.value.as_str())
        .ok_or_else(|| Error::Unsupported("selector without a metric name".to_owned()))
}

/// Groups the rows of `batch` into series keyed by their label set. Null and
/// empty label columns are not labels.
fn collect_batch(batch: &RecordBatch, metrics: &mut FxIndexMap<Signature, RangeValue>) -> Result<()> {
    let times = column::<Int64Array>(batch, FIELD_TIME)?;
    let values = column::<Float64Array>(batch, FIELD_VALUE)?;
    let schema = batch.schema();
    let label_columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .filter(|(field, _)| field.name() != FIELD_TIME && field.name() != FIELD_VALUE)
        .filter_map(|(field, array)| {
            let array = array.as_any().downcast_ref::<StringArray>()?;
            Some((field.name().as_str(), array))
        })
        .collect::<Vec<_>>();

    for i in 0..batch.num_rows() {
        let labels = Labels::new(
            label_columns
                .iter()
                .filter(|(_, array)| array.is_valid(i) && !array.value(i).is_empty())
                .map(|(name, array)| (*name, array.value(i))),
        );
        let sample = Sample::new(times.value(i), values.value(i));
        let sig = labels.signature();
        metrics
            .entry(sig)
            .or_insert_with(|| RangeValue {
                labels,
                samples: Vec::new(),
                time_range: None,
            })
            .samples
            .push(sample);
    }
    Ok(())
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|array| array.as_any().downcast_ref::<T>())
        .ok_or_else(|| {
            DataFusionError::Internal(format!("missing or mistyped column {name}")).into()
        })
}

/// Strips one pair of matching single or double quotes.
fn unquote(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

fn micros(t: Duration) -> Option<i64> {
    t.as_micros().try_into().ok()
}
