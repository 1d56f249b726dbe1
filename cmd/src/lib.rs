use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use arrow_array::{ArrayRef, Float64Array};
use color_eyre::eyre::{eyre, Result, WrapErr};
use datafusion::{
    arrow::{
        array::{Int64Array, StringArray},
        datatypes::{DataType, Field, Schema},
        record_batch::RecordBatch,
    },
    datasource::MemTable,
    prelude::SessionContext,
};
use extpromql::{
    labels::METRIC_NAME,
    value::{FIELD_TIME, FIELD_VALUE},
    RecordRule,
};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Prometheus HTTP API response
///
/// See https://prometheus.io/docs/prometheus/latest/querying/api/
#[derive(Debug, Serialize, Deserialize)]
struct Response {
    pub status: String,
    pub data: ResponseData,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseData {
    result_type: String,
    result: Vec<TimeSeries>,
}

/// See https://docs.victoriametrics.com/keyConcepts.html#time-series
#[derive(Debug, Serialize, Deserialize)]
struct TimeSeries {
    metric: BTreeMap<String, String>,
    values: Vec<Sample>,
}

/// See https://docs.victoriametrics.com/keyConcepts.html#raw-samples
#[derive(Debug, Serialize, Deserialize)]
struct Sample {
    timestamp: f64,
    value: String,
}

/// Creates a local session context with one in-memory table per metric
/// found in the `*.json` files of `samples_dir`.
pub fn create_context(samples_dir: impl AsRef<Path>) -> Result<SessionContext> {
    let ctx = SessionContext::new();
    let samples_dir = samples_dir.as_ref();
    let paths = fs::read_dir(samples_dir).wrap_err_with(|| format!("{}", samples_dir.display()))?;

    let mut metrics = BTreeMap::<String, Vec<TimeSeries>>::new();
    for dentry in paths {
        let path = dentry?.path();
        if path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        for series in read_series(&path)? {
            let Some(name) = series.metric.get(METRIC_NAME).cloned() else {
                tracing::warn!(path = %path.display(), "skipping series without a metric name");
                continue;
            };
            metrics.entry(name).or_default().push(series);
        }
    }

    for (name, series) in &metrics {
        let schema = Arc::new(create_schema_from_record(series));
        let batch = create_record_batch(schema.clone(), series)?;
        let provider = MemTable::try_new(schema, vec![vec![batch]])?;
        ctx.register_table(name.as_str(), Arc::new(provider))?;
        tracing::debug!(table = %name, series = series.len(), "registered metric table");
    }
    Ok(ctx)
}

/// Obtains start and end timestamps (Unix seconds) from the
/// `timestamp.log` file of `samples_dir`, falling back to the current time.
pub fn load_timestamps(samples_dir: impl AsRef<Path>) -> Result<(i64, i64)> {
    let path = samples_dir.as_ref().join("timestamp.log");
    let end = match fs::read_to_string(&path) {
        Ok(s) => s.trim().parse().wrap_err_with(|| {
            format!("failed to read Unix time (epoch) from {}", path.display())
        })?,
        Err(error) => {
            tracing::error!(?error, path = %path.display(), "failed to read file");
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .wrap_err("system clock is before the Unix epoch")?;
            i64::try_from(now.as_secs())?
        }
    };
    Ok((end - 1800, end))
}

/// Converts Unix seconds to the microseconds the engine works in.
pub fn to_micros(seconds: i64) -> Result<i64> {
    seconds
        .checked_mul(1_000_000)
        .ok_or_else(|| eyre!("time {seconds} is out of range"))
}

/// Loads a JSON array of recording rules, rejecting invalid ones.
pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<RecordRule>> {
    let path = path.as_ref();
    let data = fs::read(path).wrap_err_with(|| format!("{}", path.display()))?;
    let rules: Vec<RecordRule> = serde_json::from_slice(&data)
        .map_err(|e| eyre!("Failed to parse JSON file {}: {e}", path.display()))?;
    for rule in &rules {
        rule.validate()
            .wrap_err_with(|| format!("{}: rule {:?}", path.display(), rule.record))?;
    }
    Ok(rules)
}

fn read_series(path: &Path) -> Result<Vec<TimeSeries>> {
    let data = fs::read(path).wrap_err_with(|| format!("{}", path.display()))?;
    let resp: Response = serde_json::from_slice(&data)
        .map_err(|e| eyre!("Failed to parse JSON file {}: {e}", path.display()))?;
    if resp.status != "success" {
        return Err(eyre!("{}: response status is {:?}", path.display(), resp.status));
    }
    Ok(resp.data.result)
}

fn create_schema_from_record(data: &[TimeSeries]) -> Schema {
    let mut seen = FxHashSet::default();
    let mut fields = Vec::new();
    for row in data {
        for k in row.metric.keys() {
            if seen.insert(k.as_str()) {
                fields.push(Field::new(k, DataType::Utf8, true));
            }
        }
    }
    fields.push(Field::new(FIELD_TIME, DataType::Int64, false));
    fields.push(Field::new(FIELD_VALUE, DataType::Float64, false));
    Schema::new(fields)
}

fn create_record_batch(schema: Arc<Schema>, data: &[TimeSeries]) -> Result<RecordBatch> {
    let label_names = schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .filter(|name| *name != FIELD_TIME && *name != FIELD_VALUE)
        .collect::<Vec<_>>();

    let mut label_values = vec![Vec::<Option<&str>>::new(); label_names.len()];
    let mut time_field_values = Vec::new();
    let mut value_field_values = Vec::new();

    for time_series in data {
        for sample in &time_series.values {
            for (name, values) in label_names.iter().zip(&mut label_values) {
                values.push(time_series.metric.get(*name).map(String::as_str));
            }
            time_field_values.push((sample.timestamp * 1_000_000.0) as i64);
            value_field_values.push(
                sample
                    .value
                    .parse::<f64>()
                    .wrap_err_with(|| format!("invalid sample value {:?}", sample.value))?,
            );
        }
    }

    let mut columns: Vec<ArrayRef> = label_values
        .into_iter()
        .map(|values| Arc::new(StringArray::from(values)) as ArrayRef)
        .collect();
    columns.push(Arc::new(Int64Array::from(time_field_values)));
    columns.push(Arc::new(Float64Array::from(value_field_values)));

    Ok(RecordBatch::try_new(schema, columns)?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use extpromql::{value::Value, FunctionTable, QueryEngine, RecordingRule, RuleFilters};

    use super::*;

    const SAMPLES_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../samples");

    fn engine() -> QueryEngine {
        let ctx = create_context(SAMPLES_DIR).unwrap();
        QueryEngine::new(Arc::new(ctx), FunctionTable::builtin())
    }

    #[test]
    fn test_load_timestamps() {
        let (start, end) = load_timestamps(SAMPLES_DIR).unwrap();
        assert_eq!(end, 1681713200);
        assert_eq!(start, end - 1800);
    }

    #[test]
    fn test_to_micros() {
        assert_eq!(to_micros(1681713200).unwrap(), 1_681_713_200_000_000);
        assert_eq!(to_micros(-1).unwrap(), -1_000_000);
        assert!(to_micros(i64::MAX / 1000).is_err());
    }

    #[test]
    fn test_load_rules() {
        let rules = load_rules(format!("{SAMPLES_DIR}/rules/app.json")).unwrap();
        assert!(!rules.is_empty());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"record": "bad name", "expr": "up"}}]"#).unwrap();
        assert!(load_rules(file.path()).is_err());
    }

    #[tokio::test]
    async fn test_sample_tables() {
        let engine = engine();
        let (_, end) = load_timestamps(SAMPLES_DIR).unwrap();
        let ts = end * 1_000_000;

        let vector = engine
            .instant_query(r#"container_cpu_usage_seconds{namespace="shop"}"#, ts)
            .await
            .unwrap();
        assert_eq!(vector.len(), 3);
        // a label missing from one series is not materialized for it
        let cart = vector
            .iter()
            .find(|v| v.labels.value("pod_name") == "cart-0")
            .unwrap();
        assert!(!cart.labels.contains("container"));

        let value = engine
            .call(
                "select2",
                &[
                    "pod_name|pod",
                    "container_cpu_usage_seconds",
                    "kube_pod_labels",
                    "label_app:app",
                ],
                ts,
            )
            .await
            .unwrap();
        let Value::Vector(joined) = value else {
            panic!("expected a vector");
        };
        assert!(!joined.is_empty());
        assert!(joined.iter().all(|v| !v.labels.value("app").is_empty()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sample_rules() {
        let engine = engine();
        let (_, end) = load_timestamps(SAMPLES_DIR).unwrap();
        let filters = RuleFilters::builtin();
        for rule in load_rules(format!("{SAMPLES_DIR}/rules/app.json")).unwrap() {
            let rule = RecordingRule::new(rule).unwrap();
            let out = engine
                .eval_rule(&rule, &filters, end * 1_000_000)
                .await
                .unwrap();
            assert!(out.iter().all(|v| v.labels.value("__name__") == rule.name()));
        }
    }
}
