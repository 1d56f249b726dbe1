//! Post-evaluation hooks for recording rules.
//!
//! A recording rule computes a vector, then passes each of its samples
//! through the rule's filters. A filter may rewrite the labels of the sample
//! and decides whether it is kept. Filters can issue sub-queries against the
//! engine that evaluated the rule to fetch correlated metadata.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    labels::{LabelsBuilder, METRIC_NAME},
    value::{InstantValue, Vector},
};

mod app_append_labels;
mod app_define_metric;
mod app_label_2_ch;

pub use app_append_labels::AppAppendLabels;
pub use app_define_metric::AppDefineMetric;
pub use app_label_2_ch::AppLabel2Ch;

/// Marks series produced by a derivation rule.
pub const DERIVED_LABEL: &str = "mtype";
pub const DERIVED_VALUE: &str = "sys";

static RE_RECORD_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("BUG: invalid record name regex")
});

/// Evaluates `expr` at `timestamp` on behalf of a filter.
pub trait QueryFunc {
    fn query(&self, expr: &str, timestamp: i64) -> Result<Vector>;
}

impl<F> QueryFunc for F
where
    F: Fn(&str, i64) -> Result<Vector>,
{
    fn query(&self, expr: &str, timestamp: i64) -> Result<Vector> {
        self(expr, timestamp)
    }
}

pub trait RuleFilter: Send + Sync {
    /// Rewrites `builder` in place; returns whether the sample is kept.
    fn apply(&self, builder: &mut LabelsBuilder, timestamp: i64, query: &dyn QueryFunc) -> bool;
}

/// A name-keyed table of rule filters, immutable once built.
#[derive(Clone, Default)]
pub struct RuleFilters {
    filters: BTreeMap<String, Arc<dyn RuleFilter>>,
}

impl RuleFilters {
    pub fn builder() -> RuleFiltersBuilder {
        RuleFiltersBuilder::default()
    }

    /// `app_label_2_ch`, `app_append_labels` and `app_define_metric`.
    pub fn builtin() -> Self {
        Self::builder()
            .register("app_label_2_ch", AppLabel2Ch)
            .register("app_append_labels", AppAppendLabels)
            .register("app_define_metric", AppDefineMetric)
            .build()
    }

    pub fn get(&self, name: &str) -> Option<&dyn RuleFilter> {
        self.filters.get(name).map(|filter| &**filter)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    /// Runs filter `name` on `sample`. An unknown name keeps the sample
    /// unchanged.
    pub fn apply(
        &self,
        name: &str,
        sample: InstantValue,
        timestamp: i64,
        query: &dyn QueryFunc,
    ) -> (InstantValue, bool) {
        let Some(filter) = self.get(name) else {
            tracing::debug!(filter = name, "unknown rule filter");
            return (sample, true);
        };
        let InstantValue { labels, sample } = sample;
        let mut builder = LabelsBuilder::new(labels);
        let keep = filter.apply(&mut builder, timestamp, query);
        (InstantValue::new(builder.into_labels(), sample), keep)
    }
}

impl fmt::Debug for RuleFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.filters.keys()).finish()
    }
}

#[derive(Default)]
pub struct RuleFiltersBuilder {
    filters: BTreeMap<String, Arc<dyn RuleFilter>>,
}

impl RuleFiltersBuilder {
    /// Registers `filter` under `name`, replacing any previous entry.
    pub fn register<F: RuleFilter + 'static>(mut self, name: &str, filter: F) -> Self {
        self.filters.insert(name.to_owned(), Arc::new(filter));
        self
    }

    pub fn build(self) -> RuleFilters {
        RuleFilters {
            filters: self.filters,
        }
    }
}

/// A recording rule as stored: the series `record` is computed from `expr`,
/// passed through `filters` and stamped with `labels`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRule {
    pub record: String,
    pub expr: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl RecordRule {
    pub fn validate(&self) -> Result<()> {
        if self.record.is_empty() {
            return Err(Error::InvalidRule("empty record name".to_owned()));
        }
        if !RE_RECORD_NAME.is_match(&self.record) {
            return Err(Error::InvalidRule(format!(
                "invalid record name {:?}",
                self.record
            )));
        }
        if self.expr.trim().is_empty() {
            return Err(Error::InvalidRule(format!(
                "empty expression for {}",
                self.record
            )));
        }
        Ok(())
    }
}

/// A validated [`RecordRule`] ready for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingRule {
    rule: RecordRule,
}

impl RecordingRule {
    pub fn new(rule: RecordRule) -> Result<Self> {
        rule.validate()?;
        Ok(Self { rule })
    }

    pub fn name(&self) -> &str {
        &self.rule.record
    }

    pub fn expr(&self) -> &str {
        &self.rule.expr
    }

    /// Turns the vector computed from the rule's expression into the
    /// recorded series.
    ///
    /// Filters run in declaration order on the sample's own labels; the first
    /// one that rejects the sample drops it. Survivors are renamed to the
    /// record and stamped with the rule labels, where an empty value removes
    /// the label.
    pub fn eval(
        &self,
        vector: Vector,
        timestamp: i64,
        filters: &RuleFilters,
        query: &dyn QueryFunc,
    ) -> Vector {
        let mut out = Vector::with_capacity(vector.len());
        'samples: for mut sample in vector {
            for name in &self.rule.filters {
                let (filtered, keep) = filters.apply(name, sample, timestamp, query);
                if !keep {
                    tracing::debug!(
                        rule = self.name(),
                        filter = name.as_str(),
                        "sample dropped by filter"
                    );
                    continue 'samples;
                }
                sample = filtered;
            }
            let mut builder = LabelsBuilder::new(sample.labels);
            builder.set(METRIC_NAME, &self.rule.record);
            for (name, value) in &self.rule.labels {
                builder.set(name, value);
            }
            sample.labels = builder.into_labels();
            out.push(sample);
        }
        out
    }
}

/// A named set of rules evaluated together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<RecordRule>,
}

/// Rule groups with tags shared by all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedGroups {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl NamedGroups {
    /// Stamps every rule with the derived marker, so the series it records
    /// are not derived again by `app_define_metric`.
    pub fn mark_derived(&mut self) {
        for rule in self.groups.iter_mut().flat_map(|g| g.rules.iter_mut()) {
            rule.labels
                .insert(DERIVED_LABEL.to_owned(), DERIVED_VALUE.to_owned());
        }
    }
}

/// Distributes `rules` over at most `shards` groups by a hash of the record
/// name. Groups are named `meta_metrics_<shard>` and returned in shard
/// order; empty shards are omitted.
pub fn shard_rules(rules: Vec<RecordRule>, shards: u32) -> Result<Vec<Group>> {
    if shards == 0 {
        return Err(Error::invalid_params("shard_rules", "shard count must be positive"));
    }
    let mut groups = BTreeMap::<u32, Vec<RecordRule>>::new();
    for rule in rules {
        let shard = crc32fast::hash(rule.record.as_bytes()) % shards;
        groups.entry(shard).or_default().push(rule);
    }
    Ok(groups
        .into_iter()
        .map(|(shard, rules)| Group {
            name: format!("meta_metrics_{shard}"),
            rules,
        })
        .collect())
}

/// A short stable identifier derived from `s`.
pub(crate) fn hash_value(s: &str) -> String {
    format!("r{}", crc32fast::hash(s.as_bytes()))
}

/// The value of the first label whose name ends with `pod_name`.
pub(crate) fn find_pod_name(builder: &LabelsBuilder) -> Option<String> {
    builder
        .labels()
        .iter()
        .find(|l| l.name.ends_with("pod_name"))
        .map(|l| l.value.clone())
}

/// Copies every `label_<name>` of `source` onto `builder` as `<name>`, with a
/// leading `k8s_` removed. Names in `exclude` are skipped.
pub(crate) fn copy_pod_labels(builder: &mut LabelsBuilder, source: &InstantValue, exclude: &[&str]) {
    for label in source.labels.iter() {
        let Some(name) = label.name.strip_prefix("label_") else {
            continue;
        };
        if exclude.contains(&name) {
            continue;
        }
        let name = name.strip_prefix("k8s_").unwrap_or(name);
        builder.set(name, &label.value);
    }
}
