use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Label holding the metric name.
pub const METRIC_NAME: &str = "__name__";

/// Label is a key/value pair of strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// `Labels` is a sorted set of `Label`s.
///
/// Each `Labels` owns its backing vector; the `Arc`ed labels inside are
/// immutable and replaced wholesale on [`Labels::set`]. Rewriting the labels
/// of one sample therefore never shows through another sample that was
/// cloned from the same set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(Vec<Arc<Label>>);

impl Labels {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut labels = labels
            .into_iter()
            .map(|(k, v)| {
                Arc::new(Label {
                    name: k.as_ref().to_owned(),
                    value: v.as_ref().to_owned(),
                })
            })
            .collect::<Vec<_>>();
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        assert!(
            !labels.windows(2).any(|w| w[0].name == w[1].name),
            "label names are not unique"
        );
        Self(labels)
    }

    /// Returns the value of the label with given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .ok()
            .map(|index| self.0[index].value.as_str())
    }

    /// Like [`Labels::get`], but a missing label reads as the empty string.
    pub fn value(&self, name: &str) -> &str {
        self.get(name).unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_ok()
    }

    /// Sets the label `name` to `value`, replacing the previous value if the
    /// label exists. The set stays sorted.
    pub fn set(&mut self, name: &str, value: &str) {
        let label = Arc::new(Label {
            name: name.to_owned(),
            value: value.to_owned(),
        });
        match self.position(name) {
            Ok(index) => self.0[index] = label,
            Err(index) => self.0.insert(index, label),
        }
    }

    /// Removes the label with given name, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.position(name).ok()?;
        let label = self.0.remove(index);
        Some(label.value.clone())
    }

    /// Retains only the labels specified by the predicate.
    pub fn retain<P>(&mut self, mut predicate: P)
    where
        P: FnMut(&Label) -> bool,
    {
        self.0.retain(|label| predicate(label.as_ref()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter().map(AsRef::as_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A hash of every name/value pair, identifying the series.
    pub fn signature(&self) -> Signature {
        let mut hasher = blake3::Hasher::new();
        for label in &self.0 {
            hasher.update(label.name.as_bytes());
            hasher.update(&[0xff]);
            hasher.update(label.value.as_bytes());
            hasher.update(&[0xff]);
        }
        Signature(hasher.finalize().into())
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.0
            .binary_search_by_key(&name, |label| label.name.as_str())
    }
}

impl Serialize for Labels {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for label in &self.0 {
            map.serialize_entry(&label.name, &label.value)?;
        }
        map.end()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; 32]);

/// Incrementally rewrites a label set. Setting a label to the empty string
/// deletes it, as an empty label value is indistinguishable from a missing
/// label.
#[derive(Debug, Clone, Default)]
pub struct LabelsBuilder {
    labels: Labels,
}

impl LabelsBuilder {
    pub fn new(base: Labels) -> Self {
        Self { labels: base }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels.get(name)
    }

    pub fn set(&mut self, name: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.labels.remove(name);
        } else {
            self.labels.set(name, value);
        }
        self
    }

    pub fn del(&mut self, name: &str) -> &mut Self {
        self.labels.remove(name);
        self
    }

    /// The labels as built so far.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn into_labels(self) -> Labels {
        self.labels
    }
}

/// Checks `name` against `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn test_labels() {
        let labels = Labels::new([("b", "1"), ("a", "2"), ("c", "2")]);
        expect![[r#"
            Labels(
                [
                    Label {
                        name: "a",
                        value: "2",
                    },
                    Label {
                        name: "b",
                        value: "1",
                    },
                    Label {
                        name: "c",
                        value: "2",
                    },
                ],
            )
        "#]]
        .assert_debug_eq(&labels);

        expect![[r#"
            Labels(
                [],
            )
        "#]]
        .assert_debug_eq(&Labels::default());
    }

    #[test]
    #[should_panic]
    fn test_labels_not_unique() {
        Labels::new([("b", "1"), ("a", "2"), ("a", "3"), ("a", "2")]);
    }

    #[test]
    fn test_labels_get_retain() {
        let mut labels = Labels::new([("a", "1"), ("b", "2")]);
        assert_eq!(labels.get("b"), Some("2"));
        assert!(labels.get("x").is_none());
        assert_eq!(labels.value("x"), "");
        assert!(labels.contains("a"));

        labels.retain(|label| label.name != "b");
        assert!(labels.get("b").is_none());
    }

    #[test]
    fn test_labels_set_remove_stay_sorted() {
        let mut labels = Labels::new([("b", "2"), ("d", "4")]);
        labels.set("c", "3");
        labels.set("a", "1");
        labels.set("d", "40");
        let names = labels.iter().map(|l| l.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["a", "b", "c", "d"]);
        assert_eq!(labels.get("d"), Some("40"));

        assert_eq!(labels.remove("b").as_deref(), Some("2"));
        assert_eq!(labels.remove("b"), None);
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_labels_clone_does_not_alias() {
        let original = Labels::new([("pod", "a"), ("ns", "x")]);
        let mut derived = original.clone();
        derived.set("pod", "b");
        derived.set("app", "web");
        assert_eq!(original, Labels::new([("pod", "a"), ("ns", "x")]));
        assert_eq!(derived.value("pod"), "b");
    }

    #[test]
    fn test_labels_signature() {
        let labels = Labels::new([("b", "2"), ("a", "1")]);
        assert_eq!(labels.signature(), Labels::new([("a", "1"), ("b", "2")]).signature());
        assert_ne!(labels.signature(), Labels::new([("a", "1")]).signature());
        // pairs are delimited, so shifting text between name and value matters
        assert_ne!(
            Labels::new([("ab", "c")]).signature(),
            Labels::new([("a", "bc")]).signature()
        );
    }

    #[test]
    fn test_labels_serialize() {
        let labels = Labels::new([("b", "1"), ("a", "2"), ("c", "2")]);
        expect![[r#"
            {
              "a": "2",
              "b": "1",
              "c": "2"
            }"#]]
        .assert_eq(&serde_json::to_string_pretty(&labels).unwrap());
    }

    #[test]
    fn test_builder_empty_value_deletes() {
        let mut builder = LabelsBuilder::new(Labels::new([("a", "1"), ("b", "2")]));
        builder.set("c", "3").set("a", "").del("b");
        assert_eq!(builder.into_labels(), Labels::new([("c", "3")]));
    }

    #[test]
    fn test_is_valid_label_name() {
        for name in ["a", "_", "pod_name", "__v__0", "A9_b"] {
            assert!(is_valid_label_name(name), "{name}");
        }
        for name in ["", "0a", "pod-name", "a.b", "a:b", "ä"] {
            assert!(!is_valid_label_name(name), "{name}");
        }
    }
}
