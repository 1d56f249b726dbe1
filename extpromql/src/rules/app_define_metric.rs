use crate::{
    labels::{LabelsBuilder, METRIC_NAME},
    rules::{copy_pod_labels, find_pod_name, QueryFunc, RuleFilter, DERIVED_LABEL, DERIVED_VALUE},
};

/// Derives a user-defined metric from a raw pod metric.
///
/// Samples already carrying the derived marker are dropped so a derived
/// series is never derived again, as are samples without a pod name. The
/// rest get the pod's labels from `kube_pod_labels_ch` and the marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppDefineMetric;

impl RuleFilter for AppDefineMetric {
    fn apply(&self, builder: &mut LabelsBuilder, timestamp: i64, query: &dyn QueryFunc) -> bool {
        if builder.get(DERIVED_LABEL).is_some() {
            return false;
        }
        let Some(pod) = find_pod_name(builder).filter(|p| !p.is_empty()) else {
            tracing::error!(
                metric = builder.get(METRIC_NAME).unwrap_or_default(),
                "raw metric has no pod_name label"
            );
            return false;
        };

        let expr = format!(r#"kube_pod_labels_ch{{pod="{pod}"}}"#);
        match query.query(&expr, timestamp) {
            Ok(vector) => {
                if let Some(pod_labels) = vector.first() {
                    copy_pod_labels(builder, pod_labels, &["pod_template_hash"]);
                }
            }
            Err(e) => tracing::debug!(%expr, error = %e, "pod labels lookup failed"),
        }
        builder.set(DERIVED_LABEL, DERIVED_VALUE);
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        functions::tests::{render, sample},
        rules::{
            tests::{no_query, pod_labels},
            QueryFunc, RuleFilters,
        },
    };

    fn run(labels: &[(&str, &str)], query: &dyn QueryFunc) -> (Vec<String>, bool) {
        let (out, keep) =
            RuleFilters::builtin().apply("app_define_metric", sample(labels, 0, 1.0), 0, query);
        (render(&[out]), keep)
    }

    #[test]
    fn test_define_metric() {
        let pods: &[(&str, &[(&str, &str)])] = &[(
            "web-1",
            &[
                ("label_app", "web"),
                ("label_pod_template_hash", "5d8f"),
                ("label_controller_revision_hash", "r1"),
            ],
        )];
        let query = pod_labels(pods);
        let (out, keep) = run(&[("__name__", "cpu"), ("pod_name", "web-1")], &query);
        assert!(keep);
        assert_eq!(
            out,
            ["{__name__=cpu,app=web,controller_revision_hash=r1,mtype=sys,pod_name=web-1} 1"]
        );
    }

    #[test]
    fn test_drops_derived_and_unnamed() {
        let (_, keep) = run(&[("pod_name", "web-1"), ("mtype", "sys")], &no_query);
        assert!(!keep);
        let (_, keep) = run(&[("__name__", "cpu"), ("node", "n1")], &no_query);
        assert!(!keep);
    }

    #[test]
    fn test_failed_lookup_still_marks() {
        let (out, keep) = run(&[("pod_name", "web-1")], &no_query);
        assert!(keep);
        assert_eq!(out, ["{mtype=sys,pod_name=web-1} 1"]);
    }
}
