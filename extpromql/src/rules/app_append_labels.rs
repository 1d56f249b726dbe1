use crate::{
    labels::LabelsBuilder,
    rules::{copy_pod_labels, find_pod_name, hash_value, QueryFunc, RuleFilter},
};

/// Enriches a sample with the Kubernetes labels of its pod, as exported by
/// `kube_pod_labels`, and derives an `appid` when the sample has none.
///
/// Samples are always kept; a missing pod or a failed lookup only skips the
/// enrichment.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppAppendLabels;

impl RuleFilter for AppAppendLabels {
    fn apply(&self, builder: &mut LabelsBuilder, timestamp: i64, query: &dyn QueryFunc) -> bool {
        let Some(pod) = find_pod_name(builder).filter(|p| !p.is_empty()) else {
            return true;
        };
        let expr = format!(r#"kube_pod_labels{{pod="{pod}"}}"#);
        let vector = match query.query(&expr, timestamp) {
            Ok(vector) => vector,
            Err(e) => {
                tracing::debug!(%expr, error = %e, "pod labels lookup failed");
                return true;
            }
        };
        let Some(pod_labels) = vector.first() else {
            return true;
        };

        copy_pod_labels(
            builder,
            pod_labels,
            &["pod_template_hash", "controller_revision_hash"],
        );

        if builder.get("appid").unwrap_or_default().is_empty() {
            let template_hash = pod_labels.labels.value("label_pod_template_hash");
            let revision_hash = pod_labels.labels.value("label_controller_revision_hash");
            if !template_hash.is_empty() {
                let cluster = builder.get("clusterId").unwrap_or_default();
                let appid = hash_value(&format!("{template_hash}{cluster}"));
                builder.set("appid", &appid);
            } else if !revision_hash.is_empty() {
                builder.set("appid", &hash_value(revision_hash));
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        functions::tests::{render, sample},
        rules::{
            hash_value,
            tests::{no_query, pod_labels},
            RuleFilters,
        },
    };

    fn run(labels: &[(&str, &str)], query: &dyn crate::rules::QueryFunc) -> Vec<String> {
        let (out, keep) =
            RuleFilters::builtin().apply("app_append_labels", sample(labels, 0, 1.0), 0, query);
        assert!(keep);
        render(&[out])
    }

    #[test]
    fn test_append_labels() {
        let pods: &[(&str, &[(&str, &str)])] = &[(
            "web-1",
            &[
                ("label_app", "web"),
                ("label_k8s_team", "frontend"),
                ("label_pod_template_hash", "5d8f"),
                ("label_controller_revision_hash", "r1"),
                ("namespace", "prod"),
            ],
        )];
        let query = pod_labels(pods);
        let out = run(&[("container_pod_name", "web-1"), ("clusterId", "c1")], &query);
        let appid = hash_value("5d8fc1");
        assert_eq!(
            out,
            [format!(
                "{{app=web,appid={appid},clusterId=c1,container_pod_name=web-1,team=frontend}} 1"
            )]
        );
    }

    #[test]
    fn test_appid_from_revision_hash() {
        let pods: &[(&str, &[(&str, &str)])] =
            &[("db-0", &[("label_controller_revision_hash", "db-7c9")])];
        let query = pod_labels(pods);
        let out = run(&[("pod_name", "db-0")], &query);
        assert_eq!(
            out,
            [format!("{{appid={},pod_name=db-0}} 1", hash_value("db-7c9"))]
        );

        // an existing appid is kept
        let out = run(&[("pod_name", "db-0"), ("appid", "mine")], &query);
        assert_eq!(out, ["{appid=mine,pod_name=db-0} 1"]);
    }

    #[test]
    fn test_no_enrichment() {
        // no pod label
        assert_eq!(run(&[("node", "n1")], &no_query), ["{node=n1} 1"]);
        // failed sub-query
        assert_eq!(run(&[("pod_name", "a")], &no_query), ["{pod_name=a} 1"]);
        // empty result
        let query = pod_labels(&[]);
        assert_eq!(run(&[("pod_name", "a")], &query), ["{pod_name=a} 1"]);
    }
}
