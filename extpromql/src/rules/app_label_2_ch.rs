use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    labels::LabelsBuilder,
    rules::{QueryFunc, RuleFilter},
};

const SUFFIX: &str = "_b64";

/// Decodes labels shipped as `<name>_b64` into plain `<name>` labels.
///
/// Values use a label-safe base64 alphabet: an optional `b64` prefix, one
/// trailing `0` of padding, and `-`, `_`, `.` standing in for `+`, `/`, `=`.
/// Values that fail to decode are left as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppLabel2Ch;

impl RuleFilter for AppLabel2Ch {
    fn apply(&self, builder: &mut LabelsBuilder, _: i64, _: &dyn QueryFunc) -> bool {
        let encoded = builder
            .labels()
            .iter()
            .filter(|l| l.name.len() > SUFFIX.len() && l.name.ends_with(SUFFIX))
            .map(|l| (l.name.clone(), l.value.clone()))
            .collect::<Vec<_>>();
        for (name, value) in encoded {
            match decode(&value) {
                Some(decoded) => {
                    builder.del(&name);
                    builder.set(&name[..name.len() - SUFFIX.len()], &decoded);
                }
                None => tracing::debug!(label = %name, value = %value, "undecodable label value"),
            }
        }
        true
    }
}

fn decode(value: &str) -> Option<String> {
    let value = value.strip_prefix("b64").unwrap_or(value);
    let value = value.strip_suffix('0').unwrap_or(value);
    let value = value
        .chars()
        .map(|c| match c {
            '-' | ' ' => '+',
            '_' => '/',
            '.' => '=',
            c => c,
        })
        .collect::<String>();
    let bytes = STANDARD.decode(value).ok()?;
    String::from_utf8(bytes).ok()
}
