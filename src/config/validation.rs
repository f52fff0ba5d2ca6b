//! Unknown-key detection with Levenshtein suggestions.
//!
//! The raw TOML is walked as a `toml::Value` before serde sees it, and every
//! key not in `known_config_keys()` produces a warning. Warnings never fail
//! the load.

use std::collections::BTreeSet;

/// A non-fatal config warning.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

/// Every valid dotted key path of `AppConfig`. Keys inside `[[tenants]]`
/// entries appear under `tenants.*`.
pub fn known_config_keys() -> BTreeSet<&'static str> {
    [
        "server",
        "server.addr",
        "server.gzip",
        "store",
        "store.path",
        "store.collection",
        "cache",
        "cache.enabled",
        "cache.capacity_bytes",
        "cache.shards",
        "rollup",
        "rollup.policy",
        "tenants",
        "tenants.name",
        "tenants.database",
        "tenants.api_keys",
    ]
    .into_iter()
    .collect()
}

/// Collect dotted key paths. Arrays of tables share their parent's prefix.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    for item in items.iter().filter(|i| i.is_table()) {
                        keys.extend(walk_toml_keys(item, &path));
                    }
                }
                _ => {}
            }
        }
    }
    keys
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3; ties go to the first key in
/// sorted order.
pub fn suggest_correction(unknown: &str, known: &BTreeSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (levenshtein(unknown, k), *k))
        .filter(|(dist, _)| *dist <= 3)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, k)| k.to_string())
}

pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // reported by serde
    };

    let known = known_config_keys();
    let mut seen = BTreeSet::new();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()) && seen.insert(key.clone()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}
