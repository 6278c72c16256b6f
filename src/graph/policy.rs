/// Per-kind attribute filters applied before content hashing
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Which attributes of one node kind participate in its hash.
///
/// Field names match an attribute key exactly or as a dotted prefix, so
/// `metadata.options` covers `metadata.options.withmpi`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    /// When set, only these fields are hashed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl FieldFilter {
    pub fn include<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            include: Some(fields.into_iter().map(Into::into).collect()),
            exclude: Vec::new(),
        }
    }

    pub fn exclude<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            include: None,
            exclude: fields.into_iter().map(Into::into).collect(),
        }
    }

    fn allows(&self, key: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .is_none_or(|fields| fields.iter().any(|f| covers(f, key)));
        included && !self.exclude.iter().any(|f| covers(f, key))
    }
}

fn covers(field: &str, key: &str) -> bool {
    key == field
        || key
            .strip_prefix(field)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Attribute filters keyed by node kind, plus fields dropped for every kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashPolicy {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kinds: BTreeMap<String, FieldFilter>,
}

impl HashPolicy {
    /// Hash every attribute of every kind.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops fields that differ between installations of the same code.
    pub fn recommended() -> Self {
        Self::new()
            .with_global_exclude(["engine_version"])
            .with_kind("code", FieldFilter::exclude(["computer", "hostname"]))
    }

    pub fn with_kind(mut self, kind: impl Into<String>, filter: FieldFilter) -> Self {
        self.kinds.insert(kind.into(), filter);
        self
    }

    pub fn with_global_exclude<S: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.global_exclude
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Attributes of a node of `kind` that participate in its hash.
    pub fn filter(&self, kind: &str, attributes: &Map<String, Value>) -> Map<String, Value> {
        let filter = self.kinds.get(kind);
        attributes
            .iter()
            .filter(|(key, _)| !self.global_exclude.iter().any(|f| covers(f, key)))
            .filter(|(key, _)| filter.is_none_or(|f| f.allows(key)))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_empty_policy_keeps_everything() {
        let a = attrs(json!({"x": 1, "y": 2}));
        assert_eq!(HashPolicy::new().filter("any", &a), a);
    }

    #[test]
    fn test_dotted_prefix_exclusion() {
        let policy = HashPolicy::new().with_kind(
            "diff",
            FieldFilter::exclude(["metadata.options"]),
        );
        let a = attrs(json!({
            "metadata.options.withmpi": false,
            "metadata.optionsx": 1,
            "metadata.label": "x"
        }));

        let filtered = policy.filter("diff", &a);
        assert!(!filtered.contains_key("metadata.options.withmpi"));
        assert!(filtered.contains_key("metadata.optionsx"));
        assert!(filtered.contains_key("metadata.label"));
        // other kinds are untouched
        assert_eq!(policy.filter("other", &a).len(), 3);
    }

    #[test]
    fn test_include_then_exclude() {
        let filter = FieldFilter {
            include: Some(vec!["content".into(), "meta".into()]),
            exclude: vec!["meta.mtime".into()],
        };
        let policy = HashPolicy::new().with_kind("file", filter);
        let a = attrs(json!({"content": "abc", "meta.mtime": 1, "meta.name": "f", "size": 3}));

        let filtered = policy.filter("file", &a);
        let keys: Vec<&str> = filtered.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["content", "meta.name"]);
    }

    #[test]
    fn test_recommended_drops_volatile_fields() {
        let policy = HashPolicy::recommended();
        let code = attrs(json!({"executable": "diff", "computer": "localhost", "engine_version": "2.1"}));
        let filtered = policy.filter("code", &code);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("executable"));
    }

    #[test]
    fn test_toml_shape() {
        let policy: HashPolicy = toml::from_str(
            r#"
global_exclude = ["engine_version"]

[kinds.diff]
exclude = ["metadata.options"]
"#,
        )
        .unwrap();
        assert_eq!(policy.kinds["diff"].exclude, vec!["metadata.options"]);
        assert!(policy.kinds["diff"].include.is_none());
    }
}
