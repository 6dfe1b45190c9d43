use crate::error::{PlotError, PlotResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const GROUP_PREFIX: &str = "group:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Source,
    Metric,
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::Source => write!(f, "source"),
            GroupKind::Metric => write!(f, "metric"),
        }
    }
}

/// Named source and metric groups, referenced as `group:<name>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupLibrary {
    #[serde(default)]
    pub source_groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub metric_groups: BTreeMap<String, Vec<String>>,
}

impl GroupLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source_group(&mut self, name: impl Into<String>, members: Vec<String>) {
        self.source_groups.insert(name.into(), members);
    }

    pub fn add_metric_group(&mut self, name: impl Into<String>, members: Vec<String>) {
        self.metric_groups.insert(name.into(), members);
    }

    pub fn group_name(value: &str) -> Option<&str> {
        value.strip_prefix(GROUP_PREFIX)
    }

    pub fn is_group(value: &str) -> bool {
        value.starts_with(GROUP_PREFIX)
    }

    /// Returns the members of `value` when it names a group, or `value` itself.
    pub fn expand(&self, kind: GroupKind, value: &str) -> PlotResult<Vec<String>> {
        let name = match Self::group_name(value) {
            Some(name) => name,
            None => return Ok(vec![value.to_string()]),
        };

        let groups = match kind {
            GroupKind::Source => &self.source_groups,
            GroupKind::Metric => &self.metric_groups,
        };

        groups
            .get(name)
            .cloned()
            .ok_or_else(|| PlotError::UnresolvedMetric(format!("unknown {} group `{}'", kind, name)))
    }

    /// Cartesian expansion of a (source, metric) pair, sources first.
    pub fn resolve(&self, source: &str, metric: &str) -> PlotResult<Vec<(String, String)>> {
        let sources = self.expand(GroupKind::Source, source)?;
        let metrics = self.expand(GroupKind::Metric, metric)?;

        Ok(sources
            .iter()
            .flat_map(|source| {
                metrics
                    .iter()
                    .map(move |metric| (source.clone(), metric.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> GroupLibrary {
        let mut library = GroupLibrary::new();
        library.add_source_group("web", vec!["web1".to_string(), "web2".to_string()]);
        library.add_metric_group("cpu", vec!["cpu.user".to_string(), "cpu.system".to_string()]);
        library
    }

    #[test]
    fn test_plain_values_pass_through() {
        let library = library();
        assert_eq!(library.expand(GroupKind::Source, "db1").unwrap(), vec!["db1"]);
        assert_eq!(
            library.resolve("db1", "load").unwrap(),
            vec![("db1".to_string(), "load".to_string())]
        );
    }

    #[test]
    fn test_groups_expand_in_declaration_order() {
        let library = library();
        let pairs = library.resolve("group:web", "group:cpu").unwrap();
        let names: Vec<String> = pairs.iter().map(|(s, m)| format!("{}/{}", s, m)).collect();
        assert_eq!(
            names,
            vec!["web1/cpu.user", "web1/cpu.system", "web2/cpu.user", "web2/cpu.system"]
        );
    }

    #[test]
    fn test_unknown_group_is_unresolved() {
        let library = library();
        assert!(matches!(
            library.expand(GroupKind::Metric, "group:disk"),
            Err(PlotError::UnresolvedMetric(_))
        ));
        // Source groups and metric groups live in separate namespaces
        assert!(library.expand(GroupKind::Metric, "group:web").is_err());
    }

    #[test]
    fn test_library_from_json() {
        let library: GroupLibrary =
            serde_json::from_str(r#"{"source_groups": {"all": ["a", "b"]}}"#).unwrap();
        assert!(library.metric_groups.is_empty());
        assert_eq!(library.expand(GroupKind::Source, "group:all").unwrap().len(), 2);
        assert!(GroupLibrary::is_group("group:all"));
    }
}
