use crate::plot::OperatorType;
use serde::{Deserialize, Serialize};

/// Reference to a metric, or to a group of them through `group:` names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesRef {
    pub name: String,
    pub origin: String,
    pub source: String,
    pub metric: String,
    /// Zero means unset.
    #[serde(default)]
    pub scale: f64,
}

impl SeriesRef {
    pub fn new(
        name: impl Into<String>,
        origin: impl Into<String>,
        source: impl Into<String>,
        metric: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            source: source.into(),
            metric: metric.into(),
            scale: 0.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperGroup {
    pub name: String,
    #[serde(rename = "type", default)]
    pub operator: OperatorType,
    #[serde(default)]
    pub scale: f64,
    #[serde(default)]
    pub series: Vec<SeriesRef>,
}

impl OperGroup {
    pub fn new(name: impl Into<String>, operator: OperatorType) -> Self {
        Self {
            name: name.into(),
            operator,
            ..Default::default()
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_series(mut self, series: SeriesRef) -> Self {
        self.series.push(series);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<OperGroup>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: OperGroup) -> Self {
        self.groups.push(group);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stacks: Vec<Stack>,
}

impl Graph {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stacks: Vec::new(),
        }
    }

    pub fn with_stack(mut self, stack: Stack) -> Self {
        self.stacks.push(stack);
        self
    }

    pub fn series_count(&self) -> usize {
        self.stacks
            .iter()
            .flat_map(|stack| &stack.groups)
            .map(|group| group.series.len())
            .sum()
    }
}
