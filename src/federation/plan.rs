use super::graph::{Graph, OperGroup, SeriesRef};
use super::{Diagnostic, DiagnosticKind, PlotWindow};
use crate::catalog::{CatalogMetric, CatalogSnapshot, GroupLibrary};
use crate::connector::{same_connector, Connector};
use crate::error::{PlotError, PlotResult};
use crate::plot::OperatorType;
use crate::query::{Query, QueryMetric};
use std::sync::Arc;
use tracing::{debug, warn};

/// One query per connector, covering every group it serves.
pub(crate) struct Batch {
    pub connector: Arc<dyn Connector>,
    pub query: Query,
}

pub(crate) struct MemberPlan {
    /// Dispatch name the connector echoes back.
    pub key: String,
    pub name: String,
    pub scale: f64,
}

pub(crate) struct GroupPlan {
    pub name: String,
    pub operator: OperatorType,
    pub scale: f64,
    pub members: Vec<MemberPlan>,
    pub batch: Option<usize>,
    pub diagnostics: Vec<Diagnostic>,
}

pub(crate) struct StackPlan {
    pub name: String,
    pub groups: Vec<GroupPlan>,
}

pub(crate) struct Plan {
    pub batches: Vec<Batch>,
    pub stacks: Vec<StackPlan>,
}

struct ResolvedMember {
    name: String,
    scale: f64,
    metric: CatalogMetric,
}

impl Plan {
    pub fn build(
        graph: &Graph,
        snapshot: &CatalogSnapshot,
        library: &GroupLibrary,
        window: &PlotWindow,
    ) -> Plan {
        let mut plan = Plan {
            batches: Vec::new(),
            stacks: Vec::with_capacity(graph.stacks.len()),
        };
        let mut next_key = 0usize;

        for stack in &graph.stacks {
            let mut groups = Vec::with_capacity(stack.groups.len());

            for group in &stack.groups {
                let mut group_plan = GroupPlan {
                    name: group.name.clone(),
                    operator: group.operator,
                    scale: group.scale,
                    members: Vec::new(),
                    batch: None,
                    diagnostics: Vec::new(),
                };

                let resolved = resolve_group(group, snapshot, library, &mut group_plan.diagnostics);

                if let Some(first) = resolved.first() {
                    let connector = first.metric.connector.clone();

                    if let Some(other) = resolved
                        .iter()
                        .find(|member| !same_connector(&member.metric.connector, &connector))
                    {
                        let error = PlotError::BackendConflict {
                            group: group.name.clone(),
                            message: format!(
                                "series served by both `{}' and `{}'",
                                connector.name(),
                                other.metric.connector.name()
                            ),
                        };
                        warn!("{}", error);
                        group_plan
                            .diagnostics
                            .push(Diagnostic::from_error(group.name.clone(), &error));
                    } else {
                        let index = plan.batch_for(&connector, window);
                        for member in resolved {
                            let key = format!("s{}", next_key);
                            next_key += 1;

                            plan.batches[index].query.add_series(
                                key.clone(),
                                QueryMetric::new(
                                    member.metric.origin,
                                    member.metric.source,
                                    member.metric.name,
                                ),
                            );
                            group_plan.members.push(MemberPlan {
                                key,
                                name: member.name,
                                scale: member.scale,
                            });
                        }
                        group_plan.batch = Some(index);
                    }
                }

                groups.push(group_plan);
            }

            plan.stacks.push(StackPlan {
                name: stack.name.clone(),
                groups,
            });
        }

        plan
    }

    fn batch_for(&mut self, connector: &Arc<dyn Connector>, window: &PlotWindow) -> usize {
        if let Some(index) = self
            .batches
            .iter()
            .position(|batch| same_connector(&batch.connector, connector))
        {
            return index;
        }

        self.batches.push(Batch {
            connector: connector.clone(),
            query: Query::new(window.start, window.end, window.sample),
        });
        self.batches.len() - 1
    }
}

fn resolve_group(
    group: &OperGroup,
    snapshot: &CatalogSnapshot,
    library: &GroupLibrary,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ResolvedMember> {
    let mut resolved = Vec::new();

    for reference in &group.series {
        match resolve_reference(reference, snapshot, library) {
            Ok(metrics) => {
                let several = metrics.len() > 1;
                for (index, metric) in metrics.into_iter().enumerate() {
                    let name = if several {
                        format!("{}-{}", reference.name, index)
                    } else {
                        reference.name.clone()
                    };
                    resolved.push(ResolvedMember {
                        name,
                        scale: reference.scale,
                        metric,
                    });
                }
            }
            Err(e) => {
                warn!(
                    "Skipping series {} of group {}: {}",
                    reference.name, group.name, e
                );
                diagnostics.push(Diagnostic::from_error(reference.name.clone(), &e));
            }
        }
    }

    resolved
}

/// Direct references must exist; group references keep the combinations the
/// catalog knows and fail only when none is left.
fn resolve_reference(
    reference: &SeriesRef,
    snapshot: &CatalogSnapshot,
    library: &GroupLibrary,
) -> PlotResult<Vec<CatalogMetric>> {
    let pairs = library.resolve(&reference.source, &reference.metric)?;
    let expanded = GroupLibrary::is_group(&reference.source) || GroupLibrary::is_group(&reference.metric);

    let mut metrics = Vec::with_capacity(pairs.len());
    for (source, metric) in pairs {
        match snapshot.get_metric(&reference.origin, &source, &metric) {
            Ok(found) => metrics.push(found),
            Err(e) if !expanded => return Err(e),
            Err(e) => debug!("Group member of {} not found: {}", reference.name, e),
        }
    }

    if metrics.is_empty() {
        return Err(PlotError::UnresolvedMetric(format!(
            "`{}' matched no metric in origin `{}'",
            reference.name, reference.origin
        )));
    }

    Ok(metrics)
}

impl Diagnostic {
    pub(crate) fn from_error(subject: impl Into<String>, error: &PlotError) -> Self {
        let kind = match error {
            PlotError::BackendConflict { .. } => DiagnosticKind::BackendConflict,
            PlotError::UnresolvedMetric(_) => DiagnosticKind::UnresolvedMetric,
            _ => DiagnosticKind::ConnectorFailure,
        };

        Diagnostic {
            kind,
            subject: subject.into(),
            message: error.to_string(),
        }
    }
}
