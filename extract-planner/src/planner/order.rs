//! Order resolution over the closed declaration set
//!
//! Kahn's algorithm with a deterministic tie-break: among the entities whose
//! lookup targets have all been emitted, the one declared earliest goes next.
//! When nothing is ready the remaining entities form at least one cycle; the
//! earliest-declared one is emitted anyway and its unresolved lookups end up
//! deferred.
//!
//! Edges are classified after the order is fixed, using the latest-positioned
//! target of each edge as its anchor.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::declarations::EntityDeclaration;
use super::dependencies::DependencyEdge;
use super::error::{ConfigurationError, CycleBroken, PlanError, PlanWarning};

/// What to do when the remaining entities form a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakCyclesMode {
    /// Break silently and record the event
    #[default]
    Auto,
    /// Ask the confirmation hook before each break
    Ask,
}

impl FromStr for BreakCyclesMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BreakCyclesMode::Auto),
            "ask" => Ok(BreakCyclesMode::Ask),
            _ => Err(ConfigurationError::InvalidBreakCyclesMode {
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for BreakCyclesMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakCyclesMode::Auto => write!(f, "auto"),
            BreakCyclesMode::Ask => write!(f, "ask"),
        }
    }
}

/// Hook consulted before a cycle is broken in [`BreakCyclesMode::Ask`]
///
/// Returning `false` does not stop the run: the entity is emitted anyway and
/// a [`PlanWarning::CycleBreakDeclined`] is recorded.
pub trait CycleConfirmation: Send {
    fn confirm(&mut self, event: &CycleBroken) -> bool;
}

impl<F> CycleConfirmation for F
where
    F: FnMut(&CycleBroken) -> bool + Send,
{
    fn confirm(&mut self, event: &CycleBroken) -> bool {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeClassification {
    /// Every target is loaded before the source
    Ordinary,
    /// At least one target may not exist yet when the source is loaded
    Deferred,
}

/// A dependency edge after ordering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEdge {
    pub field_name: String,
    /// Targets present in the order, in the edge's original target order
    pub resolved_targets: Vec<String>,
    pub is_required: bool,
    pub classification: EdgeClassification,
    /// Latest-positioned resolved target
    pub anchor_entity: String,
}

impl ResolvedEdge {
    pub fn is_deferred(&self) -> bool {
        self.classification == EdgeClassification::Deferred
    }

    /// Entity whose load must finish before this lookup can be patched in
    pub fn insert_after(&self) -> Option<&str> {
        self.is_deferred().then_some(self.anchor_entity.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderResolution {
    pub order: Vec<String>,
    /// Resolved edges per source entity; every ordered entity has an entry
    pub edges_by_entity: BTreeMap<String, Vec<ResolvedEdge>>,
    pub cycles_broken: Vec<CycleBroken>,
    pub warnings: Vec<PlanWarning>,
}

/// Resolve the load order and classify every edge
///
/// `catalog_entities` is the full catalog entity list; targets found there but
/// not in `declarations` are ignored, anything else is a catalog inconsistency.
pub fn resolve_order(
    declarations: &[EntityDeclaration],
    edges: &[DependencyEdge],
    catalog_entities: &HashSet<String>,
    mode: BreakCyclesMode,
    mut confirm: Option<&mut dyn CycleConfirmation>,
) -> Result<OrderResolution, PlanError> {
    let index: HashMap<&str, usize> = declarations
        .iter()
        .enumerate()
        .map(|(i, d)| (d.sf_object.as_str(), i))
        .collect();

    validate_targets(edges, &index, catalog_entities)?;

    let node_count = declarations.len();
    let mut dependencies: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); node_count];
    for edge in edges {
        let Some(&from) = index.get(edge.from_entity.as_str()) else {
            continue;
        };
        for target in &edge.to_entities {
            if let Some(&to) = index.get(target.as_str()) {
                // Self-references never block the entity itself
                if to != from {
                    dependencies[from].insert(to);
                }
            }
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for (from, deps) in dependencies.iter().enumerate() {
        for &to in deps {
            dependents[to].push(from);
        }
    }

    let mut pending: Vec<usize> = dependencies.iter().map(|d| d.len()).collect();
    let mut ready: BTreeSet<usize> = (0..node_count).filter(|&i| pending[i] == 0).collect();
    let mut emitted = vec![false; node_count];
    let mut resolution = OrderResolution::default();

    while resolution.order.len() < node_count {
        let next = match ready.pop_first() {
            Some(idx) => idx,
            None => {
                // Nothing is ready, so every remaining node waits on a cycle;
                // break at the earliest node that is itself on one
                let Some(idx) = (0..node_count)
                    .find(|&i| !emitted[i] && on_cycle(i, &dependencies, &emitted))
                else {
                    break;
                };
                let event = describe_cycle(idx, declarations, edges, &index, &emitted);
                confirm_break(mode, &mut confirm, &event, &mut resolution.warnings);
                log::warn!("{}", event);
                resolution.cycles_broken.push(event);
                idx
            }
        };

        emitted[next] = true;
        resolution.order.push(declarations[next].sf_object.clone());
        for &dependent in &dependents[next] {
            if emitted[dependent] {
                continue;
            }
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    classify_edges(edges, &mut resolution);

    log::info!(
        "Resolved order of {} entities ({} cycles broken)",
        resolution.order.len(),
        resolution.cycles_broken.len()
    );
    Ok(resolution)
}

fn validate_targets(
    edges: &[DependencyEdge],
    index: &HashMap<&str, usize>,
    catalog_entities: &HashSet<String>,
) -> Result<(), PlanError> {
    for edge in edges {
        for target in &edge.to_entities {
            if !index.contains_key(target.as_str()) && !catalog_entities.contains(target) {
                return Err(PlanError::CatalogInconsistency {
                    entity: edge.from_entity.clone(),
                    field: edge.field_name.clone(),
                    missing_target: target.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Whether `start` can reach itself through dependencies not yet emitted
fn on_cycle(start: usize, dependencies: &[BTreeSet<usize>], emitted: &[bool]) -> bool {
    let mut seen = vec![false; dependencies.len()];
    let mut stack: Vec<usize> = dependencies[start].iter().copied().collect();

    while let Some(node) = stack.pop() {
        if node == start {
            return true;
        }
        if emitted[node] || seen[node] {
            continue;
        }
        seen[node] = true;
        stack.extend(dependencies[node].iter().copied());
    }
    false
}

/// Build the event for emitting `idx` while its dependencies are unresolved
fn describe_cycle(
    idx: usize,
    declarations: &[EntityDeclaration],
    edges: &[DependencyEdge],
    index: &HashMap<&str, usize>,
    emitted: &[bool],
) -> CycleBroken {
    let entity = &declarations[idx].sf_object;
    let remaining = (0..declarations.len())
        .filter(|&i| !emitted[i])
        .map(|i| declarations[i].sf_object.clone())
        .collect();

    let mut fields: Vec<String> = Vec::new();
    for edge in edges.iter().filter(|e| &e.from_entity == entity) {
        let blocked = edge.to_entities.iter().any(|t| {
            index
                .get(t.as_str())
                .is_some_and(|&to| to != idx && !emitted[to])
        });
        if blocked && !fields.contains(&edge.field_name) {
            fields.push(edge.field_name.clone());
        }
    }

    CycleBroken {
        entity: entity.clone(),
        remaining,
        fields,
    }
}

fn confirm_break(
    mode: BreakCyclesMode,
    confirm: &mut Option<&mut dyn CycleConfirmation>,
    event: &CycleBroken,
    warnings: &mut Vec<PlanWarning>,
) {
    if mode != BreakCyclesMode::Ask {
        return;
    }

    match confirm {
        Some(hook) => {
            if !hook.confirm(event) {
                let warning = PlanWarning::CycleBreakDeclined {
                    entity: event.entity.clone(),
                };
                log::warn!("{}", warning);
                warnings.push(warning);
            }
        }
        None => {
            if !warnings.contains(&PlanWarning::NoConfirmationHook) {
                log::warn!("{}", PlanWarning::NoConfirmationHook);
                warnings.push(PlanWarning::NoConfirmationHook);
            }
        }
    }
}

/// Apply the max-position rule to every edge
fn classify_edges(edges: &[DependencyEdge], resolution: &mut OrderResolution) {
    let position: HashMap<&str, usize> = resolution
        .order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut by_entity: BTreeMap<String, Vec<ResolvedEdge>> = resolution
        .order
        .iter()
        .map(|name| (name.clone(), Vec::new()))
        .collect();

    for edge in edges {
        let Some(&source) = position.get(edge.from_entity.as_str()) else {
            continue;
        };

        let resolved: Vec<(usize, &String)> = edge
            .to_entities
            .iter()
            .filter_map(|t| position.get(t.as_str()).map(|&p| (p, t)))
            .collect();
        let Some(&(anchor_position, anchor)) = resolved.iter().max_by_key(|(p, _)| *p) else {
            log::debug!(
                "Dropping {}.{}: no target in the plan",
                edge.from_entity,
                edge.field_name
            );
            continue;
        };

        let classification = if anchor_position >= source {
            EdgeClassification::Deferred
        } else {
            EdgeClassification::Ordinary
        };

        by_entity
            .entry(edge.from_entity.clone())
            .or_default()
            .push(ResolvedEdge {
                field_name: edge.field_name.clone(),
                resolved_targets: resolved.iter().map(|(_, t)| (*t).clone()).collect(),
                is_required: edge.is_required,
                classification,
                anchor_entity: anchor.clone(),
            });
    }

    resolution.edges_by_entity = by_entity;
}
