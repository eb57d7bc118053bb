//! Transitive closure over lookup targets
//!
//! Starting from the normalised declarations, every entity referenced by a
//! collected dependency edge is declared too (if it can be queried), until no
//! new entity appears. Each entity is claimed before anything is fetched for
//! it, so it is synthesised and processed at most once.

use std::collections::{HashSet, VecDeque};

use futures::stream::{self, StreamExt};

use super::declarations::{DefaultDeclarations, EntityDeclaration, ExtractDeclaration};
use super::dependencies::{CollectedDependencies, DependencyEdge, FieldPolicy, collect_dependencies};
use super::error::{PlanError, PlanWarning};
use super::normalize::expand_fields;
use crate::catalog::{CatalogError, SchemaCatalog, filters};

/// Settings for closure building
pub struct ClosureOptions<'a> {
    pub defaults: &'a DefaultDeclarations,
    pub policy: &'a dyn FieldPolicy,
    /// Entities whose optional lookups are not followed
    pub required_fields_only: &'a HashSet<String>,
    pub exclude_setup_objects: bool,
    /// Upper bound on concurrent dependency collections within one wave
    pub max_concurrent_lookups: usize,
}

impl ClosureOptions<'_> {
    fn only_required_fields(&self, entity: &str) -> bool {
        self.required_fields_only.contains(entity) || filters::is_not_extractable(entity)
    }

    fn admits(&self, entity: &str) -> bool {
        if !self.policy.allows_entity(entity) {
            return false;
        }
        !(self.exclude_setup_objects && filters::is_opt_in_only(entity))
    }
}

/// Closed declaration set with every edge collected along the way
#[derive(Debug, Clone, Default)]
pub struct Closure {
    /// Declarations in creation order: the initial ones first, then synthesised ones
    pub declarations: Vec<EntityDeclaration>,
    pub edges: Vec<DependencyEdge>,
    pub warnings: Vec<PlanWarning>,
}

/// Extend the declarations until every required or requested lookup target is declared
pub async fn extend_declarations(
    initial: Vec<EntityDeclaration>,
    catalog: &dyn SchemaCatalog,
    options: &ClosureOptions<'_>,
) -> Result<Closure, PlanError> {
    let mut declared: HashSet<String> = initial.iter().map(|d| d.sf_object.clone()).collect();
    let mut closure = Closure {
        declarations: initial,
        ..Default::default()
    };
    let mut queue: VecDeque<usize> = (0..closure.declarations.len()).collect();
    let concurrency = options.max_concurrent_lookups.max(1);
    let mut wave_number = 0usize;

    while !queue.is_empty() {
        wave_number += 1;
        let wave: Vec<usize> = queue.drain(..).collect();
        log::debug!("Closure wave {}: {} entities", wave_number, wave.len());

        // Fetch concurrently; `buffered` yields results in input order
        let results: Vec<Result<CollectedDependencies, PlanError>> = {
            let declarations = &closure.declarations;
            stream::iter(wave.iter().map(move |&idx| {
                let decl = &declarations[idx];
                collect_dependencies(
                    decl,
                    catalog,
                    options.policy,
                    options.only_required_fields(&decl.sf_object),
                )
            }))
            .buffered(concurrency)
            .collect()
            .await
        };

        for result in results {
            let collected = result?;
            closure.warnings.extend(collected.warnings);

            for edge in &collected.edges {
                for target in &edge.to_entities {
                    if declared.contains(target) {
                        continue;
                    }

                    let queryable = catalog.is_queryable(target).await.map_err(|e| match e {
                        CatalogError::UnknownEntity { .. } => PlanError::CatalogInconsistency {
                            entity: edge.from_entity.clone(),
                            field: edge.field_name.clone(),
                            missing_target: target.clone(),
                        },
                        other => PlanError::Catalog(other),
                    })?;
                    if !queryable || !options.admits(target) {
                        log::debug!(
                            "Not following {}.{} to {}",
                            edge.from_entity,
                            edge.field_name,
                            target
                        );
                        continue;
                    }

                    declared.insert(target.clone());
                    let decl = synthesize_declaration(target, catalog, options).await?;
                    log::info!(
                        "Including {} (referenced by {}.{})",
                        target,
                        edge.from_entity,
                        edge.field_name
                    );
                    queue.push_back(closure.declarations.len());
                    closure.declarations.push(decl);
                }
            }

            closure.edges.extend(collected.edges);
        }
    }

    Ok(closure)
}

/// Build a declaration for an entity that was only reached through a lookup
async fn synthesize_declaration(
    entity: &str,
    catalog: &dyn SchemaCatalog,
    options: &ClosureOptions<'_>,
) -> Result<EntityDeclaration, PlanError> {
    let fields = catalog.list_fields(entity).await?;
    let template = options
        .defaults
        .merge(&ExtractDeclaration::new(entity, Vec::<String>::new()));

    // Default field lists cover many org shapes; fields this org lacks are not worth a warning
    let mut skipped = Vec::new();
    let decl = expand_fields(&template, &fields, options.policy, &mut skipped)?;
    if !skipped.is_empty() {
        log::debug!("{}: {} default fields not in catalog", entity, skipped.len());
    }
    Ok(decl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::{CatalogBuilder, lookup, required_lookup};
    use crate::catalog::{EntityDescriptor, FieldDescriptor, FieldType, SnapshotCatalog};
    use crate::planner::dependencies::IgnoreListPolicy;

    fn declaration(entity: &str, fields: &[&str]) -> EntityDeclaration {
        let mut decl = EntityDeclaration::new(entity);
        for field in fields {
            decl.add_field(*field);
        }
        decl
    }

    async fn close(
        catalog: &SnapshotCatalog,
        initial: Vec<EntityDeclaration>,
        policy: &IgnoreListPolicy,
        concurrency: usize,
    ) -> Result<Closure, PlanError> {
        let defaults = DefaultDeclarations::builtin();
        let required_only = HashSet::new();
        let options = ClosureOptions {
            defaults: &defaults,
            policy,
            required_fields_only: &required_only,
            exclude_setup_objects: true,
            max_concurrent_lookups: concurrency,
        };
        extend_declarations(initial, catalog, &options).await
    }

    fn names(closure: &Closure) -> Vec<&str> {
        closure
            .declarations
            .iter()
            .map(|d| d.sf_object.as_str())
            .collect()
    }

    fn chain_catalog() -> SnapshotCatalog {
        CatalogBuilder::new()
            .entity("Region", vec![])
            .entity("Customer", vec![required_lookup("RegionId", "Region")])
            .entity(
                "Order",
                vec![
                    required_lookup("CustomerId", "Customer"),
                    lookup("ApproverId", &["User"]),
                ],
            )
            .entity(
                "User",
                vec![
                    FieldDescriptor::new("Username", FieldType::String).required(),
                    lookup("ManagerId", &["User"]),
                ],
            )
            .build()
    }

    #[tokio::test]
    async fn test_required_lookups_are_followed_transitively() {
        let catalog = chain_catalog();
        let closure = close(
            &catalog,
            vec![declaration("Order", &["Name", "CustomerId"])],
            &IgnoreListPolicy::default(),
            4,
        )
        .await
        .unwrap();

        assert_eq!(names(&closure), vec!["Order", "Customer", "Region"]);
        assert_eq!(closure.edges.len(), 2);
    }

    #[tokio::test]
    async fn test_requested_optional_lookups_are_followed() {
        let catalog = chain_catalog();
        let closure = close(
            &catalog,
            vec![declaration("Order", &["CustomerId", "ApproverId"])],
            &IgnoreListPolicy::default(),
            4,
        )
        .await
        .unwrap();

        // Customer and User are discovered in the first wave, Region in the second
        assert_eq!(names(&closure), vec!["Order", "Customer", "User", "Region"]);

        // Synthesised User comes from the built-in default declaration
        let user = &closure.declarations[2];
        assert!(user.has_field("Username"));
        assert!(!user.has_field("ManagerId"));
    }

    #[tokio::test]
    async fn test_cycles_terminate() {
        let catalog = CatalogBuilder::new()
            .entity("A", vec![required_lookup("BId", "B")])
            .entity("B", vec![required_lookup("AId", "A")])
            .build();

        let closure = close(
            &catalog,
            vec![declaration("A", &["BId"])],
            &IgnoreListPolicy::default(),
            4,
        )
        .await
        .unwrap();

        assert_eq!(names(&closure), vec!["A", "B"]);
        assert_eq!(closure.edges.len(), 2);
    }

    #[tokio::test]
    async fn test_non_queryable_and_ignored_targets_are_skipped() {
        let mut hidden = EntityDescriptor::new("Hidden");
        hidden.queryable = false;
        let catalog = CatalogBuilder::new()
            .entity_with(hidden, vec![])
            .entity("Legacy", vec![])
            .entity(
                "Thing",
                vec![
                    required_lookup("HiddenId", "Hidden"),
                    lookup("LegacyId", &["Legacy"]),
                ],
            )
            .build();

        let closure = close(
            &catalog,
            vec![declaration("Thing", &["HiddenId", "LegacyId"])],
            &IgnoreListPolicy::new(["Legacy"]),
            4,
        )
        .await
        .unwrap();

        assert_eq!(names(&closure), vec!["Thing"]);
        // Edges stay; the resolver ignores targets outside the closure
        assert_eq!(closure.edges.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_target_aborts() {
        let catalog = CatalogBuilder::new()
            .entity("Order", vec![lookup("CustomerId", &["Customer"])])
            .build();

        let result = close(
            &catalog,
            vec![declaration("Order", &["CustomerId"])],
            &IgnoreListPolicy::default(),
            1,
        )
        .await;

        assert!(matches!(
            result,
            Err(PlanError::CatalogInconsistency { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrency_does_not_change_result() {
        let catalog = chain_catalog();
        let initial = vec![
            declaration("Order", &["CustomerId", "ApproverId"]),
            declaration("Customer", &["RegionId"]),
        ];

        let serial = close(&catalog, initial.clone(), &IgnoreListPolicy::default(), 1)
            .await
            .unwrap();
        let parallel = close(&catalog, initial, &IgnoreListPolicy::default(), 16)
            .await
            .unwrap();

        assert_eq!(serial.declarations, parallel.declarations);
        assert_eq!(serial.edges, parallel.edges);
    }
}
