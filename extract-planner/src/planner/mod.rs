//! Extraction planning
//!
//! A run goes through four stages:
//! 1. [`normalize`]: user declarations become one concrete declaration per entity
//! 2. [`closure`]: lookup targets are declared until the set is closed,
//!    collecting [`dependencies`] for every entity on the way
//! 3. [`order`]: a deterministic load order, with cycles broken and every
//!    edge classified as ordinary or deferred
//! 4. the result is handed to the mapping emitter
//!
//! Nothing is shared between runs; every call to [`Planner::plan`] builds its
//! state from scratch.

pub mod closure;
pub mod declarations;
pub mod dependencies;
pub mod error;
pub mod normalize;
pub mod order;

pub use declarations::{ApiPreference, DefaultDeclarations, EntityDeclaration, ExtractDeclaration};
pub use dependencies::{FieldPolicy, IgnoreListPolicy};
pub use error::{ConfigurationError, CycleBroken, PlanError, PlanWarning};
pub use order::{BreakCyclesMode, CycleConfirmation, ResolvedEdge};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::SchemaCatalog;
use closure::{ClosureOptions, extend_declarations};
use normalize::{NormalizeOptions, normalize_declarations};
use order::resolve_order;

/// Default bound on concurrent catalog lookups during closure building
pub const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 8;

/// Options for one planning run
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Entity names and `Entity.Field` patterns (`%` wildcard) to leave out
    pub ignore: Vec<String>,
    /// Extra entities to extract with all fields
    pub include: Vec<String>,
    pub break_cycles: BreakCyclesMode,
    /// Remove the namespace prefix from emitted names
    pub strip_namespace: bool,
    pub namespace: Option<String>,
    /// Leave setup/tooling entities out unless declared explicitly
    pub exclude_setup_objects: bool,
    /// Entities whose optional lookups are not followed
    pub required_fields_only: HashSet<String>,
    pub max_concurrent_lookups: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            include: Vec::new(),
            break_cycles: BreakCyclesMode::Auto,
            strip_namespace: false,
            namespace: None,
            exclude_setup_objects: true,
            required_fields_only: HashSet::new(),
            max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub declarations: Vec<ExtractDeclaration>,
    pub options: PlanOptions,
}

impl PlanRequest {
    pub fn new(declarations: Vec<ExtractDeclaration>) -> Self {
        Self {
            declarations,
            options: PlanOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PlanOptions) -> Self {
        self.options = options;
        self
    }

    /// User declarations plus one `FIELDS(ALL)` declaration per `include` entry
    fn all_declarations(&self) -> Vec<ExtractDeclaration> {
        let mut all = self.declarations.clone();
        all.extend(
            self.options
                .include
                .iter()
                .map(|entity| ExtractDeclaration::new(entity.trim(), ["FIELDS(ALL)"])),
        );
        all
    }
}

/// Outcome of a successful planning run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanResult {
    /// Load order; each entity appears exactly once
    pub order: Vec<String>,
    pub edges_by_entity: BTreeMap<String, Vec<ResolvedEdge>>,
    /// Declarations in load order
    pub declarations: Vec<EntityDeclaration>,
    pub warnings: Vec<PlanWarning>,
    pub cycles_broken: Vec<CycleBroken>,
}

impl PlanResult {
    pub fn declaration(&self, entity: &str) -> Option<&EntityDeclaration> {
        self.declarations.iter().find(|d| d.sf_object == entity)
    }

    pub fn edges(&self, entity: &str) -> &[ResolvedEdge] {
        self.edges_by_entity
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn deferred_count(&self) -> usize {
        self.edges_by_entity
            .values()
            .flatten()
            .filter(|e| e.is_deferred())
            .count()
    }
}

/// Runs planning requests against one schema catalog
pub struct Planner {
    catalog: Arc<dyn SchemaCatalog>,
    defaults: DefaultDeclarations,
}

impl Planner {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self {
            catalog,
            defaults: DefaultDeclarations::builtin(),
        }
    }

    pub fn with_defaults(mut self, defaults: DefaultDeclarations) -> Self {
        self.defaults = defaults;
        self
    }

    /// Plan one extraction
    ///
    /// `confirm` is only consulted when `break_cycles` is [`BreakCyclesMode::Ask`].
    pub async fn plan(
        &self,
        request: &PlanRequest,
        confirm: Option<&mut dyn CycleConfirmation>,
    ) -> Result<PlanResult, PlanError> {
        let options = &request.options;
        let catalog = self.catalog.as_ref();
        let policy = IgnoreListPolicy::new(&options.ignore);

        let normalized = normalize_declarations(
            &request.all_declarations(),
            catalog,
            &NormalizeOptions {
                defaults: &self.defaults,
                policy: &policy,
                exclude_setup_objects: options.exclude_setup_objects,
            },
        )
        .await?;
        log::info!("Normalised {} declarations", normalized.declarations.len());

        let closure = extend_declarations(
            normalized.declarations,
            catalog,
            &ClosureOptions {
                defaults: &self.defaults,
                policy: &policy,
                required_fields_only: &options.required_fields_only,
                exclude_setup_objects: options.exclude_setup_objects,
                max_concurrent_lookups: options.max_concurrent_lookups,
            },
        )
        .await?;
        log::info!(
            "Closure has {} entities and {} dependency edges",
            closure.declarations.len(),
            closure.edges.len()
        );

        let catalog_entities: HashSet<String> = catalog
            .list_entities()
            .await?
            .into_iter()
            .map(|e| e.name)
            .collect();
        let resolution = resolve_order(
            &closure.declarations,
            &closure.edges,
            &catalog_entities,
            options.break_cycles,
            confirm,
        )?;

        let mut by_name: HashMap<String, EntityDeclaration> = closure
            .declarations
            .into_iter()
            .map(|d| (d.sf_object.clone(), d))
            .collect();
        let declarations = resolution
            .order
            .iter()
            .filter_map(|name| by_name.remove(name))
            .collect();

        let mut warnings = normalized.warnings;
        warnings.extend(closure.warnings);
        warnings.extend(resolution.warnings);

        Ok(PlanResult {
            order: resolution.order,
            edges_by_entity: resolution.edges_by_entity,
            declarations,
            warnings,
            cycles_broken: resolution.cycles_broken,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::{CatalogBuilder, lookup, required_lookup};
    use crate::catalog::{EntityDescriptor, SnapshotCatalog};
    use order::EdgeClassification;

    fn planner(catalog: SnapshotCatalog) -> Planner {
        Planner::new(Arc::new(catalog))
    }

    fn declare(entity: &str, fields: &[&str]) -> ExtractDeclaration {
        ExtractDeclaration::new(entity, fields.iter().copied())
    }

    fn custom(name: &str, count: Option<u64>) -> EntityDescriptor {
        let mut entity = EntityDescriptor::new(name);
        entity.is_custom = true;
        entity.record_count = count;
        entity
    }

    #[tokio::test]
    async fn test_required_lookup_orders_customer_first() {
        let catalog = CatalogBuilder::new()
            .entity("Customer", vec![])
            .entity("Order", vec![required_lookup("CustomerId", "Customer")])
            .build();
        let request = PlanRequest::new(vec![
            declare("Order", &["CustomerId"]),
            declare("Customer", &[]),
        ]);

        let result = planner(catalog).plan(&request, None).await.unwrap();

        assert_eq!(result.order, vec!["Customer", "Order"]);
        let edges = result.edges("Order");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].classification, EdgeClassification::Ordinary);
        assert_eq!(result.declarations[0].sf_object, "Customer");
    }

    #[tokio::test]
    async fn test_self_reference_is_deferred_to_itself() {
        let catalog = CatalogBuilder::new()
            .entity("Employee", vec![lookup("ManagerId", &["Employee"])])
            .build();
        let request = PlanRequest::new(vec![declare("Employee", &["ManagerId"])]);

        let result = planner(catalog).plan(&request, None).await.unwrap();

        assert_eq!(result.order, vec!["Employee"]);
        let edge = &result.edges("Employee")[0];
        assert_eq!(edge.insert_after(), Some("Employee"));
        assert!(result.cycles_broken.is_empty());
    }

    #[tokio::test]
    async fn test_mutual_required_lookups_break_one_cycle() {
        let catalog = CatalogBuilder::new()
            .entity("A", vec![required_lookup("BId", "B")])
            .entity("B", vec![required_lookup("AId", "A")])
            .build();
        let request = PlanRequest::new(vec![declare("A", &[]), declare("B", &[])]);

        let result = planner(catalog).plan(&request, None).await.unwrap();

        assert_eq!(result.order.len(), 2);
        assert_eq!(result.deferred_count(), 1);
        assert_eq!(result.cycles_broken.len(), 1);
    }

    #[tokio::test]
    async fn test_polymorphic_lookup_anchors_on_latest_target() {
        let catalog = CatalogBuilder::new()
            .entity("Contact", vec![])
            .entity("Lead", vec![])
            .entity("Task", vec![lookup("WhoId", &["Lead", "Contact"])])
            .build();
        let request = PlanRequest::new(vec![
            declare("Task", &["WhoId"]),
            declare("Contact", &[]),
            declare("Lead", &[]),
        ]);

        let result = planner(catalog).plan(&request, None).await.unwrap();

        assert_eq!(result.order, vec!["Contact", "Lead", "Task"]);
        let who = &result.edges("Task")[0];
        assert_eq!(who.anchor_entity, "Lead");
        assert_eq!(who.classification, EdgeClassification::Ordinary);
    }

    #[tokio::test]
    async fn test_zero_count_custom_entity_is_not_expanded() {
        let with_counts = CatalogBuilder::new()
            .entity_with(custom("Empty__c", Some(0)), vec![])
            .entity_with(custom("Full__c", Some(12)), vec![])
            .build();
        let request = PlanRequest::new(vec![declare("OBJECTS(CUSTOM)", &[])]);
        let result = planner(with_counts).plan(&request, None).await.unwrap();
        assert_eq!(result.order, vec!["Full__c"]);

        let without_counts = CatalogBuilder::new()
            .entity_with(custom("Empty__c", None), vec![])
            .entity_with(custom("Full__c", None), vec![])
            .build();
        let result = planner(without_counts).plan(&request, None).await.unwrap();
        assert_eq!(result.order, vec!["Empty__c", "Full__c"]);
    }

    #[tokio::test]
    async fn test_closure_pulls_in_required_targets() {
        let catalog = CatalogBuilder::new()
            .entity("Region", vec![])
            .entity("Customer", vec![required_lookup("RegionId", "Region")])
            .entity("Order", vec![required_lookup("CustomerId", "Customer")])
            .build();
        let request = PlanRequest::new(vec![declare("Order", &[])]);

        let result = planner(catalog).plan(&request, None).await.unwrap();

        assert_eq!(result.order, vec!["Region", "Customer", "Order"]);
        for entity in &result.order {
            for edge in result.edges(entity).iter().filter(|e| e.is_required) {
                assert!(edge.resolved_targets.iter().all(|t| result.order.contains(t)));
            }
        }
    }

    #[tokio::test]
    async fn test_include_adds_all_fields_declaration() {
        let catalog = CatalogBuilder::new()
            .entity("Product2", vec![lookup("FamilyId", &["Family__c"])])
            .entity_with(custom("Family__c", None), vec![])
            .build();
        let options = PlanOptions {
            include: vec!["Product2".to_string()],
            ..Default::default()
        };
        let request = PlanRequest::new(vec![]).with_options(options);

        let result = planner(catalog).plan(&request, None).await.unwrap();

        assert_eq!(result.order, vec!["Family__c", "Product2"]);
        let product = result.declaration("Product2").unwrap();
        assert!(product.has_field("FamilyId"));
    }

    #[tokio::test]
    async fn test_include_duplicate_is_configuration_error() {
        let catalog = CatalogBuilder::new().entity("Account", vec![]).build();
        let options = PlanOptions {
            include: vec!["Account".to_string()],
            ..Default::default()
        };
        let request = PlanRequest::new(vec![declare("Account", &[])]).with_options(options);

        let result = planner(catalog).plan(&request, None).await;

        assert_eq!(
            result.unwrap_err(),
            PlanError::Configuration(ConfigurationError::DuplicateDeclaration {
                entities: vec!["Account".to_string()]
            })
        );
    }

    #[tokio::test]
    async fn test_required_fields_only_skips_optional_lookups() {
        let catalog = CatalogBuilder::new()
            .entity("User", vec![])
            .entity("Account", vec![lookup("OwnerId", &["User"])])
            .build();
        let options = PlanOptions {
            required_fields_only: HashSet::from(["Account".to_string()]),
            ..Default::default()
        };
        let request =
            PlanRequest::new(vec![declare("Account", &["OwnerId"])]).with_options(options);

        let result = planner(catalog).plan(&request, None).await.unwrap();

        assert_eq!(result.order, vec!["Account"]);
        assert!(result.edges("Account").is_empty());
    }

    #[tokio::test]
    async fn test_planning_is_idempotent() {
        let catalog = CatalogBuilder::new()
            .entity("A", vec![required_lookup("BId", "B")])
            .entity("B", vec![required_lookup("CId", "C")])
            .entity("C", vec![lookup("AId", &["A"]), lookup("ParentId", &["C"])])
            .build();
        let request = PlanRequest::new(vec![declare("C", &["AId", "ParentId"])]);
        let planner = planner(catalog);

        let first = planner.plan(&request, None).await.unwrap();
        let second = planner.plan(&request, None).await.unwrap();

        assert_eq!(first.order, second.order);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
