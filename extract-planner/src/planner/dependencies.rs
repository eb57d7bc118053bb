//! Dependency collection for a single entity declaration
//!
//! Turns the reference fields of one declaration into [`DependencyEdge`]s:
//! - the record type discriminator target is dropped
//! - targets that cannot be queried in bulk are dropped
//! - optional lookups are kept only when the entity is not restricted to
//!   required fields

use std::collections::HashMap;

use serde::Serialize;

use super::declarations::EntityDeclaration;
use super::error::{PlanError, PlanWarning};
use crate::catalog::filters::PatternSet;
use crate::catalog::{CatalogError, FieldDescriptor, SchemaCatalog};

/// Pseudo-target used by record type discrimination fields
const RECORD_TYPE_ENTITY: &str = "RecordType";

/// A reference from one entity to one or more possible target entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub from_entity: String,
    /// Possible targets; more than one means the field is polymorphic
    pub to_entities: Vec<String>,
    pub field_name: String,
    /// The source field must be populated on create
    pub is_required: bool,
}

/// Decides which entities and optional fields the user has excluded
pub trait FieldPolicy: Send + Sync {
    /// Whether the entity may be pulled into the plan implicitly
    fn allows_entity(&self, entity: &str) -> bool;

    /// Whether an optional field may be used
    fn allows_field(&self, entity: &str, field: &FieldDescriptor) -> bool;
}

/// Policy driven by the `ignore` list
///
/// Entries containing a dot (`Account.Legacy%`) exclude fields; other entries
/// exclude entities. Both accept `%` wildcards.
#[derive(Debug, Clone, Default)]
pub struct IgnoreListPolicy {
    entities: PatternSet,
    fields: PatternSet,
}

impl IgnoreListPolicy {
    pub fn new<I, S>(ignore: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (fields, entities): (Vec<String>, Vec<String>) = ignore
            .into_iter()
            .map(|entry| entry.as_ref().trim().to_string())
            .filter(|entry| !entry.is_empty())
            .partition(|entry| entry.contains('.'));

        Self {
            entities: PatternSet::new(entities),
            fields: PatternSet::new(fields),
        }
    }
}

impl FieldPolicy for IgnoreListPolicy {
    fn allows_entity(&self, entity: &str) -> bool {
        !self.entities.matches(entity)
    }

    fn allows_field(&self, entity: &str, field: &FieldDescriptor) -> bool {
        !self.fields.matches(&format!("{}.{}", entity, field.name))
    }
}

/// Edges and warnings produced for one declaration
#[derive(Debug, Clone, Default)]
pub struct CollectedDependencies {
    pub edges: Vec<DependencyEdge>,
    pub warnings: Vec<PlanWarning>,
}

/// Collect dependency edges for the declared fields of one entity
pub async fn collect_dependencies(
    decl: &EntityDeclaration,
    catalog: &dyn SchemaCatalog,
    policy: &dyn FieldPolicy,
    only_required_fields: bool,
) -> Result<CollectedDependencies, PlanError> {
    let entity = decl.sf_object.as_str();
    let fields = catalog.list_fields(entity).await?;
    let by_name: HashMap<&str, &FieldDescriptor> =
        fields.iter().map(|f| (f.name.as_str(), f)).collect();

    let mut collected = CollectedDependencies::default();

    for field_name in &decl.fields {
        let Some(field) = by_name.get(field_name.as_str()) else {
            continue;
        };
        if !field.is_reference() || field.reference_targets.is_empty() {
            continue;
        }

        let references: Vec<&String> = field
            .reference_targets
            .iter()
            .filter(|t| t.as_str() != RECORD_TYPE_ENTITY)
            .collect();
        if references.is_empty() {
            continue;
        }

        let mut targets = Vec::with_capacity(references.len());
        for target in &references {
            let countable = catalog
                .is_countable(target)
                .await
                .map_err(|e| inconsistency(e, entity, &field.name, target))?;
            if countable {
                targets.push(target.to_string());
            }
        }

        if targets.is_empty() {
            let warning = PlanWarning::UnresolvableReference {
                entity: entity.to_string(),
                field: field.name.clone(),
                targets: references.iter().map(|t| t.to_string()).collect(),
            };
            log::warn!("{}", warning);
            collected.warnings.push(warning);
            continue;
        }

        let is_required = field.required_on_create;
        let optional_allowed = !only_required_fields && policy.allows_field(entity, field);
        if is_required || optional_allowed {
            collected.edges.push(DependencyEdge {
                from_entity: entity.to_string(),
                to_entities: targets,
                field_name: field.name.clone(),
                is_required,
            });
        }
    }

    log::debug!(
        "Collected {} dependencies for {}",
        collected.edges.len(),
        entity
    );
    Ok(collected)
}

fn inconsistency(error: CatalogError, entity: &str, field: &str, target: &str) -> PlanError {
    match error {
        CatalogError::UnknownEntity { .. } => PlanError::CatalogInconsistency {
            entity: entity.to_string(),
            field: field.to_string(),
            missing_target: target.to_string(),
        },
        other => PlanError::Catalog(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityDescriptor;
    use crate::catalog::test_support::{CatalogBuilder, lookup, required_lookup};

    fn declaration(entity: &str, fields: &[&str]) -> EntityDeclaration {
        let mut decl = EntityDeclaration::new(entity);
        for field in fields {
            decl.add_field(*field);
        }
        decl
    }

    #[tokio::test]
    async fn test_required_and_optional_lookups() {
        let catalog = CatalogBuilder::new()
            .entity("Customer", vec![])
            .entity(
                "Order",
                vec![
                    required_lookup("CustomerId", "Customer"),
                    lookup("ReferrerId", &["Customer"]),
                ],
            )
            .build();
        let policy = IgnoreListPolicy::default();
        let decl = declaration("Order", &["Name", "CustomerId", "ReferrerId"]);

        let all = collect_dependencies(&decl, &catalog, &policy, false)
            .await
            .unwrap();
        assert_eq!(all.edges.len(), 2);
        assert!(all.edges[0].is_required);
        assert!(!all.edges[1].is_required);

        let required_only = collect_dependencies(&decl, &catalog, &policy, true)
            .await
            .unwrap();
        assert_eq!(required_only.edges.len(), 1);
        assert_eq!(required_only.edges[0].field_name, "CustomerId");
    }

    #[tokio::test]
    async fn test_record_type_target_is_dropped() {
        let catalog = CatalogBuilder::new()
            .entity("RecordType", vec![])
            .entity("Case", vec![lookup("RecordTypeId", &["RecordType"])])
            .build();
        let decl = declaration("Case", &["RecordTypeId"]);

        let collected =
            collect_dependencies(&decl, &catalog, &IgnoreListPolicy::default(), false)
                .await
                .unwrap();
        assert!(collected.edges.is_empty());
        assert!(collected.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_non_countable_targets_are_filtered() {
        let catalog = CatalogBuilder::new()
            .entity("Contact", vec![])
            .entity("ContentDocumentLink", vec![])
            .entity(
                "Note__c",
                vec![
                    lookup("Parent__c", &["Contact", "ContentDocumentLink"]),
                    lookup("Link__c", &["ContentDocumentLink"]),
                ],
            )
            .build();
        let decl = declaration("Note__c", &["Parent__c", "Link__c"]);

        let collected =
            collect_dependencies(&decl, &catalog, &IgnoreListPolicy::default(), false)
                .await
                .unwrap();

        assert_eq!(collected.edges.len(), 1);
        assert_eq!(collected.edges[0].to_entities, vec!["Contact"]);
        assert_eq!(
            collected.warnings,
            vec![PlanWarning::UnresolvableReference {
                entity: "Note__c".to_string(),
                field: "Link__c".to_string(),
                targets: vec!["ContentDocumentLink".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn test_catalog_countable_flag_is_respected() {
        let mut restricted = EntityDescriptor::new("Restricted__c");
        restricted.countable = false;
        let catalog = CatalogBuilder::new()
            .entity_with(restricted, vec![])
            .entity("Thing__c", vec![required_lookup("Restricted__c", "Restricted__c")])
            .build();
        let decl = declaration("Thing__c", &["Restricted__c"]);

        let collected =
            collect_dependencies(&decl, &catalog, &IgnoreListPolicy::default(), false)
                .await
                .unwrap();
        assert!(collected.edges.is_empty());
        assert_eq!(collected.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_target_is_catalog_inconsistency() {
        let catalog = CatalogBuilder::new()
            .entity("Order", vec![required_lookup("CustomerId", "Customer")])
            .build();
        let decl = declaration("Order", &["CustomerId"]);

        let result =
            collect_dependencies(&decl, &catalog, &IgnoreListPolicy::default(), false).await;
        assert_eq!(
            result.unwrap_err(),
            PlanError::CatalogInconsistency {
                entity: "Order".to_string(),
                field: "CustomerId".to_string(),
                missing_target: "Customer".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_ignored_optional_field_has_no_edge() {
        let catalog = CatalogBuilder::new()
            .entity("User", vec![])
            .entity(
                "Account",
                vec![
                    lookup("OwnerId", &["User"]),
                    required_lookup("CreatorId", "User"),
                ],
            )
            .build();
        let policy = IgnoreListPolicy::new(["Account.Owner%", "Account.CreatorId"]);
        let decl = declaration("Account", &["OwnerId", "CreatorId"]);

        let collected = collect_dependencies(&decl, &catalog, &policy, false)
            .await
            .unwrap();

        // Required lookups cannot be ignored
        assert_eq!(collected.edges.len(), 1);
        assert_eq!(collected.edges[0].field_name, "CreatorId");
    }

    #[test]
    fn test_ignore_policy_splits_entities_and_fields() {
        let policy = IgnoreListPolicy::new(["%History", "Contact.Fax"]);
        assert!(!policy.allows_entity("AccountHistory"));
        assert!(policy.allows_entity("Contact"));

        let fax = FieldDescriptor::new("Fax", crate::catalog::FieldType::String);
        assert!(!policy.allows_field("Contact", &fax));
        assert!(policy.allows_field("Lead", &fax));
    }
}
