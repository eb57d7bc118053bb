//! Declaration normalisation
//!
//! Expands `OBJECTS(...)` groups against the catalog, merges built-in
//! defaults into explicit declarations, and resolves `FIELDS(...)` groups to
//! concrete field names. Required fields are always added.

use std::collections::{HashMap, HashSet};

use super::declarations::{
    DefaultDeclarations, EntityDeclaration, ExtractDeclaration, FieldGroup, FieldSelector,
    ObjectGroup, ObjectSelector,
};
use super::dependencies::FieldPolicy;
use super::error::{ConfigurationError, PlanError, PlanWarning};
use crate::catalog::{EntityDescriptor, FieldDescriptor, SchemaCatalog, filters};

/// Result of normalisation
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// One declaration per entity: explicit ones first, then group expansions
    pub declarations: Vec<EntityDeclaration>,
    pub warnings: Vec<PlanWarning>,
}

/// Options that affect which entities a group may expand to
pub struct NormalizeOptions<'a> {
    pub defaults: &'a DefaultDeclarations,
    pub policy: &'a dyn FieldPolicy,
    /// Skip setup/tooling entities during group expansion
    pub exclude_setup_objects: bool,
}

/// Flatten user declarations into concrete per-entity declarations
pub async fn normalize_declarations(
    declarations: &[ExtractDeclaration],
    catalog: &dyn SchemaCatalog,
    options: &NormalizeOptions<'_>,
) -> Result<Normalized, PlanError> {
    let mut atomic = Vec::new();
    let mut groups = Vec::new();
    for decl in declarations {
        match decl.selector()? {
            ObjectSelector::Named(_) => atomic.push(decl),
            ObjectSelector::Group(group) => groups.push((group, decl)),
        }
    }

    let duplicates = find_duplicates(atomic.iter().map(|d| d.sf_object.as_str()));
    if !duplicates.is_empty() {
        return Err(ConfigurationError::DuplicateDeclaration {
            entities: duplicates,
        }
        .into());
    }

    for decl in &atomic {
        if !catalog.contains(&decl.sf_object).await? {
            return Err(ConfigurationError::UnknownEntity {
                entity: decl.sf_object.clone(),
            }
            .into());
        }
    }

    let mut merged: Vec<ExtractDeclaration> = atomic
        .iter()
        .map(|decl| options.defaults.merge(decl))
        .collect();

    if !groups.is_empty() {
        let entities = catalog.list_entities().await?;
        let mut selected: HashSet<String> = merged.iter().map(|d| d.sf_object.clone()).collect();

        for (group, decl) in groups {
            let mut expanded = 0usize;
            for entity in &entities {
                if selected.contains(&entity.name) || !group_accepts(group, entity, options) {
                    continue;
                }
                // A known zero count means there is nothing to extract
                if catalog.record_count(&entity.name).await? == Some(0) {
                    log::debug!("Skipping {}: no records", entity.name);
                    continue;
                }
                selected.insert(entity.name.clone());
                merged.push(options.defaults.merge(&ExtractDeclaration {
                    sf_object: entity.name.clone(),
                    fields: decl.fields.clone(),
                    where_filter: decl.where_filter.clone(),
                    api: decl.api,
                }));
                expanded += 1;
            }
            log::info!("{} expanded to {} entities", decl.sf_object, expanded);
        }
    }

    let mut normalized = Normalized::default();
    for decl in &merged {
        let fields = catalog.list_fields(&decl.sf_object).await?;
        let entity_decl = expand_fields(decl, &fields, options.policy, &mut normalized.warnings)?;
        normalized.declarations.push(entity_decl);
    }

    Ok(normalized)
}

/// Whether a group expansion should include the given entity
fn group_accepts(group: ObjectGroup, entity: &EntityDescriptor, options: &NormalizeOptions<'_>) -> bool {
    if !group.matches(entity.is_custom) || !entity.queryable {
        return false;
    }
    if filters::is_not_extractable(&entity.name) || !options.policy.allows_entity(&entity.name) {
        return false;
    }
    !(options.exclude_setup_objects && filters::is_opt_in_only(&entity.name))
}

/// Resolve field selectors of one declaration against the entity's catalog fields
pub(crate) fn expand_fields(
    decl: &ExtractDeclaration,
    fields: &[FieldDescriptor],
    policy: &dyn FieldPolicy,
    warnings: &mut Vec<PlanWarning>,
) -> Result<EntityDeclaration, ConfigurationError> {
    let entity = decl.sf_object.as_str();
    let by_name: HashMap<&str, &FieldDescriptor> =
        fields.iter().map(|f| (f.name.as_str(), f)).collect();
    let usable = |field: &FieldDescriptor| field.is_required() || policy.allows_field(entity, field);

    let mut out = EntityDeclaration {
        sf_object: decl.sf_object.clone(),
        fields: Vec::new(),
        where_filter: decl.where_filter.clone(),
        api: decl.api,
    };

    for token in &decl.fields {
        match FieldSelector::parse(token)? {
            FieldSelector::Named(name) => match by_name.get(name.as_str()) {
                Some(&field) if usable(field) => out.add_field(name),
                Some(_) => log::debug!("{}.{} is ignored", entity, name),
                None => {
                    let warning = PlanWarning::UnknownField {
                        entity: entity.to_string(),
                        field: name,
                    };
                    log::warn!("{}", warning);
                    warnings.push(warning);
                }
            },
            FieldSelector::Group(group) => {
                for field in fields {
                    let matches = match group {
                        FieldGroup::All => true,
                        FieldGroup::Standard => !field.is_custom,
                        FieldGroup::Custom => field.is_custom,
                        FieldGroup::Required => false,
                    };
                    if matches && usable(field) {
                        out.add_field(field.name.clone());
                    }
                }
            }
        }
    }

    for field in fields.iter().filter(|f| f.is_required()) {
        out.add_field(field.name.clone());
    }

    Ok(out)
}

/// Names that occur more than once, in first-seen order
fn find_duplicates<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for name in names {
        let count = counts.entry(name).or_insert(0);
        if *count == 0 {
            order.push(name);
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter(|name| counts.get(name).copied().unwrap_or(0) > 1)
        .map(str::to_string)
        .collect()
}
