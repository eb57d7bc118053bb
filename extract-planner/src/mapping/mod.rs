//! Mapping document emitted from a plan
//!
//! One step per planned entity, in load order, keyed `Insert <Entity>`.
//! Lookups that are deferred carry an `after` pointing at the step that must
//! finish before the lookup can be patched in.

pub mod writer;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::catalog::filters;
use crate::catalog::{CatalogError, FieldDescriptor, FieldType, SchemaCatalog};
use crate::planner::{FieldPolicy, PlanOptions, PlanResult};

const ID_FIELD: &str = "Id";
const RECORD_TYPE_FIELD: &str = "RecordTypeId";
/// Compound name fields are extracted as a whole
const NAME_COMPOUND: &str = "Name";

/// Step key for an entity
pub fn step_key(entity: &str) -> String {
    format!("Insert {}", entity)
}

/// Ordered set of mapping steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingDocument {
    steps: Vec<(String, MappingStep)>,
}

impl MappingDocument {
    pub fn steps(&self) -> impl Iterator<Item = (&str, &MappingStep)> {
        self.steps.iter().map(|(key, step)| (key.as_str(), step))
    }

    pub fn step(&self, key: &str) -> Option<&MappingStep> {
        self.steps.iter().find(|(k, _)| k == key).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// Serialised as a map so the step order survives in YAML and JSON
impl Serialize for MappingDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.steps.len()))?;
        for (key, step) in &self.steps {
            map.serialize_entry(key, step)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingStep {
    pub sf_object: String,
    pub table: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub lookups: BTreeMap<String, LookupSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soql_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<crate::planner::ApiPreference>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupSpec {
    pub table: LookupTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// Lookup target table; polymorphic lookups list every target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LookupTable {
    Single(String),
    Many(Vec<String>),
}

impl LookupTable {
    fn from_targets(mut targets: Vec<String>) -> Self {
        match targets.len() {
            1 => LookupTable::Single(targets.remove(0)),
            _ => LookupTable::Many(targets),
        }
    }

    pub fn targets(&self) -> Vec<&str> {
        match self {
            LookupTable::Single(t) => vec![t.as_str()],
            LookupTable::Many(ts) => ts.iter().map(String::as_str).collect(),
        }
    }
}

/// Emission settings
pub struct MappingOptions<'a> {
    pub policy: &'a dyn FieldPolicy,
    /// Namespace prefix to strip, if stripping is enabled
    pub strip_namespace: Option<&'a str>,
}

impl<'a> MappingOptions<'a> {
    pub fn new(policy: &'a dyn FieldPolicy) -> Self {
        Self {
            policy,
            strip_namespace: None,
        }
    }

    /// Settings taken from the options the plan was made with
    pub fn for_plan(policy: &'a dyn FieldPolicy, options: &'a PlanOptions) -> Self {
        Self::new(policy).with_namespace(options.strip_namespace, options.namespace.as_deref())
    }

    pub fn with_namespace(mut self, strip: bool, namespace: Option<&'a str>) -> Self {
        self.strip_namespace = namespace.filter(|ns| strip && !ns.is_empty());
        self
    }
}

/// Removes `<ns>__` prefixes unless the short form is already taken
struct NamespaceStripper {
    prefix: Option<String>,
}

impl NamespaceStripper {
    fn new(namespace: Option<&str>) -> Self {
        Self {
            prefix: namespace.map(|ns| format!("{}__", ns)),
        }
    }

    fn strip(&self, name: &str, taken: &HashSet<&str>) -> String {
        let Some(prefix) = &self.prefix else {
            return name.to_string();
        };
        match name.strip_prefix(prefix.as_str()) {
            Some(short) if !taken.contains(short) => short.to_string(),
            _ => name.to_string(),
        }
    }
}

/// Build the mapping document for a plan
pub async fn build_mapping(
    plan: &PlanResult,
    catalog: &dyn SchemaCatalog,
    options: &MappingOptions<'_>,
) -> Result<MappingDocument, CatalogError> {
    let stripper = NamespaceStripper::new(options.strip_namespace);
    let planned: HashSet<&str> = plan.order.iter().map(String::as_str).collect();
    let record_type_counts: HashMap<String, u32> = catalog
        .list_entities()
        .await?
        .into_iter()
        .map(|e| (e.name, e.record_type_count))
        .collect();
    let mut document = MappingDocument::default();

    for decl in &plan.declarations {
        let entity = decl.sf_object.as_str();
        let catalog_fields = catalog.list_fields(entity).await?;
        let mappable = mappable_fields(entity, &catalog_fields, options.policy);
        // RecordTypeId only matters past the master record type
        let has_record_types = record_type_counts.get(entity).is_some_and(|&n| n > 1);

        let mut fields: Vec<&str> = Vec::new();
        let mut lookups: Vec<&str> = Vec::new();
        if let Some(id) = mappable.iter().find(|f| f.name == ID_FIELD) {
            fields.push(id.name.as_str());
        }
        if !filters::is_not_extractable(entity) {
            for field in mappable.iter().filter(|f| decl.has_field(&f.name)) {
                if field.name == ID_FIELD
                    || (field.name == RECORD_TYPE_FIELD && !has_record_types)
                {
                    continue;
                }
                if field.is_reference() && field.name != RECORD_TYPE_FIELD {
                    lookups.push(field.name.as_str());
                } else {
                    fields.push(field.name.as_str());
                }
            }
        }

        let field_names: HashSet<&str> = fields.iter().copied().collect();
        let mut stripped_fields: Vec<String> = fields
            .iter()
            .map(|f| stripper.strip(f, &field_names))
            .collect();
        stripped_fields.sort();

        let lookup_names: HashSet<&str> = lookups.iter().copied().collect();
        let mut lookup_specs = BTreeMap::new();
        for field in lookups {
            let Some(edge) = plan.edges(entity).iter().find(|e| e.field_name == field) else {
                log::debug!("{}.{} has no target in the plan", entity, field);
                continue;
            };
            let table = edge
                .resolved_targets
                .iter()
                .map(|t| stripper.strip(t, &planned))
                .collect();
            lookup_specs.insert(
                stripper.strip(field, &lookup_names),
                LookupSpec {
                    table: LookupTable::from_targets(table),
                    after: edge
                        .insert_after()
                        .map(|anchor| step_key(&stripper.strip(anchor, &planned))),
                },
            );
        }

        let table = stripper.strip(entity, &planned);
        document.steps.push((
            step_key(&table),
            MappingStep {
                sf_object: table.clone(),
                table,
                fields: stripped_fields,
                lookups: lookup_specs,
                soql_filter: decl.where_filter.clone(),
                api: decl.api,
            },
        ));
    }

    log::info!("Built mapping with {} steps", document.len());
    Ok(document)
}

/// Fields that can be written by a bulk load
fn mappable_fields<'f>(
    entity: &str,
    fields: &'f [FieldDescriptor],
    policy: &dyn FieldPolicy,
) -> Vec<&'f FieldDescriptor> {
    let compound_parents: HashSet<&str> = fields
        .iter()
        .filter_map(|f| f.compound_field_name.as_deref())
        .filter(|name| *name != NAME_COMPOUND)
        .collect();
    if !compound_parents.is_empty() {
        log::debug!("Compound fields ignored in {}: {:?}", entity, compound_parents);
    }

    fields
        .iter()
        .filter(|f| !compound_parents.contains(f.name.as_str()))
        .filter(|f| !f.is_deprecated())
        .filter(|f| f.field_type != FieldType::Base64)
        .filter(|f| f.is_required() || policy.allows_field(entity, f))
        .collect()
}
