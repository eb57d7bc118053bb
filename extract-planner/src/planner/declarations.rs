//! Extract declaration types
//!
//! An [`ExtractDeclaration`] is what a user writes: an entity name or an
//! `OBJECTS(...)` group, plus field names or `FIELDS(...)` groups. The
//! normaliser turns these into [`EntityDeclaration`]s with concrete names only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::ConfigurationError;

const OBJECTS_PREFIX: &str = "OBJECTS(";
const FIELDS_PREFIX: &str = "FIELDS(";

/// Which API the downstream loader should use for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiPreference {
    #[default]
    Smart,
    Rest,
    Bulk,
}

/// User-supplied declaration of what to extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractDeclaration {
    /// Entity name or `OBJECTS(ALL|STANDARD|CUSTOM)`
    pub sf_object: String,
    /// Field names and/or `FIELDS(ALL|STANDARD|CUSTOM|REQUIRED)` groups
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiPreference>,
}

impl ExtractDeclaration {
    pub fn new<I, S>(sf_object: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExtractDeclaration {
            sf_object: sf_object.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            where_filter: None,
            api: None,
        }
    }

    pub fn with_where(mut self, where_filter: impl Into<String>) -> Self {
        self.where_filter = Some(where_filter.into());
        self
    }

    pub fn selector(&self) -> Result<ObjectSelector, ConfigurationError> {
        ObjectSelector::parse(&self.sf_object)
    }
}

/// Entity group matched by `OBJECTS(...)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectGroup {
    All,
    Standard,
    Custom,
}

impl ObjectGroup {
    pub fn matches(&self, is_custom: bool) -> bool {
        match self {
            ObjectGroup::All => true,
            ObjectGroup::Standard => !is_custom,
            ObjectGroup::Custom => is_custom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectSelector {
    Named(String),
    Group(ObjectGroup),
}

impl ObjectSelector {
    pub fn parse(token: &str) -> Result<Self, ConfigurationError> {
        let Some(inner) = group_argument(token, OBJECTS_PREFIX) else {
            return Ok(ObjectSelector::Named(token.trim().to_string()));
        };

        let group = match inner.as_str() {
            "ALL" => ObjectGroup::All,
            "STANDARD" => ObjectGroup::Standard,
            "CUSTOM" => ObjectGroup::Custom,
            _ => {
                return Err(ConfigurationError::InvalidSelector {
                    selector: token.to_string(),
                });
            }
        };
        Ok(ObjectSelector::Group(group))
    }
}

/// Field group matched by `FIELDS(...)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    All,
    Standard,
    Custom,
    /// Required fields are always included, so this group adds nothing on its own
    Required,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelector {
    Named(String),
    Group(FieldGroup),
}

impl FieldSelector {
    pub fn parse(token: &str) -> Result<Self, ConfigurationError> {
        let Some(inner) = group_argument(token, FIELDS_PREFIX) else {
            return Ok(FieldSelector::Named(token.trim().to_string()));
        };

        let group = match inner.as_str() {
            "ALL" => FieldGroup::All,
            "STANDARD" => FieldGroup::Standard,
            "CUSTOM" => FieldGroup::Custom,
            "REQUIRED" => FieldGroup::Required,
            _ => {
                return Err(ConfigurationError::InvalidSelector {
                    selector: token.to_string(),
                });
            }
        };
        Ok(FieldSelector::Group(group))
    }
}

/// Extract the upper-cased argument of `PREFIX...)`, if the token has that shape
fn group_argument(token: &str, prefix: &str) -> Option<String> {
    let upper = token.trim().to_ascii_uppercase();
    let rest = upper.strip_prefix(prefix)?;
    let inner = rest.strip_suffix(')')?;
    Some(inner.trim().to_string())
}

/// A concrete, normalised declaration for exactly one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDeclaration {
    pub sf_object: String,
    /// Concrete field names, without duplicates, in first-seen order
    pub fields: Vec<String>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiPreference>,
}

impl EntityDeclaration {
    pub fn new(sf_object: impl Into<String>) -> Self {
        EntityDeclaration {
            sf_object: sf_object.into(),
            fields: Vec::new(),
            where_filter: None,
            api: None,
        }
    }

    /// Add a field unless it is already present
    pub fn add_field(&mut self, field: impl Into<String>) {
        let field = field.into();
        if !self.has_field(&field) {
            self.fields.push(field);
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// Known-good declarations for entities that ship with built-in records
///
/// Used both to fill in user declarations that leave `where`/`fields` empty
/// and to synthesise declarations for entities pulled in by lookups.
#[derive(Debug, Clone)]
pub struct DefaultDeclarations {
    by_entity: HashMap<String, ExtractDeclaration>,
}

impl DefaultDeclarations {
    pub fn builtin() -> Self {
        let defaults = [
            ExtractDeclaration::new("Account", ["FIELDS(REQUIRED)"])
                .with_where("Name != 'Sample Account for Entitlements'"),
            ExtractDeclaration::new("BusinessHours", ["FIELDS(REQUIRED)"])
                .with_where("Name != 'Default'"),
            ExtractDeclaration::new("ContentWorkspace", ["FIELDS(REQUIRED)"])
                .with_where("Name != 'Asset Library'"),
            ExtractDeclaration::new("Entitlement", ["FIELDS(REQUIRED)"])
                .with_where("Name != 'Sample Entitlement'"),
            ExtractDeclaration::new("Pricebook2", ["FIELDS(REQUIRED)", "IsActive"])
                .with_where("IsStandard = False"),
            ExtractDeclaration::new("User", ["Username", "Email", "Alias", "LastName", "FirstName"]),
            ExtractDeclaration::new("Group", ["Name", "DeveloperName", "Type"])
                .with_where("Type = 'Regular'"),
            ExtractDeclaration::new("RecordType", ["DeveloperName", "SobjectType", "IsActive"]),
            ExtractDeclaration::new("WorkBadgeDefinition", ["FIELDS(REQUIRED)"])
                .with_where("IsCompanyWide = false"),
        ];

        Self::from_declarations(defaults)
    }

    pub fn empty() -> Self {
        Self {
            by_entity: HashMap::new(),
        }
    }

    pub fn from_declarations(declarations: impl IntoIterator<Item = ExtractDeclaration>) -> Self {
        let by_entity = declarations
            .into_iter()
            .map(|d| (d.sf_object.clone(), d))
            .collect();
        Self { by_entity }
    }

    /// Replace or add defaults, keyed by entity name
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = ExtractDeclaration>) -> Self {
        for decl in overrides {
            self.by_entity.insert(decl.sf_object.clone(), decl);
        }
        self
    }

    pub fn get(&self, entity: &str) -> Option<&ExtractDeclaration> {
        self.by_entity.get(entity)
    }

    /// Merge a user declaration with the default for its entity
    ///
    /// User values take priority; anything still missing falls back to
    /// `FIELDS(REQUIRED)` and no filter.
    pub fn merge(&self, user: &ExtractDeclaration) -> ExtractDeclaration {
        let default = self.get(&user.sf_object);

        let fields = if !user.fields.is_empty() {
            user.fields.clone()
        } else if let Some(default) = default.filter(|d| !d.fields.is_empty()) {
            default.fields.clone()
        } else {
            vec!["FIELDS(REQUIRED)".to_string()]
        };

        ExtractDeclaration {
            sf_object: user.sf_object.clone(),
            fields,
            where_filter: user
                .where_filter
                .clone()
                .or_else(|| default.and_then(|d| d.where_filter.clone())),
            api: user.api,
        }
    }
}

impl Default for DefaultDeclarations {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_selectors() {
        assert_eq!(
            ObjectSelector::parse("OBJECTS(CUSTOM)").unwrap(),
            ObjectSelector::Group(ObjectGroup::Custom)
        );
        assert_eq!(
            ObjectSelector::parse("objects( all )").unwrap(),
            ObjectSelector::Group(ObjectGroup::All)
        );
        assert_eq!(
            ObjectSelector::parse("Account").unwrap(),
            ObjectSelector::Named("Account".to_string())
        );
        assert!(matches!(
            ObjectSelector::parse("OBJECTS(POPULATED)"),
            Err(ConfigurationError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_field_selectors() {
        assert_eq!(
            FieldSelector::parse("FIELDS(REQUIRED)").unwrap(),
            FieldSelector::Group(FieldGroup::Required)
        );
        assert_eq!(
            FieldSelector::parse("Description").unwrap(),
            FieldSelector::Named("Description".to_string())
        );
    }

    #[test]
    fn test_merge_prefers_user_values() {
        let defaults = DefaultDeclarations::builtin();
        let user = ExtractDeclaration::new("Account", ["Name", "Industry"]);

        let merged = defaults.merge(&user);
        assert_eq!(merged.fields, vec!["Name", "Industry"]);
        assert_eq!(
            merged.where_filter.as_deref(),
            Some("Name != 'Sample Account for Entitlements'")
        );

        let user = ExtractDeclaration::new("Account", Vec::<String>::new()).with_where("Rating = 'Hot'");
        let merged = defaults.merge(&user);
        assert_eq!(merged.fields, vec!["FIELDS(REQUIRED)"]);
        assert_eq!(merged.where_filter.as_deref(), Some("Rating = 'Hot'"));
    }

    #[test]
    fn test_merge_without_default_requires_fields() {
        let merged = DefaultDeclarations::empty()
            .merge(&ExtractDeclaration::new("Invoice__c", Vec::<String>::new()));
        assert_eq!(merged.fields, vec!["FIELDS(REQUIRED)"]);
        assert_eq!(merged.where_filter, None);
    }

    #[test]
    fn test_entity_declaration_dedupes_fields() {
        let mut decl = EntityDeclaration::new("Contact");
        decl.add_field("LastName");
        decl.add_field("Email");
        decl.add_field("LastName");
        assert_eq!(decl.fields, vec!["LastName", "Email"]);
    }
}
