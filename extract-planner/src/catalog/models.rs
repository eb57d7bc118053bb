//! Schema catalog models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field metadata as reported by the schema catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// API name, unique within its entity (e.g., "AccountId")
    pub name: String,
    /// Display label (e.g., "Account ID")
    #[serde(default)]
    pub label: String,
    /// Field data type
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Entity types a reference field may point to, in catalog order
    #[serde(rename = "referenceTo", default, skip_serializing_if = "Vec::is_empty")]
    pub reference_targets: Vec<String>,
    #[serde(rename = "requiredOnCreate", default)]
    pub required_on_create: bool,
    #[serde(default = "default_true")]
    pub nillable: bool,
    #[serde(rename = "defaultedOnCreate", default)]
    pub defaulted_on_create: bool,
    #[serde(rename = "defaultValue", default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    pub createable: bool,
    #[serde(rename = "custom", default)]
    pub is_custom: bool,
    /// Set when this field is a component of a compound field
    /// (e.g., "BillingCity" has compound field name "BillingAddress")
    #[serde(rename = "compoundFieldName", default, skip_serializing_if = "Option::is_none")]
    pub compound_field_name: Option<String>,
    /// Catalog attributes this crate does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FieldDescriptor {
    /// Create a plain (non-reference) field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            field_type,
            reference_targets: Vec::new(),
            required_on_create: false,
            nillable: true,
            defaulted_on_create: false,
            default_value: None,
            createable: true,
            is_custom: false,
            compound_field_name: None,
            extra: BTreeMap::new(),
        }
    }

    /// Create a reference field pointing at the given targets
    pub fn reference<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut field = Self::new(name, FieldType::Reference);
        field.reference_targets = targets.into_iter().map(Into::into).collect();
        field
    }

    /// Mark the field as required on create and not nillable
    pub fn required(mut self) -> Self {
        self.required_on_create = true;
        self.nillable = false;
        self
    }

    pub fn custom(mut self) -> Self {
        self.is_custom = true;
        self
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.field_type, FieldType::Reference)
    }

    /// Whether a record cannot be created without a value for this field.
    ///
    /// A field that the platform fills in on its own (nillable, defaulted on
    /// create, or carrying a default value) is never required.
    pub fn is_required(&self) -> bool {
        let defaulted =
            self.default_value.is_some() || self.nillable || self.defaulted_on_create;
        self.createable && self.required_on_create && !defaulted
    }

    pub fn is_deprecated(&self) -> bool {
        self.label.contains("(Deprecated)")
    }
}

/// Field data types understood by the planner
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Id,
    #[default]
    String,
    Boolean,
    Int,
    Double,
    Currency,
    Date,
    DateTime,
    Picklist,
    Reference,
    Address,
    Base64,
    Other(String),
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "id" => FieldType::Id,
            "string" | "textarea" | "email" | "phone" | "url" => FieldType::String,
            "boolean" => FieldType::Boolean,
            "int" => FieldType::Int,
            "double" | "percent" => FieldType::Double,
            "currency" => FieldType::Currency,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "picklist" | "multipicklist" => FieldType::Picklist,
            "reference" => FieldType::Reference,
            "address" => FieldType::Address,
            "base64" => FieldType::Base64,
            _ => FieldType::Other(value),
        }
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::Id => "id".to_string(),
            FieldType::String => "string".to_string(),
            FieldType::Boolean => "boolean".to_string(),
            FieldType::Int => "int".to_string(),
            FieldType::Double => "double".to_string(),
            FieldType::Currency => "currency".to_string(),
            FieldType::Date => "date".to_string(),
            FieldType::DateTime => "datetime".to_string(),
            FieldType::Picklist => "picklist".to_string(),
            FieldType::Reference => "reference".to_string(),
            FieldType::Address => "address".to_string(),
            FieldType::Base64 => "base64".to_string(),
            FieldType::Other(other) => other,
        }
    }
}

/// Entity-level metadata as reported by the schema catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// API name (e.g., "Account", "Invoice__c")
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "custom", default)]
    pub is_custom: bool,
    #[serde(default = "default_true")]
    pub queryable: bool,
    #[serde(default = "default_true")]
    pub createable: bool,
    /// False when the entity cannot be queried in bulk without an extra filter
    #[serde(default = "default_true")]
    pub countable: bool,
    /// Known number of records; None when counts were not collected
    #[serde(rename = "count", default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    /// Number of record types defined on the entity (including the master type)
    #[serde(rename = "recordTypeCount", default)]
    pub record_type_count: u32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            is_custom: false,
            queryable: true,
            createable: true,
            countable: true,
            record_count: None,
            record_type_count: 0,
            extra: BTreeMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}
