//! Planner errors, warnings and cycle events

use serde::Serialize;

use crate::catalog::CatalogError;

/// Fatal error that aborts a planning run
#[derive(Debug, Clone, PartialEq)]
pub enum PlanError {
    /// The request itself is invalid
    Configuration(ConfigurationError),
    /// The catalog references an entity it cannot describe
    CatalogInconsistency {
        /// Entity whose field references the missing target
        entity: String,
        field: String,
        missing_target: String,
    },
    /// The catalog backend failed
    Catalog(CatalogError),
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::Configuration(e) => write!(f, "Configuration error: {}", e),
            PlanError::CatalogInconsistency {
                entity,
                field,
                missing_target,
            } => write!(
                f,
                "Catalog inconsistency: {}.{} references '{}', which is not in the catalog",
                entity, field, missing_target
            ),
            PlanError::Catalog(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlanError::Configuration(e) => Some(e),
            PlanError::Catalog(e) => Some(e),
            PlanError::CatalogInconsistency { .. } => None,
        }
    }
}

impl From<ConfigurationError> for PlanError {
    fn from(e: ConfigurationError) -> Self {
        PlanError::Configuration(e)
    }
}

impl From<CatalogError> for PlanError {
    fn from(e: CatalogError) -> Self {
        PlanError::Catalog(e)
    }
}

/// Invalid planning input
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// The same entity was declared explicitly more than once
    DuplicateDeclaration { entities: Vec<String> },
    /// An explicitly declared entity does not exist in the catalog
    UnknownEntity { entity: String },
    /// break_cycles was neither "auto" nor "ask"
    InvalidBreakCyclesMode { value: String },
    /// A group selector such as `OBJECTS(...)` or `FIELDS(...)` was not recognised
    InvalidSelector { selector: String },
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::DuplicateDeclaration { entities } => write!(
                f,
                "Duplicate declarations not allowed: {}",
                entities.join(", ")
            ),
            ConfigurationError::UnknownEntity { entity } => {
                write!(f, "Declared entity '{}' does not exist in the catalog", entity)
            }
            ConfigurationError::InvalidBreakCyclesMode { value } => write!(
                f,
                "Invalid break_cycles mode '{}' (expected 'auto' or 'ask')",
                value
            ),
            ConfigurationError::InvalidSelector { selector } => {
                write!(f, "Unrecognised group selector '{}'", selector)
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Non-fatal issue recorded during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// Every target of a reference field was filtered out; the field was dropped
    UnresolvableReference {
        entity: String,
        field: String,
        targets: Vec<String>,
    },
    /// A declared field does not exist on the entity
    UnknownField { entity: String, field: String },
    /// The confirmation hook declined a cycle break; the plan proceeded anyway
    CycleBreakDeclined { entity: String },
    /// Ask mode was requested but no confirmation hook was supplied
    NoConfirmationHook,
}

impl std::fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanWarning::UnresolvableReference {
                entity,
                field,
                targets,
            } => write!(
                f,
                "{}.{} dropped: no extractable target among {}",
                entity,
                field,
                targets.join(", ")
            ),
            PlanWarning::UnknownField { entity, field } => {
                write!(f, "{}.{} does not exist and was ignored", entity, field)
            }
            PlanWarning::CycleBreakDeclined { entity } => write!(
                f,
                "Cycle break at {} was declined; its lookups were deferred anyway",
                entity
            ),
            PlanWarning::NoConfirmationHook => {
                write!(f, "No confirmation prompt available; cycles were broken automatically")
            }
        }
    }
}

/// Record of the resolver emitting an entity whose dependencies were unresolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleBroken {
    /// Entity emitted to break the cycle
    pub entity: String,
    /// Entities still waiting at the time of the break, in declaration order
    pub remaining: Vec<String>,
    /// Lookup fields on `entity` whose targets had not been emitted yet
    pub fields: Vec<String>,
}

impl std::fmt::Display for CycleBroken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Circular dependency among {}; loading {} first and deferring {}",
            self.remaining.join(", "),
            self.entity,
            self.fields.join(", ")
        )
    }
}
