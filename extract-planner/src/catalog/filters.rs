//! Built-in entity pattern lists
//!
//! Patterns use `%` as a wildcard (e.g., `%__mdt` matches every custom
//! metadata type) and match case-insensitively against entity names.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Entities that cannot be queried in bulk without a filter on a single Id
pub const NOT_COUNTABLE: &[&str] = &[
    "ContentDocumentLink",
    "ContentFolderItem",
    "ContentFolder",
    "ContentFolderLink",
    "ContentFolderMember",
    "IdeaComment",
    "Vote",
    "RecordActionHistory",
    "DashboardSnapshotResults",
    "RecordRecommendation",
];

/// Entity patterns that are never extracted beyond their Id
const NOT_EXTRACTABLE_PATTERNS: &[&str] = &[
    "%__e",
    "%__mdt",
    "%__b",
    "%__x",
    "%__kav",
    "%__voteStat",
    "%__viewStat",
    "%__xo",
    "%__dlm",
    "%_hd",
    "%__chn",
    "%__p",
    "%ChangeEvent",
    "%Share",
    "%Access",
    "%History",
    "%Permission",
    "%PermissionSet",
    "%Permissions",
    "AuthorizationFormDataUse",
    "CustomHelpMenuSection",
    "DataUseLegalBasis",
    "DataUsePurpose",
    "ExternalDataUserAuth",
    "FieldPermissions",
    "FieldServiceMobileSettings",
    "MacroInstruction",
    "NetworkUserHistoryRecent",
    "ObjectPermissions",
    "OutgoingEmail",
    "OutgoingEmailRelation",
    "PermissionSet",
    "PermissionSetAssignment",
    "PermissionSetGroup",
    "PermissionSetGroupComponent",
    "PermissionSetLicenseAssign",
    "PermissionSetTabSetting",
    "UserAppInfo",
    "UserAppMenuCustomization",
    "UserCustomBadge",
    "UserCustomBadgeLocalization",
    "UserEmailPreferredPerson",
    "UserListView",
    "UserListViewCriterion",
    "UserPackageLicense",
    "UserPreference",
    "UserProvAccount",
    "UserProvAccountStaging",
    "UserProvMockTarget",
    "UserProvisioningConfig",
    "UserProvisioningLog",
    "UserProvisioningRequest",
];

/// Setup and tooling entities that are only extracted when explicitly asked for
pub const OPT_IN_ONLY: &[&str] = &[
    "ActionLinkGroupTemplate",
    "ApexClass",
    "ApexTrigger",
    "AppAnalyticsQueryRequest",
    "AuraDefinition",
    "FeedItem",
    "Translation",
    "WebLinkLocalization",
    "RecordTypeLocalization",
    "ApexPage",
    "ApexTestQueueItem",
    "ApexTestResult",
    "ApexComponent",
    "ApexEmailNotification",
    "ApexTestResultLimits",
    "ApexTestRunResult",
    "ApexTestSuite",
    "AppMenuItem",
    "AuthProvider",
    "BrandTemplate",
    "OauthCustomScope",
    "OauthCustomScopeApp",
    "OauthTokenExchHandlerApp",
    "OauthTokenExchangeHandler",
    "ScratchOrgInfo",
    "PromptError",
];

static NOT_COUNTABLE_SET: Lazy<PatternSet> = Lazy::new(|| PatternSet::new(NOT_COUNTABLE));

static NOT_EXTRACTABLE_SET: Lazy<PatternSet> = Lazy::new(|| {
    PatternSet::new(NOT_COUNTABLE.iter().chain(NOT_EXTRACTABLE_PATTERNS.iter()))
});

static OPT_IN_ONLY_SET: Lazy<PatternSet> = Lazy::new(|| PatternSet::new(OPT_IN_ONLY));

/// Whether the entity requires a per-Id filter to be queried
pub fn is_not_countable(entity: &str) -> bool {
    NOT_COUNTABLE_SET.matches(entity)
}

/// Whether only the Id of this entity may be extracted
pub fn is_not_extractable(entity: &str) -> bool {
    NOT_EXTRACTABLE_SET.matches(entity)
}

/// Whether the entity is setup data that must be requested explicitly
pub fn is_opt_in_only(entity: &str) -> bool {
    OPT_IN_ONLY_SET.matches(entity)
}

/// A compiled list of `%`-wildcard name patterns
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compile the given patterns, skipping (and logging) any that fail to compile
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter_map(|pattern| {
                let pattern = pattern.as_ref();
                match compile_pattern(pattern) {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        log::warn!("Ignoring invalid pattern '{}': {}", pattern, e);
                        None
                    }
                }
            })
            .collect();

        Self { patterns }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|regex| regex.is_match(name))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('%')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    RegexBuilder::new(&format!("^{}$", body))
        .case_insensitive(true)
        .build()
}
