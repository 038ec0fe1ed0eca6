use serde::{Deserialize, Serialize};

/// Organization feature flag.
///
/// Organization routes are always registered; when this flag is off the
/// guards answer every organization-scoped request with Not Found.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrganizationsConfig {
    /// Whether organization views are served.
    /// Default: false
    #[serde(default)]
    pub enabled: bool,
}
