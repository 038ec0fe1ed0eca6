pub mod organizations;

pub use organizations::{
    GuardError, GuardOutcome, OrganizationGuard, OrganizationGuards, OrganizationSource,
    OrganizationsEnabledGuard, RouteMatch, StaticOrganizations, UnspecifiedOrganizationGuard,
};
