//! Guards for organization-scoped routes.
//!
//! Guards run before an organization handler and decide whether the request
//! continues, is redirected, or gets a 404:
//!
//! 1. [`OrganizationsEnabledGuard`]: 404 when organizations are switched off
//! 2. [`UnspecifiedOrganizationGuard`]: a `_` (or missing) slug is replaced by
//!    the caller's only organization, if they have exactly one
//!
//! [`OrganizationGuards`] runs both in that order.

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use http::{StatusCode, header};

use crate::config::OrganizationsConfig;

/// Slug placeholder meaning "whichever organization applies".
pub const UNSPECIFIED_SLUG: &str = "_";

const SLUG_PARAM: &str = "slug";

/// A matched route: its template (`/organizations/{slug}/members`) and the
/// parameter values extracted from the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub template: String,
    pub params: BTreeMap<String, String>,
}

impl RouteMatch {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Whether the template contains a `{name}` placeholder.
    pub fn has_placeholder(&self, name: &str) -> bool {
        self.template.contains(&format!("{{{name}}}"))
    }

    /// Build the concrete path for this route from its parameters.
    pub fn reverse(&self) -> Result<String, GuardError> {
        let mut path = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            path.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| GuardError::InvalidTemplate(self.template.clone()))?;
            let name = &after[..close];
            let value = self
                .param(name)
                .ok_or_else(|| GuardError::MissingParam(name.to_string()))?;
            path.push_str(value);
            rest = &after[close + 1..];
        }
        path.push_str(rest);
        Ok(path)
    }
}

/// Result of running a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Proceed to the next guard or the handler.
    Continue,
    /// Send the client to another path.
    Redirect(String),
    /// Respond 404.
    NotFound,
}

impl GuardOutcome {
    /// HTTP response for a terminal outcome; `None` for `Continue`.
    pub fn into_response(self) -> Option<Response> {
        match self {
            GuardOutcome::Continue => None,
            GuardOutcome::Redirect(target) => {
                Some((StatusCode::FOUND, [(header::LOCATION, target)]).into_response())
            }
            GuardOutcome::NotFound => Some(StatusCode::NOT_FOUND.into_response()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("Route parameter '{0}' is missing")]
    MissingParam(String),

    #[error("Malformed route template: {0}")]
    InvalidTemplate(String),

    #[error("Failed to load organizations: {0}")]
    Source(String),
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Organization guard failed");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// Organizations the current requester may see.
#[async_trait]
pub trait OrganizationSource: Send + Sync {
    async fn eligible_slugs(&self) -> Result<Vec<String>, GuardError>;
}

/// Fixed list of organizations.
#[derive(Debug, Clone, Default)]
pub struct StaticOrganizations(pub Vec<String>);

#[async_trait]
impl OrganizationSource for StaticOrganizations {
    async fn eligible_slugs(&self) -> Result<Vec<String>, GuardError> {
        Ok(self.0.clone())
    }
}

/// A check run before an organization handler.
#[async_trait]
pub trait OrganizationGuard: Send + Sync {
    async fn check(
        &self,
        route: &RouteMatch,
        source: &dyn OrganizationSource,
    ) -> Result<GuardOutcome, GuardError>;
}

/// 404 for every organization route while the feature is off.
pub struct OrganizationsEnabledGuard {
    enabled: bool,
}

impl OrganizationsEnabledGuard {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl OrganizationGuard for OrganizationsEnabledGuard {
    async fn check(
        &self,
        _route: &RouteMatch,
        _source: &dyn OrganizationSource,
    ) -> Result<GuardOutcome, GuardError> {
        Ok(if self.enabled {
            GuardOutcome::Continue
        } else {
            GuardOutcome::NotFound
        })
    }
}

/// Resolves the `_` slug when the requester has exactly one organization.
///
/// With zero or several organizations, or on a route whose template has no
/// `{slug}`, the request continues unchanged.
pub struct UnspecifiedOrganizationGuard;

#[async_trait]
impl OrganizationGuard for UnspecifiedOrganizationGuard {
    async fn check(
        &self,
        route: &RouteMatch,
        source: &dyn OrganizationSource,
    ) -> Result<GuardOutcome, GuardError> {
        // Routes without a slug in their path have nothing to substitute
        if !route.has_placeholder(SLUG_PARAM) {
            return Ok(GuardOutcome::Continue);
        }

        let slug = route.param(SLUG_PARAM).unwrap_or(UNSPECIFIED_SLUG);
        if slug != UNSPECIFIED_SLUG {
            return Ok(GuardOutcome::Continue);
        }

        let slugs = source.eligible_slugs().await?;
        let [only] = slugs.as_slice() else {
            // TODO: send users with several organizations to a chooser page
            tracing::debug!(count = slugs.len(), "Organization slug left unspecified");
            return Ok(GuardOutcome::Continue);
        };

        let target = route.clone().with_param(SLUG_PARAM, only.as_str()).reverse()?;
        tracing::debug!(slug = %only, target = %target, "Redirecting to only organization");
        Ok(GuardOutcome::Redirect(target))
    }
}

/// Guards applied to every organization route, in order.
pub struct OrganizationGuards {
    guards: Vec<Box<dyn OrganizationGuard>>,
}

impl OrganizationGuards {
    pub fn new(enabled: bool) -> Self {
        Self {
            guards: vec![
                Box::new(OrganizationsEnabledGuard::new(enabled)),
                Box::new(UnspecifiedOrganizationGuard),
            ],
        }
    }

    pub fn from_config(config: &OrganizationsConfig) -> Self {
        Self::new(config.enabled)
    }

    /// Run the guards until one stops the request.
    pub async fn evaluate(
        &self,
        route: &RouteMatch,
        source: &dyn OrganizationSource,
    ) -> Result<GuardOutcome, GuardError> {
        for guard in &self.guards {
            match guard.check(route, source).await? {
                GuardOutcome::Continue => continue,
                outcome => return Ok(outcome),
            }
        }
        Ok(GuardOutcome::Continue)
    }
}
