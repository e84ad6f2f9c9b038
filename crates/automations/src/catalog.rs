//!
//! # Built-in automation catalog
//!
//! Wires the canonical slugs to their actions and dependency edges.
//! Which project types each automation applies to varies per
//! deployment, so the caller passes the applicable type ids.
//!

use std::sync::Arc;

use slipway_saga_core::{
    AutomationDescriptor, AutomationRegistry, RegistryError, SubjectTypeId,
};

use crate::clients::ClientFactory;
use crate::config::AutomationSettings;
use crate::models::Subject;
use crate::{github, pagerduty, sentry, sonarqube};

pub const GITHUB_INTEGRATION: &str = "github";
pub const SENTRY_INTEGRATION: &str = "sentry";
pub const PAGERDUTY_INTEGRATION: &str = "pagerduty";
pub const SONARQUBE_INTEGRATION: &str = "sonarqube";

/// Build a registry with the standard project-creation automations.
///
/// Edges: the code-quality project depends on the repository existing
/// (pull-request decoration), and the on-call dependency association
/// depends on the on-call service automation.
pub fn builtin_registry(
    clients: Arc<dyn ClientFactory>,
    settings: &AutomationSettings,
    applies_to: &[SubjectTypeId],
) -> Result<AutomationRegistry<Subject>, RegistryError> {
    let mut registry = AutomationRegistry::new();

    registry.register(
        AutomationDescriptor::new(
            github::SLUG,
            GITHUB_INTEGRATION,
            Arc::new(github::CreateRepository::new(
                clients.clone(),
                settings.github.clone(),
            )),
        )
        .with_applies_to(applies_to.iter().copied()),
    )?;

    registry.register(
        AutomationDescriptor::new(
            sentry::SLUG,
            SENTRY_INTEGRATION,
            Arc::new(sentry::CreateProject::new(
                clients.clone(),
                settings.sentry.clone(),
            )),
        )
        .with_applies_to(applies_to.iter().copied()),
    )?;

    registry.register(
        AutomationDescriptor::new(
            pagerduty::SERVICE_SLUG,
            PAGERDUTY_INTEGRATION,
            Arc::new(pagerduty::CreateService::new(
                clients.clone(),
                settings.pagerduty.clone(),
            )),
        )
        .with_applies_to(applies_to.iter().copied()),
    )?;

    registry.register(
        AutomationDescriptor::new(
            pagerduty::DEPENDENCY_SLUG,
            PAGERDUTY_INTEGRATION,
            Arc::new(pagerduty::AssociateDependency::new(clients.clone())),
        )
        .with_depends_on([pagerduty::SERVICE_SLUG])
        .with_applies_to(applies_to.iter().copied()),
    )?;

    registry.register(
        AutomationDescriptor::new(
            sonarqube::SLUG,
            SONARQUBE_INTEGRATION,
            Arc::new(sonarqube::CreateProject::new(
                clients,
                settings.sonarqube.clone(),
            )),
        )
        .with_depends_on([github::SLUG])
        .with_applies_to(applies_to.iter().copied()),
    )?;

    Ok(registry)
}
