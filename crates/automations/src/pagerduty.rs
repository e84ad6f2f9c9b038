//!
//! # PagerDuty automations
//!
//! Two automations target the on-call service:
//!
//! - [`SERVICE_SLUG`] creates a service for a new project, stores the
//!   events-API integration key as a project secret and registers the
//!   service id as a project identifier.
//! - [`DEPENDENCY_SLUG`] mirrors a catalog dependency between two
//!   projects as a PagerDuty service dependency. It requires the
//!   service automation to have run for both sides.
//!
//! Namespaces without an escalation policy are skipped with a note.
//!

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use slipway_saga_core::{
    ActionError, AutomationAction, AutomationContext, AutomationDescriptor, Compensation,
    CompensationError, CompensationResult,
};

use crate::clients::{ClientFactory, PagerDutyService};
use crate::config::PagerDutySettings;
use crate::models::{Project, Subject};

pub const SERVICE_SLUG: &str = "pagerduty-service";
pub const DEPENDENCY_SLUG: &str = "pagerduty-dependency";

const SERVICE_SCRATCH_KEY: &str = "pagerduty.create-service";
const DEPENDENCY_SCRATCH_KEY: &str = "pagerduty.associate-dependency";

const INSERT_IDENTIFIER: &str = "INSERT INTO v1.project_identifiers \
     (external_id, integration_name, project_id, created_at, created_by) \
     VALUES (:external_id, :integration_name, :project_id, CURRENT_TIMESTAMP, :username)";

const INSERT_LINK: &str = "INSERT INTO v1.project_links \
     (project_id, link_type_id, created_by, url) \
     VALUES (:project_id, :link_type_id, :username, :url)";

const INSERT_SECRET: &str = "INSERT INTO v1.project_secrets \
     (project_id, name, value, created_by) \
     VALUES (:project_id, :name, :value, :username)";

const GET_IDENTIFIER: &str = "SELECT external_id \
     FROM v1.project_identifiers \
     WHERE project_id = :project_id AND integration_name = :integration_name";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServiceScratch {
    integration_name: String,
    service: PagerDutyService,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DependencyScratch {
    integration_name: String,
    dependency_id: String,
}

/// Forward action for [`SERVICE_SLUG`].
pub struct CreateService {
    clients: Arc<dyn ClientFactory>,
    settings: PagerDutySettings,
}

impl CreateService {
    pub fn new(clients: Arc<dyn ClientFactory>, settings: PagerDutySettings) -> Self {
        Self { clients, settings }
    }
}

#[async_trait]
impl AutomationAction<Subject> for CreateService {
    async fn execute(
        &self,
        context: &mut AutomationContext,
        descriptor: &AutomationDescriptor<Subject>,
        subject: &Subject,
    ) -> Result<(), ActionError> {
        let Some(project) = subject.as_project() else {
            return Err(ActionError::domain(format!(
                "automation {} only applies to projects",
                descriptor.slug()
            )));
        };
        let Some(policy) = project.namespace.on_call_policy.clone() else {
            context.note_progress(format!(
                "on-call is not enabled for namespace {}, skipping",
                project.namespace.name
            ));
            return Ok(());
        };

        let client = self
            .clients
            .pagerduty(descriptor.integration_name())
            .await?;
        let service = client.create_service(&project.name, &policy).await?;

        context.stash(
            SERVICE_SCRATCH_KEY,
            &ServiceScratch {
                integration_name: descriptor.integration_name().to_string(),
                service: service.clone(),
            },
        )?;
        context.add_callback(RemoveService {
            clients: self.clients.clone(),
        });
        context.note_progress(format!(
            "created PagerDuty service {} for project {}",
            service.id, project.id
        ));

        // the integration is a child resource of the service, so it is
        // deleted when the service is; no extra cleanup to register
        let hook = client.create_inbound_integration(&service.id).await?;
        context
            .run_query(
                INSERT_SECRET,
                json!({
                    "project_id": project.id.0,
                    "name": "pagerduty-integration-key",
                    "value": hook.integration_key,
                    "username": context.actor().username,
                }),
                "insert-pagerduty-keys",
            )
            .await?;

        context
            .run_query(
                INSERT_IDENTIFIER,
                json!({
                    "external_id": service.id,
                    "integration_name": descriptor.integration_name(),
                    "project_id": project.id.0,
                    "username": context.actor().username,
                }),
                "insert-project-identifiers",
            )
            .await?;
        context.note_progress(format!(
            "registered PagerDuty service {} for project {}",
            service.id, project.id
        ));

        if let Some(link_type_id) = self.settings.project_link_type_id {
            context
                .run_query(
                    INSERT_LINK,
                    json!({
                        "project_id": project.id.0,
                        "link_type_id": link_type_id,
                        "username": context.actor().username,
                        "url": service.html_url,
                    }),
                    "insert-project-links",
                )
                .await?;
            context.note_progress(format!(
                "created PagerDuty link {} for project {}",
                service.html_url, project.id
            ));
        }
        Ok(())
    }
}

struct RemoveService {
    clients: Arc<dyn ClientFactory>,
}

#[async_trait]
impl Compensation for RemoveService {
    async fn run(
        &self,
        context: &mut AutomationContext,
        _error: &ActionError,
    ) -> CompensationResult {
        let Some(scratch) = context.take_stashed::<ServiceScratch>(SERVICE_SCRATCH_KEY) else {
            return Ok(());
        };

        let client = match self.clients.pagerduty(&scratch.integration_name).await {
            Ok(client) => client,
            Err(acquire_error) if acquire_error.is_unavailable() => {
                warn!(%acquire_error, "skipping PagerDuty service rollback");
                return Ok(());
            }
            Err(acquire_error) => return Err(CompensationError::new(acquire_error.to_string())),
        };

        context.note_progress(format!(
            "removing PagerDuty service {} due to error",
            scratch.service.id
        ));
        match client.remove_service(&scratch.service.id).await {
            Ok(()) => Ok(()),
            Err(remove_error) if remove_error.is_not_found() => Ok(()),
            Err(remove_error) => Err(CompensationError::new(remove_error.to_string())),
        }
    }
}

/// Forward action for [`DEPENDENCY_SLUG`].
pub struct AssociateDependency {
    clients: Arc<dyn ClientFactory>,
}

impl AssociateDependency {
    pub fn new(clients: Arc<dyn ClientFactory>) -> Self {
        Self { clients }
    }

    async fn service_id(
        &self,
        context: &AutomationContext,
        integration_name: &str,
        project: &Project,
    ) -> Result<Option<String>, ActionError> {
        let rows = context
            .run_query(
                GET_IDENTIFIER,
                json!({
                    "project_id": project.id.0,
                    "integration_name": integration_name,
                }),
                "get-project-identifiers",
            )
            .await?;
        Ok(rows
            .row()
            .and_then(|row| row["external_id"].as_str())
            .map(str::to_string))
    }
}

#[async_trait]
impl AutomationAction<Subject> for AssociateDependency {
    async fn execute(
        &self,
        context: &mut AutomationContext,
        descriptor: &AutomationDescriptor<Subject>,
        subject: &Subject,
    ) -> Result<(), ActionError> {
        let Some(dependency) = subject.as_dependency() else {
            return Err(ActionError::domain(format!(
                "automation {} only applies to project dependencies",
                descriptor.slug()
            )));
        };

        let integration_name = descriptor.integration_name();
        let Some(service_id) = self
            .service_id(context, integration_name, &dependency.project)
            .await?
        else {
            context.note_progress(format!(
                "project {} has no PagerDuty service, skipping dependency",
                dependency.project.slug
            ));
            return Ok(());
        };
        let Some(depends_on_id) = self
            .service_id(context, integration_name, &dependency.dependency)
            .await?
        else {
            context.note_progress(format!(
                "project {} has no PagerDuty service, skipping dependency",
                dependency.dependency.slug
            ));
            return Ok(());
        };

        let client = self.clients.pagerduty(integration_name).await?;
        let created = client
            .add_service_dependency(&service_id, &depends_on_id)
            .await?;

        context.stash(
            DEPENDENCY_SCRATCH_KEY,
            &DependencyScratch {
                integration_name: integration_name.to_string(),
                dependency_id: created.id.clone(),
            },
        )?;
        context.add_callback(RemoveDependency {
            clients: self.clients.clone(),
        });
        context.note_progress(format!(
            "associated PagerDuty service {} with dependency {}",
            service_id, depends_on_id
        ));
        Ok(())
    }
}

struct RemoveDependency {
    clients: Arc<dyn ClientFactory>,
}

#[async_trait]
impl Compensation for RemoveDependency {
    async fn run(
        &self,
        context: &mut AutomationContext,
        _error: &ActionError,
    ) -> CompensationResult {
        let Some(scratch) =
            context.take_stashed::<DependencyScratch>(DEPENDENCY_SCRATCH_KEY)
        else {
            return Ok(());
        };

        let client = match self.clients.pagerduty(&scratch.integration_name).await {
            Ok(client) => client,
            Err(acquire_error) if acquire_error.is_unavailable() => {
                warn!(%acquire_error, "skipping PagerDuty dependency rollback");
                return Ok(());
            }
            Err(acquire_error) => return Err(CompensationError::new(acquire_error.to_string())),
        };

        context.note_progress(format!(
            "removing PagerDuty service dependency {} due to error",
            scratch.dependency_id
        ));
        match client
            .remove_service_dependency(&scratch.dependency_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(remove_error) if remove_error.is_not_found() => Ok(()),
            Err(remove_error) => Err(CompensationError::new(remove_error.to_string())),
        }
    }
}
