//!
//! # Sentry project automation
//!
//! Creates the error-tracking project for namespaces that have a Sentry
//! team, records the project slug on the catalog record and stores the
//! issued client keys as project secrets. Namespaces without a team are
//! skipped with a note rather than failed.
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

use crate::clients::{ClientFactory, SentryProject};
use crate::config::SentrySettings;
use crate::models::Subject;

pub const SLUG: &str = "sentry-project";

const SCRATCH_KEY: &str = "sentry.create-project";

const UPDATE_PROJECT: &str = "UPDATE v1.projects \
     SET sentry_project_slug = :slug, \
         last_modified_at = CURRENT_TIMESTAMP, \
         last_modified_by = :username \
     WHERE id = :project_id";

const INSERT_LINK: &str = "INSERT INTO v1.project_links \
     (project_id, link_type_id, created_by, url) \
     VALUES (:project_id, :link_type_id, :username, :url)";

const INSERT_SECRET: &str = "INSERT INTO v1.project_secrets \
     (project_id, name, value, created_by) \
     VALUES (:project_id, :name, :value, :username)";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SentryScratch {
    integration_name: String,
    project: SentryProject,
}

/// Forward action for [`SLUG`].
pub struct CreateProject {
    clients: Arc<dyn ClientFactory>,
    settings: SentrySettings,
}

impl CreateProject {
    pub fn new(clients: Arc<dyn ClientFactory>, settings: SentrySettings) -> Self {
        Self { clients, settings }
    }
}

#[async_trait]
impl AutomationAction<Subject> for CreateProject {
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
        let Some(team_slug) = project.namespace.error_tracking_team.clone() else {
            context.note_progress(format!(
                "error tracking is not enabled for namespace {}, skipping",
                project.namespace.name
            ));
            return Ok(());
        };

        let client = self.clients.sentry(descriptor.integration_name()).await?;
        let sentry_project = client.create_project(&team_slug, &project.name).await?;

        context.stash(
            SCRATCH_KEY,
            &SentryScratch {
                integration_name: descriptor.integration_name().to_string(),
                project: sentry_project.clone(),
            },
        )?;
        context.add_callback(RemoveProject {
            clients: self.clients.clone(),
        });
        context.note_progress(format!(
            "created Sentry project {} for project {}",
            sentry_project.slug, project.id
        ));

        context
            .run_query(
                UPDATE_PROJECT,
                json!({
                    "slug": sentry_project.slug,
                    "username": context.actor().username,
                    "project_id": project.id.0,
                }),
                "update-sentry-slug",
            )
            .await?;

        if let Some(link_type_id) = self.settings.project_link_type_id {
            context
                .run_query(
                    INSERT_LINK,
                    json!({
                        "project_id": project.id.0,
                        "link_type_id": link_type_id,
                        "username": context.actor().username,
                        "url": sentry_project.link,
                    }),
                    "insert-project-links",
                )
                .await?;
            context.note_progress(format!(
                "created Sentry link {} for project {}",
                sentry_project.link, project.id
            ));
        }

        // the values arrive encrypted by the caller's secret handling;
        // the names are normalized so cookiecutters can find them
        for (name, value) in &sentry_project.keys {
            context
                .run_query(
                    INSERT_SECRET,
                    json!({
                        "project_id": project.id.0,
                        "name": format!("sentry_{}", name.to_lowercase()),
                        "value": value,
                        "username": context.actor().username,
                    }),
                    "insert-project-secrets",
                )
                .await?;
        }
        Ok(())
    }
}

/// Compensating action: removes the Sentry project recorded in scratch.
struct RemoveProject {
    clients: Arc<dyn ClientFactory>,
}

#[async_trait]
impl Compensation for RemoveProject {
    async fn run(
        &self,
        context: &mut AutomationContext,
        _error: &ActionError,
    ) -> CompensationResult {
        let Some(scratch) = context.take_stashed::<SentryScratch>(SCRATCH_KEY) else {
            return Ok(());
        };

        let client = match self.clients.sentry(&scratch.integration_name).await {
            Ok(client) => client,
            Err(acquire_error) if acquire_error.is_unavailable() => {
                warn!(%acquire_error, "skipping Sentry project rollback");
                return Ok(());
            }
            Err(acquire_error) => return Err(CompensationError::new(acquire_error.to_string())),
        };

        context.note_progress(format!(
            "removing Sentry project {} due to error",
            scratch.project.slug
        ));
        match client.remove_project(&scratch.project.slug).await {
            Ok(()) => Ok(()),
            Err(remove_error) if remove_error.is_not_found() => Ok(()),
            Err(remove_error) => Err(CompensationError::new(remove_error.to_string())),
        }
    }
}
