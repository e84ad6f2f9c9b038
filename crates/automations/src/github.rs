//!
//! # GitHub repository automation
//!
//! Creates the repository for a new project, registers its id as a
//! project identifier and attaches a dashboard link when one is
//! configured. The compensating action deletes the repository again.
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

use crate::clients::{ClientFactory, Repository};
use crate::config::GitHubSettings;
use crate::models::Subject;

pub const SLUG: &str = "github-repository";

/// Scratch key for the created repository. Public because the
/// code-quality automation reads the repository id from here to wire up
/// pull-request decoration; nothing else may.
pub const SCRATCH_KEY: &str = "github.create-repository";

const INSERT_IDENTIFIER: &str = "INSERT INTO v1.project_identifiers \
     (external_id, integration_name, project_id, created_at, created_by) \
     VALUES (:external_id, :integration_name, :project_id, CURRENT_TIMESTAMP, :username)";

const INSERT_LINK: &str = "INSERT INTO v1.project_links \
     (project_id, link_type_id, created_by, url) \
     VALUES (:project_id, :link_type_id, :username, :url)";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubScratch {
    pub integration_name: String,
    pub organization: String,
    pub repository: Repository,
}

/// Forward action for [`SLUG`].
pub struct CreateRepository {
    clients: Arc<dyn ClientFactory>,
    settings: GitHubSettings,
}

impl CreateRepository {
    pub fn new(clients: Arc<dyn ClientFactory>, settings: GitHubSettings) -> Self {
        Self { clients, settings }
    }
}

#[async_trait]
impl AutomationAction<Subject> for CreateRepository {
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
        let organization = self
            .settings
            .organization
            .clone()
            .or_else(|| project.namespace.source_control_group.clone())
            .ok_or_else(|| {
                ActionError::domain(format!(
                    "namespace {} has no source-control group configured",
                    project.namespace.slug
                ))
            })?;

        let client = self
            .clients
            .github(descriptor.integration_name(), context.actor())
            .await?;
        let repository = client
            .create_repository(&organization, &project.slug, project.description.as_deref())
            .await?;

        // register the rollback before any bookkeeping so a failure
        // below still deletes the repository
        context.stash(
            SCRATCH_KEY,
            &GitHubScratch {
                integration_name: descriptor.integration_name().to_string(),
                organization: organization.clone(),
                repository: repository.clone(),
            },
        )?;
        context.add_callback(DeleteRepository {
            clients: self.clients.clone(),
        });
        context.note_progress(format!(
            "created GitHub repository {} (id={}) for project {}",
            repository.full_name, repository.id, project.id
        ));

        if let Some(team_slug) = &self.settings.team_slug {
            // secondary embellishment: intentionally non-fatal
            if let Err(attach_error) = client
                .add_team(&organization, &project.slug, team_slug)
                .await
            {
                warn!(%attach_error, repository = %repository.full_name, "team attachment failed");
                context.note_progress(format!(
                    "could not attach team {team_slug} to {}: {attach_error}",
                    repository.full_name
                ));
            }
        }

        context
            .run_query(
                INSERT_IDENTIFIER,
                json!({
                    "external_id": repository.id.to_string(),
                    "integration_name": descriptor.integration_name(),
                    "project_id": project.id.0,
                    "username": context.actor().username,
                }),
                "insert-project-identifiers",
            )
            .await?;
        context.note_progress(format!(
            "registered GitHub identifier {} for project {}",
            repository.id, project.id
        ));

        if let Some(link_type_id) = self.settings.project_link_type_id {
            context
                .run_query(
                    INSERT_LINK,
                    json!({
                        "project_id": project.id.0,
                        "link_type_id": link_type_id,
                        "username": context.actor().username,
                        "url": repository.html_url,
                    }),
                    "insert-project-links",
                )
                .await?;
            context.note_progress(format!(
                "created GitHub link {} for project {}",
                repository.html_url, project.id
            ));
        }
        Ok(())
    }
}

/// Compensating action: deletes the repository recorded in scratch.
struct DeleteRepository {
    clients: Arc<dyn ClientFactory>,
}

#[async_trait]
impl Compensation for DeleteRepository {
    async fn run(
        &self,
        context: &mut AutomationContext,
        _error: &ActionError,
    ) -> CompensationResult {
        let Some(scratch) = context.take_stashed::<GitHubScratch>(SCRATCH_KEY) else {
            return Ok(());
        };

        let client = match self
            .clients
            .github(&scratch.integration_name, context.actor())
            .await
        {
            Ok(client) => client,
            Err(acquire_error) if acquire_error.is_unavailable() => {
                // credentials vanished between forward and compensating
                // execution; the rollback cannot happen and is skipped
                warn!(%acquire_error, "skipping GitHub repository rollback");
                return Ok(());
            }
            Err(acquire_error) => return Err(CompensationError::new(acquire_error.to_string())),
        };

        context.note_progress(format!(
            "removing GitHub repository {} due to error",
            scratch.repository.full_name
        ));
        match client
            .delete_repository(&scratch.organization, &scratch.repository.name)
            .await
        {
            Ok(()) => Ok(()),
            // already gone counts as undone
            Err(delete_error) if delete_error.is_not_found() => Ok(()),
            Err(delete_error) => Err(CompensationError::new(delete_error.to_string())),
        }
    }
}
