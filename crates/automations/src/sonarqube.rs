//!
//! # SonarQube project automation
//!
//! Creates the code-quality project keyed by namespace and project
//! slug, registers the key as a project identifier and, when a GitHub
//! repository was created earlier in the same saga, wires up
//! pull-request decoration as a best-effort extra.
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

use crate::clients::{ClientFactory, SonarQubeProject};
use crate::config::SonarQubeSettings;
use crate::github;
use crate::github::GitHubScratch;
use crate::models::Subject;

pub const SLUG: &str = "sonarqube-project";

const SCRATCH_KEY: &str = "sonarqube.create-project";

const INSERT_IDENTIFIER: &str = "INSERT INTO v1.project_identifiers \
     (external_id, integration_name, project_id, created_at, created_by) \
     VALUES (:external_id, :integration_name, :project_id, CURRENT_TIMESTAMP, :username)";

const INSERT_LINK: &str = "INSERT INTO v1.project_links \
     (project_id, link_type_id, created_by, url) \
     VALUES (:project_id, :link_type_id, :username, :url)";

/// Project key in SonarQube, namespaced the same way dashboards group
/// them.
pub fn project_key(namespace_slug: &str, project_slug: &str) -> String {
    format!("{namespace_slug}:{project_slug}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SonarQubeScratch {
    integration_name: String,
    project: SonarQubeProject,
}

/// Forward action for [`SLUG`].
pub struct CreateProject {
    clients: Arc<dyn ClientFactory>,
    settings: SonarQubeSettings,
}

impl CreateProject {
    pub fn new(clients: Arc<dyn ClientFactory>, settings: SonarQubeSettings) -> Self {
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
        let key = project_key(&project.namespace.slug, &project.slug);

        let client = self
            .clients
            .sonarqube(descriptor.integration_name())
            .await?;
        let sonar_project = client.create_project(&key, &project.name).await?;

        context.stash(
            SCRATCH_KEY,
            &SonarQubeScratch {
                integration_name: descriptor.integration_name().to_string(),
                project: sonar_project.clone(),
            },
        )?;
        context.add_callback(RemoveProject {
            clients: self.clients.clone(),
        });
        context.note_progress(format!(
            "created SonarQube project {} for project {}",
            sonar_project.key, project.id
        ));

        context
            .run_query(
                INSERT_IDENTIFIER,
                json!({
                    "external_id": sonar_project.key,
                    "integration_name": descriptor.integration_name(),
                    "project_id": project.id.0,
                    "username": context.actor().username,
                }),
                "insert-project-identifiers",
            )
            .await?;
        context.note_progress(format!(
            "registered SonarQube identifier {} for project {}",
            sonar_project.key, project.id
        ));

        if let Some(link_type_id) = self.settings.project_link_type_id {
            context
                .run_query(
                    INSERT_LINK,
                    json!({
                        "project_id": project.id.0,
                        "link_type_id": link_type_id,
                        "username": context.actor().username,
                        "url": sonar_project.dashboard_url,
                    }),
                    "insert-project-links",
                )
                .await?;
            context.note_progress(format!(
                "created SonarQube link {} for project {}",
                sonar_project.dashboard_url, project.id
            ));
        }

        // best effort: decorate pull requests when this saga also
        // created the repository
        if let Some(repo) = context.stashed::<GitHubScratch>(github::SCRATCH_KEY) {
            match client
                .enable_pr_decoration(&sonar_project.key, repo.repository.id)
                .await
            {
                Ok(()) => context.note_progress(format!(
                    "enabled pull-request decoration for {} on repository {}",
                    sonar_project.key, repo.repository.full_name
                )),
                Err(decoration_error) => {
                    warn!(%decoration_error, key = %sonar_project.key, "PR decoration failed");
                    context.note_progress(format!(
                        "could not enable pull-request decoration for {}: {decoration_error}",
                        sonar_project.key
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Compensating action: removes the SonarQube project recorded in
/// scratch.
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
        let Some(scratch) = context.take_stashed::<SonarQubeScratch>(SCRATCH_KEY) else {
            return Ok(());
        };

        let client = match self.clients.sonarqube(&scratch.integration_name).await {
            Ok(client) => client,
            Err(acquire_error) if acquire_error.is_unavailable() => {
                warn!(%acquire_error, "skipping SonarQube project rollback");
                return Ok(());
            }
            Err(acquire_error) => return Err(CompensationError::new(acquire_error.to_string())),
        };

        context.note_progress(format!(
            "removing SonarQube project {} due to error",
            scratch.project.key
        ));
        match client.remove_project(&scratch.project.key).await {
            Ok(()) => Ok(()),
            Err(remove_error) if remove_error.is_not_found() => Ok(()),
            Err(remove_error) => Err(CompensationError::new(remove_error.to_string())),
        }
    }
}
