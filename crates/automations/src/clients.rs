//!
//! # Integration client ports
//!
//! The automations depend only on the create/delete contracts of the
//! four integrations; the concrete HTTP wrappers live with the
//! embedding application. Clients are created fresh per saga through
//! the [`ClientFactory`] port.
//!

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use slipway_saga_core::{ActionError, Actor};

#[derive(Debug, Error)]
pub enum ClientError {
    /// The integration cannot be used at all right now: disabled, not
    /// configured or missing credentials.
    #[error("integration {integration} is not available: {reason}")]
    Unavailable { integration: String, reason: String },

    /// The resource addressed by the call does not exist. Delete call
    /// sites treat this as success.
    #[error("{integration}: {resource} not found")]
    NotFound {
        integration: String,
        resource: String,
    },

    /// Any other failure from the external API.
    #[error("{integration} API call failed: {message}")]
    Api {
        integration: String,
        message: String,
    },
}

impl ClientError {
    pub fn unavailable(integration: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            integration: integration.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(integration: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::NotFound {
            integration: integration.into(),
            resource: resource.into(),
        }
    }

    pub fn api(integration: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            integration: integration.into(),
            message: message.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ClientError::Unavailable { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

impl From<ClientError> for ActionError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Unavailable {
                integration,
                reason,
            } => ActionError::ClientUnavailable {
                integration,
                reason,
            },
            ClientError::NotFound {
                integration,
                resource,
            } => ActionError::Integration {
                integration,
                message: format!("{resource} not found"),
            },
            ClientError::Api {
                integration,
                message,
            } => ActionError::Integration {
                integration,
                message,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
}

#[async_trait]
pub trait GitHubClient: Send + Sync {
    async fn create_repository(
        &self,
        organization: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Repository, ClientError>;

    /// Grant a team access to a repository. Secondary embellishment.
    async fn add_team(
        &self,
        organization: &str,
        repository: &str,
        team_slug: &str,
    ) -> Result<(), ClientError>;

    async fn delete_repository(&self, organization: &str, name: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentryProject {
    pub slug: String,
    pub link: String,
    /// Client keys issued with the project, e.g. `dsn`.
    pub keys: BTreeMap<String, String>,
}

#[async_trait]
pub trait SentryClient: Send + Sync {
    async fn create_project(
        &self,
        team_slug: &str,
        name: &str,
    ) -> Result<SentryProject, ClientError>;

    async fn remove_project(&self, slug: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagerDutyService {
    pub id: String,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundIntegration {
    pub integration_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDependency {
    pub id: String,
}

#[async_trait]
pub trait PagerDutyClient: Send + Sync {
    async fn create_service(
        &self,
        name: &str,
        escalation_policy: &str,
    ) -> Result<PagerDutyService, ClientError>;

    /// Events API hook for the service. A child resource: deleting the
    /// service deletes it too.
    async fn create_inbound_integration(
        &self,
        service_id: &str,
    ) -> Result<InboundIntegration, ClientError>;

    async fn add_service_dependency(
        &self,
        service_id: &str,
        depends_on_service_id: &str,
    ) -> Result<ServiceDependency, ClientError>;

    async fn remove_service_dependency(&self, dependency_id: &str) -> Result<(), ClientError>;

    async fn remove_service(&self, service_id: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SonarQubeProject {
    pub key: String,
    pub dashboard_url: String,
}

#[async_trait]
pub trait SonarQubeClient: Send + Sync {
    async fn create_project(
        &self,
        key: &str,
        name: &str,
    ) -> Result<SonarQubeProject, ClientError>;

    /// Wire pull-request decoration to a source-control repository.
    /// Secondary embellishment.
    async fn enable_pr_decoration(
        &self,
        project_key: &str,
        repository_id: i64,
    ) -> Result<(), ClientError>;

    async fn remove_project(&self, key: &str) -> Result<(), ClientError>;
}

/// Authenticated-client source, implemented by the embedding
/// application. Acquisition failures surface as
/// [`ClientError::Unavailable`] before any side effect happens for the
/// step. The actor is passed through for integrations that use
/// user-scoped credentials.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn github(
        &self,
        integration_name: &str,
        actor: &Actor,
    ) -> Result<Arc<dyn GitHubClient>, ClientError>;

    async fn sentry(&self, integration_name: &str) -> Result<Arc<dyn SentryClient>, ClientError>;

    async fn pagerduty(
        &self,
        integration_name: &str,
    ) -> Result<Arc<dyn PagerDutyClient>, ClientError>;

    async fn sonarqube(
        &self,
        integration_name: &str,
    ) -> Result<Arc<dyn SonarQubeClient>, ClientError>;
}
