//!
//! # Catalog subjects
//!
//! The records automations run against: a project with its namespace
//! and project type, or a dependency between two projects. Subjects are
//! hydrated by the caller through the [`SubjectLoader`] port before the
//! saga starts.
//!

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use slipway_saga_core::SubjectTypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    pub slug: String,
    /// Organization/group in the source-control host, when provisioned.
    pub source_control_group: Option<String>,
    /// Team slug in the error tracker; absent means the integration is
    /// not enabled for this namespace.
    pub error_tracking_team: Option<String>,
    /// Escalation policy id in the on-call service; absent means the
    /// integration is not enabled for this namespace.
    pub on_call_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectType {
    pub id: SubjectTypeId,
    pub name: String,
    pub slug: String,
    /// Path prefix under the namespace group in the source-control host.
    pub source_control_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub namespace: Namespace,
    pub project_type: ProjectType,
}

/// A directed dependency: `project` depends on `dependency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDependency {
    pub project: Project,
    pub dependency: Project,
}

/// What one saga runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    Project(Project),
    Dependency(ProjectDependency),
}

impl Subject {
    pub fn subject_type(&self) -> SubjectTypeId {
        match self {
            Subject::Project(project) => project.project_type.id,
            Subject::Dependency(dependency) => dependency.project.project_type.id,
        }
    }

    pub fn as_project(&self) -> Option<&Project> {
        match self {
            Subject::Project(project) => Some(project),
            Subject::Dependency(_) => None,
        }
    }

    pub fn as_dependency(&self) -> Option<&ProjectDependency> {
        match self {
            Subject::Dependency(dependency) => Some(dependency),
            Subject::Project(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SubjectLoadError {
    #[error("project {id} not found")]
    NotFound { id: ProjectId },

    #[error("subject lookup failed: {message}")]
    Backend { message: String },
}

/// Hydrates subject records from the catalog. Implemented by the
/// embedding application; the automations only read the result.
#[async_trait]
pub trait SubjectLoader: Send + Sync {
    async fn load_project(&self, id: ProjectId) -> Result<Project, SubjectLoadError>;

    async fn load_dependency(
        &self,
        project_id: ProjectId,
        dependency_id: ProjectId,
    ) -> Result<ProjectDependency, SubjectLoadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(type_id: i32) -> Project {
        Project {
            id: ProjectId(1),
            name: "Example".into(),
            slug: "example".into(),
            description: None,
            namespace: Namespace {
                name: "Platform".into(),
                slug: "platform".into(),
                source_control_group: Some("platform".into()),
                error_tracking_team: None,
                on_call_policy: None,
            },
            project_type: ProjectType {
                id: SubjectTypeId(type_id),
                name: "HTTP API".into(),
                slug: "http-api".into(),
                source_control_prefix: Some("apis".into()),
            },
        }
    }

    #[test]
    fn subject_type_comes_from_the_project() {
        let subject = Subject::Project(project(7));
        assert_eq!(subject.subject_type(), SubjectTypeId(7));
        assert!(subject.as_project().is_some());
        assert!(subject.as_dependency().is_none());
    }

    #[test]
    fn dependency_subject_uses_the_depending_projects_type() {
        let subject = Subject::Dependency(ProjectDependency {
            project: project(3),
            dependency: project(9),
        });
        assert_eq!(subject.subject_type(), SubjectTypeId(3));
        assert!(subject.as_dependency().is_some());
    }
}
