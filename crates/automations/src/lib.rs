//!
//! # slipway-automations
//!
//! Provisioning automations for the slipway service catalog: when a
//! project or a project dependency is created, these actions create the
//! matching resources in the source-control host, error tracker,
//! on-call service and code-quality service, registering a compensating
//! delete for every side effect.
//!
//! Every integration follows the same shape:
//!
//! 1. acquire an authenticated client (failure here means nothing to
//!    roll back yet),
//! 2. perform the primary creation call,
//! 3. register the compensating delete and stash the created identity
//!    before any further bookkeeping,
//! 4. note progress,
//! 5. run best-effort embellishments whose failures are logged, not
//!    fatal,
//! 6. persist identifier and link rows through the saga's query
//!    capability.
//!
//! Concrete HTTP clients and the persistence backend are ports
//! implemented by the embedding application.
//!

pub mod catalog;
pub mod clients;
pub mod config;
pub mod github;
pub mod models;
pub mod pagerduty;
pub mod sentry;
pub mod sonarqube;

pub use catalog::builtin_registry;
pub use clients::{
    ClientError, ClientFactory, GitHubClient, InboundIntegration, PagerDutyClient,
    PagerDutyService, Repository, SentryClient, SentryProject, ServiceDependency,
    SonarQubeClient, SonarQubeProject,
};
pub use config::{
    AutomationSettings, ConfigError, GitHubSettings, PagerDutySettings, SentrySettings,
    SonarQubeSettings,
};
pub use models::{
    Namespace, Project, ProjectDependency, ProjectId, ProjectType, Subject, SubjectLoadError,
    SubjectLoader,
};
