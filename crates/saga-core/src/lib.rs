//!
//! # slipway-saga-core
//!
//! Compensating-transaction engine for service-catalog provisioning.
//!
//! When a project (or a dependency between two projects) is created,
//! an ordered sequence of provisioning *automations* runs against
//! external systems. Every automation registers a compensating action
//! for each side effect it performs; if a later automation fails, the
//! whole stack unwinds in reverse registration order, best effort.
//!
//! The engine is deliberately small and non-durable: an in-flight saga
//! lives only as long as the call that started it, automations run one
//! at a time, and there is no watchdog. Persistence and external API
//! clients are capabilities injected by the caller.
//!
//! ```ignore
//! let ordered = registry.resolve(&requested, project.subject_type())?;
//! let notes = run_automations(
//!     &ordered,
//!     &subject,
//!     Actor::new(username),
//!     query_executor,
//!     vec![Box::new(QueryCompensation::new(
//!         "delete-project",
//!         "DELETE FROM v1.projects WHERE id = :id",
//!         json!({"id": project_id}),
//!     ))],
//! )
//! .await?;
//! ```
//!

pub mod context;
pub mod descriptor;
pub mod error;
pub mod orchestrator;
pub mod query;
pub mod resolver;

pub use context::{
    Actor, AutomationContext, AutomationNote, CompensatingAction, Compensation,
    CompensationResult, QueryCompensation,
};
pub use descriptor::{AutomationAction, AutomationDescriptor, SubjectTypeId};
pub use error::{
    ActionError, CompensationError, Disposition, OrchestrationError, RegistryError,
    ResolutionFailure, ResolveError,
};
pub use orchestrator::run_automations;
pub use query::{QueryError, QueryExecutor, QueryParameters, RowSet};
pub use resolver::AutomationRegistry;
