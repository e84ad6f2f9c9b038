//!
//! # Error taxonomy for the automation engine
//!
//! Distinguishes caller-facing failures (surfaced verbatim to the end
//! user) from operational failures (wrapped and reported generically).
//!

use serde::Serialize;
use thiserror::Error;

use crate::query::QueryError;

/// How a failed automation surfaces to the caller.
///
/// The orchestrator is the only consumer: `CallerFacing` errors pass
/// through unchanged, `Operational` errors are wrapped in
/// [`OrchestrationError::AutomationFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The caller can fix this; show them the message.
    CallerFacing,

    /// Internal or collaborator failure; hide the detail behind a
    /// generic operational error.
    Operational,
}

/// Error returned by a forward automation action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A problem the caller is expected to correct, e.g. a
    /// misconfigured namespace. Surfaced verbatim.
    #[error("{message}")]
    Domain { message: String },

    /// The integration's client could not be acquired, e.g. missing
    /// credentials. Raised before any side effect for the step.
    #[error("integration {integration} is not available: {reason}")]
    ClientUnavailable { integration: String, reason: String },

    /// The external system rejected or failed the call.
    #[error("{integration} call failed: {message}")]
    Integration { integration: String, message: String },

    /// Identifier/link persistence failed. Critical: triggers rollback
    /// of the step's own creation and everything before it.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Engine-side defect, e.g. scratch state that does not serialize.
    #[error("internal automation error: {message}")]
    Internal { message: String },
}

impl ActionError {
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain {
            message: message.into(),
        }
    }

    pub fn client_unavailable(
        integration: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ClientUnavailable {
            integration: integration.into(),
            reason: reason.into(),
        }
    }

    pub fn integration(integration: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Integration {
            integration: integration.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The single classification point between "the user's fault" and
    /// "an operational failure". Every new variant must be placed here
    /// deliberately instead of being classified ad hoc at call sites.
    pub fn disposition(&self) -> Disposition {
        match self {
            ActionError::Domain { .. } => Disposition::CallerFacing,
            ActionError::ClientUnavailable { .. }
            | ActionError::Integration { .. }
            | ActionError::Query(_)
            | ActionError::Internal { .. } => Disposition::Operational,
        }
    }
}

/// Failure of a compensating action.
///
/// Rollback is best effort: the context logs these and keeps draining
/// the stack, so this error never propagates out of an unwind.
#[derive(Debug, Error)]
#[error("compensation failed: {message}")]
pub struct CompensationError {
    pub message: String,
}

impl CompensationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<QueryError> for CompensationError {
    fn from(error: QueryError) -> Self {
        Self::new(error.to_string())
    }
}

/// Error returned by [`run_automations`](crate::orchestrator::run_automations).
///
/// Callers must distinguish the two variants: `Domain` is meant for the
/// end user, `AutomationFailed` is an internal failure that should be
/// translated to a generic 5xx-style response.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Caller-facing failure, passed through from the action verbatim.
    #[error("{message}")]
    Domain { message: String },

    /// An automation failed operationally. All compensations registered
    /// up to that point have already run.
    #[error("automation {slug} failed: {source}")]
    AutomationFailed {
        slug: String,
        #[source]
        source: ActionError,
    },
}

impl OrchestrationError {
    /// Slug of the automation that failed, when one did.
    pub fn failed_slug(&self) -> Option<&str> {
        match self {
            OrchestrationError::AutomationFailed { slug, .. } => Some(slug),
            OrchestrationError::Domain { .. } => None,
        }
    }
}

/// Validation buckets reported by the resolver.
///
/// All three buckets are gathered before reporting so the caller can
/// return one complete, actionable error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionFailure {
    /// Requested slugs with no registered descriptor.
    pub nonexistent: Vec<String>,

    /// Requested automations that do not apply to the subject type.
    pub invalid: Vec<String>,

    /// Dependencies of requested automations that were not themselves
    /// requested. Never pulled in silently.
    pub missing_required: Vec<String>,
}

impl ResolutionFailure {
    pub fn is_empty(&self) -> bool {
        self.nonexistent.is_empty() && self.invalid.is_empty() && self.missing_required.is_empty()
    }
}

/// Error returned by [`AutomationRegistry::resolve`](crate::resolver::AutomationRegistry::resolve).
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The request referenced unknown, inapplicable or incompletely
    /// specified automations. Caller-facing.
    #[error("automation request failed validation")]
    Validation(ResolutionFailure),

    /// The requested automations' dependencies contain a cycle. This is
    /// a configuration defect, not a user error.
    #[error("dependency cycle among automations: {0:?}")]
    Cycle(Vec<String>),
}

/// Error raised while building an [`AutomationRegistry`](crate::resolver::AutomationRegistry).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate automation slug {0}")]
    DuplicateSlug(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_caller_facing() {
        let error = ActionError::domain("namespace is missing a group");
        assert_eq!(error.disposition(), Disposition::CallerFacing);
        assert_eq!(error.to_string(), "namespace is missing a group");
    }

    #[test]
    fn collaborator_errors_are_operational() {
        let errors = [
            ActionError::client_unavailable("github", "no credentials"),
            ActionError::integration("sentry", "503 from upstream"),
            ActionError::Query(QueryError::new("insert-identifiers", "connection reset")),
            ActionError::internal("scratch did not serialize"),
        ];
        for error in errors {
            assert_eq!(error.disposition(), Disposition::Operational);
        }
    }

    #[test]
    fn resolution_failure_reports_all_buckets() {
        let failure = ResolutionFailure {
            nonexistent: vec!["missing".into()],
            invalid: vec!["wrong-type".into()],
            missing_required: vec!["github-repository".into()],
        };
        assert!(!failure.is_empty());
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["nonexistent"][0], "missing");
        assert_eq!(json["missing_required"][0], "github-repository");
    }
}
