//!
//! # Orchestrator
//!
//! Runs an already-ordered list of automations against one subject with
//! saga semantics: strictly sequential execution, and on the first
//! failure a reverse-order unwind of every compensating action
//! registered so far before the failure is reported.
//!

use std::sync::Arc;

use tracing::{debug, info};

use crate::context::{Actor, AutomationContext, AutomationNote, CompensatingAction};
use crate::descriptor::AutomationDescriptor;
use crate::error::{Disposition, OrchestrationError};
use crate::query::QueryExecutor;

/// Run `automations` in order against `subject`.
///
/// The list must already be dependency-ordered (see
/// [`AutomationRegistry::resolve`](crate::resolver::AutomationRegistry::resolve));
/// ordering is not re-validated here. `extra_callbacks` are registered
/// before the first automation runs so a caller can undo its own side
/// effects, such as deleting the subject row it just inserted. They are
/// never invoked when `automations` is empty.
///
/// On success the compensation stack is discarded untouched and the
/// audit notes are returned. On the first failure the context unwinds
/// every registered compensation, then the error is classified once:
/// caller-facing failures pass through verbatim as
/// [`OrchestrationError::Domain`], anything operational is wrapped in
/// [`OrchestrationError::AutomationFailed`] naming the failing slug.
pub async fn run_automations<S>(
    automations: &[Arc<AutomationDescriptor<S>>],
    subject: &S,
    actor: Actor,
    query: Arc<dyn QueryExecutor>,
    extra_callbacks: Vec<CompensatingAction>,
) -> Result<Vec<AutomationNote>, OrchestrationError>
where
    S: Send + Sync,
{
    if automations.is_empty() {
        debug!("no automations requested, nothing to run");
        return Ok(Vec::new());
    }

    let mut context = AutomationContext::new(actor, query);
    for callback in extra_callbacks {
        context.add_boxed_callback(callback);
    }

    info!(
        saga_id = %context.saga_id(),
        order = ?automations.iter().map(|d| d.slug()).collect::<Vec<_>>(),
        "running automations"
    );

    for descriptor in automations {
        if let Err(error) = context.run_action(descriptor, subject).await {
            // the one guaranteed cleanup point for the whole saga
            context.unwind(&error).await;
            return Err(match error.disposition() {
                Disposition::CallerFacing => OrchestrationError::Domain {
                    message: error.to_string(),
                },
                Disposition::Operational => OrchestrationError::AutomationFailed {
                    slug: descriptor.slug().to_string(),
                    source: error,
                },
            });
        }
    }

    info!(saga_id = %context.saga_id(), "all automations completed");
    Ok(context.into_notes())
}
