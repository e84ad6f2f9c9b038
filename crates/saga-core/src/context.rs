//!
//! # Automation context
//!
//! The per-saga execution environment. A context is created once per
//! orchestration, lives exactly as long as the sequential execution of
//! the ordered automation list, and is discarded when the call returns,
//! successfully or after rollback. Contexts are never shared between
//! sagas.
//!
//! The context carries:
//!
//! - the acting user, used only for audit fields passed to collaborators,
//! - the caller's query-execution capability,
//! - an append-only log of progress notes, surfaced to end users as an
//!   audit trail,
//! - a LIFO stack of compensating actions, and
//! - a scratch store letting a forward action stash state for its own
//!   compensating action, keyed by an explicit per-action key.
//!
//! ```text
//! Forward:       [step 1] -> [step 2] -> [step 3] -> FAIL
//! Compensation:                          [comp 3] -> [comp 2] -> [comp 1]
//! ```
//!

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::descriptor::AutomationDescriptor;
use crate::error::{ActionError, CompensationError};
use crate::query::{QueryError, QueryExecutor, QueryParameters, RowSet};

/// The acting user. Opaque to the engine; collaborators receive it for
/// audit columns and user-scoped credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub username: String,
}

impl Actor {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// One entry in the saga's audit trail.
///
/// Notes may be returned in an API response, so nothing sensitive
/// belongs in the message. The engine does not scrub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationNote {
    pub when: DateTime<Utc>,
    pub integration_name: Option<String>,
    pub automation_slug: Option<String>,
    pub message: String,
}

pub type CompensationResult = Result<(), CompensationError>;

/// A compensating action, registered by a forward action immediately
/// after a side effect that would need undoing.
///
/// Once registered, the context exclusively owns the action until it
/// either runs it (on failure) or discards the whole stack (on
/// success). Implementations retrieve their forward action's state from
/// the context's scratch store.
#[async_trait]
pub trait Compensation: Send + Sync {
    async fn run(
        &self,
        context: &mut AutomationContext,
        error: &ActionError,
    ) -> CompensationResult;
}

pub type CompensatingAction = Box<dyn Compensation>;

/// Compensation that executes a single statement through the context's
/// query capability. Callers use this for simple "delete the row we
/// just inserted" cleanup; anything more involved should implement
/// [`Compensation`] directly.
pub struct QueryCompensation {
    metric_name: String,
    statement: String,
    parameters: QueryParameters,
}

impl QueryCompensation {
    pub fn new(
        metric_name: impl Into<String>,
        statement: impl Into<String>,
        parameters: QueryParameters,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            statement: statement.into(),
            parameters,
        }
    }
}

#[async_trait]
impl Compensation for QueryCompensation {
    async fn run(
        &self,
        context: &mut AutomationContext,
        _error: &ActionError,
    ) -> CompensationResult {
        context.note_progress(format!("running cleanup query {}", self.metric_name));
        context
            .run_query(&self.statement, self.parameters.clone(), &self.metric_name)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CurrentAutomation {
    slug: String,
    integration_name: String,
}

/// Execution environment for one saga.
pub struct AutomationContext {
    saga_id: Uuid,
    actor: Actor,
    query: Arc<dyn QueryExecutor>,
    notes: Vec<AutomationNote>,
    cleanups: Vec<CompensatingAction>,
    scratch: HashMap<&'static str, serde_json::Value>,
    current: Option<CurrentAutomation>,
    unwound: bool,
}

impl AutomationContext {
    pub fn new(actor: Actor, query: Arc<dyn QueryExecutor>) -> Self {
        let saga_id = Uuid::new_v4();
        debug!(%saga_id, actor = %actor.username, "created automation context");
        Self {
            saga_id,
            actor,
            query,
            notes: Vec::new(),
            cleanups: Vec::new(),
            scratch: HashMap::new(),
            current: None,
            unwound: false,
        }
    }

    pub fn saga_id(&self) -> Uuid {
        self.saga_id
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Slug of the executing automation, if one is active.
    pub fn current_automation(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.slug.as_str())
    }

    /// Integration of the executing automation, if one is active.
    pub fn current_integration(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.integration_name.as_str())
    }

    pub fn notes(&self) -> &[AutomationNote] {
        &self.notes
    }

    pub fn into_notes(self) -> Vec<AutomationNote> {
        self.notes
    }

    /// Append a note to the audit trail, stamped with the executing
    /// automation. Never fails. Mirrored to the log at info level, so
    /// callers are responsible for redacting secrets.
    pub fn note_progress(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(
            saga_id = %self.saga_id,
            automation = self.current_automation().unwrap_or("-"),
            integration = self.current_integration().unwrap_or("-"),
            "{message}"
        );
        let integration_name = self.current_integration().map(str::to_string);
        let automation_slug = self.current_automation().map(str::to_string);
        self.notes.push(AutomationNote {
            when: Utc::now(),
            integration_name,
            automation_slug,
            message,
        });
    }

    /// Execute a statement through the saga's query capability.
    pub async fn run_query(
        &self,
        statement: &str,
        parameters: QueryParameters,
        metric_name: &str,
    ) -> Result<RowSet, QueryError> {
        self.query.execute(statement, parameters, metric_name).await
    }

    /// Push a compensating action onto the stack. Pure registration; the
    /// action runs only if the saga later fails.
    pub fn add_callback(&mut self, action: impl Compensation + 'static) {
        self.add_boxed_callback(Box::new(action));
    }

    pub fn add_boxed_callback(&mut self, action: CompensatingAction) {
        if self.unwound {
            warn!(
                saga_id = %self.saga_id,
                "compensating action registered after unwind; it will never run"
            );
        }
        self.cleanups.push(action);
    }

    /// Number of registered, not-yet-run compensating actions.
    pub fn pending_compensations(&self) -> usize {
        self.cleanups.len()
    }

    /// Stash state for the calling action's own compensation. The key is
    /// an explicit per-action constant; no other action may read it
    /// unless the owner publishes the key.
    pub fn stash<T: Serialize>(&mut self, key: &'static str, value: &T) -> Result<(), ActionError> {
        let value = serde_json::to_value(value).map_err(|error| {
            ActionError::internal(format!("scratch value for {key} did not serialize: {error}"))
        })?;
        self.scratch.insert(key, value);
        Ok(())
    }

    /// Read a scratch entry without removing it.
    pub fn stashed<T: DeserializeOwned>(&self, key: &'static str) -> Option<T> {
        let value = self.scratch.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(decode_error) => {
                error!(saga_id = %self.saga_id, key, %decode_error, "scratch entry did not decode");
                None
            }
        }
    }

    /// Remove and return a scratch entry. Compensations use this so a
    /// second unwind trigger finds nothing to undo.
    pub fn take_stashed<T: DeserializeOwned>(&mut self, key: &'static str) -> Option<T> {
        let value = self.scratch.remove(key)?;
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(decode_error) => {
                error!(saga_id = %self.saga_id, key, %decode_error, "scratch entry did not decode");
                None
            }
        }
    }

    /// Invoke one automation's forward action with this context.
    ///
    /// A thin pass-through: the action's error is returned unchanged and
    /// no unwinding happens here. The orchestrator owns the single
    /// guaranteed cleanup point.
    pub async fn run_action<S>(
        &mut self,
        descriptor: &AutomationDescriptor<S>,
        subject: &S,
    ) -> Result<(), ActionError>
    where
        S: Send + Sync,
    {
        debug!(saga_id = %self.saga_id, automation = descriptor.slug(), "running automation");
        self.current = Some(CurrentAutomation {
            slug: descriptor.slug().to_string(),
            integration_name: descriptor.integration_name().to_string(),
        });
        let action = descriptor.action();
        let result = action.execute(self, descriptor, subject).await;
        self.current = None;
        if let Err(action_error) = &result {
            error!(
                saga_id = %self.saga_id,
                automation = descriptor.slug(),
                %action_error,
                pending_compensations = self.cleanups.len(),
                "automation failed"
            );
        }
        result
    }

    /// Drain the compensation stack, most-recent-first, passing each
    /// action the context and the triggering error.
    ///
    /// A failing compensation is logged and deliberately discarded so
    /// that cleanup of the remaining stack always proceeds. Draining up
    /// front makes a second trigger a structural no-op: every action runs
    /// at most once. The context is terminal afterwards.
    pub async fn unwind(&mut self, automation_error: &ActionError) {
        if self.unwound {
            debug!(saga_id = %self.saga_id, "context already unwound");
            return;
        }
        self.unwound = true;
        let cleanups = std::mem::take(&mut self.cleanups);
        info!(
            saga_id = %self.saga_id,
            count = cleanups.len(),
            "unwinding compensating actions"
        );
        for cleanup in cleanups.into_iter().rev() {
            if let Err(failure) = cleanup.run(self, automation_error).await {
                // best effort: one failed rollback must not block the rest
                error!(saga_id = %self.saga_id, %failure, "compensating action failed, continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::descriptor::AutomationAction;

    struct NullExecutor;

    #[async_trait]
    impl QueryExecutor for NullExecutor {
        async fn execute(
            &self,
            _statement: &str,
            _parameters: QueryParameters,
            _metric_name: &str,
        ) -> Result<RowSet, QueryError> {
            Ok(RowSet::empty())
        }
    }

    struct RecordingExecutor {
        statements: Mutex<Vec<(String, QueryParameters, String)>>,
    }

    #[async_trait]
    impl QueryExecutor for RecordingExecutor {
        async fn execute(
            &self,
            statement: &str,
            parameters: QueryParameters,
            metric_name: &str,
        ) -> Result<RowSet, QueryError> {
            self.statements.lock().unwrap().push((
                statement.to_string(),
                parameters,
                metric_name.to_string(),
            ));
            Ok(RowSet::empty())
        }
    }

    struct RecordingCompensation {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Compensation for RecordingCompensation {
        async fn run(
            &self,
            _context: &mut AutomationContext,
            error: &ActionError,
        ) -> CompensationResult {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, error));
            if self.fail {
                return Err(CompensationError::new(format!("{} broke", self.label)));
            }
            Ok(())
        }
    }

    struct NoteAction {
        message: &'static str,
        fail_with: Option<fn() -> ActionError>,
    }

    #[async_trait]
    impl AutomationAction<()> for NoteAction {
        async fn execute(
            &self,
            context: &mut AutomationContext,
            _descriptor: &AutomationDescriptor<()>,
            _subject: &(),
        ) -> Result<(), ActionError> {
            context.note_progress(self.message);
            if let Some(make_error) = self.fail_with {
                return Err(make_error());
            }
            Ok(())
        }
    }

    fn context() -> AutomationContext {
        AutomationContext::new(Actor::new("test-user"), Arc::new(NullExecutor))
    }

    fn descriptor(slug: &str, action: NoteAction) -> AutomationDescriptor<()> {
        AutomationDescriptor::new(slug, "test-integration", Arc::new(action))
    }

    #[tokio::test]
    async fn callbacks_run_on_unwind_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut context = context();
        for label in ["first", "second", "third"] {
            context.add_callback(RecordingCompensation {
                label,
                log: log.clone(),
                fail: false,
            });
        }

        let error = ActionError::integration("github", "boom");
        context.unwind(&error).await;

        let ran = log.lock().unwrap().clone();
        assert_eq!(
            ran,
            vec![
                "third:github call failed: boom",
                "second:github call failed: boom",
                "first:github call failed: boom",
            ]
        );
    }

    #[tokio::test]
    async fn callbacks_do_not_run_on_success() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let mut context = context();
            context.add_callback(RecordingCompensation {
                label: "only",
                log: log.clone(),
                fail: false,
            });
            // context dropped without unwind: the stack is discarded
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_callback_does_not_stop_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut context = context();
        context.add_callback(RecordingCompensation {
            label: "first",
            log: log.clone(),
            fail: false,
        });
        context.add_callback(RecordingCompensation {
            label: "second",
            log: log.clone(),
            fail: true,
        });

        context.unwind(&ActionError::domain("bad input")).await;

        let ran = log.lock().unwrap().clone();
        assert_eq!(ran.len(), 2, "the failing cleanup must not block the first one");
        assert!(ran[0].starts_with("second:"));
        assert!(ran[1].starts_with("first:"));
    }

    #[tokio::test]
    async fn unwind_runs_each_callback_exactly_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut context = context();
        context.add_callback(RecordingCompensation {
            label: "once",
            log: log.clone(),
            fail: false,
        });

        let error = ActionError::integration("sentry", "down");
        context.unwind(&error).await;
        context.unwind(&error).await;

        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_action_stamps_notes_with_the_automation() {
        let mut context = context();
        let descriptor = descriptor(
            "create-widget",
            NoteAction {
                message: "widget created",
                fail_with: None,
            },
        );

        context.run_action(&descriptor, &()).await.unwrap();

        assert!(context.current_automation().is_none());
        let notes = context.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].automation_slug.as_deref(), Some("create-widget"));
        assert_eq!(
            notes[0].integration_name.as_deref(),
            Some("test-integration")
        );
        assert_eq!(notes[0].message, "widget created");
    }

    #[tokio::test]
    async fn run_action_returns_the_error_unchanged_and_does_not_unwind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut context = context();
        context.add_callback(RecordingCompensation {
            label: "pending",
            log: log.clone(),
            fail: false,
        });
        let descriptor = descriptor(
            "explodes",
            NoteAction {
                message: "about to fail",
                fail_with: Some(|| ActionError::integration("github", "502")),
            },
        );

        let result = context.run_action(&descriptor, &()).await;

        assert!(matches!(
            result,
            Err(ActionError::Integration { ref integration, .. }) if integration == "github"
        ));
        assert!(context.current_automation().is_none());
        assert!(
            log.lock().unwrap().is_empty(),
            "run_action is a pass-through; unwinding belongs to the orchestrator"
        );
        assert_eq!(context.pending_compensations(), 1);
    }

    #[tokio::test]
    async fn scratch_round_trips_and_take_removes() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Stash {
            id: i64,
            name: String,
        }

        const KEY: &str = "test.stash";

        let mut context = context();
        context
            .stash(
                KEY,
                &Stash {
                    id: 42,
                    name: "answer".into(),
                },
            )
            .unwrap();

        let peeked: Stash = context.stashed(KEY).unwrap();
        assert_eq!(peeked.id, 42);

        let taken: Stash = context.take_stashed(KEY).unwrap();
        assert_eq!(taken.name, "answer");
        assert!(context.take_stashed::<Stash>(KEY).is_none());
    }

    #[tokio::test]
    async fn query_compensation_notes_and_executes() {
        let executor = Arc::new(RecordingExecutor {
            statements: Mutex::new(Vec::new()),
        });
        let mut context =
            AutomationContext::new(Actor::new("test-user"), executor.clone());
        context.add_callback(QueryCompensation::new(
            "delete-project",
            "DELETE FROM v1.projects WHERE id = :id",
            serde_json::json!({"id": 7}),
        ));

        context
            .unwind(&ActionError::integration("github", "boom"))
            .await;

        let statements = executor.statements.lock().unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].2, "delete-project");
        assert_eq!(statements[0].1["id"], 7);
        assert_eq!(context.notes().len(), 1);
        assert!(context.notes()[0].message.contains("delete-project"));
    }
}
