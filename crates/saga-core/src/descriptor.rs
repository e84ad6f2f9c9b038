//!
//! # Automation descriptors
//!
//! Declarative records describing one provisioning step: a unique slug,
//! the integration it targets, the action to run and the slugs it
//! depends on.
//!

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::AutomationContext;
use crate::error::ActionError;

/// Identifier for the kind of subject an automation may run against
/// (a project-type id in the catalog).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SubjectTypeId(pub i32);

impl fmt::Display for SubjectTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A forward provisioning action.
///
/// Implementations perform the external creation, register their
/// compensating action with the context and persist identifier/link
/// rows through the context's query capability. The dispatch is uniform
/// whether the implementation suspends or returns immediately.
#[async_trait]
pub trait AutomationAction<S>: Send + Sync
where
    S: Send + Sync,
{
    async fn execute(
        &self,
        context: &mut AutomationContext,
        descriptor: &AutomationDescriptor<S>,
        subject: &S,
    ) -> Result<(), ActionError>;
}

/// Static description of one automation.
pub struct AutomationDescriptor<S> {
    slug: String,
    integration_name: String,
    action: Arc<dyn AutomationAction<S>>,
    depends_on: Vec<String>,
    applies_to: Vec<SubjectTypeId>,
}

impl<S> AutomationDescriptor<S>
where
    S: Send + Sync,
{
    pub fn new(
        slug: impl Into<String>,
        integration_name: impl Into<String>,
        action: Arc<dyn AutomationAction<S>>,
    ) -> Self {
        Self {
            slug: slug.into(),
            integration_name: integration_name.into(),
            action,
            depends_on: Vec::new(),
            applies_to: Vec::new(),
        }
    }

    /// Slugs that must run, and succeed, before this automation.
    pub fn with_depends_on<I, T>(mut self, slugs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.depends_on = slugs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_applies_to<I>(mut self, subject_types: I) -> Self
    where
        I: IntoIterator<Item = SubjectTypeId>,
    {
        self.applies_to = subject_types.into_iter().collect();
        self
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn integration_name(&self) -> &str {
        &self.integration_name
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn applies_to(&self) -> &[SubjectTypeId] {
        &self.applies_to
    }

    pub fn applies_to_subject_type(&self, subject_type: SubjectTypeId) -> bool {
        self.applies_to.contains(&subject_type)
    }

    pub(crate) fn action(&self) -> Arc<dyn AutomationAction<S>> {
        self.action.clone()
    }
}

impl<S> fmt::Debug for AutomationDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomationDescriptor")
            .field("slug", &self.slug)
            .field("integration_name", &self.integration_name)
            .field("depends_on", &self.depends_on)
            .field("applies_to", &self.applies_to)
            .finish()
    }
}
