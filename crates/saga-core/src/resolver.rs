//!
//! # Dependency resolver
//!
//! Turns a caller-supplied list of automation slugs into a validated,
//! execution-ordered list of descriptors. All validation failures are
//! gathered and reported together so the caller can return one complete
//! error; missing dependencies are never pulled in silently.
//!

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{AutomationDescriptor, SubjectTypeId};
use crate::error::{RegistryError, ResolutionFailure, ResolveError};

/// Registry of the automations known to the application.
pub struct AutomationRegistry<S> {
    by_slug: HashMap<String, Arc<AutomationDescriptor<S>>>,
}

impl<S> Default for AutomationRegistry<S> {
    fn default() -> Self {
        Self {
            by_slug: HashMap::new(),
        }
    }
}

impl<S> AutomationRegistry<S>
where
    S: Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Slugs are unique: registering the same
    /// slug twice is a configuration defect.
    pub fn register(&mut self, descriptor: AutomationDescriptor<S>) -> Result<(), RegistryError> {
        let slug = descriptor.slug().to_string();
        if self.by_slug.contains_key(&slug) {
            return Err(RegistryError::DuplicateSlug(slug));
        }
        self.by_slug.insert(slug, Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, slug: &str) -> Option<&Arc<AutomationDescriptor<S>>> {
        self.by_slug.get(slug)
    }

    pub fn len(&self) -> usize {
        self.by_slug.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slug.is_empty()
    }

    /// Validate the requested slugs against the registry and the subject
    /// type, then order them so that every automation appears after all
    /// of its dependencies.
    ///
    /// Validation gathers three buckets before failing: unknown slugs,
    /// automations not applicable to `subject_type`, and dependencies
    /// that were not themselves requested. The topological order among
    /// mutually-independent automations is unspecified.
    pub fn resolve(
        &self,
        requested: &[String],
        subject_type: SubjectTypeId,
    ) -> Result<Vec<Arc<AutomationDescriptor<S>>>, ResolveError> {
        let mut failure = ResolutionFailure::default();
        let mut resolved = Vec::with_capacity(requested.len());
        for slug in requested {
            match self.by_slug.get(slug) {
                Some(descriptor) => resolved.push(descriptor.clone()),
                None => failure.nonexistent.push(slug.clone()),
            }
        }

        for descriptor in &resolved {
            if !descriptor.applies_to_subject_type(subject_type) {
                failure.invalid.push(descriptor.slug().to_string());
            }
        }

        let requested_slugs: HashSet<&str> = requested.iter().map(String::as_str).collect();
        let missing: BTreeSet<String> = resolved
            .iter()
            .flat_map(|descriptor| descriptor.depends_on())
            .filter(|dependency| !requested_slugs.contains(dependency.as_str()))
            .cloned()
            .collect();
        failure.missing_required = missing.into_iter().collect();

        if !failure.is_empty() {
            return Err(ResolveError::Validation(failure));
        }

        let ordered = topological_order(&resolved)?;
        debug!(
            subject_type = %subject_type,
            order = ?ordered.iter().map(|d| d.slug()).collect::<Vec<_>>(),
            "resolved automation order"
        );
        Ok(ordered)
    }
}

/// Kahn's algorithm over exactly the requested descriptors. Validation
/// has already guaranteed that every dependency is present in the set.
fn topological_order<S>(
    descriptors: &[Arc<AutomationDescriptor<S>>],
) -> Result<Vec<Arc<AutomationDescriptor<S>>>, ResolveError>
where
    S: Send + Sync,
{
    let by_slug: HashMap<&str, &Arc<AutomationDescriptor<S>>> = descriptors
        .iter()
        .map(|descriptor| (descriptor.slug(), descriptor))
        .collect();

    let mut indegree: HashMap<&str, usize> = HashMap::with_capacity(descriptors.len());
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for descriptor in descriptors {
        indegree.entry(descriptor.slug()).or_insert(0);
        for dependency in descriptor.depends_on() {
            *indegree.entry(descriptor.slug()).or_insert(0) += 1;
            dependents
                .entry(dependency.as_str())
                .or_default()
                .push(descriptor.slug());
        }
    }

    let mut ready: VecDeque<&str> = descriptors
        .iter()
        .map(|descriptor| descriptor.slug())
        .filter(|slug| indegree[slug] == 0)
        .collect();

    let mut ordered = Vec::with_capacity(descriptors.len());
    while let Some(slug) = ready.pop_front() {
        ordered.push((*by_slug[slug]).clone());
        for &dependent in dependents.get(slug).map(Vec::as_slice).unwrap_or(&[]) {
            let remaining = indegree
                .get_mut(dependent)
                .map(|count| {
                    *count -= 1;
                    *count
                })
                .unwrap_or(0);
            if remaining == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if ordered.len() != descriptors.len() {
        let stuck: Vec<String> = descriptors
            .iter()
            .map(|descriptor| descriptor.slug().to_string())
            .filter(|slug| !ordered.iter().any(|d| d.slug() == slug))
            .collect();
        return Err(ResolveError::Cycle(stuck));
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::context::AutomationContext;
    use crate::descriptor::AutomationAction;
    use crate::error::ActionError;

    struct Inert;

    #[async_trait]
    impl AutomationAction<()> for Inert {
        async fn execute(
            &self,
            _context: &mut AutomationContext,
            _descriptor: &AutomationDescriptor<()>,
            _subject: &(),
        ) -> Result<(), ActionError> {
            Ok(())
        }
    }

    const PROJECT_TYPE: SubjectTypeId = SubjectTypeId(1);
    const OTHER_TYPE: SubjectTypeId = SubjectTypeId(2);

    fn descriptor(slug: &str, depends_on: &[&str]) -> AutomationDescriptor<()> {
        AutomationDescriptor::new(slug, "test", Arc::new(Inert))
            .with_depends_on(depends_on.iter().copied())
            .with_applies_to([PROJECT_TYPE])
    }

    fn registry(descriptors: Vec<AutomationDescriptor<()>>) -> AutomationRegistry<()> {
        let mut registry = AutomationRegistry::new();
        for d in descriptors {
            registry.register(d).unwrap();
        }
        registry
    }

    fn slugs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duplicate_slugs_are_rejected() {
        let mut registry = registry(vec![descriptor("a", &[])]);
        let result = registry.register(descriptor("a", &[]));
        assert!(matches!(result, Err(RegistryError::DuplicateSlug(slug)) if slug == "a"));
    }

    #[test]
    fn unrequested_dependency_is_reported_not_pulled_in() {
        let registry = registry(vec![
            descriptor("pagerduty-service", &[]),
            descriptor("pagerduty-dependency", &["pagerduty-service"]),
        ]);

        let result = registry.resolve(&slugs(&["pagerduty-dependency"]), PROJECT_TYPE);

        match result {
            Err(ResolveError::Validation(failure)) => {
                assert_eq!(failure.missing_required, vec!["pagerduty-service"]);
                assert!(failure.nonexistent.is_empty());
                assert!(failure.invalid.is_empty());
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn all_three_buckets_are_gathered_together() {
        let registry = registry(vec![
            descriptor("github-repository", &[]),
            descriptor("sonarqube-project", &["github-repository"]),
        ]);

        let result = registry.resolve(
            &slugs(&["sonarqube-project", "no-such-automation"]),
            OTHER_TYPE,
        );

        match result {
            Err(ResolveError::Validation(failure)) => {
                assert_eq!(failure.nonexistent, vec!["no-such-automation"]);
                assert_eq!(failure.invalid, vec!["sonarqube-project"]);
                assert_eq!(failure.missing_required, vec!["github-repository"]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn order_respects_dependencies() {
        let registry = registry(vec![
            descriptor("d", &["b", "c"]),
            descriptor("b", &["a"]),
            descriptor("c", &["a"]),
            descriptor("a", &[]),
        ]);

        let ordered = registry
            .resolve(&slugs(&["d", "c", "b", "a"]), PROJECT_TYPE)
            .unwrap();

        let position: HashMap<&str, usize> = ordered
            .iter()
            .enumerate()
            .map(|(index, d)| (d.slug(), index))
            .collect();
        for descriptor in &ordered {
            for dependency in descriptor.depends_on() {
                assert!(
                    position[dependency.as_str()] < position[descriptor.slug()],
                    "{} must come after {}",
                    descriptor.slug(),
                    dependency
                );
            }
        }
        assert_eq!(ordered.len(), 4);
    }

    #[test]
    fn independent_automations_resolve_in_any_order() {
        let registry = registry(vec![
            descriptor("github-repository", &[]),
            descriptor("sentry-project", &[]),
        ]);

        let ordered = registry
            .resolve(
                &slugs(&["github-repository", "sentry-project"]),
                PROJECT_TYPE,
            )
            .unwrap();
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn cycles_are_detected() {
        let registry = registry(vec![
            descriptor("a", &["b"]),
            descriptor("b", &["a"]),
        ]);

        let result = registry.resolve(&slugs(&["a", "b"]), PROJECT_TYPE);
        match result {
            Err(ResolveError::Cycle(stuck)) => {
                assert_eq!(stuck.len(), 2);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn empty_request_resolves_to_empty_order() {
        let registry = registry(vec![descriptor("a", &[])]);
        let ordered = registry.resolve(&[], PROJECT_TYPE).unwrap();
        assert!(ordered.is_empty());
    }
}
