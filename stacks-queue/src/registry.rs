//! Job lookup by name.

use crate::action::ActionRegistry;
use crate::error::ConfigurationError;
use crate::job::{Job, JobHandler};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Jobs loaded at startup, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: BTreeMap<String, Arc<Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job. Two jobs with the same name are a configuration error.
    pub fn register(&mut self, job: Job) -> Result<Arc<Job>, ConfigurationError> {
        if self.jobs.contains_key(job.name()) {
            return Err(ConfigurationError::DuplicateJob(job.name().to_string()));
        }
        let job = Arc::new(job);
        self.jobs.insert(job.name().to_string(), Arc::clone(&job));
        Ok(job)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Job>> {
        self.jobs.get(name).cloned()
    }

    /// Jobs in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Job>> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Check that every action-backed job points at a registered action.
    pub fn verify_actions(&self, actions: &ActionRegistry) -> Result<(), ConfigurationError> {
        for job in self.jobs.values() {
            if let JobHandler::Action(action) = job.handler() {
                if !actions.contains(action) {
                    return Err(ConfigurationError::UnknownAction {
                        job: job.name().to_string(),
                        action: action.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected() {
        let mut jobs = JobRegistry::new();
        jobs.register(Job::action("Sync", "SyncAction")).unwrap();
        let err = jobs.register(Job::action("Sync", "Other")).unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateJob("Sync".to_string()));
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn test_verify_actions() {
        let mut jobs = JobRegistry::new();
        jobs.register(Job::action("Sync", "SyncAction")).unwrap();
        jobs.register(Job::new("Inline", |_| async { Ok(()) })).unwrap();

        let mut actions = ActionRegistry::new();
        assert!(matches!(
            jobs.verify_actions(&actions),
            Err(ConfigurationError::UnknownAction { ref action, .. }) if action == "SyncAction"
        ));

        actions.register_fn("SyncAction", |_| async { Ok(()) });
        assert!(jobs.verify_actions(&actions).is_ok());
    }

    #[test]
    fn test_iteration_is_name_ordered() {
        let mut jobs = JobRegistry::new();
        jobs.register(Job::action("b", "x")).unwrap();
        jobs.register(Job::action("a", "x")).unwrap();
        let names: Vec<_> = jobs.iter().map(|j| j.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
