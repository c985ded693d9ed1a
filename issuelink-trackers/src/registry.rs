use std::collections::HashMap;

use issuelink_config::{TrackerConfig, TrackerKind};

use crate::{
    adapters::{GitHubTracker, GitLabTracker, JiraTracker, RedmineTracker},
    error::{TrackerError, TrackerResult},
    tracker::{IssueTracker, TrackerServices},
};

pub type TrackerConstructor = fn(TrackerConfig, TrackerServices) -> Box<dyn IssueTracker>;

/// Maps each tracker type to the constructor of its adapter.
///
/// Hosts decide which kinds are available at startup instead of loading code conditionally.
#[derive(Clone, Default)]
pub struct TrackerRegistry {
    constructors: HashMap<TrackerKind, TrackerConstructor>,
}

impl TrackerRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(TrackerKind::Jira, |config, services| {
            Box::new(JiraTracker::new(config, services))
        });
        registry.register(TrackerKind::GitHub, |config, services| {
            Box::new(GitHubTracker::new(config, services))
        });
        registry.register(TrackerKind::GitLab, |config, services| {
            Box::new(GitLabTracker::new(config, services))
        });
        registry.register(TrackerKind::Redmine, |config, services| {
            Box::new(RedmineTracker::new(config, services))
        });
        registry
    }

    /// Returns the constructor previously registered for `kind`, if any.
    pub fn register(
        &mut self,
        kind: TrackerKind,
        constructor: TrackerConstructor,
    ) -> Option<TrackerConstructor> {
        self.constructors.insert(kind, constructor)
    }

    pub fn unregister(&mut self, kind: TrackerKind) -> bool {
        self.constructors.remove(&kind).is_some()
    }

    pub fn is_registered(&self, kind: TrackerKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<TrackerKind> {
        TrackerKind::ALL
            .into_iter()
            .filter(|kind| self.is_registered(*kind))
            .collect()
    }

    pub fn build(
        &self,
        config: TrackerConfig,
        services: TrackerServices,
    ) -> TrackerResult<Box<dyn IssueTracker>> {
        let constructor = self
            .constructors
            .get(&config.kind)
            .ok_or(TrackerError::Unsupported(config.kind))?;
        Ok(constructor(config, services))
    }
}
