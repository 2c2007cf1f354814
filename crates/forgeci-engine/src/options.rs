//! Build options: poll policy, repository layout and manifest template.

use forgeci_core::ManifestTemplate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Timing of the dispatch settle delay and the run poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Poll attempts before giving up with a timeout.
    pub max_attempts: u32,

    /// Wait between attempts. There is no wait before the first one.
    pub interval: Duration,

    /// Wait after a dispatch before the first poll; a freshly dispatched
    /// run is not immediately visible in the run list.
    pub settle_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 40,
            interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(5),
        }
    }
}

impl PollPolicy {
    /// Worst-case time from dispatch to timeout.
    pub fn worst_case_wait(&self) -> Duration {
        self.settle_delay + self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Where the manifest and source land in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryLayout {
    pub manifest_path: String,
    pub source_path: String,
    pub manifest_message: String,
    pub source_message: String,
}

impl Default for RepositoryLayout {
    fn default() -> Self {
        Self {
            manifest_path: "project.yml".to_string(),
            source_path: "Sources/App.swift".to_string(),
            manifest_message: "Update build manifest".to_string(),
            source_message: "Update application source".to_string(),
        }
    }
}

/// Everything about a build that is not per-invocation input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub policy: PollPolicy,
    pub layout: RepositoryLayout,
    pub manifest: ManifestTemplate,

    /// Directory artifacts are downloaded into.
    pub scratch_dir: PathBuf,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            policy: PollPolicy::default(),
            layout: RepositoryLayout::default(),
            manifest: ManifestTemplate::default(),
            scratch_dir: std::env::temp_dir().join("forgeci"),
        }
    }
}

impl BuildOptions {
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_manifest(mut self, manifest: ManifestTemplate) -> Self {
        self.manifest = manifest;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_policy_default() {
        let policy = PollPolicy::default();
        assert_eq!(policy.max_attempts, 40);
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.settle_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_worst_case_wait() {
        // settle + 39 gaps between 40 attempts
        assert_eq!(
            PollPolicy::default().worst_case_wait(),
            Duration::from_secs(200)
        );

        let single = PollPolicy {
            max_attempts: 1,
            ..PollPolicy::default()
        };
        assert_eq!(single.worst_case_wait(), Duration::from_secs(5));
    }

    #[test]
    fn test_layout_default_paths() {
        let layout = RepositoryLayout::default();
        assert_eq!(layout.manifest_path, "project.yml");
        assert!(layout.source_path.starts_with("Sources/"));
    }
}
