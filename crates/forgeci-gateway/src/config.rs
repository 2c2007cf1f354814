//! Gateway settings.

use serde::{Deserialize, Serialize};

/// Default REST API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// API version pinned on every request.
pub const DEFAULT_API_VERSION: &str = "2022-11-28";

/// Repository API settings shared by every build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// REST API root URL
    pub api_url: String,
    /// Branch every write and dispatch targets
    pub branch: String,
    /// Workflow file name under `.github/workflows`
    pub workflow_file: String,
    /// Client identifier sent as `User-Agent`
    pub user_agent: String,
    /// Value of the `X-GitHub-Api-Version` header
    pub api_version: String,
    /// Extension of the local artifact file (`<run id>.<ext>`)
    pub artifact_extension: String,
    /// Timeout for API calls
    pub request_timeout_secs: u64,
    /// Timeout for the artifact download
    pub download_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            api_url: DEFAULT_API_URL.to_string(),
            branch: "main".to_string(),
            workflow_file: "build.yml".to_string(),
            user_agent: format!("forgeci/{}", forgeci_core::VERSION),
            api_version: DEFAULT_API_VERSION.to_string(),
            artifact_extension: "zip".to_string(),
            request_timeout_secs: 30,
            download_timeout_secs: 600,
        }
    }
}

impl GatewaySettings {
    /// Defaults overridden by `FORGECI_API_URL`, `FORGECI_BRANCH` and
    /// `FORGECI_WORKFLOW` when set.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(url) = env_value("FORGECI_API_URL") {
            settings.api_url = url;
        }
        if let Some(branch) = env_value("FORGECI_BRANCH") {
            settings.branch = branch;
        }
        if let Some(workflow) = env_value("FORGECI_WORKFLOW") {
            settings.workflow_file = workflow;
        }
        settings
    }

    /// Point at a different API root (e.g. GitHub Enterprise or a test server).
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_workflow(mut self, workflow_file: &str) -> Self {
        self.workflow_file = workflow_file.to_string();
        self
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = branch.to_string();
        self
    }

    /// Local file name of the artifact downloaded for `run_id`.
    pub fn artifact_file_name(&self, run_id: u64) -> String {
        format!("{}.{}", run_id, self.artifact_extension)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = GatewaySettings::default();
        assert_eq!(settings.api_url, "https://api.github.com");
        assert_eq!(settings.branch, "main");
        assert_eq!(settings.api_version, "2022-11-28");
        assert!(settings.user_agent.starts_with("forgeci/"));
    }

    #[test]
    fn test_with_api_url_trims_trailing_slash() {
        let settings = GatewaySettings::default().with_api_url("http://127.0.0.1:9999/");
        assert_eq!(settings.api_url, "http://127.0.0.1:9999");
    }

    #[test]
    fn test_artifact_file_name() {
        let settings = GatewaySettings::default();
        assert_eq!(settings.artifact_file_name(555), "555.zip");
    }
}
