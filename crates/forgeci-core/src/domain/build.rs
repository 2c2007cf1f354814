//! Build inputs: repository credentials and the user's request.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Repository coordinates and access token for one build.
///
/// Read-only for the duration of a build. `Debug` never prints the token.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Account or organisation owning the repository.
    pub owner: String,

    /// Repository name.
    pub repository: String,

    /// Bearer token used on every API call.
    pub token: String,
}

impl BuildConfig {
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repository: repository.into(),
            token: token.into(),
        }
    }

    /// True when owner, repository and token are all non-empty.
    pub fn is_ready(&self) -> bool {
        !self.owner.trim().is_empty()
            && !self.repository.trim().is_empty()
            && !self.token.trim().is_empty()
    }

    /// `owner/repository`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }
}

impl std::fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = if self.token.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("BuildConfig")
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("token", &token)
            .finish()
    }
}

/// Input to a single compile invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    application_name: String,
    source_code: String,
}

impl BuildRequest {
    /// Validate and create a request.
    ///
    /// The application name ends up in the manifest and the bundle
    /// identifier, so it is limited to ASCII alphanumerics, `-` and `_`.
    pub fn new(application_name: impl Into<String>, source_code: impl Into<String>) -> Result<Self> {
        let application_name = application_name.into();
        let trimmed = application_name.trim();

        if trimmed.is_empty() {
            return Err(CoreError::InvalidRequest(
                "application name must not be empty".to_string(),
            ));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(CoreError::InvalidRequest(format!(
                "application name contains unsupported character {:?}",
                bad
            )));
        }

        Ok(Self {
            application_name: trimmed.to_string(),
            source_code: source_code.into(),
        })
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn source_code(&self) -> &str {
        &self.source_code
    }
}
