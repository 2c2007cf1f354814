//! Build manifest generation.
//!
//! The manifest is an XcodeGen-style project document written to the
//! repository before the source on every build. Its schema is static; the
//! values that vary per deployment (platform, bundle prefix, signing,
//! build settings) live in [`ManifestTemplate`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Platform, signing and build-setting values for the generated manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestTemplate {
    /// Target platform (e.g. "iOS").
    pub platform: String,

    /// Minimum platform version.
    pub deployment_target: String,

    /// Reverse-DNS prefix; the bundle id is `<prefix>.<application name>`.
    pub bundle_id_prefix: String,

    /// Xcode signing style ("Manual" or "Automatic").
    pub signing_style: String,

    /// Directory holding the application sources.
    pub sources_dir: String,

    /// Extra target build settings, emitted in key order.
    pub build_settings: BTreeMap<String, String>,
}

impl Default for ManifestTemplate {
    fn default() -> Self {
        let build_settings = [
            ("CODE_SIGNING_ALLOWED", "NO"),
            ("CODE_SIGNING_REQUIRED", "NO"),
            ("CODE_SIGN_IDENTITY", ""),
            ("CURRENT_PROJECT_VERSION", "1"),
            ("GENERATE_INFOPLIST_FILE", "YES"),
            ("MARKETING_VERSION", "1.0"),
            ("SWIFT_VERSION", "5.0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            platform: "iOS".to_string(),
            deployment_target: "16.0".to_string(),
            bundle_id_prefix: "com.forgeci".to_string(),
            signing_style: "Manual".to_string(),
            sources_dir: "Sources".to_string(),
            build_settings,
        }
    }
}

#[derive(Serialize)]
struct ProjectDocument<'a> {
    name: &'a str,
    options: ProjectOptions<'a>,
    targets: BTreeMap<&'a str, TargetSpec<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectOptions<'a> {
    bundle_id_prefix: &'a str,
    deployment_target: BTreeMap<&'a str, &'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetSpec<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    platform: &'a str,
    deployment_target: &'a str,
    sources: Vec<SourceEntry<'a>>,
    settings: TargetSettings,
}

#[derive(Serialize)]
struct SourceEntry<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct TargetSettings {
    base: BTreeMap<String, String>,
}

impl ManifestTemplate {
    /// Defaults overridden by `FORGECI_PLATFORM`, `FORGECI_DEPLOYMENT_TARGET`,
    /// `FORGECI_BUNDLE_PREFIX` and `FORGECI_SIGNING_STYLE` when set.
    pub fn from_env() -> Self {
        let mut template = Self::default();
        let overrides: [(&str, &mut String); 4] = [
            ("FORGECI_PLATFORM", &mut template.platform),
            ("FORGECI_DEPLOYMENT_TARGET", &mut template.deployment_target),
            ("FORGECI_BUNDLE_PREFIX", &mut template.bundle_id_prefix),
            ("FORGECI_SIGNING_STYLE", &mut template.signing_style),
        ];
        for (key, field) in overrides {
            if let Some(value) = std::env::var(key).ok().filter(|v| !v.trim().is_empty()) {
                *field = value;
            }
        }
        template
    }

    /// Bundle identifier for an application.
    pub fn bundle_identifier(&self, application_name: &str) -> String {
        format!("{}.{}", self.bundle_id_prefix, application_name)
    }

    /// Override or add a build setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_settings.insert(key.into(), value.into());
        self
    }

    /// Render the manifest for `application_name` as YAML. Deterministic.
    ///
    /// The bundle identifier and signing style always win over entries of
    /// the same name in `build_settings`.
    pub fn render(&self, application_name: &str) -> Result<String> {
        let mut base = self.build_settings.clone();
        base.insert(
            "PRODUCT_BUNDLE_IDENTIFIER".to_string(),
            self.bundle_identifier(application_name),
        );
        base.insert("CODE_SIGN_STYLE".to_string(), self.signing_style.clone());

        let target = TargetSpec {
            kind: "application",
            platform: &self.platform,
            deployment_target: &self.deployment_target,
            sources: vec![SourceEntry {
                path: &self.sources_dir,
            }],
            settings: TargetSettings { base },
        };

        let document = ProjectDocument {
            name: application_name,
            options: ProjectOptions {
                bundle_id_prefix: &self.bundle_id_prefix,
                deployment_target: BTreeMap::from([(
                    self.platform.as_str(),
                    self.deployment_target.as_str(),
                )]),
            },
            targets: BTreeMap::from([(application_name, target)]),
        };

        Ok(serde_yaml::to_string(&document)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn parse(manifest: &str) -> Value {
        serde_yaml::from_str(manifest).unwrap()
    }

    #[test]
    fn test_render_names_application_and_bundle() {
        let manifest = ManifestTemplate::default().render("Calculator").unwrap();
        assert!(manifest.starts_with("name: Calculator\n"));

        let doc = parse(&manifest);
        assert_eq!(doc["options"]["bundleIdPrefix"], "com.forgeci");
        assert_eq!(doc["options"]["deploymentTarget"]["iOS"], "16.0");

        let target = &doc["targets"]["Calculator"];
        assert_eq!(target["type"], "application");
        assert_eq!(target["platform"], "iOS");
        assert_eq!(target["sources"][0]["path"], "Sources");

        let base = &target["settings"]["base"];
        assert_eq!(base["PRODUCT_BUNDLE_IDENTIFIER"], "com.forgeci.Calculator");
        assert_eq!(base["CODE_SIGN_STYLE"], "Manual");
        assert_eq!(base["CODE_SIGN_IDENTITY"], "");
    }

    #[test]
    fn test_version_strings_stay_strings() {
        let doc = parse(&ManifestTemplate::default().render("App").unwrap());
        let base = &doc["targets"]["App"]["settings"]["base"];
        assert_eq!(base["SWIFT_VERSION"], Value::String("5.0".to_string()));
        assert_eq!(base["CURRENT_PROJECT_VERSION"], Value::String("1".to_string()));
    }

    #[test]
    fn test_render_is_deterministic_and_sorted() {
        let template = ManifestTemplate::default();
        let manifest = template.render("App").unwrap();
        assert_eq!(manifest, template.render("App").unwrap());

        let allowed = manifest.find("CODE_SIGNING_ALLOWED").unwrap();
        let swift = manifest.find("SWIFT_VERSION").unwrap();
        assert!(allowed < swift);
    }

    #[test]
    fn test_values_survive_yaml_special_characters() {
        let template = ManifestTemplate {
            platform: "iOS: x".to_string(),
            bundle_id_prefix: "org.example".to_string(),
            ..ManifestTemplate::default()
        }
        .with_setting("OTHER_LDFLAGS", "-a\n-b")
        .with_setting("OTHER_FLAGS", "say \"hi\" # not a comment");

        let doc = parse(&template.render("App").unwrap());
        let target = &doc["targets"]["App"];
        assert_eq!(target["platform"], "iOS: x");
        assert_eq!(doc["options"]["deploymentTarget"]["iOS: x"], "16.0");
        assert_eq!(target["settings"]["base"]["OTHER_LDFLAGS"], "-a\n-b");
        assert_eq!(
            target["settings"]["base"]["OTHER_FLAGS"],
            "say \"hi\" # not a comment"
        );
        assert_eq!(template.bundle_identifier("App"), "org.example.App");
    }

    #[test]
    fn test_computed_settings_override_template_entries() {
        let template = ManifestTemplate::default()
            .with_setting("PRODUCT_BUNDLE_IDENTIFIER", "com.other.Thing")
            .with_setting("CODE_SIGN_STYLE", "Automatic");

        let doc = parse(&template.render("App").unwrap());
        let base = &doc["targets"]["App"]["settings"]["base"];
        assert_eq!(base["PRODUCT_BUNDLE_IDENTIFIER"], "com.forgeci.App");
        assert_eq!(base["CODE_SIGN_STYLE"], "Manual");
    }
}
