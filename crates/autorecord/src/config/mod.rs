//! Configuration types for autorecord.

mod autorecord;
mod intercept;

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AutorecordError, Result};
use crate::host::HostLayout;

pub use autorecord::{AutorecordConfig, StringifyOptions};
pub use intercept::InterceptPattern;

/// Host-level configuration: the folders the host runner uses plus the
/// `autorecord` namespace.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_fixtures_folder")]
    pub fixtures_folder: PathBuf,

    /// Folder holding the spec files, used to find orphaned mock indexes
    #[serde(default = "default_integration_folder")]
    pub integration_folder: PathBuf,

    #[serde(default)]
    pub autorecord: AutorecordConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fixtures_folder: default_fixtures_folder(),
            integration_folder: default_integration_folder(),
            autorecord: AutorecordConfig::default(),
        }
    }
}

impl Config {
    /// Load from YAML or JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.fixtures_folder.as_os_str().is_empty() {
            anyhow::bail!("'fixturesFolder' must not be empty");
        }

        if !(self.autorecord.max_inline_size_mb > 0.0) {
            anyhow::bail!(
                "'autorecord.maxInlineSizeMb' must be positive, got {}",
                self.autorecord.max_inline_size_mb
            );
        }

        self.autorecord
            .compile()
            .map_err(|e| anyhow::anyhow!("Invalid autorecord configuration: {e}"))?;

        Ok(())
    }

    /// Directory layout derived from the configured folders.
    pub fn layout(&self) -> HostLayout {
        HostLayout::new(&self.fixtures_folder, &self.integration_folder)
    }
}

fn default_fixtures_folder() -> PathBuf {
    PathBuf::from("cypress/fixtures")
}

fn default_integration_folder() -> PathBuf {
    PathBuf::from("cypress/integration")
}

/// Compiled form of [`AutorecordConfig`] used at runtime.
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub options: AutorecordConfig,
    pub whitelist_headers: Vec<Regex>,
    pub intercept_pattern: InterceptPattern,
    pub intercept_method: Regex,
}

impl AutorecordConfig {
    pub fn compile(&self) -> Result<CompiledConfig> {
        let whitelist_headers = self
            .whitelist_headers
            .iter()
            .map(|pattern| compile_regex(pattern))
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledConfig {
            options: self.clone(),
            whitelist_headers,
            intercept_pattern: InterceptPattern::parse(&self.intercept_pattern)?,
            intercept_method: compile_regex(&self.intercept_method)?,
        })
    }
}

impl CompiledConfig {
    /// Whether the interceptor is bound to this method and URL.
    pub fn binds(&self, method: &str, url: &str) -> bool {
        self.intercept_method.is_match(method) && self.intercept_pattern.matches(url)
    }

    pub fn is_blacklisted(&self, url: &str) -> bool {
        self.options
            .blacklist_routes
            .iter()
            .any(|route| url.contains(route.as_str()))
    }

    pub fn keeps_header(&self, name: &str) -> bool {
        self.whitelist_headers.iter().any(|re| re.is_match(name))
    }

    pub fn is_record_test(&self, fqtn: &str) -> bool {
        self.options.record_tests.iter().any(|t| t == fqtn)
    }
}

fn compile_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AutorecordError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.fixtures_folder, PathBuf::from("cypress/fixtures"));
        assert!(config.autorecord.include_parent_test_name);
        assert!(!config.autorecord.clean_mocks);
        assert_eq!(config.autorecord.intercept_pattern, "*");
        assert_eq!(config.autorecord.max_inline_size_mb, 70.0);
        assert_eq!(config.autorecord.stringify_options.indent, 2);
        assert_eq!(config.autorecord.stringify_options.max_length, 80);
    }

    #[test]
    fn test_camel_case_options() {
        let yaml = r#"
fixturesFolder: e2e/fixtures
autorecord:
  cleanMocks: true
  includeParentTestName: false
  recordTests: ["user > signs in"]
  blacklistRoutes: ["/sockjs-node"]
  whitelistHeaders: ["^content-type$"]
  ignoredRequestBodyAttributes: ["timestamp"]
  interceptPattern: "/api/i"
  stringifyOptions:
    indent: 4
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        let options = &config.autorecord;
        assert!(options.clean_mocks);
        assert!(!options.include_parent_test_name);
        assert_eq!(options.record_tests, vec!["user > signs in".to_string()]);
        assert_eq!(options.stringify_options.indent, 4);
        assert_eq!(options.stringify_options.max_length, 80);
    }

    #[test]
    fn test_legacy_separate_mock_files_spelling() {
        let config: Config =
            serde_json::from_str(r#"{"autorecord": {"seperateMockFiles": true}}"#).unwrap();
        assert!(config.autorecord.separate_mock_files);
    }

    #[test]
    fn test_invalid_whitelist_regex_fails_validation() {
        let mut config = Config::default();
        config.autorecord.whitelist_headers = vec!["(".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_compiled_filters() {
        let options = AutorecordConfig {
            blacklist_routes: vec!["/__cypress".to_string()],
            whitelist_headers: vec!["^content-".to_string()],
            intercept_method: "^(GET|POST)$".to_string(),
            record_tests: vec!["a > b".to_string()],
            ..Default::default()
        };
        let compiled = options.compile().unwrap();
        assert!(compiled.is_blacklisted("http://localhost/__cypress/runner"));
        assert!(!compiled.is_blacklisted("http://localhost/api"));
        assert!(compiled.keeps_header("content-type"));
        assert!(!compiled.keeps_header("x-request-id"));
        assert!(compiled.binds("GET", "/api"));
        assert!(!compiled.binds("DELETE", "/api"));
        assert!(compiled.is_record_test("a > b"));
        assert!(!compiled.is_record_test("b"));
    }

    #[test]
    fn test_layout_puts_mocks_beside_fixtures() {
        let config = Config {
            fixtures_folder: PathBuf::from("cypress/fixtures"),
            ..Default::default()
        };
        let layout = config.layout();
        assert_eq!(layout.mocks_dir, PathBuf::from("cypress/mocks"));
    }
}
