//! Configuration management with environment variable support.
//!
//! Reporter options are read from a JSON file (the same keys the wdio
//! `testRailsOptions` block uses) and every key can be overridden from the
//! environment. [`ReporterOptions::validate`] turns the loose options into a
//! [`TestRailConfig`] and fails fast when a required value is missing.
//!
//! # Environment Variables
//!
//! | Variable | Option |
//! |----------|--------|
//! | `TESTRAIL_CONFIG` | Path of the JSON options file (default `testrail.json`) |
//! | `TESTRAIL_DOMAIN` | `domain` |
//! | `TESTRAIL_USERNAME` | `username` |
//! | `TESTRAIL_PASSWORD` | `password` (API key) |
//! | `TESTRAIL_PROJECT_ID` | `projectId` |
//! | `TESTRAIL_SUITE_ID` | `suiteId` (comma-separated for several suites) |
//! | `TESTRAIL_ASSIGNED_TO_ID` | `assignedToId` |
//! | `TESTRAIL_INCLUDE_ALL` | `includeAllTest` |
//! | `TESTRAIL_UPDATE_RUN` | `updateRun` |
//! | `TESTRAIL_UPDATE_PLAN` | `updatePlan` |
//! | `TESTRAIL_RUN_NAME` | `runName` |
//! | `TESTRAIL_ERRORSHOT_HOST` | `errorshotHost` |
//!
//! # Example
//!
//! ```json
//! {
//!   "domain": "example.testrail.io",
//!   "username": "qa@example.com",
//!   "password": "api-key",
//!   "projectId": 1,
//!   "suiteId": [3, 4]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Default Values
// ============================================================================

/// Default location of the options file
pub const DEFAULT_CONFIG_PATH: &str = "testrail.json";

/// Default prefix of run and plan names
pub const DEFAULT_RUN_NAME: &str = "testrail-sync reporter";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_CONFIG: &str = "TESTRAIL_CONFIG";
pub const ENV_DOMAIN: &str = "TESTRAIL_DOMAIN";
pub const ENV_USERNAME: &str = "TESTRAIL_USERNAME";
pub const ENV_PASSWORD: &str = "TESTRAIL_PASSWORD";
pub const ENV_PROJECT_ID: &str = "TESTRAIL_PROJECT_ID";
pub const ENV_SUITE_ID: &str = "TESTRAIL_SUITE_ID";
pub const ENV_ASSIGNED_TO_ID: &str = "TESTRAIL_ASSIGNED_TO_ID";
pub const ENV_INCLUDE_ALL: &str = "TESTRAIL_INCLUDE_ALL";
pub const ENV_UPDATE_RUN: &str = "TESTRAIL_UPDATE_RUN";
pub const ENV_UPDATE_PLAN: &str = "TESTRAIL_UPDATE_PLAN";
pub const ENV_RUN_NAME: &str = "TESTRAIL_RUN_NAME";
pub const ENV_ERRORSHOT_HOST: &str = "TESTRAIL_ERRORSHOT_HOST";

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating options
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required option is absent
    #[error("Missing {0} value. Please update the TestRail options")]
    Missing(&'static str),

    /// The options file could not be read
    #[error("failed to read options file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The options file is not valid JSON for [`ReporterOptions`]
    #[error("failed to parse options file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An environment override could not be parsed
    #[error("invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },
}

/// One suite, or an ordered list of suites.
///
/// The shape decides the publish topology: a list always publishes into a
/// plan, even when it holds a single id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SuiteSelection {
    Single(u64),
    Multiple(Vec<u64>),
}

impl SuiteSelection {
    /// All configured suite ids in order
    pub fn ids(&self) -> Vec<u64> {
        match self {
            SuiteSelection::Single(id) => vec![*id],
            SuiteSelection::Multiple(ids) => ids.clone(),
        }
    }

    /// The suite id when exactly one suite is configured as a plain number
    pub fn single(&self) -> Option<u64> {
        match self {
            SuiteSelection::Single(id) => Some(*id),
            SuiteSelection::Multiple(_) => None,
        }
    }

    /// The suite that owns sections and cases created by this tool
    pub fn primary(&self) -> Option<u64> {
        match self {
            SuiteSelection::Single(id) => Some(*id),
            SuiteSelection::Multiple(ids) => ids.first().copied(),
        }
    }
}

impl fmt::Display for SuiteSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuiteSelection::Single(id) => write!(f, "{}", id),
            SuiteSelection::Multiple(ids) => {
                let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                write!(f, "[{}]", ids.join(", "))
            }
        }
    }
}

/// Raw reporter options as written in the options file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReporterOptions {
    /// TestRail host, e.g. `example.testrail.io`
    pub domain: Option<String>,
    /// User email
    pub username: Option<String>,
    /// User API key
    pub password: Option<String>,
    /// Project identifier
    pub project_id: Option<u64>,
    /// Suite identifier or list of suite identifiers
    pub suite_id: Option<SuiteSelection>,
    /// User new runs are assigned to
    pub assigned_to_id: Option<u64>,
    /// Include every case of the suite in new runs
    #[serde(default)]
    pub include_all_test: bool,
    /// Existing run to update instead of creating one
    pub update_run: Option<u64>,
    /// Existing plan to update instead of creating one
    pub update_plan: Option<u64>,
    /// Display prefix for run and plan names
    pub run_name: Option<String>,
    /// Base URL under which failure screenshots are served
    pub errorshot_host: Option<String>,
}

impl ReporterOptions {
    /// Read options from a JSON file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read options from a JSON file if it exists, then apply environment overrides
    pub fn load_with_env(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let options = if path.exists() {
            Self::load(path)?
        } else {
            tracing::debug!("options file {} not found, using environment only", path.display());
            Self::default()
        };
        options.with_overrides(|name| env::var(name).ok())
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn with_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_DOMAIN) {
            self.domain = Some(v);
        }
        if let Some(v) = lookup(ENV_USERNAME) {
            self.username = Some(v);
        }
        if let Some(v) = lookup(ENV_PASSWORD) {
            self.password = Some(v);
        }
        if let Some(v) = lookup(ENV_PROJECT_ID) {
            self.project_id = Some(parse_id(ENV_PROJECT_ID, &v)?);
        }
        if let Some(v) = lookup(ENV_SUITE_ID) {
            self.suite_id = Some(parse_suites(&v)?);
        }
        if let Some(v) = lookup(ENV_ASSIGNED_TO_ID) {
            self.assigned_to_id = Some(parse_id(ENV_ASSIGNED_TO_ID, &v)?);
        }
        if let Some(v) = lookup(ENV_INCLUDE_ALL) {
            self.include_all_test = parse_bool(ENV_INCLUDE_ALL, &v)?;
        }
        if let Some(v) = lookup(ENV_UPDATE_RUN) {
            self.update_run = Some(parse_id(ENV_UPDATE_RUN, &v)?);
        }
        if let Some(v) = lookup(ENV_UPDATE_PLAN) {
            self.update_plan = Some(parse_id(ENV_UPDATE_PLAN, &v)?);
        }
        if let Some(v) = lookup(ENV_RUN_NAME) {
            self.run_name = Some(v);
        }
        if let Some(v) = lookup(ENV_ERRORSHOT_HOST) {
            self.errorshot_host = Some(v);
        }
        Ok(self)
    }

    /// Check required options and produce the validated configuration
    pub fn validate(&self) -> ConfigResult<TestRailConfig> {
        let domain = self.domain.clone().ok_or(ConfigError::Missing("domain"))?;
        let username = self.username.clone().ok_or(ConfigError::Missing("username"))?;
        let password = self.password.clone().ok_or(ConfigError::Missing("password"))?;
        let project_id = self.project_id.ok_or(ConfigError::Missing("projectId"))?;
        let suites = self.suite_id.clone().ok_or(ConfigError::Missing("suiteId"))?;

        Ok(TestRailConfig {
            domain,
            username,
            password,
            project_id,
            suites,
            assigned_to_id: self.assigned_to_id,
            include_all_test: self.include_all_test,
            update_run: self.update_run,
            update_plan: self.update_plan,
            run_name: self
                .run_name
                .clone()
                .unwrap_or_else(|| DEFAULT_RUN_NAME.to_string()),
            errorshot_host: self
                .errorshot_host
                .as_ref()
                .map(|h| h.trim_end_matches('/').to_string()),
        })
    }
}

/// Validated TestRail configuration
#[derive(Clone, PartialEq)]
pub struct TestRailConfig {
    pub domain: String,
    pub username: String,
    pub password: String,
    pub project_id: u64,
    pub suites: SuiteSelection,
    pub assigned_to_id: Option<u64>,
    pub include_all_test: bool,
    pub update_run: Option<u64>,
    pub update_plan: Option<u64>,
    pub run_name: String,
    pub errorshot_host: Option<String>,
}

impl TestRailConfig {
    /// Create a configuration with the required values and defaults elsewhere
    pub fn new(
        domain: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        project_id: u64,
        suites: SuiteSelection,
    ) -> Self {
        Self {
            domain: domain.into(),
            username: username.into(),
            password: password.into(),
            project_id,
            suites,
            assigned_to_id: None,
            include_all_test: false,
            update_run: None,
            update_plan: None,
            run_name: DEFAULT_RUN_NAME.to_string(),
            errorshot_host: None,
        }
    }

    pub fn update_run(mut self, run_id: u64) -> Self {
        self.update_run = Some(run_id);
        self
    }

    pub fn update_plan(mut self, plan_id: u64) -> Self {
        self.update_plan = Some(plan_id);
        self
    }

    pub fn run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = name.into();
        self
    }

    pub fn errorshot_host(mut self, host: impl Into<String>) -> Self {
        self.errorshot_host = Some(host.into().trim_end_matches('/').to_string());
        self
    }

    /// TestRail entry point, e.g. `https://example.testrail.io/index.php`
    ///
    /// A domain that already carries a scheme is used as given.
    pub fn base_url(&self) -> String {
        let domain = self.domain.trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            format!("{}/index.php", domain)
        } else {
            format!("https://{}/index.php", domain)
        }
    }
}

// The API key must never end up in logs.
impl fmt::Debug for TestRailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRailConfig")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("suites", &self.suites)
            .field("assigned_to_id", &self.assigned_to_id)
            .field("include_all_test", &self.include_all_test)
            .field("update_run", &self.update_run)
            .field("update_plan", &self.update_plan)
            .field("run_name", &self.run_name)
            .field("errorshot_host", &self.errorshot_host)
            .finish()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_id(name: &'static str, value: &str) -> ConfigResult<u64> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

/// Parse `"3"` as a single suite and `"3,4"` as a list
fn parse_suites(value: &str) -> ConfigResult<SuiteSelection> {
    if value.contains(',') {
        let ids = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_id(ENV_SUITE_ID, s))
            .collect::<ConfigResult<Vec<u64>>>()?;
        Ok(SuiteSelection::Multiple(ids))
    } else {
        Ok(SuiteSelection::Single(parse_id(ENV_SUITE_ID, value)?))
    }
}

fn parse_bool(name: &'static str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}
