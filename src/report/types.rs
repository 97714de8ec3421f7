//! Types for test lifecycle events and captured results.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::store::{ResultPayload, TestStatus};

/// Capabilities of one test execution environment.
///
/// Known wdio capability keys get typed fields; anything else is kept in
/// `extra`. Two descriptors are the same environment when their canonical
/// serialization is equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerDescriptor {
    #[serde(rename = "browserName", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub browser_name: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(rename = "platformVersion", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub platform_version: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub browser_version: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(rename = "platformName", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub platform_name: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    #[serde(rename = "deviceName", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,

    #[serde(rename = "customName", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,

    /// Any other capability, sorted by key
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RunnerDescriptor {
    /// Desktop browser descriptor
    pub fn browser(name: &str, version: Option<&str>, platform: Option<&str>) -> Self {
        Self {
            browser_name: Some(name.to_string()),
            version: version.map(str::to_string),
            platform: platform.map(str::to_string),
            ..Default::default()
        }
    }

    /// Canonical serialized form; equal keys mean the same environment
    pub fn canonical_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }

    /// Structural equality by canonical form
    pub fn same_environment(&self, other: &RunnerDescriptor) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

/// Capabilities sometimes carry versions as numbers (`"version": 91`).
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Remote session metadata announced together with a runner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// WebDriver session id
    #[serde(default)]
    pub session_id: Option<String>,

    /// Selenium host the session ran on; unknown when absent
    #[serde(default)]
    pub host: Option<String>,

    /// Whether the session went through Sauce Connect
    #[serde(default)]
    pub sauce_connect: bool,
}

/// Error attached to a failed test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestError {
    pub message: String,
    #[serde(default)]
    pub stack: String,
}

/// A single observed test outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Unique id, used to correlate screenshots
    #[serde(default)]
    pub uid: String,

    pub title: String,

    /// Present for failures
    #[serde(default)]
    pub error: Option<TestError>,
}

impl TestOutcome {
    pub fn new(uid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            title: title.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>, stack: impl Into<String>) -> Self {
        self.error = Some(TestError {
            message: message.into(),
            stack: stack.into(),
        });
        self
    }
}

/// Screenshot taken for a test, keyed by the test's uid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    pub uid: String,
    pub filename: String,
}

/// Lifecycle notification from a test runner.
///
/// Serialized as JSON objects tagged by `event`, e.g.
/// `{"event": "pass", "uid": "1", "title": "logs in C12"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TestEvent {
    /// A new execution environment becomes active
    RunnerStart {
        capabilities: RunnerDescriptor,
        #[serde(default)]
        session: SessionInfo,
    },
    Pending(TestOutcome),
    Pass(TestOutcome),
    Fail(TestOutcome),
    Screenshot(Screenshot),
    End,
}

/// A line of an event stream that is not a valid [`TestEvent`]
#[derive(Debug, thiserror::Error)]
#[error("invalid event on line {line}: {source}")]
pub struct EventParseError {
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Parse a JSON-lines event stream; blank lines are ignored
pub fn parse_events(input: &str) -> Result<Vec<TestEvent>, EventParseError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| EventParseError {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

/// Outcome of one test for one case id, tagged with its environment
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub case_id: u64,
    pub status: TestStatus,
    pub runner: RunnerDescriptor,
    pub comment: String,
}

impl ResultRecord {
    /// Wire form posted to TestRail
    pub fn to_payload(&self) -> ResultPayload {
        ResultPayload {
            case_id: self.case_id,
            status_id: self.status.status_id(),
            comment: self.comment.clone(),
        }
    }
}
