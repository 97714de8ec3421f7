// Wire types for the TestRail v2 API

use serde::{Deserialize, Serialize};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a [`TestRailApi`](super::TestRailApi) implementation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// TestRail answered with an `error` body
    #[error("TestRail rejected {endpoint}: {message}")]
    RemoteCall { endpoint: String, message: String },

    /// The HTTP exchange itself failed
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: ureq::Error,
    },

    /// The response could not be decoded into the expected shape
    #[error("unexpected response from {endpoint}: {message}")]
    UnexpectedResponse { endpoint: String, message: String },

    /// The request body could not be encoded
    #[error("failed to encode request for {endpoint}: {source}")]
    Encode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A node in the suite's section tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub suite_id: Option<u64>,
}

/// A test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub section_id: Option<u64>,
    #[serde(default)]
    pub suite_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suite {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// A test run, standalone or inside a plan entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: u64,
    #[serde(default)]
    pub suite_id: Option<u64>,
    #[serde(default)]
    pub name: String,
}

/// A test inside a run; `case_id` links it back to its case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    #[serde(default)]
    pub id: u64,
    pub case_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub entries: Vec<PlanEntry>,
}

/// Plan entries are identified by a GUID string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub id: String,
    #[serde(default)]
    pub suite_id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub runs: Vec<Run>,
}

/// Body of `add_run`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRun {
    pub suite_id: u64,
    pub name: String,
    pub description: String,
    #[serde(rename = "assignedto_id", skip_serializing_if = "Option::is_none")]
    pub assigned_to_id: Option<u64>,
    pub include_all: bool,
    pub case_ids: Vec<u64>,
}

/// Body of `add_plan`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlan {
    pub name: String,
    pub description: String,
    pub entries: Vec<NewPlanEntry>,
}

/// Body of `add_plan_entry`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlanEntry {
    pub suite_id: u64,
    pub name: String,
    pub description: String,
    pub include_all: bool,
    pub case_ids: Vec<u64>,
    pub runs: Vec<NewPlanRun>,
}

/// A run configuration inside [`NewPlanEntry`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlanRun {
    pub name: String,
    pub description: String,
    pub suite_id: u64,
}

/// TestRail result statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    Passed,
    Blocked,
    Untested,
    Retest,
    Failed,
}

impl TestStatus {
    /// Numeric status id understood by TestRail
    pub fn status_id(self) -> u8 {
        match self {
            TestStatus::Passed => 1,
            TestStatus::Blocked => 2,
            TestStatus::Untested => 3,
            TestStatus::Retest => 4,
            TestStatus::Failed => 5,
        }
    }
}

/// One element of the `add_results_for_cases` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub case_id: u64,
    pub status_id: u8,
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ids() {
        assert_eq!(TestStatus::Passed.status_id(), 1);
        assert_eq!(TestStatus::Failed.status_id(), 5);
    }

    #[test]
    fn test_new_run_serializes_testrail_keys() {
        let run = NewRun {
            suite_id: 2,
            name: "nightly".to_string(),
            description: String::new(),
            assigned_to_id: Some(8),
            include_all: false,
            case_ids: vec![1, 2],
        };
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["assignedto_id"], 8);
        assert_eq!(json["case_ids"], serde_json::json!([1, 2]));

        let unassigned = NewRun {
            assigned_to_id: None,
            ..run
        };
        let json = serde_json::to_value(&unassigned).unwrap();
        assert!(json.get("assignedto_id").is_none());
    }

    #[test]
    fn test_plan_decodes_entries() {
        let plan: Plan = serde_json::from_str(
            r#"{"id": 4, "name": "p", "entries": [
                {"id": "a1b2", "suite_id": 3, "runs": [{"id": 11, "suite_id": 3, "name": "chrome"}]}
            ], "milestone_id": null}"#,
        )
        .unwrap();
        assert_eq!(plan.entries[0].id, "a1b2");
        assert_eq!(plan.entries[0].runs[0].id, 11);
    }
}
