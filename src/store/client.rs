//! Blocking HTTP client for the TestRail v2 API.
//!
//! Every call goes to `<base>/index.php?/api/v2/<endpoint>` with basic
//! authentication and JSON bodies. TestRail reports failures as a JSON body
//! with an `error` field; those become [`StoreError::RemoteCall`] unless an
//! error hook is installed with [`TestRailClient::with_error_hook`].
//!
//! List endpoints accept both the legacy bare-array responses and the paged
//! `{ "<key>": [...], "_links": { "next": ... } }` form.

use base64::Engine;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::TestRailApi;
use super::types::{
    Case, NewPlan, NewPlanEntry, NewRun, Plan, PlanEntry, ResultPayload, Run, Section,
    StoreError, StoreResult, Suite, Test,
};
use crate::config::TestRailConfig;

/// Callback receiving `(endpoint, message)` for downgraded remote errors
pub type ErrorHook = Box<dyn Fn(&str, &str) + Send + Sync>;

/// HTTP implementation of [`TestRailApi`]
pub struct TestRailClient {
    agent: ureq::Agent,
    base_url: String,
    authorization: String,
    project_id: u64,
    error_hook: Option<ErrorHook>,
}

impl TestRailClient {
    pub fn new(config: &TestRailConfig) -> Self {
        // TestRail explains 4xx answers in the body, so keep them readable.
        let agent = ureq::config::Config::builder()
            .http_status_as_error(false)
            .build()
            .new_agent();

        let credentials = format!("{}:{}", config.username, config.password);
        let authorization = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        );

        Self {
            agent,
            base_url: config.base_url(),
            authorization,
            project_id: config.project_id,
            error_hook: None,
        }
    }

    /// Downgrade remote errors to a logged event passed to `hook`.
    ///
    /// Calls whose response carries no data then succeed; calls that need an
    /// identifier from the response still fail while decoding it.
    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.error_hook = Some(Box::new(hook));
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}?/api/v2/{}", self.base_url, endpoint)
    }

    fn get(&self, endpoint: &str) -> StoreResult<Value> {
        let url = self.url(endpoint);
        debug!("GET {}", url);

        let response = self
            .agent
            .get(&url)
            .header("Authorization", self.authorization.as_str())
            .header("Content-Type", "application/json")
            .call()
            .map_err(|source| StoreError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        self.read_response(endpoint, response)
    }

    fn post<B: Serialize>(&self, endpoint: &str, body: &B) -> StoreResult<Value> {
        let url = self.url(endpoint);
        let payload = serde_json::to_string(body).map_err(|source| StoreError::Encode {
            endpoint: endpoint.to_string(),
            source,
        })?;
        debug!("POST {}", url);

        let response = self
            .agent
            .post(&url)
            .header("Authorization", self.authorization.as_str())
            .header("Content-Type", "application/json")
            .send(payload.as_bytes())
            .map_err(|source| StoreError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        self.read_response(endpoint, response)
    }

    fn read_response(
        &self,
        endpoint: &str,
        response: ureq::http::Response<ureq::Body>,
    ) -> StoreResult<Value> {
        let status = response.status();
        let text = response
            .into_body()
            .read_to_string()
            .map_err(|source| StoreError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if text.trim().is_empty() {
            if status.is_success() {
                return Ok(Value::Null);
            }
            return self.remote_error(endpoint, format!("HTTP {}", status.as_u16()));
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| StoreError::UnexpectedResponse {
                endpoint: endpoint.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), e),
            })?;

        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            self.remote_error(endpoint, message)?;
        }

        Ok(value)
    }

    fn remote_error(&self, endpoint: &str, message: String) -> StoreResult<Value> {
        match &self.error_hook {
            Some(hook) => {
                warn!("TestRail rejected {}: {}", endpoint, message);
                hook(endpoint, &message);
                Ok(Value::Null)
            }
            None => Err(StoreError::RemoteCall {
                endpoint: endpoint.to_string(),
                message,
            }),
        }
    }

    /// Fetch every item of a list endpoint, following pagination links
    fn get_list<T: DeserializeOwned>(&self, endpoint: &str, key: &str) -> StoreResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(endpoint.to_string());

        while let Some(current) = next.take() {
            match self.get(&current)? {
                Value::Array(list) => {
                    items.extend(decode::<Vec<T>>(&current, Value::Array(list))?);
                }
                Value::Object(mut page) => {
                    let list = page
                        .remove(key)
                        .ok_or_else(|| StoreError::UnexpectedResponse {
                            endpoint: current.clone(),
                            message: format!("missing '{}' field", key),
                        })?;
                    items.extend(decode::<Vec<T>>(&current, list)?);
                    next = page
                        .get("_links")
                        .and_then(|links| links.get("next"))
                        .and_then(Value::as_str)
                        .map(|link| link.trim_start_matches("/api/v2/").to_string());
                }
                other => {
                    return Err(StoreError::UnexpectedResponse {
                        endpoint: current,
                        message: format!("expected a list, got {}", other),
                    });
                }
            }
        }

        Ok(items)
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, value: Value) -> StoreResult<T> {
    serde_json::from_value(value).map_err(|e| StoreError::UnexpectedResponse {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

impl TestRailApi for TestRailClient {
    fn add_section(
        &self,
        suite_id: u64,
        name: &str,
        parent_id: Option<u64>,
    ) -> StoreResult<Section> {
        let endpoint = format!("add_section/{}", self.project_id);
        let mut body = json!({
            "suite_id": suite_id,
            "name": name,
        });
        if let Some(parent_id) = parent_id {
            body["parent_id"] = json!(parent_id);
        }
        let value = self.post(&endpoint, &body)?;
        decode(&endpoint, value)
    }

    fn get_sections(&self, suite_id: u64) -> StoreResult<Vec<Section>> {
        self.get_list(
            &format!("get_sections/{}&suite_id={}", self.project_id, suite_id),
            "sections",
        )
    }

    fn add_case(&self, section_id: u64, title: &str) -> StoreResult<Case> {
        let endpoint = format!("add_case/{}", section_id);
        let value = self.post(&endpoint, &json!({ "title": title }))?;
        decode(&endpoint, value)
    }

    fn get_cases(&self, suite_id: u64) -> StoreResult<Vec<Case>> {
        self.get_list(
            &format!("get_cases/{}&suite_id={}", self.project_id, suite_id),
            "cases",
        )
    }

    fn get_suite(&self, suite_id: u64) -> StoreResult<Suite> {
        let endpoint = format!("get_suite/{}", suite_id);
        let value = self.get(&endpoint)?;
        decode(&endpoint, value)
    }

    fn add_run(&self, run: &NewRun) -> StoreResult<Run> {
        let endpoint = format!("add_run/{}", self.project_id);
        let value = self.post(&endpoint, run)?;
        decode(&endpoint, value)
    }

    fn get_tests(&self, run_id: u64) -> StoreResult<Vec<Test>> {
        self.get_list(&format!("get_tests/{}", run_id), "tests")
    }

    fn update_run_cases(&self, run_id: u64, case_ids: &[u64]) -> StoreResult<()> {
        self.post(&format!("update_run/{}", run_id), &json!({ "case_ids": case_ids }))?;
        Ok(())
    }

    fn add_plan(&self, plan: &NewPlan) -> StoreResult<Plan> {
        let endpoint = format!("add_plan/{}", self.project_id);
        let value = self.post(&endpoint, plan)?;
        decode(&endpoint, value)
    }

    fn get_plan(&self, plan_id: u64) -> StoreResult<Plan> {
        let endpoint = format!("get_plan/{}", plan_id);
        let value = self.get(&endpoint)?;
        decode(&endpoint, value)
    }

    fn add_plan_entry(&self, plan_id: u64, entry: &NewPlanEntry) -> StoreResult<PlanEntry> {
        let endpoint = format!("add_plan_entry/{}", plan_id);
        let value = self.post(&endpoint, entry)?;
        decode(&endpoint, value)
    }

    fn update_plan_entry_cases(
        &self,
        plan_id: u64,
        entry_id: &str,
        case_ids: &[u64],
    ) -> StoreResult<()> {
        self.post(
            &format!("update_plan_entry/{}/{}", plan_id, entry_id),
            &json!({ "case_ids": case_ids }),
        )?;
        Ok(())
    }

    fn add_results_for_cases(&self, run_id: u64, results: &[ResultPayload]) -> StoreResult<()> {
        self.post(
            &format!("add_results_for_cases/{}", run_id),
            &json!({ "results": results }),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuiteSelection;

    fn client() -> TestRailClient {
        let config = TestRailConfig::new(
            "example.testrail.io",
            "qa@example.com",
            "secret",
            7,
            SuiteSelection::Single(1),
        );
        TestRailClient::new(&config)
    }

    #[test]
    fn test_url_layout() {
        let client = client();
        assert_eq!(
            client.url("get_sections/7&suite_id=1"),
            "https://example.testrail.io/index.php?/api/v2/get_sections/7&suite_id=1"
        );
    }

    #[test]
    fn test_basic_authorization_header() {
        let client = client();
        let expected = base64::engine::general_purpose::STANDARD.encode("qa@example.com:secret");
        assert_eq!(client.authorization, format!("Basic {}", expected));
    }

    #[test]
    fn test_remote_error_without_hook_is_fatal() {
        let client = client();
        let err = client
            .remote_error("add_run/7", "Field :suite_id is required".to_string())
            .unwrap_err();
        assert!(matches!(err, StoreError::RemoteCall { .. }));
        assert!(err.to_string().contains("suite_id is required"));
    }

    #[test]
    fn test_remote_error_with_hook_is_downgraded() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let client = client().with_error_hook(move |endpoint, message| {
            sink.lock()
                .unwrap()
                .push(format!("{}: {}", endpoint, message));
        });

        let value = client
            .remote_error("update_run/3", "No access".to_string())
            .unwrap();
        assert_eq!(value, Value::Null);
        assert_eq!(seen.lock().unwrap().as_slice(), ["update_run/3: No access"]);
    }
}
