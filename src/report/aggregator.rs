//! Accumulates test outcomes for one execution.
//!
//! The aggregator receives lifecycle notifications in the order the runner
//! emits them, counts outcomes, turns every outcome that references cases
//! into [`ResultRecord`]s and remembers each distinct execution environment.
//! [`ResultAggregator::finish`] consumes it and produces the
//! [`PublishRequest`] for the reconciliation step.

use chrono::{DateTime, Local};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::types::{ResultRecord, RunnerDescriptor, Screenshot, SessionInfo, TestEvent, TestOutcome};
use crate::case_ref::title_to_case_ids;
use crate::config::{DEFAULT_RUN_NAME, TestRailConfig};
use crate::publish::PublishRequest;
use crate::store::TestStatus;

const NO_MATCH_WARNING: &str = "No testcases were matched. Ensure that your tests are declared correctly and match C<id> or TC<id>.\n\
     You may use the generate-cases command to annotate them automatically.";

#[derive(Debug, Clone)]
struct StoredScreenshot {
    filename: String,
    url: Option<String>,
}

/// Per-execution result accumulator
#[derive(Debug)]
pub struct ResultAggregator {
    run_name: String,
    errorshot_host: Option<String>,
    passes: usize,
    fails: usize,
    pending: usize,
    results: Vec<ResultRecord>,
    runners: Vec<RunnerDescriptor>,
    runner_keys: HashSet<String>,
    active_runner: RunnerDescriptor,
    session: SessionInfo,
    screenshots: HashMap<String, StoredScreenshot>,
    log: Vec<String>,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_RUN_NAME)
    }
}

impl ResultAggregator {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            errorshot_host: None,
            passes: 0,
            fails: 0,
            pending: 0,
            results: Vec::new(),
            runners: Vec::new(),
            runner_keys: HashSet::new(),
            active_runner: RunnerDescriptor::default(),
            session: SessionInfo::default(),
            screenshots: HashMap::new(),
            log: Vec::new(),
        }
    }

    /// Aggregator using the run name and screenshot host of a configuration
    pub fn from_config(config: &TestRailConfig) -> Self {
        let aggregator = Self::new(config.run_name.clone());
        match &config.errorshot_host {
            Some(host) => aggregator.errorshot_host(host.clone()),
            None => aggregator,
        }
    }

    /// Base URL under which failure screenshots are served
    pub fn errorshot_host(mut self, host: impl Into<String>) -> Self {
        self.errorshot_host = Some(host.into().trim_end_matches('/').to_string());
        self
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn fails(&self) -> usize {
        self.fails
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    /// Distinct environments in order of first announcement
    pub fn runners(&self) -> &[RunnerDescriptor] {
        &self.runners
    }

    /// One `<title>: pass|fail|pending` line per outcome
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Dispatch a single event. `End` is a no-op here; call [`finish`](Self::finish).
    pub fn handle(&mut self, event: TestEvent) {
        match event {
            TestEvent::RunnerStart {
                capabilities,
                session,
            } => self.on_runner_start(capabilities, session),
            TestEvent::Pending(outcome) => self.on_pending(&outcome),
            TestEvent::Pass(outcome) => self.on_pass(&outcome),
            TestEvent::Fail(outcome) => self.on_fail(&outcome),
            TestEvent::Screenshot(screenshot) => self.on_screenshot(screenshot),
            TestEvent::End => {}
        }
    }

    /// Feed events until `End` (or until they run out) and finish
    pub fn replay<I>(mut self, events: I) -> Option<PublishRequest>
    where
        I: IntoIterator<Item = TestEvent>,
    {
        let mut ended = false;
        for event in events {
            if event == TestEvent::End {
                ended = true;
                break;
            }
            self.handle(event);
        }
        if !ended {
            warn!("event stream ended without an end notification");
        }
        self.finish()
    }

    /// Make `capabilities` the active environment; the first announcement of
    /// a structurally equal descriptor is the one kept
    pub fn on_runner_start(&mut self, capabilities: RunnerDescriptor, session: SessionInfo) {
        if self.runner_keys.insert(capabilities.canonical_key()) {
            debug!("new runner: {}", capabilities.describe(true));
            self.runners.push(capabilities.clone());
        }
        self.active_runner = capabilities;
        self.session = session;
    }

    pub fn on_pending(&mut self, outcome: &TestOutcome) {
        self.pending += 1;
        self.log.push(format!("{}: pending", outcome.title));
    }

    pub fn on_pass(&mut self, outcome: &TestOutcome) {
        self.passes += 1;
        self.log.push(format!("{}: pass", outcome.title));
        self.record(outcome, TestStatus::Passed, outcome.title.clone());
    }

    pub fn on_fail(&mut self, outcome: &TestOutcome) {
        self.fails += 1;
        self.log.push(format!("{}: fail", outcome.title));
        let comment = self.failure_comment(outcome);
        self.record(outcome, TestStatus::Failed, comment);
    }

    pub fn on_screenshot(&mut self, screenshot: Screenshot) {
        let url = self
            .errorshot_host
            .as_ref()
            .map(|host| format!("{}/{}", host, screenshot.filename));
        self.screenshots.insert(
            screenshot.uid,
            StoredScreenshot {
                filename: screenshot.filename,
                url,
            },
        );
    }

    fn record(&mut self, outcome: &TestOutcome, status: TestStatus, comment: String) {
        for case_id in title_to_case_ids(&outcome.title) {
            self.results.push(ResultRecord {
                case_id,
                status,
                runner: self.active_runner.clone(),
                comment: comment.clone(),
            });
        }
    }

    fn failure_comment(&self, outcome: &TestOutcome) -> String {
        let (message, stack) = outcome
            .error
            .as_ref()
            .map(|e| (e.message.as_str(), e.stack.as_str()))
            .unwrap_or_default();

        format!(
            "{title}\n\n\
             **{message}**\n\n\
             > {stack}\n\n\
             ----\n\n\
             _Additional Test Context_\n\n\
             **Session Id/Saucelabs Link:**\n\
             > {session}\n\n\
             **Browser Info:**\n\
             > {browser}\n\n\
             **Screenshot:**\n\
             > {screenshot}\n",
            title = outcome.title,
            message = message,
            stack = stack,
            session = self.session_link(),
            browser = self.active_runner.describe(true),
            screenshot = self.screenshot_reference(&outcome.uid),
        )
    }

    fn session_link(&self) -> String {
        let Some(host) = &self.session.host else {
            return "Not available".to_string();
        };
        let session_id = self.session.session_id.as_deref().unwrap_or("unknown");
        if host.contains("saucelabs.com") || self.session.sauce_connect {
            format!("Check out job at https://saucelabs.com/tests/{}", session_id)
        } else {
            session_id.to_string()
        }
    }

    fn screenshot_reference(&self, uid: &str) -> String {
        match self.screenshots.get(uid) {
            Some(StoredScreenshot {
                filename,
                url: Some(url),
            }) => {
                let link = format!("[{}]({})", filename, url);
                format!("!{}\n> {}", link, link)
            }
            Some(StoredScreenshot { filename, url: None }) => filename.clone(),
            None => "No screenshot available.".to_string(),
        }
    }

    /// End of execution, stamped with the current local time
    pub fn finish(self) -> Option<PublishRequest> {
        self.finish_at(Local::now())
    }

    /// End of execution. Returns `None` (after a warning) when no outcome
    /// referenced a case, so nothing must be published.
    pub fn finish_at(self, at: DateTime<Local>) -> Option<PublishRequest> {
        for line in &self.log {
            debug!("{}", line);
        }
        if self.results.is_empty() {
            warn!("{}", NO_MATCH_WARNING);
            return None;
        }

        let total = self.passes + self.fails + self.pending;
        let name = format!(
            "{}: automated test run {}",
            self.run_name,
            at.format("%Y-%m-%d %H:%M:%S %:z")
        );
        let description = format!(
            "{}\n**Execution summary:**\nPasses: {}\nFails: {}\nPending: {}\nTotal: {}\n",
            name, self.passes, self.fails, self.pending, total
        );

        Some(PublishRequest {
            name,
            description,
            results: self.results,
            runners: self.runners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn chrome() -> RunnerDescriptor {
        RunnerDescriptor::browser("chrome", Some("91"), Some("Linux"))
    }

    #[test]
    fn test_pending_only_counts() {
        let mut aggregator = ResultAggregator::default();
        aggregator.on_pending(&TestOutcome::new("1", "later C5"));
        assert_eq!(aggregator.pending(), 1);
        assert!(aggregator.results().is_empty());
        assert_eq!(aggregator.log(), ["later C5: pending"]);
    }

    #[test]
    fn test_pass_records_every_case_id() {
        let mut aggregator = ResultAggregator::default();
        aggregator.on_runner_start(chrome(), SessionInfo::default());
        aggregator.on_pass(&TestOutcome::new("1", "C1 C2 works"));

        let results = aggregator.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].case_id, 1);
        assert_eq!(results[1].case_id, 2);
        assert!(results.iter().all(|r| r.status == TestStatus::Passed));
        assert!(results.iter().all(|r| r.comment == "C1 C2 works"));
        assert!(results.iter().all(|r| r.runner == chrome()));
    }

    #[test]
    fn test_unreferenced_outcomes_are_counted_only() {
        let mut aggregator = ResultAggregator::default();
        aggregator.on_pass(&TestOutcome::new("1", "no reference"));
        assert_eq!(aggregator.passes(), 1);
        assert!(aggregator.results().is_empty());
    }

    #[test]
    fn test_runners_are_deduplicated() {
        let mut aggregator = ResultAggregator::default();
        aggregator.on_runner_start(chrome(), SessionInfo::default());
        aggregator.on_runner_start(
            RunnerDescriptor::browser("firefox", None, None),
            SessionInfo::default(),
        );
        aggregator.on_runner_start(chrome(), SessionInfo::default());
        assert_eq!(aggregator.runners().len(), 2);
        assert_eq!(aggregator.runners()[0], chrome());
    }

    #[test]
    fn test_failure_comment_with_saucelabs_and_screenshot() {
        let mut aggregator = ResultAggregator::default().errorshot_host("https://shots.example.com/");
        aggregator.on_runner_start(
            chrome(),
            SessionInfo {
                session_id: Some("abc123".to_string()),
                host: Some("ondemand.saucelabs.com".to_string()),
                sauce_connect: false,
            },
        );
        aggregator.on_screenshot(Screenshot {
            uid: "7".to_string(),
            filename: "login.png".to_string(),
        });
        aggregator.on_fail(&TestOutcome::new("7", "logs in C9").with_error("expected true", "at login.js:3"));

        let comment = &aggregator.results()[0].comment;
        assert!(comment.starts_with("logs in C9\n\n**expected true**\n\n> at login.js:3"));
        assert!(comment.contains("Check out job at https://saucelabs.com/tests/abc123"));
        assert!(comment.contains("> chrome (v91) on Linux"));
        assert!(comment.contains("![login.png](https://shots.example.com/login.png)"));
        assert_eq!(aggregator.results()[0].status, TestStatus::Failed);
    }

    #[test]
    fn test_failure_comment_without_context() {
        let mut aggregator = ResultAggregator::default();
        aggregator.on_runner_start(
            chrome(),
            SessionInfo {
                session_id: Some("s-1".to_string()),
                host: Some("grid.internal".to_string()),
                sauce_connect: false,
            },
        );
        aggregator.on_screenshot(Screenshot {
            uid: "other".to_string(),
            filename: "other.png".to_string(),
        });
        aggregator.on_fail(&TestOutcome::new("7", "C9 fails").with_error("boom", ""));

        let comment = &aggregator.results()[0].comment;
        assert!(comment.contains("**Session Id/Saucelabs Link:**\n> s-1"));
        assert!(comment.contains("**Screenshot:**\n> No screenshot available."));
    }

    #[test]
    fn test_screenshot_without_host_uses_filename() {
        let mut aggregator = ResultAggregator::default();
        aggregator.on_screenshot(Screenshot {
            uid: "7".to_string(),
            filename: "login.png".to_string(),
        });
        aggregator.on_fail(&TestOutcome::new("7", "C9 fails"));
        let comment = &aggregator.results()[0].comment;
        assert!(comment.contains("**Screenshot:**\n> login.png"));
        assert!(comment.contains("**Session Id/Saucelabs Link:**\n> Not available"));
    }

    #[test]
    fn test_finish_without_results_is_noop() {
        let mut aggregator = ResultAggregator::default();
        aggregator.on_pass(&TestOutcome::new("1", "no reference"));
        assert!(aggregator.finish().is_none());
    }

    #[test]
    fn test_finish_builds_summary() {
        let mut aggregator = ResultAggregator::new("Nightly");
        aggregator.on_runner_start(chrome(), SessionInfo::default());
        aggregator.on_pass(&TestOutcome::new("1", "does X (TC42)"));
        aggregator.on_fail(&TestOutcome::new("2", "does Y C43").with_error("boom", ""));
        aggregator.on_pending(&TestOutcome::new("3", "does Z"));

        let at = Local.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        let request = aggregator.finish_at(at).unwrap();

        assert!(request.name.starts_with("Nightly: automated test run 2026-10-19 08:30:00"));
        assert!(request.description.contains("Passes: 1\nFails: 1\nPending: 1\nTotal: 3"));
        assert_eq!(request.results.len(), 2);
        assert_eq!(request.runners, vec![chrome()]);
    }

    #[test]
    fn test_replay_stops_at_end() {
        let events = vec![
            TestEvent::RunnerStart {
                capabilities: chrome(),
                session: SessionInfo::default(),
            },
            TestEvent::Pass(TestOutcome::new("1", "C1 works")),
            TestEvent::End,
            TestEvent::Pass(TestOutcome::new("2", "C2 ignored")),
        ];
        let request = ResultAggregator::default().replay(events).unwrap();
        assert_eq!(request.results.len(), 1);
        assert_eq!(request.results[0].case_id, 1);
    }
}
