//! Result reconciliation against the remote store.
//!
//! A [`PublishRequest`] (produced by the aggregator at the end of an
//! execution) is pushed into runs and plans. The layout is decided once from
//! the configured suites, the update ids and the number of distinct runners:
//!
//! | Suites | Runners | Update id | Strategy |
//! |--------|---------|-----------|----------|
//! | one | one | none / `updateRun` | [`PublishStrategy::SingleSuiteSingleCap`] |
//! | one | several | none | [`PublishStrategy::SingleSuiteMultiCap`] |
//! | several | any | none | [`PublishStrategy::MultiSuiteCreate`] |
//! | several, or several runners | | `updatePlan` | [`PublishStrategy::MultiSuiteUpdate`] |
//!
//! Any failing remote call aborts the remaining work.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::TestRailConfig;
use crate::report::{ResultRecord, RunnerDescriptor};
use crate::store::{
    NewPlan, NewPlanEntry, NewPlanRun, NewRun, ResultPayload, StoreError, TestRailApi,
};

/// Result type for publishing
pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no suite configured")]
    NoSuite,

    #[error("plan entry {entry} was created without a run")]
    MissingRun { entry: String },
}

/// Everything gathered during one execution
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub name: String,
    pub description: String,
    pub results: Vec<ResultRecord>,
    /// Distinct environments, in order of first announcement
    pub runners: Vec<RunnerDescriptor>,
}

impl PublishRequest {
    /// Announced runners, or the distinct runners of the records when none
    /// were announced
    pub fn effective_runners(&self) -> Vec<RunnerDescriptor> {
        if !self.runners.is_empty() {
            return self.runners.clone();
        }
        let mut seen = HashSet::new();
        self.results
            .iter()
            .filter(|r| seen.insert(r.runner.canonical_key()))
            .map(|r| r.runner.clone())
            .collect()
    }

    /// Distinct case ids of the results, in order of first appearance
    pub fn case_ids(&self) -> Vec<u64> {
        let mut seen = HashSet::new();
        self.results
            .iter()
            .map(|r| r.case_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// How a request is laid out in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStrategy {
    /// One run; an existing one when `update_run` is set
    SingleSuiteSingleCap { update_run: Option<u64> },
    /// One plan with a run per runner
    SingleSuiteMultiCap,
    /// One plan with a run per suite and runner
    MultiSuiteCreate,
    /// Merge into every entry of an existing plan
    MultiSuiteUpdate { plan_id: u64 },
}

impl PublishStrategy {
    pub fn select(config: &TestRailConfig, runner_count: usize) -> Self {
        let single_suite = config.suites.single().is_some();
        if single_suite && runner_count <= 1 {
            return PublishStrategy::SingleSuiteSingleCap {
                update_run: config.update_run,
            };
        }
        match config.update_plan {
            Some(plan_id) => PublishStrategy::MultiSuiteUpdate { plan_id },
            None if single_suite => PublishStrategy::SingleSuiteMultiCap,
            None => PublishStrategy::MultiSuiteCreate,
        }
    }
}

/// Where the results ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishTarget {
    Run(u64),
    Plan(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub target: PublishTarget,
    pub url: String,
}

impl PublishOutcome {
    fn new(base_url: &str, target: PublishTarget) -> Self {
        let url = match target {
            PublishTarget::Run(id) => format!("{}?/runs/view/{}", base_url, id),
            PublishTarget::Plan(id) => format!("{}?/plans/view/{}", base_url, id),
        };
        Self { target, url }
    }

    /// Hint for reusing the target on the next execution
    pub fn update_hint(&self) -> String {
        match self.target {
            PublishTarget::Run(id) => format!("Add updateRun: {} to your config to update this run.", id),
            PublishTarget::Plan(id) => {
                format!("Add updatePlan: {} to your config to update this plan.", id)
            }
        }
    }
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Results published to {}\n{}", self.url, self.update_hint())
    }
}

/// Pushes publish requests into a [`TestRailApi`]
pub struct Publisher<'a, A: TestRailApi + ?Sized> {
    api: &'a A,
    config: &'a TestRailConfig,
    suite_cases: HashMap<u64, HashSet<u64>>,
}

impl<'a, A: TestRailApi + ?Sized> Publisher<'a, A> {
    pub fn new(api: &'a A, config: &'a TestRailConfig) -> Self {
        Self {
            api,
            config,
            suite_cases: HashMap::new(),
        }
    }

    pub fn publish(&mut self, request: &PublishRequest) -> PublishResult<PublishOutcome> {
        let runners = request.effective_runners();
        let strategy = PublishStrategy::select(self.config, runners.len());
        debug!("publishing {} results with {:?}", request.results.len(), strategy);
        self.suite_cases.clear();

        let target = match strategy {
            PublishStrategy::SingleSuiteSingleCap { update_run } => {
                self.publish_single_run(request, update_run)?
            }
            PublishStrategy::SingleSuiteMultiCap => self.publish_runner_plan(request, &runners)?,
            PublishStrategy::MultiSuiteCreate => self.publish_suite_plan(request, &runners)?,
            PublishStrategy::MultiSuiteUpdate { plan_id } => {
                self.update_plan(request, plan_id)?
            }
        };

        let outcome = PublishOutcome::new(&self.config.base_url(), target);
        info!("Results published to {}", outcome.url);
        info!("{}", outcome.update_hint());
        Ok(outcome)
    }

    fn publish_single_run(
        &mut self,
        request: &PublishRequest,
        update_run: Option<u64>,
    ) -> PublishResult<PublishTarget> {
        let run_id = match update_run {
            Some(run_id) => {
                let mut case_ids: BTreeSet<u64> = self
                    .api
                    .get_tests(run_id)?
                    .into_iter()
                    .map(|t| t.case_id)
                    .collect();
                case_ids.extend(request.case_ids());
                let merged: Vec<u64> = case_ids.into_iter().collect();
                self.api.update_run_cases(run_id, &merged)?;
                run_id
            }
            None => {
                let suite_id = self.config.suites.primary().ok_or(PublishError::NoSuite)?;
                let run = self.api.add_run(&NewRun {
                    suite_id,
                    name: request.name.clone(),
                    description: request.description.clone(),
                    assigned_to_id: self.config.assigned_to_id,
                    include_all: self.config.include_all_test,
                    case_ids: request.case_ids(),
                })?;
                info!("Run {} is created: {}", run.id, run.name);
                run.id
            }
        };

        let payload: Vec<ResultPayload> = request.results.iter().map(ResultRecord::to_payload).collect();
        self.post_results(run_id, &payload)?;
        Ok(PublishTarget::Run(run_id))
    }

    fn publish_runner_plan(
        &mut self,
        request: &PublishRequest,
        runners: &[RunnerDescriptor],
    ) -> PublishResult<PublishTarget> {
        let suite_id = self.config.suites.primary().ok_or(PublishError::NoSuite)?;
        let plan_id = self.create_plan(request)?;
        let suite_name = self.api.get_suite(suite_id)?.name;

        for runner in runners {
            let entry_name = entry_name(runner, &suite_name);
            self.add_entry(request, plan_id, suite_id, runner, &entry_name, &entry_name)?;
        }
        Ok(PublishTarget::Plan(plan_id))
    }

    fn publish_suite_plan(
        &mut self,
        request: &PublishRequest,
        runners: &[RunnerDescriptor],
    ) -> PublishResult<PublishTarget> {
        let suites = self.config.suites.ids();
        if suites.is_empty() {
            return Err(PublishError::NoSuite);
        }
        let plan_id = self.create_plan(request)?;

        for suite_id in suites {
            let suite_name = self.api.get_suite(suite_id)?.name;
            for runner in runners {
                let entry_name = entry_name(runner, &suite_name);
                let run_name = format!("{} | {}", entry_name, suite_name);
                self.add_entry(request, plan_id, suite_id, runner, &entry_name, &run_name)?;
            }
        }
        Ok(PublishTarget::Plan(plan_id))
    }

    fn update_plan(&mut self, request: &PublishRequest, plan_id: u64) -> PublishResult<PublishTarget> {
        let plan = self.api.get_plan(plan_id)?;

        for entry in &plan.entries {
            let Some(run) = entry.runs.first() else {
                warn!("Plan entry {} ({}) has no run, skipping", entry.id, entry.name);
                continue;
            };
            let Some(suite_id) = run.suite_id.or(entry.suite_id) else {
                warn!("Plan entry {} ({}) has no suite, skipping", entry.id, entry.name);
                continue;
            };

            let mut case_ids: BTreeSet<u64> = self
                .api
                .get_tests(run.id)?
                .into_iter()
                .map(|t| t.case_id)
                .collect();
            let suite_cases = self.suite_cases(suite_id)?;
            let matched: Vec<ResultPayload> = request
                .results
                .iter()
                .filter(|r| suite_cases.contains(&r.case_id))
                .map(ResultRecord::to_payload)
                .collect();
            case_ids.extend(matched.iter().map(|r| r.case_id));

            let merged: Vec<u64> = case_ids.into_iter().collect();
            self.api.update_plan_entry_cases(plan.id, &entry.id, &merged)?;
            self.post_results(run.id, &matched)?;
        }
        Ok(PublishTarget::Plan(plan.id))
    }

    fn create_plan(&self, request: &PublishRequest) -> PublishResult<u64> {
        let plan = self.api.add_plan(&NewPlan {
            name: request.name.clone(),
            description: request.description.clone(),
            entries: Vec::new(),
        })?;
        info!("Plan {} is created: {}", plan.id, plan.name);
        Ok(plan.id)
    }

    /// Add one entry for `runner` in `suite_id` and post its matching results
    fn add_entry(
        &mut self,
        request: &PublishRequest,
        plan_id: u64,
        suite_id: u64,
        runner: &RunnerDescriptor,
        entry_name: &str,
        run_name: &str,
    ) -> PublishResult<()> {
        let suite_cases = self.suite_cases(suite_id)?;
        let matched: Vec<ResultPayload> = request
            .results
            .iter()
            .filter(|r| r.runner.same_environment(runner) && suite_cases.contains(&r.case_id))
            .map(ResultRecord::to_payload)
            .collect();
        let case_ids: BTreeSet<u64> = matched.iter().map(|r| r.case_id).collect();

        let entry = self.api.add_plan_entry(
            plan_id,
            &NewPlanEntry {
                suite_id,
                name: entry_name.to_string(),
                description: request.description.clone(),
                include_all: self.config.include_all_test,
                case_ids: case_ids.into_iter().collect(),
                runs: vec![NewPlanRun {
                    name: run_name.to_string(),
                    description: request.description.clone(),
                    suite_id,
                }],
            },
        )?;
        let run_id = entry
            .runs
            .first()
            .map(|run| run.id)
            .ok_or_else(|| PublishError::MissingRun {
                entry: entry.id.clone(),
            })?;
        info!("Plan entry {} is created: {}", entry.id, entry_name);

        self.post_results(run_id, &matched)
    }

    /// Live case ids of a suite, fetched once per publish
    fn suite_cases(&mut self, suite_id: u64) -> PublishResult<HashSet<u64>> {
        if let Some(cases) = self.suite_cases.get(&suite_id) {
            return Ok(cases.clone());
        }
        let cases: HashSet<u64> = self.api.get_cases(suite_id)?.into_iter().map(|c| c.id).collect();
        self.suite_cases.insert(suite_id, cases.clone());
        Ok(cases)
    }

    fn post_results(&self, run_id: u64, results: &[ResultPayload]) -> PublishResult<()> {
        if results.is_empty() {
            warn!("No results matched run {}, nothing posted", run_id);
            return Ok(());
        }
        self.api.add_results_for_cases(run_id, results)?;
        debug!("posted {} results to run {}", results.len(), run_id);
        Ok(())
    }
}

fn entry_name(runner: &RunnerDescriptor, suite_name: &str) -> String {
    let description = runner.describe(true);
    if description.is_empty() {
        suite_name.to_string()
    } else {
        description
    }
}
