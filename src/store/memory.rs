//! In-memory TestRail store.
//!
//! Implements [`TestRailApi`] without a server: ids are handed out
//! sequentially and every mutating call is recorded as a [`StoreCall`] so
//! tests (and `--dry-run`) can inspect exactly what would have been sent.
//! Individual endpoints can be made to fail with [`MemoryTestRail::fail_on`].

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::TestRailApi;
use super::types::{
    Case, NewPlan, NewPlanEntry, NewRun, Plan, PlanEntry, ResultPayload, Run, Section,
    StoreError, StoreResult, Suite, Test,
};

/// A mutating call received by [`MemoryTestRail`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    AddSection {
        suite_id: u64,
        name: String,
        parent_id: Option<u64>,
    },
    AddCase {
        section_id: u64,
        title: String,
    },
    AddRun(NewRun),
    UpdateRunCases {
        run_id: u64,
        case_ids: Vec<u64>,
    },
    AddPlan(NewPlan),
    AddPlanEntry {
        plan_id: u64,
        entry: NewPlanEntry,
    },
    UpdatePlanEntryCases {
        plan_id: u64,
        entry_id: String,
        case_ids: Vec<u64>,
    },
    AddResults {
        run_id: u64,
        results: Vec<ResultPayload>,
    },
}

#[derive(Debug, Clone)]
struct StoredRun {
    run: Run,
    case_ids: Vec<u64>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    next_entry: u64,
    suites: BTreeMap<u64, Suite>,
    sections: Vec<Section>,
    cases: Vec<Case>,
    runs: BTreeMap<u64, StoredRun>,
    plans: BTreeMap<u64, Plan>,
    results: BTreeMap<u64, Vec<ResultPayload>>,
    calls: Vec<StoreCall>,
    failing: HashSet<String>,
}

impl MemoryState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, endpoint: &str) -> StoreResult<()> {
        if self.failing.contains(endpoint) {
            return Err(StoreError::RemoteCall {
                endpoint: endpoint.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn not_found(endpoint: &str, what: &str, id: impl std::fmt::Display) -> StoreError {
        StoreError::RemoteCall {
            endpoint: endpoint.to_string(),
            message: format!("Field :{} is not a valid {} ({})", what, what, id),
        }
    }
}

/// In-memory implementation of [`TestRailApi`]
#[derive(Debug)]
pub struct MemoryTestRail {
    state: Mutex<MemoryState>,
}

impl Default for MemoryTestRail {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTestRail {
    /// Create an empty store; generated ids start at 1000
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_id: 999,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a suite
    pub fn with_suite(self, id: u64, name: &str) -> Self {
        self.lock().suites.insert(
            id,
            Suite {
                id,
                name: name.to_string(),
            },
        );
        self
    }

    /// Register existing cases belonging to a suite
    pub fn with_cases(self, suite_id: u64, case_ids: &[u64]) -> Self {
        {
            let mut state = self.lock();
            for &id in case_ids {
                state.cases.push(Case {
                    id,
                    title: format!("C{}", id),
                    section_id: None,
                    suite_id: Some(suite_id),
                });
            }
        }
        self
    }

    /// Register an existing section
    pub fn with_section(self, id: u64, name: &str, parent_id: Option<u64>, suite_id: u64) -> Self {
        self.lock().sections.push(Section {
            id,
            name: name.to_string(),
            parent_id,
            suite_id: Some(suite_id),
        });
        self
    }

    /// Register an existing run including the given cases
    pub fn with_run(self, id: u64, suite_id: u64, case_ids: &[u64]) -> Self {
        self.lock().runs.insert(
            id,
            StoredRun {
                run: Run {
                    id,
                    suite_id: Some(suite_id),
                    name: format!("run {}", id),
                },
                case_ids: case_ids.to_vec(),
            },
        );
        self
    }

    /// Register an existing plan with one entry per `(entry_id, run_id, suite_id)`.
    /// The runs must be registered with [`with_run`](Self::with_run).
    pub fn with_plan(self, id: u64, entries: &[(&str, u64, u64)]) -> Self {
        {
            let mut state = self.lock();
            let entries = entries
                .iter()
                .map(|&(entry_id, run_id, suite_id)| PlanEntry {
                    id: entry_id.to_string(),
                    suite_id: Some(suite_id),
                    name: entry_id.to_string(),
                    runs: state
                        .runs
                        .get(&run_id)
                        .map(|stored| vec![stored.run.clone()])
                        .unwrap_or_default(),
                })
                .collect();
            state.plans.insert(
                id,
                Plan {
                    id,
                    name: format!("plan {}", id),
                    entries,
                },
            );
        }
        self
    }

    /// Make every call to the named endpoint (e.g. `"add_section"`) fail
    pub fn fail_on(&self, endpoint: &str) {
        self.lock().failing.insert(endpoint.to_string());
    }

    /// Mutating calls received so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// All sections, existing and created
    pub fn sections(&self) -> Vec<Section> {
        self.lock().sections.clone()
    }

    /// All cases, existing and created
    pub fn cases(&self) -> Vec<Case> {
        self.lock().cases.clone()
    }

    /// Case ids currently included in a run
    pub fn run_case_ids(&self, run_id: u64) -> Option<Vec<u64>> {
        self.lock().runs.get(&run_id).map(|r| r.case_ids.clone())
    }

    /// Every result posted to a run
    pub fn run_results(&self, run_id: u64) -> Vec<ResultPayload> {
        self.lock().results.get(&run_id).cloned().unwrap_or_default()
    }

    pub fn plan(&self, plan_id: u64) -> Option<Plan> {
        self.lock().plans.get(&plan_id).cloned()
    }
}

impl TestRailApi for MemoryTestRail {
    fn add_section(
        &self,
        suite_id: u64,
        name: &str,
        parent_id: Option<u64>,
    ) -> StoreResult<Section> {
        let mut state = self.lock();
        state.check("add_section")?;
        state.calls.push(StoreCall::AddSection {
            suite_id,
            name: name.to_string(),
            parent_id,
        });
        let section = Section {
            id: state.allocate(),
            name: name.to_string(),
            parent_id,
            suite_id: Some(suite_id),
        };
        state.sections.push(section.clone());
        Ok(section)
    }

    fn get_sections(&self, suite_id: u64) -> StoreResult<Vec<Section>> {
        let state = self.lock();
        state.check("get_sections")?;
        Ok(state
            .sections
            .iter()
            .filter(|s| s.suite_id == Some(suite_id))
            .cloned()
            .collect())
    }

    fn add_case(&self, section_id: u64, title: &str) -> StoreResult<Case> {
        let mut state = self.lock();
        state.check("add_case")?;
        let suite_id = state
            .sections
            .iter()
            .find(|s| s.id == section_id)
            .map(|s| s.suite_id)
            .ok_or_else(|| MemoryState::not_found("add_case", "section_id", section_id))?;
        state.calls.push(StoreCall::AddCase {
            section_id,
            title: title.to_string(),
        });
        let case = Case {
            id: state.allocate(),
            title: title.to_string(),
            section_id: Some(section_id),
            suite_id,
        };
        state.cases.push(case.clone());
        Ok(case)
    }

    fn get_cases(&self, suite_id: u64) -> StoreResult<Vec<Case>> {
        let state = self.lock();
        state.check("get_cases")?;
        Ok(state
            .cases
            .iter()
            .filter(|c| c.suite_id == Some(suite_id))
            .cloned()
            .collect())
    }

    fn get_suite(&self, suite_id: u64) -> StoreResult<Suite> {
        let state = self.lock();
        state.check("get_suite")?;
        state
            .suites
            .get(&suite_id)
            .cloned()
            .ok_or_else(|| MemoryState::not_found("get_suite", "suite_id", suite_id))
    }

    fn add_run(&self, run: &NewRun) -> StoreResult<Run> {
        let mut state = self.lock();
        state.check("add_run")?;
        state.calls.push(StoreCall::AddRun(run.clone()));
        let created = Run {
            id: state.allocate(),
            suite_id: Some(run.suite_id),
            name: run.name.clone(),
        };
        state.runs.insert(
            created.id,
            StoredRun {
                run: created.clone(),
                case_ids: run.case_ids.clone(),
            },
        );
        Ok(created)
    }

    fn get_tests(&self, run_id: u64) -> StoreResult<Vec<Test>> {
        let state = self.lock();
        state.check("get_tests")?;
        let run = state
            .runs
            .get(&run_id)
            .ok_or_else(|| MemoryState::not_found("get_tests", "run_id", run_id))?;
        Ok(run
            .case_ids
            .iter()
            .enumerate()
            .map(|(i, &case_id)| Test {
                id: run_id * 10_000 + i as u64,
                case_id,
            })
            .collect())
    }

    fn update_run_cases(&self, run_id: u64, case_ids: &[u64]) -> StoreResult<()> {
        let mut state = self.lock();
        state.check("update_run")?;
        state.calls.push(StoreCall::UpdateRunCases {
            run_id,
            case_ids: case_ids.to_vec(),
        });
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| MemoryState::not_found("update_run", "run_id", run_id))?;
        run.case_ids = case_ids.to_vec();
        Ok(())
    }

    fn add_plan(&self, plan: &NewPlan) -> StoreResult<Plan> {
        let mut state = self.lock();
        state.check("add_plan")?;
        state.calls.push(StoreCall::AddPlan(plan.clone()));
        let created = Plan {
            id: state.allocate(),
            name: plan.name.clone(),
            entries: Vec::new(),
        };
        state.plans.insert(created.id, created.clone());
        Ok(created)
    }

    fn get_plan(&self, plan_id: u64) -> StoreResult<Plan> {
        let state = self.lock();
        state.check("get_plan")?;
        state
            .plans
            .get(&plan_id)
            .cloned()
            .ok_or_else(|| MemoryState::not_found("get_plan", "plan_id", plan_id))
    }

    fn add_plan_entry(&self, plan_id: u64, entry: &NewPlanEntry) -> StoreResult<PlanEntry> {
        let mut state = self.lock();
        state.check("add_plan_entry")?;
        if !state.plans.contains_key(&plan_id) {
            return Err(MemoryState::not_found("add_plan_entry", "plan_id", plan_id));
        }
        state.calls.push(StoreCall::AddPlanEntry {
            plan_id,
            entry: entry.clone(),
        });

        state.next_entry += 1;
        let entry_id = format!("entry-{}", state.next_entry);
        let mut runs = Vec::new();
        for config in &entry.runs {
            let run = Run {
                id: state.allocate(),
                suite_id: Some(config.suite_id),
                name: config.name.clone(),
            };
            state.runs.insert(
                run.id,
                StoredRun {
                    run: run.clone(),
                    case_ids: entry.case_ids.clone(),
                },
            );
            runs.push(run);
        }

        let created = PlanEntry {
            id: entry_id,
            suite_id: Some(entry.suite_id),
            name: entry.name.clone(),
            runs,
        };
        if let Some(plan) = state.plans.get_mut(&plan_id) {
            plan.entries.push(created.clone());
        }
        Ok(created)
    }

    fn update_plan_entry_cases(
        &self,
        plan_id: u64,
        entry_id: &str,
        case_ids: &[u64],
    ) -> StoreResult<()> {
        let mut state = self.lock();
        state.check("update_plan_entry")?;
        state.calls.push(StoreCall::UpdatePlanEntryCases {
            plan_id,
            entry_id: entry_id.to_string(),
            case_ids: case_ids.to_vec(),
        });
        let run_ids: Vec<u64> = state
            .plans
            .get(&plan_id)
            .and_then(|plan| plan.entries.iter().find(|e| e.id == entry_id))
            .map(|entry| entry.runs.iter().map(|r| r.id).collect())
            .ok_or_else(|| MemoryState::not_found("update_plan_entry", "entry_id", entry_id))?;
        for run_id in run_ids {
            if let Some(run) = state.runs.get_mut(&run_id) {
                run.case_ids = case_ids.to_vec();
            }
        }
        Ok(())
    }

    fn add_results_for_cases(&self, run_id: u64, results: &[ResultPayload]) -> StoreResult<()> {
        let mut state = self.lock();
        state.check("add_results_for_cases")?;
        if !state.runs.contains_key(&run_id) {
            return Err(MemoryState::not_found("add_results_for_cases", "run_id", run_id));
        }
        state.calls.push(StoreCall::AddResults {
            run_id,
            results: results.to_vec(),
        });
        state
            .results
            .entry(run_id)
            .or_default()
            .extend_from_slice(results);
        Ok(())
    }
}
