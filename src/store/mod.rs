//! Access to the remote TestRail store.
//!
//! [`TestRailApi`] is the seam between the synchronization logic and the
//! remote side:
//! - [`TestRailClient`] talks to a TestRail instance over HTTP
//! - [`MemoryTestRail`] keeps everything in memory and records mutations
//!   (tests and dry runs)

pub mod client;
pub mod memory;
pub mod types;

pub use client::TestRailClient;
pub use memory::{MemoryTestRail, StoreCall};
pub use types::{
    Case, NewPlan, NewPlanEntry, NewPlanRun, NewRun, Plan, PlanEntry, ResultPayload, Run,
    Section, StoreError, StoreResult, Suite, Test, TestStatus,
};

/// Operations consumed from the test-management store.
///
/// Project-scoped calls use the project the implementation was configured
/// with. Every call is attempted exactly once.
pub trait TestRailApi {
    /// Create a section in `suite_id`, optionally below `parent_id`
    fn add_section(&self, suite_id: u64, name: &str, parent_id: Option<u64>)
        -> StoreResult<Section>;

    /// All sections of a suite
    fn get_sections(&self, suite_id: u64) -> StoreResult<Vec<Section>>;

    /// Create a case in a section
    fn add_case(&self, section_id: u64, title: &str) -> StoreResult<Case>;

    /// All cases of a suite
    fn get_cases(&self, suite_id: u64) -> StoreResult<Vec<Case>>;

    fn get_suite(&self, suite_id: u64) -> StoreResult<Suite>;

    fn add_run(&self, run: &NewRun) -> StoreResult<Run>;

    /// Tests of a run, one per included case
    fn get_tests(&self, run_id: u64) -> StoreResult<Vec<Test>>;

    /// Replace the case ids included in a run
    fn update_run_cases(&self, run_id: u64, case_ids: &[u64]) -> StoreResult<()>;

    fn add_plan(&self, plan: &NewPlan) -> StoreResult<Plan>;

    fn get_plan(&self, plan_id: u64) -> StoreResult<Plan>;

    fn add_plan_entry(&self, plan_id: u64, entry: &NewPlanEntry) -> StoreResult<PlanEntry>;

    /// Replace the case ids included in a plan entry's runs
    fn update_plan_entry_cases(
        &self,
        plan_id: u64,
        entry_id: &str,
        case_ids: &[u64],
    ) -> StoreResult<()>;

    /// Post a batch of results to a run
    fn add_results_for_cases(&self, run_id: u64, results: &[ResultPayload]) -> StoreResult<()>;
}
