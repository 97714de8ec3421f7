//! testrail-sync - Synchronize automated test results with TestRail.
//!
//! This crate provides:
//! - Case-reference extraction from test titles (`C123`, `TC123`)
//! - A result aggregator fed by test-runner lifecycle events
//! - Reconciliation of results into TestRail runs and plans
//! - A section resolver mirroring folder paths as TestRail sections
//! - Case generation that annotates un-referenced test declarations
//! - An HTTP client and an in-memory store behind one trait
//!
//! # Example
//!
//! ```rust,no_run
//! use testrail_sync::{Publisher, ReporterOptions, ResultAggregator, TestRailClient, parse_events};
//!
//! let config = ReporterOptions::load_with_env("testrail.json")?.validate()?;
//! let events = parse_events(&std::fs::read_to_string("events.jsonl")?)?;
//!
//! if let Some(request) = ResultAggregator::from_config(&config).replay(events) {
//!     let client = TestRailClient::new(&config);
//!     let outcome = Publisher::new(&client, &config).publish(&request)?;
//!     println!("{}", outcome);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod case_ref;
pub mod config;
pub mod generate;
pub mod publish;
pub mod report;
pub mod sections;
pub mod store;

// Re-export case references
pub use case_ref::{has_case_reference, title_to_case_ids};

// Re-export configuration
pub use config::{ConfigError, ConfigResult, ReporterOptions, SuiteSelection, TestRailConfig};

// Re-export reporting types
pub use report::{
    EventParseError, ResultAggregator, ResultRecord, RunnerDescriptor, SessionInfo, TestEvent,
    TestOutcome, parse_events,
};

// Re-export reconciliation
pub use publish::{
    PublishError, PublishOutcome, PublishRequest, PublishResult, PublishStrategy, PublishTarget,
    Publisher,
};

// Re-export section handling and case generation
pub use generate::{CaseGenerator, GenerateError, GenerateResult, GenerateSummary};
pub use sections::{SectionError, SectionResolver, SectionResult};

// Re-export stores
pub use store::{MemoryTestRail, StoreCall, StoreError, StoreResult, TestRailApi, TestRailClient};
