//! Test-runner side of the synchronizer.
//!
//! Lifecycle events ([`TestEvent`]) are fed into a [`ResultAggregator`],
//! which collects [`ResultRecord`]s and the distinct [`RunnerDescriptor`]s
//! of one execution.

pub mod aggregator;
pub mod environment;
pub mod types;

pub use aggregator::ResultAggregator;
pub use types::{
    EventParseError, ResultRecord, RunnerDescriptor, Screenshot, SessionInfo, TestError,
    TestEvent, TestOutcome, parse_events,
};
