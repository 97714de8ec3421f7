use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::error::Error;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use testrail_sync::config::{DEFAULT_CONFIG_PATH, ENV_CONFIG, ReporterOptions, TestRailConfig};
use testrail_sync::generate::{CaseGenerator, DEFAULT_MARKER};
use testrail_sync::publish::{PublishRequest, Publisher};
use testrail_sync::report::{ResultAggregator, parse_events};
use testrail_sync::store::{MemoryTestRail, TestRailApi, TestRailClient};

/// testrail-sync - Synchronize automated test results with TestRail
#[derive(Parser, Debug)]
#[command(
    name = "testrail-sync",
    version,
    about = "Publish test results to TestRail and annotate tests with case ids",
    after_help = "ENVIRONMENT VARIABLES:\n\
        TESTRAIL_CONFIG           Path of the JSON options file\n\
        TESTRAIL_DOMAIN           TestRail host, e.g. example.testrail.io\n\
        TESTRAIL_USERNAME         TestRail user\n\
        TESTRAIL_PASSWORD         TestRail password or API key\n\
        TESTRAIL_PROJECT_ID       Project id\n\
        TESTRAIL_SUITE_ID         Suite id, comma-separated for several suites\n\
        TESTRAIL_UPDATE_RUN       Existing run to update\n\
        TESTRAIL_UPDATE_PLAN      Existing plan to update\n\
        TESTRAIL_RUN_NAME         Prefix of run and plan names\n\
        TESTRAIL_ERRORSHOT_HOST   Base URL of failure screenshots\n\
        RUST_LOG                  Log filter (overrides --verbose)"
)]
struct Args {
    /// Path of the JSON options file
    #[arg(short, long, global = true, env = ENV_CONFIG, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON-lines event file and publish the results
    Report {
        /// Event file, one JSON event per line
        #[arg(short, long)]
        events: PathBuf,

        /// Publish into an in-memory store and print the calls instead
        #[arg(long)]
        dry_run: bool,
    },

    /// Create cases for un-annotated test declarations and annotate them
    GenerateCases {
        /// Base folder of the test sources
        base_dir: PathBuf,

        /// Name of the test declaration function
        #[arg(short, long, default_value = DEFAULT_MARKER)]
        marker: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = ReporterOptions::load_with_env(&args.config)?.validate()?;
    debug!("loaded {:?}", config);

    match args.command {
        Commands::Report { events, dry_run } => {
            let events = parse_events(&std::fs::read_to_string(&events)?)?;
            info!("replaying {} events", events.len());

            let Some(request) = ResultAggregator::from_config(&config).replay(events) else {
                return Ok(());
            };

            if dry_run {
                let store = dry_run_store(&config, &request);
                publish(&store, &config, &request)?;
                println!("\nCalls that would have been made:");
                for call in store.calls() {
                    println!("  {:?}", call);
                }
            } else {
                let client = TestRailClient::new(&config);
                publish(&client, &config, &request)?;
            }
        }

        Commands::GenerateCases { base_dir, marker } => {
            let suite_id = config
                .suites
                .primary()
                .ok_or("suiteId must name at least one suite")?;
            println!("Searching for test functions with '{}' keyword", marker);

            let client = TestRailClient::new(&config);
            let summary = CaseGenerator::new(&client, suite_id, &marker)?.run(&base_dir)?;

            println!(
                "Scanned {} files: {} updated, {} cases and {} sections created",
                summary.files_scanned,
                summary.files_updated,
                summary.cases_created,
                summary.sections_created
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn publish<A: TestRailApi>(
    api: &A,
    config: &TestRailConfig,
    request: &PublishRequest,
) -> Result<(), Box<dyn Error>> {
    let outcome = Publisher::new(api, config).publish(request)?;
    println!("{}", outcome);
    Ok(())
}

/// In-memory store shaped like the configured project: every configured
/// suite exists and contains every referenced case
fn dry_run_store(config: &TestRailConfig, request: &PublishRequest) -> MemoryTestRail {
    let case_ids: Vec<u64> = request
        .results
        .iter()
        .map(|r| r.case_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut store = MemoryTestRail::new();
    for suite_id in config.suites.ids() {
        store = store
            .with_suite(suite_id, &format!("Suite {}", suite_id))
            .with_cases(suite_id, &case_ids);
    }
    if let Some(run_id) = config.update_run {
        store = store.with_run(run_id, config.suites.primary().unwrap_or_default(), &[]);
    }
    if let Some(plan_id) = config.update_plan {
        store = store.with_plan(plan_id, &[]);
    }
    store
}
