use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use opwatch_core::{
    AlertSweeper, OperationKind, OperationWrapper, PerformanceBudget, StartOptions, Tracker,
    TrackerConfig, TrackerEvent,
};

#[derive(Parser)]
#[command(name = "opwatch")]
#[command(about = "Operation lifecycle tracker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a handful of simulated operations and print the report as JSON
    Demo {
        /// Tracker configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Interval between synthetic progress stages
        #[arg(long, default_value = "100")]
        tick_ms: u64,
    },

    /// Print the default configuration as JSON
    Config,

    /// Validate a configuration file
    Check {
        /// Path to configuration file
        config: PathBuf,
    },
}

/// One simulated unit of work.
#[async_trait]
trait DemoOperation: Send + Sync {
    fn id(&self) -> &'static str;

    fn kind(&self) -> OperationKind;

    fn stages(&self) -> &'static [&'static str] {
        &[]
    }

    fn budget(&self) -> Option<PerformanceBudget> {
        None
    }

    async fn execute(&self) -> Result<String, String>;
}

#[derive(Debug, Deserialize)]
struct ListingsPayload {
    listings: Vec<Listing>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    id: u32,
    price: f64,
}

const LISTINGS_JSON: &str = r#"{
    "listings": [
        { "id": 1, "price": 420000.0 },
        { "id": 2, "price": 385000.0 },
        { "id": 3, "price": 512500.0 }
    ]
}"#;

struct FetchListings;

#[async_trait]
impl DemoOperation for FetchListings {
    fn id(&self) -> &'static str {
        "fetch.listings"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Data
    }

    fn stages(&self) -> &'static [&'static str] {
        &["connecting", "downloading", "parsing"]
    }

    fn budget(&self) -> Option<PerformanceBudget> {
        Some(PerformanceBudget::new(Duration::from_millis(2000)))
    }

    async fn execute(&self) -> Result<String, String> {
        sleep(Duration::from_millis(450)).await;
        let payload: ListingsPayload =
            serde_json::from_str(LISTINGS_JSON).map_err(|e| format!("json decode: {e}"))?;
        let ids: Vec<u32> = payload.listings.iter().map(|l| l.id).collect();
        let total: f64 = payload.listings.iter().map(|l| l.price).sum();
        Ok(format!("{} listings {ids:?}, total {total:.0}", ids.len()))
    }
}

/// Fails a fixed number of times before succeeding.
struct PriceCalculation {
    remaining_failures: AtomicU32,
}

impl PriceCalculation {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl DemoOperation for PriceCalculation {
    fn id(&self) -> &'static str {
        "calc.price"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Calculation
    }

    fn stages(&self) -> &'static [&'static str] {
        &["loading rates", "computing"]
    }

    async fn execute(&self) -> Result<String, String> {
        sleep(Duration::from_millis(200)).await;
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(format!("rate service unavailable (left={left})"));
        }
        Ok("price computed".into())
    }
}

/// Slower than its own budget on purpose.
struct SubmitForm;

#[async_trait]
impl DemoOperation for SubmitForm {
    fn id(&self) -> &'static str {
        "form.submit"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Form
    }

    fn stages(&self) -> &'static [&'static str] {
        &["validating", "saving"]
    }

    fn budget(&self) -> Option<PerformanceBudget> {
        Some(PerformanceBudget::new(Duration::from_millis(1000)))
    }

    async fn execute(&self) -> Result<String, String> {
        sleep(Duration::from_millis(1300)).await;
        Ok("form saved".into())
    }
}

struct Navigate;

#[async_trait]
impl DemoOperation for Navigate {
    fn id(&self) -> &'static str {
        "nav.details"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Navigation
    }

    async fn execute(&self) -> Result<String, String> {
        sleep(Duration::from_millis(80)).await;
        Ok("details page".into())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("opwatch=info,opwatch_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run `op` once, then retry while it fails and its budget still allows it.
async fn run_operation(tracker: Tracker, op: Arc<dyn DemoOperation>, tick: Duration) {
    let wrapper = OperationWrapper::new(tracker.clone(), op.id())
        .with_options(StartOptions::from(op.kind()))
        .with_stages(op.stages().iter().copied(), tick);
    let max_retries = tracker
        .budget_for(op.id())
        .map(|b| b.max_retry_attempts)
        .unwrap_or(PerformanceBudget::default().max_retry_attempts);

    let mut result = wrapper.run(op.execute()).await;
    let mut attempts = 0;
    while result.is_err() && attempts < max_retries {
        attempts += 1;
        result = wrapper.retry_with(op.execute()).await;
    }

    match result {
        Ok(summary) => info!(operation = op.id(), %summary, "done"),
        Err(e) => warn!(operation = op.id(), error = %e, attempts, "gave up"),
    }
}

async fn demo(config: Option<PathBuf>, tick_ms: u64) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => TrackerConfig::from_path(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    let tracker = Tracker::builder().config(config).build()?;
    let sweeper = AlertSweeper::spawn_default(tracker.clone());

    let mut events = tracker.subscribe();
    let progress_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TrackerEvent::Progressed {
                    id,
                    progress,
                    stage,
                }) => info!(operation = %id, progress, %stage, "progress"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let operations: Vec<Arc<dyn DemoOperation>> = vec![
        Arc::new(FetchListings),
        Arc::new(PriceCalculation::new(2)),
        Arc::new(SubmitForm),
        Arc::new(Navigate),
    ];
    for op in &operations {
        if let Some(budget) = op.budget() {
            tracker.set_budget(op.id(), budget)?;
        }
    }

    let tick = Duration::from_millis(tick_ms.max(1));
    let joins: Vec<_> = operations
        .into_iter()
        .map(|op| tokio::spawn(run_operation(tracker.clone(), op, tick)))
        .collect();
    for join in joins {
        join.await.context("operation task panicked")?;
    }

    let report = tracker.generate_report();
    println!("{}", serde_json::to_string_pretty(&report)?);

    sweeper.shutdown_and_join().await;
    progress_log.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { config, tick_ms } => demo(config, tick_ms).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&TrackerConfig::default())?);
            Ok(())
        }
        Commands::Check { config } => {
            let parsed = TrackerConfig::from_path(&config)
                .with_context(|| format!("checking {}", config.display()))?;
            println!(
                "{}: ok ({} kind budgets, alert capacity {})",
                config.display(),
                parsed.kind_budgets.len(),
                parsed.alert_capacity
            );
            Ok(())
        }
    }
}
