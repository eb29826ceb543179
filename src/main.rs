use anyhow::Context;
use catalog_ingest::apis::activity_hero::ActivityHeroStrategy;
use catalog_ingest::apis::nces::NcesDirectory;
use catalog_ingest::apis::DirectoryFilter;
use catalog_ingest::config::{AppConfig, IngestSettings};
use catalog_ingest::extract::RenderedExtractor;
use catalog_ingest::logging::init_logging;
use catalog_ingest::metrics::{init_metrics, push_to_gateway};
use catalog_ingest::normalize::PillarRules;
use catalog_ingest::pipeline::jobs::{self, SchoolSelection};
use catalog_ingest::pipeline::{Orchestrator, RunSummary};
use catalog_ingest::storage::{Catalog, CatalogStore, InMemoryStore, PostgrestStore};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const REGIONAL_BATCH_SIZE: usize = 5;
const REGIONAL_MAX_PER_UNIT: usize = 10;

#[derive(Parser)]
#[command(name = "catalog-ingest")]
#[command(about = "School directory and activity listing ingestion")]
#[command(version)]
struct Cli {
    /// Optional TOML file with pacing, batch and browser settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write to an in-memory store instead of the catalog database
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh schools from the public school directory
    Schools {
        /// State FIPS code, e.g. 06 for California
        #[arg(long)]
        fips: String,
        /// Cities to fetch (comma-separated). Omit for the whole state.
        #[arg(long, value_delimiter = ',')]
        cities: Vec<String>,
    },
    /// Scrape activity listings for schools already in the catalog
    Clubs {
        /// Select schools by state code
        #[arg(long, conflicts_with = "cities", default_value = "CA")]
        state: String,
        /// Select schools by city instead (comma-separated)
        #[arg(long, value_delimiter = ',')]
        cities: Vec<String>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        max_per_unit: Option<usize>,
    },
    /// Refresh schools for a set of cities, then scrape their listings
    Regional {
        #[arg(long)]
        fips: String,
        #[arg(long, value_delimiter = ',', required = true)]
        cities: Vec<String>,
        #[arg(long, default_value_t = REGIONAL_BATCH_SIZE)]
        batch_size: usize,
        #[arg(long, default_value_t = REGIONAL_MAX_PER_UNIT)]
        max_per_unit: usize,
    },
    /// Insert a demo school with a handful of clubs
    Seed,
}

impl Commands {
    /// Commands that run the unit loop and can stop between units.
    fn uses_orchestrator(&self) -> bool {
        matches!(self, Commands::Clubs { .. } | Commands::Regional { .. })
    }
}

/// Cancel `cancel` on the first interrupt, then wait for a second one.
///
/// Returns `true` when a second interrupt arrives and `false` when the
/// interrupt source ends first.
async fn watch_interrupts<F, Fut>(mut next_interrupt: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if !next_interrupt().await {
        return false;
    }
    warn!("Interrupt received; finishing the current unit (interrupt again to exit now)");
    cancel.cancel();
    next_interrupt().await
}

fn install_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let second = watch_interrupts(
            || async { tokio::signal::ctrl_c().await.is_ok() },
            cancel,
        )
        .await;
        if second {
            warn!("Second interrupt; exiting without waiting for the current unit");
            std::process::exit(130);
        }
    });
}

fn open_store(cli: &Cli) -> anyhow::Result<(Arc<dyn CatalogStore>, IngestSettings)> {
    if cli.dry_run {
        let settings = IngestSettings::load(cli.config.as_deref())?;
        warn!("Dry run: writes go to an in-memory store and are discarded");
        return Ok((Arc::new(InMemoryStore::new()), settings));
    }
    let config = AppConfig::from_env(cli.config.as_deref())
        .context("Missing or invalid store configuration; check .env.local")?;
    let store = PostgrestStore::new(&config.store)?;
    Ok((Arc::new(store), config.settings))
}

fn nces_source(settings: &IngestSettings) -> NcesDirectory {
    NcesDirectory::default()
        .with_base_url(settings.nces.base_url.clone())
        .with_year(settings.nces.year)
        .with_max_pages(settings.nces.max_pages)
}

fn orchestrator(
    catalog: Catalog,
    settings: &IngestSettings,
    classifier: PillarRules,
    batch_size: usize,
    max_per_unit: usize,
    cancel: CancellationToken,
) -> Orchestrator {
    let strategy = Arc::new(ActivityHeroStrategy::new(settings.search_url.clone()));
    let extractor =
        RenderedExtractor::new(strategy, settings.render_options()).with_max_per_unit(max_per_unit);
    Orchestrator::new(catalog, extractor, classifier)
        .with_pacing(settings.pacing.clone())
        .with_batch_size(batch_size)
        .with_cancellation(cancel)
}

fn print_summary(name: &str, summary: &RunSummary) {
    println!("\n📊 Results for {}:", name);
    if summary.parents_upserted > 0 {
        println!("   Schools upserted: {}", summary.parents_upserted);
    }
    println!("   Units total: {}", summary.units_total);
    println!("   Already done: {}", summary.units_already_done);
    println!("   Deferred to next run: {}", summary.units_deferred);
    println!("   Processed: {}", summary.processed);
    println!("   Empty: {}", summary.empty);
    println!("   Failed: {}", summary.failed);
    println!("   Cancelled: {}", summary.cancelled);
    println!("   Rows written: {}", summary.rows_written);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging();
    init_metrics();

    let cli = Cli::parse();
    let (store, settings) = open_store(&cli)?;
    let catalog = Catalog::new(store);

    // Other commands keep the default Ctrl-C behavior and exit at once.
    let cancel = CancellationToken::new();
    if cli.command.uses_orchestrator() {
        install_interrupt_handler(cancel.clone());
    }

    let sessions = settings.browser_options();

    let (name, summary) = match &cli.command {
        Commands::Schools { fips, cities } => {
            let filter = DirectoryFilter::region(fips.clone()).with_cities(cities.clone());
            let stored = jobs::refresh_schools(&catalog, &nces_source(&settings), &filter).await?;
            let summary = RunSummary {
                parents_upserted: stored.len(),
                ..RunSummary::default()
            };
            ("schools", summary)
        }
        Commands::Clubs {
            state,
            cities,
            batch_size,
            max_per_unit,
        } => {
            let selection = if cities.is_empty() {
                SchoolSelection::State(state.clone())
            } else {
                SchoolSelection::Cities(cities.clone())
            };
            let orchestrator = orchestrator(
                catalog.clone(),
                &settings,
                PillarRules::standard(),
                batch_size.unwrap_or(settings.batch_size),
                max_per_unit.unwrap_or(settings.max_listings_per_unit),
                cancel.clone(),
            );
            let summary = jobs::ingest_clubs(&catalog, &orchestrator, &selection, &sessions).await?;
            ("clubs", summary)
        }
        Commands::Regional {
            fips,
            cities,
            batch_size,
            max_per_unit,
        } => {
            let filter = DirectoryFilter::region(fips.clone()).with_cities(cities.clone());
            let orchestrator = orchestrator(
                catalog.clone(),
                &settings,
                PillarRules::compact(),
                *batch_size,
                *max_per_unit,
                cancel.clone(),
            );
            let summary = jobs::regional(
                &catalog,
                &nces_source(&settings),
                &filter,
                &orchestrator,
                &sessions,
            )
            .await?;
            ("regional", summary)
        }
        Commands::Seed => ("seed", jobs::seed(&catalog).await?),
    };

    info!("Run complete: {:?}", summary);
    print_summary(name, &summary);
    push_to_gateway(name).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::{mpsc, Mutex};

    fn interrupts() -> (
        mpsc::UnboundedSender<()>,
        impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = bool> + Send>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel::<()>();
        let rx = Arc::new(Mutex::new(rx));
        let next = move || {
            let rx = rx.clone();
            Box::pin(async move { rx.lock().await.recv().await.is_some() })
                as std::pin::Pin<Box<dyn Future<Output = bool> + Send>>
        };
        (tx, next)
    }

    #[test]
    fn only_unit_loop_commands_trap_interrupts() {
        let parse = |args: &[&str]| Cli::try_parse_from(args).unwrap().command;
        assert!(parse(&["catalog-ingest", "clubs"]).uses_orchestrator());
        assert!(parse(&["catalog-ingest", "regional", "--fips", "06", "--cities", "Oakland"])
            .uses_orchestrator());
        assert!(!parse(&["catalog-ingest", "schools", "--fips", "06"]).uses_orchestrator());
        assert!(!parse(&["catalog-ingest", "seed"]).uses_orchestrator());
    }

    #[tokio::test]
    async fn first_interrupt_cancels_and_second_requests_exit() {
        let (tx, next) = interrupts();
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_interrupts(next, cancel.clone()));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), cancel.cancelled())
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert!(!watcher.is_finished());

        tx.send(()).unwrap();
        assert!(watcher.await.unwrap());
    }

    #[tokio::test]
    async fn closed_interrupt_source_never_exits() {
        let (tx, next) = interrupts();
        let cancel = CancellationToken::new();
        drop(tx);
        assert!(!watch_interrupts(next, cancel.clone()).await);
        assert!(!cancel.is_cancelled());
    }
}
