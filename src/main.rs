use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use extension_profiler::cache::{MetadataCache, PublishTimeCache, open_stores};
use extension_profiler::config::{self, CacheBackend, ProfilerConfig};
use extension_profiler::logging;
use extension_profiler::profile::Profiler;
use extension_profiler::version::registries::NpmRegistry;
use extension_profiler::version::registry::Registry;

#[derive(Parser)]
#[command(name = "extension-profiler")]
#[command(
    version,
    about = "Track which JupyterLab release line registry extensions support"
)]
struct Cli {
    /// Debug logging (also enabled by EXTENSION_PROFILER_DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    cache_backend: Option<CacheBackend>,

    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Directory snapshots are written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    registry_url: Option<String>,

    /// Extensions classified concurrently
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Also write JSON logs to a file (defaults to the data directory)
    #[arg(long, global = true, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify the currently tagged version of every extension
    Profile,
    /// Write snapshots for dates sampled between start and stop
    Backfill {
        /// First date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Last date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        stop: Option<String>,
        /// Days between two samples
        #[arg(long)]
        sample_rate: Option<u32>,
    },
    /// Classify one package, given as name or name@version
    Inspect { package: String },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<ProfilerConfig> {
        let mut config = ProfilerConfig::load(self.config.as_deref())?;

        if let Some(backend) = self.cache_backend {
            config.cache.backend = backend;
        }
        if let Some(dir) = &self.cache_dir {
            config.cache.dir = Some(dir.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(url) = &self.registry_url {
            config.registry.url = url.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }

        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let verbose = config::verbose_requested(cli.verbose);
    let log_file = cli
        .log_file
        .clone()
        .map(|path| path.unwrap_or_else(config::log_path));
    let _guard = logging::init(verbose, log_file.as_deref())?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;

    let registry: Arc<dyn Registry> = Arc::new(NpmRegistry::new(&config.registry.url));
    let (metadata_store, publish_times_store) = open_stores(&config.cache)?;
    let metadata = MetadataCache::load(Arc::clone(&registry), metadata_store)?;
    let publish_times = PublishTimeCache::load(Arc::clone(&registry), publish_times_store)?;
    let profiler = Profiler::new(&config, registry, metadata, publish_times);

    let today = Utc::now().date_naive();
    let outcome = execute(&profiler, &config, cli.command, today).await;

    if let Err(e) = profiler.save_caches() {
        error!("Failed to save caches: {}", e);
    }
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

async fn execute(
    profiler: &Profiler,
    config: &ProfilerConfig,
    command: Command,
    today: NaiveDate,
) -> anyhow::Result<()> {
    match command {
        Command::Profile => {
            let path = profiler.profile_now(today).await?;
            info!("Wrote {}", path.display());
        }
        Command::Backfill {
            start,
            stop,
            sample_rate,
        } => {
            let start = match start {
                Some(start) => config::parse_date(&start)?,
                None => config.backfill.start_date()?,
            };
            let stop = stop
                .as_deref()
                .map(config::parse_date)
                .transpose()?
                .unwrap_or(today);
            let step = sample_rate.unwrap_or(config.backfill.sample_rate_days);

            let written = profiler.backfill(start, stop, step).await?;
            info!(
                "Wrote {} snapshots to {}",
                written.len(),
                config.output_dir.display()
            );
        }
        Command::Inspect { package } => {
            let result = profiler.inspect(&package).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
