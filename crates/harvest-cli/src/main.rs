//! `harvest` command-line tool.
//!
//! ```bash
//! harvest list
//! harvest run copetran --output buses.jsonl
//! harvest run-all --category lodging
//! harvest check omega --html saved-results.html
//! ```

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use harvest_browser::ChromiumLauncher;
use harvest_core::{AppConfig, SiteId};
use harvest_scanner::{
    deliver, extract, find_containers, CompiledSchema, JsonLinesSink, RunOutcome, RunResult,
    ScanOrchestrator,
};
use harvest_site::{SiteCategory, SiteLoader, SiteProfile, SiteRegistry};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "harvest", version, about = "Resilient extraction of listings from travel sites")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Site profile directory
    #[arg(long, global = true)]
    profiles: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available site profiles
    List {
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
    },
    /// Run one site and write its records as JSON lines
    Run {
        /// Site identifier, e.g. "copetran"
        site: String,
        /// Fetch this URL instead of the profile's search URL
        #[arg(long)]
        url: Option<String>,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override the retry attempt ceiling
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Run every site, optionally limited to one category
    RunAll {
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the effective configuration to the user config file
    InitConfig,
    /// Extract records from a saved results page without a browser
    Check {
        /// Site identifier whose profile should be applied
        site: String,
        /// Saved HTML page
        #[arg(long)]
        html: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CategoryArg {
    Flights,
    Buses,
    Lodging,
    Other,
}

impl From<CategoryArg> for SiteCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Flights => Self::Flights,
            CategoryArg::Buses => Self::Buses,
            CategoryArg::Lodging => Self::Lodging,
            CategoryArg::Other => Self::Other,
        }
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = match verbose {
        0 => "info,harvest=debug",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            config
        }
        None => AppConfig::load_with_env().context("Failed to load config")?,
    };
    Ok(config)
}

fn open_registry(config: &AppConfig, dir: Option<PathBuf>) -> Result<SiteRegistry> {
    let loader = match dir.or_else(|| config.profiles.dir.clone()) {
        Some(dir) => SiteLoader::new(dir)?,
        None => SiteLoader::with_default_dir()?,
    };
    tracing::debug!(dir = %loader.dir().display(), "loading site profiles");
    Ok(SiteRegistry::load_from(&loader)?)
}

fn filter_profiles(registry: &SiteRegistry, category: Option<CategoryArg>) -> Vec<SiteProfile> {
    match category {
        Some(category) => registry.get_by_category(category.into()),
        None => registry.get_all(),
    }
}

fn lookup(registry: &SiteRegistry, site: &str) -> Result<SiteProfile> {
    let site_id = SiteId::new(site)?;
    registry
        .get(&site_id)
        .with_context(|| format!("Unknown site '{site}'"))
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    })
}

fn report(outcome: &RunOutcome) {
    match &outcome.result {
        RunResult::Success(records) => tracing::info!(
            site_id = %outcome.site_id,
            records = records.len(),
            attempts = outcome.attempts.len(),
            "run succeeded"
        ),
        RunResult::Exhausted(e) => tracing::warn!(
            site_id = %outcome.site_id,
            attempts = outcome.attempts.len(),
            error = %e,
            "run produced no records"
        ),
    }
}

fn write_records(outcomes: &[RunOutcome], output: Option<&Path>) -> Result<()> {
    let mut sink = JsonLinesSink::new(output_writer(output)?);
    for outcome in outcomes {
        report(outcome);
        let delivered = deliver(outcome.records(), &mut sink);
        if delivered.failed > 0 {
            tracing::warn!(site_id = %outcome.site_id, failed = delivered.failed, "some records were not written");
        }
    }
    sink.into_inner()?;
    Ok(())
}

fn list(registry: &SiteRegistry, category: Option<CategoryArg>) {
    let profiles = filter_profiles(registry, category);
    if profiles.is_empty() {
        println!("No site profiles found.");
        return;
    }

    println!("{:<20} {:<10} {:<24} URL", "ID", "CATEGORY", "NAME");
    for profile in profiles {
        println!(
            "{:<20} {:<10} {:<24} {}",
            profile.id().as_str(),
            profile.category().display_name(),
            profile.name(),
            profile.site.search_url
        );
    }
}

fn check(profile: &SiteProfile, html: &Path) -> Result<()> {
    let page = std::fs::read_to_string(html)
        .with_context(|| format!("Failed to read {}", html.display()))?;
    let schema = CompiledSchema::compile(profile)?;

    let Some((candidate, containers)) = find_containers(&page, &profile.candidates()) else {
        bail!(
            "No result containers matched any of the {} selector candidates",
            profile.candidates().len()
        );
    };
    tracing::info!(
        selector = %candidate.selector,
        priority = candidate.priority,
        containers = containers.len(),
        "containers found"
    );

    let records = extract(&containers, &schema);
    let mut sink = JsonLinesSink::new(io::stdout().lock());
    deliver(&records, &mut sink);
    sink.into_inner()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;

    if matches!(cli.command, Commands::InitConfig) {
        config.save()?;
        println!("Wrote {}", AppConfig::config_path()?.display());
        return Ok(());
    }

    let registry = open_registry(&config, cli.profiles)?;

    match cli.command {
        Commands::List { category } => list(&registry, category),
        Commands::Run {
            site,
            url,
            output,
            max_attempts,
        } => {
            if let Some(attempts) = max_attempts {
                config.scanning.max_attempts = attempts;
                config.validate()?;
            }
            let profile = lookup(&registry, &site)?;
            let orchestrator = ScanOrchestrator::new(ChromiumLauncher::new(&config.browser), &config);
            let outcome = orchestrator.run_site(&profile, url.as_deref()).await;
            write_records(&[outcome], output.as_deref())?;
        }
        Commands::RunAll { category, output } => {
            let profiles = filter_profiles(&registry, category);
            if profiles.is_empty() {
                bail!("No site profiles to run");
            }
            let orchestrator = ScanOrchestrator::new(ChromiumLauncher::new(&config.browser), &config);
            let outcomes = orchestrator.run_sites(&profiles).await;
            write_records(&outcomes, output.as_deref())?;
        }
        Commands::Check { site, html } => {
            let profile = lookup(&registry, &site)?;
            check(&profile, &html)?;
        }
        Commands::InitConfig => {}
    }

    Ok(())
}
