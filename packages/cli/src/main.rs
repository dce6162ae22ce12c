#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the UPRN map tools.
//!
//! `uprn_maps single` renders one property on one page; `uprn_maps batch`
//! groups a CSV export and renders one page per group plus an overview.
//! Arguments missing from the command line are prompted for with
//! `dialoguer`. Ctrl-C cancels the run.
//!
//! Uses `indicatif-log-bridge` (via [`uprn_maps_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod prompt;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use uprn_maps_cli_utils::PageProgress;
use uprn_maps_compose::PdfWriter;
use uprn_maps_grouping::{LinfaDbscan, Strategy};
use uprn_maps_models::{LocationRecord, RoundCategory};
use uprn_maps_pipeline::{DEFAULT_CONCURRENCY, RunRequest, cancellation};
use uprn_maps_render::{ClientOptions, create_renderer};
use uprn_maps_request::service_registry::{self, ServiceConfig};
use uprn_maps_request::{LabelVerbosity, ServiceKind};

const DEFAULT_EPS: f64 = 80.0;
const DEFAULT_MIN_SAMPLES: usize = 3;
const DEFAULT_OUTPUT: &str = "uprn_maps.pdf";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Parser)]
#[command(
    name = "uprn_maps",
    about = "Render UPRN locations onto printable map documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one property on a single page
    Single {
        /// 12-digit UPRN to map (prompted when absent)
        uprn: Option<String>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Group properties and render one page per group plus an overview
    Batch {
        /// How properties are grouped into pages
        #[arg(long, value_enum)]
        strategy: Option<StrategyKind>,
        /// Cluster radius in metres (cluster strategy)
        #[arg(long)]
        eps: Option<f64>,
        /// Minimum properties per cluster (cluster strategy)
        #[arg(long)]
        min_samples: Option<usize>,
        /// Comma-separated round categories, e.g. `RECY,GW` (round-diff strategy)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<RoundCategory>,
        /// Maximum groups rendered at once
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// CSV export of located properties
    #[arg(long)]
    input: Option<PathBuf>,
    /// Rendering service (`esri` or `mapbox`)
    #[arg(long)]
    service: Option<ServiceKind>,
    /// TOML file replacing the built-in service layout
    #[arg(long)]
    service_config: Option<PathBuf>,
    /// Output PDF path
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,
    /// Per-request deadline in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
    /// Marker labels (`uprn` or `address`)
    #[arg(long, default_value_t = LabelVerbosity::Uprn)]
    labels: LabelVerbosity,
    /// Document title (defaults to the UPRN or the input file name)
    #[arg(long)]
    title: Option<String>,
}

impl CommonArgs {
    fn prompted() -> Self {
        Self {
            input: None,
            service: None,
            service_config: None,
            output: PathBuf::from(DEFAULT_OUTPUT),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            labels: LabelVerbosity::Uprn,
            title: None,
        }
    }
}

/// Grouping strategy names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    Postcode,
    Cluster,
    RoundDiff,
}

/// A fully resolved run.
struct Plan {
    locations: Vec<LocationRecord>,
    strategy: Strategy,
    concurrency: usize,
    include_overview: bool,
    title: String,
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = uprn_maps_cli_utils::init_logger();
    let cli = Cli::parse();

    let command = match cli.command {
        Some(command) => command,
        None => match prompt::mode()? {
            prompt::Mode::Single => Commands::Single {
                uprn: None,
                common: CommonArgs::prompted(),
            },
            prompt::Mode::Batch => Commands::Batch {
                strategy: None,
                eps: None,
                min_samples: None,
                categories: Vec::new(),
                concurrency: DEFAULT_CONCURRENCY,
                common: CommonArgs::prompted(),
            },
        },
    };

    let plan = match command {
        Commands::Single { uprn, common } => plan_single(uprn, common)?,
        Commands::Batch {
            strategy,
            eps,
            min_samples,
            categories,
            concurrency,
            common,
        } => plan_batch(strategy, eps, min_samples, categories, concurrency, common)?,
    };

    let service = resolve_service(&plan.common)?;
    let renderer = create_renderer(
        &service,
        ClientOptions {
            timeout: Duration::from_secs(plan.common.timeout_secs.max(1)),
            ..ClientOptions::default()
        },
    )?;
    let writer = PdfWriter::new(&plan.common.output);

    let (handle, cancel) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, cancelling run...");
            handle.cancel();
        }
    });

    let progress = PageProgress::maps_bar(&multi, "Grouping locations");
    let start = Instant::now();

    let report = uprn_maps_pipeline::run(
        RunRequest {
            locations: plan.locations,
            strategy: plan.strategy,
            clusterer: Arc::new(LinfaDbscan),
            service,
            labels: plan.common.labels,
            concurrency: plan.concurrency,
            title: plan.title,
            include_overview: plan.include_overview,
            progress,
        },
        renderer.as_ref(),
        &writer,
        cancel,
    )
    .await?;

    log::info!(
        "Run complete: {} page(s) from {} group(s), {} request(s), {} noise location(s) in {:.1}s",
        report.pages,
        report.groups,
        report.requests,
        report.noise,
        start.elapsed().as_secs_f64()
    );
    if !report.failed.is_empty() {
        log::warn!("{} page(s) could not be rendered", report.failed.len());
    }
    println!("Wrote {} page(s) to {}", report.pages, writer.path().display());

    Ok(())
}

fn plan_single(
    uprn: Option<String>,
    mut common: CommonArgs,
) -> Result<Plan, Box<dyn std::error::Error>> {
    let uprn = match uprn {
        Some(uprn) => uprn,
        None => prompt::uprn()?,
    };
    let uprn = uprn_maps_source::validate_uprn(&uprn)?;

    let input = input_path(&mut common)?;
    let locations = uprn_maps_source::read_locations(&input)?;
    let location = uprn_maps_source::find_location(&locations, uprn)?;

    let title = common
        .title
        .clone()
        .unwrap_or_else(|| format!("UPRN {uprn:012}"));

    Ok(Plan {
        locations: vec![location],
        strategy: Strategy::Postcode,
        concurrency: 1,
        include_overview: false,
        title,
        common,
    })
}

fn plan_batch(
    strategy: Option<StrategyKind>,
    eps: Option<f64>,
    min_samples: Option<usize>,
    categories: Vec<RoundCategory>,
    concurrency: usize,
    mut common: CommonArgs,
) -> Result<Plan, Box<dyn std::error::Error>> {
    let input = input_path(&mut common)?;

    let kind = match strategy {
        Some(kind) => kind,
        None => prompt::strategy()?,
    };
    let strategy = match kind {
        StrategyKind::Postcode => Strategy::Postcode,
        StrategyKind::Cluster => Strategy::Cluster {
            eps: match eps {
                Some(eps) => eps,
                None => prompt::eps(DEFAULT_EPS)?,
            },
            min_samples: match min_samples {
                Some(min_samples) => min_samples,
                None => prompt::min_samples(DEFAULT_MIN_SAMPLES)?,
            },
        },
        StrategyKind::RoundDiff => Strategy::RoundDiff {
            categories: if categories.is_empty() {
                prompt::categories()?
            } else {
                categories
            },
        },
    };
    // Reject bad parameters before reading the input.
    strategy.validate()?;

    let locations = uprn_maps_source::read_locations(&input)?;
    let title = common
        .title
        .clone()
        .unwrap_or_else(|| default_title(&input));

    Ok(Plan {
        locations,
        strategy,
        concurrency,
        include_overview: true,
        title,
        common,
    })
}

fn input_path(common: &mut CommonArgs) -> Result<PathBuf, dialoguer::Error> {
    if let Some(input) = &common.input {
        return Ok(input.clone());
    }
    let input = prompt::input_path()?;
    common.input = Some(input.clone());
    Ok(input)
}

fn resolve_service(common: &CommonArgs) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    if let Some(path) = &common.service_config {
        return Ok(service_registry::load(path)?);
    }
    let kind = match common.service {
        Some(kind) => kind,
        None => prompt::service()?,
    };
    Ok(service_registry::builtin(kind)?)
}

fn default_title(input: &Path) -> String {
    input
        .file_stem()
        .map_or_else(|| "UPRN maps".to_owned(), |s| s.to_string_lossy().into_owned())
}
