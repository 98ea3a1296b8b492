/* Command-line front end for the UCP and landscape engines */

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use urbanscape::{
    config::{Connectivity, Settings},
    geo::projection::UtmTable,
    io::{read_raster, read_vector},
    landscape::{
        aggregation_index_by_class, engine::{boundary_polygons, class_codes}, parse_landscape_metrics, LandscapeMetric,
        LandscapeRun,
    },
    orchestrator::{run_batch, BatchRequest, LandscapeRequest},
    progress::BarProgress,
    ucp::{parse_metrics, run_ucp_file, OutputLayout, UcpMetric},
    workflow::{run_region, RegionRequest},
};

#[derive(Parser)]
#[command(name = "urbanscape")]
#[command(author, version, about = "Urban canopy parameters and landscape metrics", long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// UCP rasters of one footprint file
    Ucp {
        input: PathBuf,
        destination: PathBuf,
        /// Comma separated metric ids, all when omitted
        #[arg(short, long, value_delimiter = ',')]
        metrics: Vec<String>,
        /// Attribute holding the building height
        #[arg(long)]
        height_field: Option<String>,
    },
    /// UCP rasters of every footprint file below a folder
    Batch {
        source: PathBuf,
        destination: PathBuf,
        #[arg(short, long, value_delimiter = ',')]
        metrics: Vec<String>,
        /// Worker count, 0 for one per CPU
        #[arg(short, long)]
        workers: Option<String>,
        /// Classified raster for per-file landscape metrics
        #[arg(long)]
        land_cover: Option<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        landscape_metrics: Vec<String>,
    },
    /// Landscape metrics of a classified raster
    Landscape {
        #[command(subcommand)]
        mode: LandscapeCommands,
    },
    /// UCP and landscape metrics of one region of interest
    Region {
        roi: PathBuf,
        destination: PathBuf,
        #[arg(long)]
        buildings: Option<PathBuf>,
        #[arg(long)]
        land_cover: Option<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        ucp_metrics: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        landscape_metrics: Vec<String>,
    },
    /// Aggregation index of every class in a classified raster
    Ai {
        input: PathBuf,
        /// Only report this class
        #[arg(long)]
        class: Option<i64>,
        /// Class to skip
        #[arg(long)]
        nodata: Option<i64>,
    },
}

#[derive(Args)]
struct LandscapeArgs {
    classified: PathBuf,
    output: PathBuf,
    #[arg(short, long, value_delimiter = ',')]
    metrics: Vec<String>,
    /// Tile side in boundary units
    #[arg(long)]
    grid_size: Option<f64>,
    /// Class ignored by the pattern metrics
    #[arg(long)]
    pattern_nodata: Option<i64>,
    /// Patch neighbourhood, 4 or 8
    #[arg(long, value_parser = ["4", "8"])]
    connectivity: Option<String>,
}

#[derive(Subcommand)]
enum LandscapeCommands {
    /// Tiles of a boundary polygon file
    Vector {
        boundary: PathBuf,
        #[command(flatten)]
        args: LandscapeArgs,
    },
    /// One cell per pixel of a reference raster
    Raster {
        reference: PathBuf,
        #[command(flatten)]
        args: LandscapeArgs,
        /// Mask the outputs to this polygon file
        #[arg(long)]
        boundary: Option<PathBuf>,
    },
    /// Tiles of the convex hull of a footprint file
    Buildings {
        footprints: PathBuf,
        #[command(flatten)]
        args: LandscapeArgs,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn ucp_metrics(names: &[String]) -> Result<Vec<UcpMetric>> {
    if names.is_empty() {
        return Ok(UcpMetric::ALL.to_vec());
    }
    parse_metrics(names).context("invalid UCP metric list")
}

fn landscape_metrics(names: &[String]) -> Result<Vec<LandscapeMetric>> {
    if names.is_empty() {
        return Ok(LandscapeMetric::ALL.to_vec());
    }
    parse_landscape_metrics(names).context("invalid landscape metric list")
}

fn run_landscape(mode: LandscapeCommands, mut settings: Settings) -> Result<Vec<PathBuf>> {
    let args = match &mode {
        LandscapeCommands::Vector { args, .. } | LandscapeCommands::Raster { args, .. } | LandscapeCommands::Buildings { args, .. } => args,
    };
    if let Some(size) = args.grid_size {
        settings.landscape.grid_size = size;
    }
    if args.pattern_nodata.is_some() {
        settings.landscape.pattern_nodata = args.pattern_nodata;
    }
    match args.connectivity.as_deref() {
        Some("4") => settings.landscape.connectivity = Connectivity::Four,
        Some("8") => settings.landscape.connectivity = Connectivity::Eight,
        _ => {}
    }
    settings.landscape.validate()?;
    let metrics = landscape_metrics(&args.metrics)?;
    let table = UtmTable::new();
    let run = LandscapeRun {
        classified: &args.classified,
        output_dir: &args.output,
        metrics: &metrics,
        cfg: &settings.landscape,
        table: &table,
    };

    let outputs = match &mode {
        LandscapeCommands::Vector { boundary, .. } => run.by_vector(boundary)?,
        LandscapeCommands::Raster { reference, boundary, .. } => {
            let mask = match boundary {
                Some(path) => {
                    let layer = read_vector(path).with_context(|| format!("cannot read {}", path.display()))?;
                    Some(vec![geo_types::Geometry::MultiPolygon(boundary_polygons(&layer, path)?)])
                }
                None => None,
            };
            run.by_raster(reference, mask.as_deref())?
        }
        LandscapeCommands::Buildings { footprints, .. } => run.by_buildings(footprints)?,
    };
    Ok(outputs)
}

fn run_single_file(input: &Path, destination: &Path, metrics: &[UcpMetric], settings: &Settings) -> Result<Vec<PathBuf>> {
    settings.ucp.validate()?;
    fs::create_dir_all(destination).with_context(|| format!("cannot create {}", destination.display()))?;
    let scratch = settings.batch.scratch_for(destination);
    let layout = OutputLayout::Flat(destination.to_path_buf());
    let result = run_ucp_file(input, &layout, metrics, &settings.ucp, &UtmTable::new(), &scratch);
    if scratch.exists() {
        fs::remove_dir_all(&scratch).with_context(|| format!("cannot remove {}", scratch.display()))?;
    }
    Ok(result?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = match &cli.config {
        Some(path) => Settings::from_json_file(path).with_context(|| format!("cannot load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Ucp {
            input,
            destination,
            metrics,
            height_field,
        } => {
            if let Some(field) = height_field {
                settings.ucp.height_field = field;
            }
            let outputs = run_single_file(&input, &destination, &ucp_metrics(&metrics)?, &settings)?;
            info!("wrote {} rasters to {}", outputs.len(), destination.display());
        }
        Commands::Batch {
            source,
            destination,
            metrics,
            workers,
            land_cover,
            landscape_metrics: names,
        } => {
            if let Some(workers) = workers {
                settings.batch.workers = workers;
            }
            let landscape = match land_cover {
                Some(classified) => Some(LandscapeRequest {
                    classified,
                    metrics: landscape_metrics(&names)?,
                }),
                None if !names.is_empty() => bail!("--landscape-metrics needs --land-cover"),
                None => None,
            };
            let request = BatchRequest {
                source,
                destination,
                metrics: ucp_metrics(&metrics)?,
                landscape,
            };
            let progress = BarProgress::new();
            let report = run_batch(&request, &settings, &progress).context("batch run failed")?;
            progress.finish();
            for failure in &report.failed {
                eprintln!("failed: {} ({})", failure.input.display(), failure.error);
            }
            info!("{} files succeeded, {} failed", report.succeeded.len(), report.failed.len());
            if !report.is_clean() {
                bail!("{} of {} files failed", report.failed.len(), report.failed.len() + report.succeeded.len());
            }
        }
        Commands::Landscape { mode } => {
            let outputs = run_landscape(mode, settings)?;
            info!("wrote {} landscape rasters", outputs.len());
        }
        Commands::Region {
            roi,
            destination,
            buildings,
            land_cover,
            ucp_metrics: ucp_names,
            landscape_metrics: landscape_names,
        } => {
            let request = RegionRequest {
                roi,
                buildings,
                land_cover,
                destination,
                ucp_metrics: if ucp_names.is_empty() { Vec::new() } else { ucp_metrics(&ucp_names)? },
                landscape_metrics: if landscape_names.is_empty() {
                    Vec::new()
                } else {
                    landscape_metrics(&landscape_names)?
                },
            };
            let progress = BarProgress::new();
            let outputs = run_region(&request, &settings, &progress).context("region run failed")?;
            progress.finish();
            info!("wrote {} UCP and {} landscape rasters", outputs.ucp.len(), outputs.landscape.len());
        }
        Commands::Ai { input, class, nodata } => {
            let raster = read_raster(&input).with_context(|| format!("cannot read {}", input.display()))?;
            let scores = aggregation_index_by_class(class_codes(&raster).view(), nodata);
            for (value, ai) in scores.iter().filter(|(value, _)| class.map_or(true, |c| c == **value)) {
                println!("{value}\t{ai:.4}");
            }
        }
    }
    Ok(())
}
