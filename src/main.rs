//! `aerial-geolocation` CLI: triangulate sightings, compare captures, project pixels.

use aerial_geolocation::{
    coverage_radius_m, project_pixel, ChangeDetector, ConfigurationManager, Coordinates, DroneTelemetry, GeoPoint,
    Metadata, ObservationInput, Orientation, SystemConfig, TriangulationEngine,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aerial-geolocation", about = "Drone sighting triangulation and change detection")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate a target position from a JSON array of observations.
    Triangulate {
        /// Path to the observations file
        input: PathBuf,
        /// Target identifier to file the observations under
        #[arg(long, default_value = "target")]
        target: String,
    },
    /// Compare a capture against a reference image of the same cell.
    Detect {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        current: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Write the annotated capture here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Map an image pixel offset to an approximate ground coordinate.
    Project {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long)]
        altitude: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        yaw: f64,
        #[arg(allow_hyphen_values = true)]
        x: f64,
        #[arg(allow_hyphen_values = true)]
        y: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigurationManager::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?
            .get_system_config()
            .clone(),
        None => SystemConfig::default(),
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.log_level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Triangulate { input, target } => run_triangulate(&input, &target),
        Commands::Detect { reference, current, lat, lng, output } => {
            let report = run_detect(&config, &reference, &current, Coordinates::new(lat, lng), output.as_deref())?;
            println!("{}", report);
            Ok(())
        }
        Commands::Project { lat, lng, altitude, yaw, x, y } => {
            let telemetry = DroneTelemetry {
                position: GeoPoint::new(lat, lng, altitude),
                orientation: Orientation { yaw, ..Default::default() },
            };
            let fix = project_pixel((x, y), &telemetry);
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "fix": fix,
                    "coverage_radius_meters": coverage_radius_m(altitude),
                }))?
            );
            Ok(())
        }
    }
}

fn run_triangulate(input: &Path, target: &str) -> Result<()> {
    let content = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let observations: Vec<ObservationInput> =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", input.display()))?;

    let mut engine = TriangulationEngine::new();
    for observation in &observations {
        engine.add_observation(
            target,
            observation.drone_position,
            observation.target_bearing,
            observation.target_elevation,
            observation.confidence,
        );
    }

    let value = aerial_geolocation::api::position_result(&engine.calculate_position(target));
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Registers `reference`, compares `current` and returns the report JSON text
fn run_detect(
    config: &SystemConfig,
    reference: &Path,
    current: &Path,
    coordinates: Coordinates,
    output: Option<&Path>,
) -> Result<String> {
    let reference_bytes = fs::read(reference).with_context(|| format!("reading {}", reference.display()))?;
    let current_bytes = fs::read(current).with_context(|| format!("reading {}", current.display()))?;

    let mut detector = ChangeDetector::with_config(&config.change_detection)?;
    let mut metadata = Metadata::new();
    metadata.insert("timestamp".to_string(), json!(aerial_geolocation::core::unix_timestamp()));
    metadata.insert("source".to_string(), json!(reference.display().to_string()));

    let location_id = detector.add_reference_image(&reference_bytes, coordinates, metadata)?;
    let result = detector.detect_changes(&current_bytes, &location_id);

    if let (Some(path), Ok(report)) = (output, &result) {
        fs::write(path, &report.changes_image).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "annotated capture written");
    }

    let value = aerial_geolocation::api::change_result(&result);
    Ok(serde_json::to_string_pretty(&value)?)
}
