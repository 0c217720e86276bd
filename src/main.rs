use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gps_route_filter::{
    export_data,
    gps_processor::{
        self, FilterConfig, FilterMode, RouteFilter, DEFAULT_SPEED_LIMIT_KMPH,
        DEFAULT_TIGHT_ANGLE_DEG,
    },
    logs,
    registry::FormatRegistry,
};
use log::info;
use simplelog::LevelFilter;

/// Removes implausible points from a recorded driving route.
///
/// A point is dropped when the route turns back on itself at it (the angle
/// at the point is tighter than --tight-angle) while moving faster than
/// --speed-limit, or when the route leaves and comes back to exactly the
/// same spot.
#[derive(Parser, Debug)]
#[command(name = "gps-route-filter", version, about)]
struct Args {
    /// Route to filter, or `-` to read CSV from stdin
    input: String,

    /// Input format, detected from the file extension when omitted (csv, gpx, kml)
    #[arg(short, long)]
    input_format: Option<String>,

    /// Output format (csv, gpx, json, kml)
    #[arg(short, long, default_value = "csv")]
    format: String,

    /// Where to write the filtered route, stdout by default
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the dropped points to this file, in the output format
    #[arg(short, long)]
    errors: Option<PathBuf>,

    /// Angle at a point, in degrees, below which the turn counts as tight
    #[arg(long, env = "ROUTE_FILTER_TIGHT_ANGLE", default_value_t = DEFAULT_TIGHT_ANGLE_DEG)]
    tight_angle: f64,

    /// Speed, in km/h, above which a tight turn is considered bogus
    #[arg(long, env = "ROUTE_FILTER_SPEED_LIMIT", default_value_t = DEFAULT_SPEED_LIMIT_KMPH)]
    speed_limit: f64,

    /// Match the output of earlier releases of this filter (see FilterMode::Legacy).
    /// Needed to get their results: on their sample route only this mode drops
    /// the 4th and 5th points, the default mode keeps every point
    #[arg(long)]
    legacy: bool,

    /// Also write logs to this file (rotated, a few thousand lines are kept)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log every dropped point
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logs::init(level, args.log_file.as_deref())?;

    let config = FilterConfig {
        tight_angle_deg: args.tight_angle,
        speed_limit_kmph: args.speed_limit,
        mode: if args.legacy {
            FilterMode::Legacy
        } else {
            FilterMode::Standard
        },
    };
    config.validate()?;

    let registry = FormatRegistry::new();
    let input_format = registry.input_for(&args.input, args.input_format.as_deref())?;
    let output_format = registry.output_for(&args.format)?;

    let source = input_format.open(&args.input)?;
    let mut sink = output_format.create_sink(export_data::open_output(args.output.as_deref())?);
    let mut route_filter = RouteFilter::new(config);
    let stats = gps_processor::run(source, sink.as_mut(), &mut route_filter)
        .with_context(|| format!("failed to filter {}", args.input))?;

    info!(
        "points read: {}, emitted: {}, dropped: {} ({} round trips, {} tight turns)",
        stats.points_read,
        stats.points_emitted,
        stats.rejected(),
        stats.round_trips_rejected,
        stats.tight_turns_rejected
    );

    if let Some(path) = &args.errors {
        let mut error_sink = output_format.create_sink(export_data::open_output(Some(path))?);
        export_data::write_points(error_sink.as_mut(), route_filter.error_points())?;
        info!(
            "wrote {} dropped points to {}",
            route_filter.error_points().len(),
            path.display()
        );
    }
    Ok(())
}
