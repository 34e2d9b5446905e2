use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use monastery_directions::config::DirectionsConfig;
use monastery_directions::geolocation::{GeolocationAcquirer, HttpIpLocator};
use monastery_directions::logging::initialize_logging;
use monastery_directions::models::{GeoPoint, LocationSource, Monastery, UserLocation};
use monastery_directions::trip::{TripPlanner, TripSummary};
use monastery_directions::{shared, web};

#[derive(Parser)]
#[command(name = "monastery-directions")]
#[command(about = "Directions, travel times and nearest airports for Sikkim's monasteries")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a trip to a monastery
    Trip {
        /// Monastery slug, see `monasteries`
        #[arg(short, long)]
        monastery: String,

        /// Starting latitude; the IP location is used when omitted
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Starting longitude
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the known monasteries
    Monasteries,

    /// Serve the JSON API
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DirectionsConfig::load_from_path(cli.config.clone())
        .context("Failed to load configuration")?;
    initialize_logging(&config.logging, cli.verbose);

    match cli.command {
        Commands::Trip {
            monastery,
            lat,
            lon,
            json,
        } => run_trip(&config, &monastery, lat.zip(lon), json).await,
        Commands::Monasteries => list_monasteries(),
        Commands::Serve { port } => web::run(&config, port.unwrap_or(config.server.port)).await,
    }
}

async fn starting_point(config: &DirectionsConfig, manual: Option<(f64, f64)>) -> Result<UserLocation> {
    if let Some((lat, lon)) = manual {
        let point = GeoPoint::new(lat, lon)?;
        return Ok(UserLocation::new(point, LocationSource::Manual));
    }

    let clients = shared::http_clients(&config.endpoints).await?;
    let ip_locator = HttpIpLocator::new(clients.direct.clone(), &config.endpoints.app_base_url);
    let acquirer = GeolocationAcquirer::new(None, Arc::new(ip_locator), config.geolocation.clone());

    let Some(snapshot) = acquirer.acquire().await else {
        bail!("Location acquisition is already running");
    };
    match snapshot.location {
        Some(location) => Ok(location),
        None => bail!(
            "{} Pass --lat and --lon to set a starting point.",
            snapshot.message.unwrap_or_default()
        ),
    }
}

async fn run_trip(
    config: &DirectionsConfig,
    slug: &str,
    manual: Option<(f64, f64)>,
    json: bool,
) -> Result<()> {
    Monastery::find(slug)?;
    let user = starting_point(config, manual).await?;
    let planner = TripPlanner::from_config(config).await?;
    let summary = planner.plan(slug, &user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &TripSummary) {
    println!("{}", summary.destination.name);
    println!("  From:     {}", summary.location.display_label());
    println!(
        "  Distance: {} (straight line {})",
        summary.distance, summary.straight_line_distance
    );
    println!("  Car:      {}", summary.car);
    println!("  Train:    {}", summary.train);
    println!("  Walk:     {}", summary.walk);

    if let Some(airport) = &summary.airport {
        let note = if summary.airport_is_fallback {
            " (offline list)"
        } else {
            ""
        };
        println!(
            "  Airport:  {}, {}{}",
            airport.display_name(),
            monastery_directions::format_distance(airport.distance_km),
            note
        );
    }
    if let Some(advisory) = &summary.advisory {
        println!();
        println!("  {advisory}");
    }
}

fn list_monasteries() -> Result<()> {
    for monastery in Monastery::all()? {
        let district = monastery.district.as_deref().unwrap_or("-");
        println!(
            "{:<14} {:<28} {:<16} {}",
            monastery.slug,
            monastery.name,
            district,
            monastery.point().format_coordinates()
        );
    }
    Ok(())
}
