use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;

use virtual_tourist::album::{AlbumController, AlbumOutcome};
use virtual_tourist::config::Config;
use virtual_tourist::geo::Coordinate;
use virtual_tourist::store::{PhotoId, PinId, PinPhotoStore};

#[derive(Parser)]
#[command(author, version, about = "Drop map pins and browse Flickr photos taken nearby")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize with a default config file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,

        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Drop a pin at a coordinate
    AddPin {
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,

        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,

        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// List all pins
    Pins {
        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Show a pin's photo album, searching for photos if it is empty
    Album {
        pin: PinId,

        /// Replace the album with a new collection
        #[arg(short, long)]
        refresh: bool,

        /// Don't download missing images
        #[arg(long)]
        skip_images: bool,

        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Remove selected photos from a pin's album
    RemovePhotos {
        pin: PinId,

        #[arg(required = true)]
        photos: Vec<PhotoId>,

        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Remove a pin and its photos
    RemovePin {
        pin: PinId,

        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Show configuration and store statistics
    Status {
        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Init { force, config } => init_config(config, *force),
        Commands::AddPin {
            latitude,
            longitude,
            config,
        } => {
            let albums = open_controller(config)?;
            let pin_id = albums.add_pin(Coordinate::new(*latitude, *longitude))?;
            println!("Added pin {pin_id} at {latitude}, {longitude}");
            Ok(())
        }
        Commands::Pins { config } => {
            let albums = open_controller(config)?;
            let pins = albums.store().pins();
            if pins.is_empty() {
                println!("No pins yet. Add one with 'virtual-tourist add-pin'.");
                return Ok(());
            }

            println!("{} pins:", pins.len());
            for pin in pins {
                let photos = albums.store().photos_for_pin(pin.id)?;
                println!("  {}  ({})  {} photos", pin.id, pin.coordinate(), photos.len());
            }
            Ok(())
        }
        Commands::Album {
            pin,
            refresh,
            skip_images,
            config,
        } => show_album(config, *pin, *refresh, *skip_images).await,
        Commands::RemovePhotos {
            pin,
            photos,
            config,
        } => {
            let albums = open_controller(config)?;
            let removed = albums.remove_photos(*pin, photos).await?;
            println!("Removed {removed} photos from pin {pin}");
            Ok(())
        }
        Commands::RemovePin { pin, config } => {
            let albums = open_controller(config)?;
            let removed = albums
                .remove_pin(*pin)
                .await
                .with_context(|| format!("Failed to remove pin {pin}"))?;
            println!("Removed pin {pin} and {removed} photos");
            Ok(())
        }
        Commands::Status { config } => {
            let config_path = Config::get_config_path(config);
            let config_data = load_config(config)?;
            let store = PinPhotoStore::open(&config_data.store_path())?;
            let stats = store.stats();

            println!("virtual-tourist Status");
            println!("Configuration:");
            println!("  Config file: {}", config_path.display());
            println!("  API endpoint: {}", config_data.api_base_url);
            println!("  Store file: {}", config_data.store_file);
            println!("  Album capacity: {}", config_data.album_capacity);
            println!("Store:");
            println!("  Pins: {}", stats.pins);
            println!("  Photos: {}", stats.photos);
            println!("  Cached images: {}/{}", stats.cached_images, stats.photos);
            if stats.orphans > 0 {
                println!("  Unattached photos: {}", stats.orphans);
            }
            Ok(())
        }
    }
}

async fn show_album(
    config: &Option<PathBuf>,
    pin_id: PinId,
    refresh: bool,
    skip_images: bool,
) -> Result<()> {
    let albums = open_controller(config)?;
    let pin = albums.store().pin(pin_id)?;
    println!("Album for pin {} ({})", pin.id, pin.coordinate());

    let outcome = if refresh {
        albums.new_collection(pin_id).await
    } else {
        albums.open_album(pin_id).await
    };
    let outcome = outcome.context("Failed to fetch photos")?;

    match outcome {
        AlbumOutcome::NoImagesFound => {
            println!("No Images Found");
            return Ok(());
        }
        AlbumOutcome::PinRemoved => {
            println!("Pin {pin_id} was removed");
            return Ok(());
        }
        AlbumOutcome::Populated(ids) => debug!("Album has {} photos", ids.len()),
    }

    if !skip_images {
        let summary = albums.fetch_missing_images(pin_id).await?;
        println!(
            "Images: {} downloaded, {} failed",
            summary.fetched, summary.failed
        );
    }

    for photo in albums.store().photos_for_pin(pin_id)? {
        let cached = if photo.has_image() { "cached" } else { "not cached" };
        println!(
            "  {}  {}  [{}]",
            photo.id,
            photo.title.as_deref().unwrap_or("(untitled)"),
            cached
        );
    }
    Ok(())
}

fn open_controller(config: &Option<PathBuf>) -> Result<AlbumController<Client>> {
    let config_data = load_config(config)?;
    let store_path = config_data.store_path();
    let store = PinPhotoStore::open(&store_path)
        .with_context(|| format!("Failed to open store at {}", store_path.display()))?;

    Ok(
        AlbumController::new(Arc::new(store), Client::new(), config_data.search_settings()?)
            .with_capacity(config_data.album_capacity)
            .with_image_concurrency(config_data.image_concurrency),
    )
}

fn init_config(config_path_opt: &Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = Config::get_config_path(config_path_opt);

    if config_path.exists() && !force {
        println!("Config file already exists at {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    let config = Config::default();
    config
        .save_to_file(&config_path)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    println!("Created config file at {}", config_path.display());
    Ok(())
}

fn load_config(config_path_opt: &Option<PathBuf>) -> Result<Config> {
    let config_path = Config::get_config_path(config_path_opt);

    if !config_path.exists() {
        anyhow::bail!(
            "Config file not found at {}. Run 'virtual-tourist init' to create one.",
            config_path.display()
        );
    }

    Config::load_from_file(&config_path)
}
