use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wallpaper_thumbs::{scan, ThumbnailConfig, ThumbnailService};

/// Thumbnail cache for the live wallpaper app
#[derive(Parser, Debug)]
#[command(name = "wallpaper-thumbs", version)]
struct Cli {
    /// Directory containing the wallpaper images
    #[arg(long, global = true)]
    images: Option<PathBuf>,

    /// Directory thumbnails are cached in
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the image directory and generate every missing or stale thumbnail
    Warm,
    /// Print the path of a fresh thumbnail for one image
    Get { name: String },
    /// Print whether a thumbnail file exists for one image
    Has { name: String },
    /// Print the queue status as JSON
    Status,
    /// Delete every cached thumbnail
    Clear,
    /// Delete thumbnails whose source image is gone
    Prune,
}

impl Cli {
    fn load_config(&self) -> Result<ThumbnailConfig> {
        let mut config = match &self.config {
            Some(path) => ThumbnailConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ThumbnailConfig::default(),
        };

        if let Some(images) = &self.images {
            config.images_dir = images.clone();
        }
        if let Some(cache) = &self.cache {
            config.cache_dir = cache.clone();
        }
        Ok(config.validate()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let service = ThumbnailService::new(cli.load_config()?);

    match cli.command {
        Command::Warm => {
            let images_dir = service.config().images_dir.clone();
            let names = tokio::task::spawn_blocking(move || scan::scan_images(&images_dir))
                .await
                .context("Image scan task failed")?;
            info!(count = names.len(), "Found images");

            let report = service.generate_all_in_background(&names).await;
            service.wait_idle().await;

            println!("{}", serde_json::to_string_pretty(&report)?);
            println!("{}", serde_json::to_string_pretty(&service.queue_status())?);
        }
        Command::Get { name } => {
            let path = service
                .get_thumbnail(&name)
                .await
                .with_context(|| format!("Could not produce thumbnail for {}", name))?;
            println!("{}", path.display());
        }
        Command::Has { name } => {
            println!("{}", service.has_thumbnail(&name).await);
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&service.queue_status())?);
        }
        Command::Clear => {
            service.clear_cache().await?;
            println!("Cleared {}", service.config().cache_dir.display());
        }
        Command::Prune => {
            let removed = service.prune_orphans().await?;
            println!("Removed {} orphaned thumbnails", removed);
        }
    }

    Ok(())
}
