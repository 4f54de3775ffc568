//! CLI binary for infographic-embed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use infographic_embed::cache::{cache_path, hash_key};
use infographic_embed::host::FsStorage;
use infographic_embed::parser::parse_spec;
use infographic_embed::{block, ImageFormat, Settings, SnapshotCache, Theme};
use log::info;

/// Inspect infographic blocks and manage the snapshot cache.
#[derive(Parser)]
#[command(name = "infographic-embed", version, about)]
struct Cli {
    /// Path to a JSON settings file.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a block's source and report how it would be rendered.
    Check {
        /// File holding the block body (without the fence).
        file: PathBuf,
    },

    /// Print the starter template block.
    Template,

    /// Print the cache path a snapshot of a block would be stored under.
    CachePath {
        /// Cache directory; defaults to the configured one.
        #[arg(long)]
        dir: Option<String>,
        /// Resolved theme (light or dark).
        #[arg(long, default_value = "light")]
        theme: Theme,
        /// Treat the host as being in dark mode when resolving `auto`.
        #[arg(long)]
        dark_host: bool,
        #[arg(long, default_value = "png")]
        format: ImageFormat,
        file: PathBuf,
    },

    /// Write a data URL into the cache.
    Persist {
        #[arg(long)]
        dir: Option<String>,
        /// Cache key to hash; defaults to the data URL itself.
        #[arg(long)]
        key: Option<String>,
        #[arg(long, default_value = "png")]
        format: ImageFormat,
        /// File holding the data URL.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    settings.validate()?;

    match cli.command {
        Command::Check { file } => check(&file, &settings),
        Command::Template => {
            print!("{}", block::template_block());
            Ok(())
        }
        Command::CachePath {
            dir,
            theme,
            dark_host,
            format,
            file,
        } => {
            let source = read_source(&file)?;
            let parsed = parse_spec(&source)?;
            let request = parsed.into_request(theme, dark_host);
            let dir = dir.unwrap_or_else(|| settings.cache_dir.clone());
            println!("{}", cache_path(&dir, &request.cache_key(format), format));
            Ok(())
        }
        Command::Persist {
            dir,
            key,
            format,
            file,
        } => {
            let data_url = read_source(&file)?;
            let data_url = data_url.trim();
            let dir = dir.unwrap_or_else(|| settings.cache_dir.clone());
            let key = key.unwrap_or_else(|| data_url.to_string());

            let cache = SnapshotCache::new(Arc::new(FsStorage::new(".")));
            let reference = cache.persist(&dir, data_url, format, &key).await?;
            info!("persisted {} snapshot under key hash {}", format, hash_key(&key));
            println!("{}", reference);
            Ok(())
        }
    }
}

fn check(file: &Path, settings: &Settings) -> anyhow::Result<()> {
    let source = read_source(file)?;
    let parsed = parse_spec(&source)?;
    let request = parsed.into_request(settings.theme, false);
    println!("kind: {}", request.content_kind());
    println!("theme: {}", request.resolved_theme());
    println!(
        "png: {}",
        cache_path(&settings.cache_dir, &request.cache_key(ImageFormat::Png), ImageFormat::Png)
    );
    println!(
        "svg: {}",
        cache_path(&settings.cache_dir, &request.cache_key(ImageFormat::Svg), ImageFormat::Svg)
    );
    Ok(())
}

fn read_source(file: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))
}
