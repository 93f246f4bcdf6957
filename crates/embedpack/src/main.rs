//! embedpack — builds redistributable packages of the CPython embeddable
//! distribution: fetches the upstream archive for each requested release,
//! repairs its path isolation, and repacks it as bare-fixed and pip-enabled
//! artifacts.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use embedpack_core::{BuildConfig, Platform, PythonVersion};
use embedpack_fetch::AssetCache;

mod logging;
mod patch;
mod pipeline;
mod settings;

use settings::Settings;

/// Build redistributable embeddable-Python packages.
#[derive(Parser, Debug)]
#[command(name = "embedpack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Target runtime releases (X.Y.Z), processed in order.
    #[arg(required = true)]
    versions: Vec<String>,

    /// Architecture tag of the embeddable distribution.
    #[arg(long)]
    platform: Option<String>,

    /// Download cache and working-tree root.
    #[arg(long)]
    cache_root: Option<PathBuf>,

    /// Output directory for finished artifacts.
    #[arg(long)]
    out_root: Option<PathBuf>,

    /// Static support files copied into every build.
    #[arg(long)]
    assets_root: Option<PathBuf>,

    /// JSON settings file; flags take precedence over its fields.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    let settings = match &cli.settings {
        Some(path) => match Settings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => Settings::default(),
    };

    let platform = cli
        .platform
        .or(settings.platform)
        .map_or_else(Platform::default, Platform::new);
    let cache_root = resolve_root(cli.cache_root, settings.cache_root, "tmp");
    let out_root = resolve_root(cli.out_root, settings.out_root, "out");
    let assets_root = resolve_root(cli.assets_root, settings.assets_root, "assets");

    let cache = match AssetCache::new(&cache_root) {
        Ok(cache) => cache,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Each release is its own failure domain: a fatal error for one must
    // not stop the ones after it.
    let mut failures = 0_u32;
    for raw in &cli.versions {
        let version: PythonVersion = match raw.parse() {
            Ok(version) => version,
            Err(e) => {
                error!("skipping {raw}: {e}");
                failures += 1;
                continue;
            }
        };

        let config = BuildConfig::new(version, platform.clone()).with_roots(
            cache_root.clone(),
            out_root.clone(),
            assets_root.clone(),
        );

        info!("building {version} for {platform}");
        if let Err(e) = pipeline::run(&config, &cache).await {
            error!("build for {version} failed: {e}");
            failures += 1;
        }
    }

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn resolve_root(flag: Option<PathBuf>, file: Option<PathBuf>, default: &str) -> PathBuf {
    flag.or(file).unwrap_or_else(|| PathBuf::from(default))
}
