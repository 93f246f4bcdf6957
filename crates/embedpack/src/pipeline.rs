use std::path::Path;

use log::{info, warn};

use embedpack_archive::{ArchiveError, extract_distribution, pack_tree};
use embedpack_core::BuildConfig;
use embedpack_fetch::{AssetCache, FetchError};
use embedpack_pip::{BootstrapError, SmokeError, ensure_package_manager, smoke_test_pip, smoke_test_runtime};

use crate::patch::{PatchError, patch_isolation};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Smoke(#[from] SmokeError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Build both artifacts for one (version, platform) request.
///
/// Stages through the base pack are fatal: on error the run aborts and the
/// working tree is left behind for inspection. The package-manager leg is
/// best-effort — its failure is logged, the base artifact stays, and the
/// working tree is still cleaned up.
///
/// # Errors
/// Returns an error when a fatal stage (fetch, extract, patch, runtime
/// smoke test, base pack, or cleanup) fails.
pub async fn run(config: &BuildConfig, cache: &AssetCache) -> Result<(), PipelineError> {
    let base_artifact = config.base_artifact();
    if base_artifact.exists() {
        info!(
            "{} already exists, skipping {}",
            base_artifact.display(),
            config.version
        );
        return Ok(());
    }

    config.ensure_roots().map_err(|source| PipelineError::Io {
        context: "failed to create cache/output roots",
        source,
    })?;

    let archive = cache.ensure_runtime_archive(config).await?;

    let work_dir = config.work_dir();
    info!("extracting {} into {}", archive.display(), work_dir.display());
    extract_distribution(&archive, &work_dir)?;

    patch_isolation(&config.assets_root, &work_dir, config.version)?;

    smoke_test_runtime(&work_dir).await?;

    info!("packing base artifact {}", base_artifact.display());
    pack_tree(&work_dir, &base_artifact)?;

    if let Err(error) = bootstrap_and_pack(config, cache, &work_dir).await {
        warn!(
            "package-manager bootstrap for {} failed, keeping base artifact only: {error}",
            config.version
        );
    }

    info!("removing working tree {}", work_dir.display());
    std::fs::remove_dir_all(&work_dir).map_err(|source| PipelineError::Io {
        context: "failed to remove working tree",
        source,
    })?;

    Ok(())
}

async fn bootstrap_and_pack(
    config: &BuildConfig,
    cache: &AssetCache,
    work_dir: &Path,
) -> Result<(), PipelineError> {
    ensure_package_manager(work_dir, config.version, cache, &config.bootstrap_base).await?;
    smoke_test_pip(work_dir).await?;

    let pip_artifact = config.pip_artifact();
    info!("packing pip artifact {}", pip_artifact.display());
    pack_tree(work_dir, &pip_artifact)?;
    Ok(())
}
