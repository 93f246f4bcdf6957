use std::path::{Path, PathBuf};

use log::{debug, info};

use embedpack_core::PythonVersion;

const NEUTRAL_ISOLATION_FILE: &str = "python._pth";

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("expected at most one version-tagged isolation file, found {found}")]
    IsolationFiles { found: usize },
    #[error("isolation file {name} does not match the requested release")]
    WrongRelease { name: String },
    #[error("support assets are missing the replacement isolation file {name}")]
    MissingAsset { name: &'static str },
}

impl PatchError {
    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }
}

/// Copy the static support files into the working tree and repair the
/// path-isolation declaration so the interpreter can see site-packages and
/// the copied support scripts.
///
/// The assets ship a neutral-named `python._pth` replacement. When the
/// extracted tree carried a version-tagged isolation file (`python39._pth`),
/// the tagged original is dropped and the replacement takes over its name.
/// Older layouts without a tagged file get the neutral file removed
/// outright: with no isolation file present the runtime falls back to
/// default path resolution, which already permits site-packages.
///
/// # Errors
/// Returns an error on filesystem failure, when several version-tagged
/// isolation files are found, or when the assets lack the replacement file.
pub fn patch_isolation(
    assets_root: &Path,
    work_dir: &Path,
    version: PythonVersion,
) -> Result<(), PatchError> {
    let tagged_name = format!("python{}._pth", version.tag());
    let had_tagged = find_tagged_isolation_files(work_dir, &tagged_name)?;

    info!("copying support assets from {}", assets_root.display());
    copy_dir_recursive(assets_root, work_dir)?;

    let neutral = work_dir.join(NEUTRAL_ISOLATION_FILE);
    if !neutral.exists() {
        return Err(PatchError::MissingAsset {
            name: NEUTRAL_ISOLATION_FILE,
        });
    }

    if let Some(tagged) = had_tagged {
        debug!("replacing tagged isolation file {}", tagged.display());
        std::fs::remove_file(&tagged)
            .map_err(|e| PatchError::io_with_path("failed to remove isolation file", &tagged, &e))?;
        let target = work_dir.join(&tagged_name);
        std::fs::rename(&neutral, &target)
            .map_err(|e| PatchError::io_with_path("failed to rename isolation file", &target, &e))?;
    } else {
        // Pre-tagged layout: dropping the isolation file entirely re-enables
        // default path resolution.
        debug!("no tagged isolation file, removing neutral one");
        std::fs::remove_file(&neutral)
            .map_err(|e| PatchError::io_with_path("failed to remove isolation file", &neutral, &e))?;
    }

    Ok(())
}

/// Look for version-tagged isolation files in the extracted tree. Exactly
/// one (or none, for older layouts) is expected; several means the upstream
/// layout changed in a way this tool does not understand.
fn find_tagged_isolation_files(
    work_dir: &Path,
    tagged_name: &str,
) -> Result<Option<PathBuf>, PatchError> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(work_dir)
        .map_err(|e| PatchError::io_with_path("failed to read working tree", work_dir, &e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.file_name().and_then(|n| n.to_str()).is_some_and(|name| {
                    name.ends_with("._pth") && name != NEUTRAL_ISOLATION_FILE
                })
        })
        .collect();

    match matches.len() {
        0 => Ok(None),
        1 => {
            let found = matches.remove(0);
            let name = found
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            if name == tagged_name {
                Ok(Some(found))
            } else {
                // A tagged file for a different release in this tree means
                // the archive and the requested version disagree.
                Err(PatchError::WrongRelease { name })
            }
        }
        found => Err(PatchError::IsolationFiles { found }),
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), PatchError> {
    std::fs::create_dir_all(dest)
        .map_err(|e| PatchError::io_with_path("failed to create directory", dest, &e))?;

    for entry in std::fs::read_dir(src)
        .map_err(|e| PatchError::io_with_path("failed to read assets directory", src, &e))?
    {
        let entry = entry.map_err(|e| PatchError::Io {
            context: "failed to read assets entry",
            source: e,
        })?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dest_path)?;
        } else {
            std::fs::copy(&src_path, &dest_path).map_err(|e| PatchError::Io {
                context: "failed to copy support asset",
                source: std::io::Error::new(
                    e.kind(),
                    format!("{} -> {}: {e}", src_path.display(), dest_path.display()),
                ),
            })?;
        }
    }
    Ok(())
}
