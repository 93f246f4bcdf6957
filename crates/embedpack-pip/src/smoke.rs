use std::path::{Path, PathBuf};

use log::info;

#[derive(Debug, thiserror::Error)]
pub enum SmokeError {
    #[error("failed to spawn {what}: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{what} smoke test exited with {code:?}")]
    Failed {
        what: &'static str,
        code: Option<i32>,
    },
}

/// The embeddable distribution is Windows-only, so the interpreter always
/// sits at the tree root as `python.exe`.
#[must_use]
pub fn interpreter_path(work_dir: &Path) -> PathBuf {
    work_dir.join("python.exe")
}

/// Ask the freshly built interpreter for its version. Output passes through
/// to the terminal.
///
/// # Errors
/// Returns an error if the interpreter cannot be spawned or exits non-zero.
pub async fn smoke_test_runtime(work_dir: &Path) -> Result<(), SmokeError> {
    info!("smoke testing interpreter");
    run(work_dir, "interpreter", &["-V"]).await
}

/// Ask the installed package manager for its version.
///
/// # Errors
/// Returns an error if the interpreter cannot be spawned or exits non-zero.
pub async fn smoke_test_pip(work_dir: &Path) -> Result<(), SmokeError> {
    info!("smoke testing package manager");
    run(work_dir, "package manager", &["-m", "pip", "-V"]).await
}

async fn run(work_dir: &Path, what: &'static str, args: &[&str]) -> Result<(), SmokeError> {
    let status = tokio::process::Command::new(interpreter_path(work_dir))
        .args(args)
        .status()
        .await
        .map_err(|source| SmokeError::Spawn { what, source })?;

    if status.success() {
        Ok(())
    } else {
        Err(SmokeError::Failed {
            what,
            code: status.code(),
        })
    }
}
