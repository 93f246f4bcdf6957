use std::io::Write as _;
use std::path::Path;

use log::{debug, info};

use embedpack_core::PythonVersion;
use embedpack_fetch::{AssetCache, FetchError, IndexError, resolve_latest_wheel};

use crate::smoke::interpreter_path;

/// Releases at or above this minor use the generic "latest" bootstrap
/// script; older ones need the version-pinned variant.
const GENERIC_MIN_MINOR: u32 = 8;
/// At or below this minor the script's self-upgrade invocation breaks an
/// offline install and has to be rewritten against pre-fetched wheels.
const OFFLINE_PATCH_MAX_MINOR: u32 = 6;

/// The literal argument list get-pip.py uses to upgrade itself. Text
/// substitution against it is a compatibility shim for releases without an
/// offline install mode; its absence is an explicit error.
const SELF_UPGRADE_MARKER: &str = r#""install", "--upgrade""#;

/// The three wheels an offline bootstrap needs: the package manager itself,
/// the build-backend helper, and the wheel-format helper.
const OFFLINE_WHEEL_PACKAGES: [&str; 3] = ["pip", "setuptools", "wheel"];

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("self-upgrade marker not found in bootstrap script {script}")]
    MarkerNotFound { script: String },
    #[error("bootstrap script exited with {code:?}")]
    ScriptFailed { code: Option<i32> },
}

impl BootstrapError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// How the package manager gets installed into a given target release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStrategy {
    /// Generic latest bootstrap script, run unmodified.
    Latest,
    /// Version-pinned bootstrap script, run unmodified.
    Pinned,
    /// Version-pinned script with its self-upgrade rewritten into an
    /// offline, no-index install of pre-fetched wheels.
    OfflinePatched,
}

impl BootstrapStrategy {
    #[must_use]
    pub fn for_version(version: PythonVersion) -> Self {
        if version.minor >= GENERIC_MIN_MINOR {
            Self::Latest
        } else if version.minor <= OFFLINE_PATCH_MAX_MINOR {
            Self::OfflinePatched
        } else {
            Self::Pinned
        }
    }

    /// Script URL under the configured bootstrap host.
    #[must_use]
    pub fn script_url(self, base: &str, version: PythonVersion) -> String {
        match self {
            Self::Latest => format!("{base}/get-pip.py"),
            Self::Pinned | Self::OfflinePatched => {
                format!("{base}/pip/{}/get-pip.py", version.minor_series())
            }
        }
    }

    /// Cache-entry file name for the selected script.
    #[must_use]
    pub fn cache_file_name(self, version: PythonVersion) -> String {
        match self {
            Self::Latest => "get-pip.py".to_string(),
            Self::Pinned | Self::OfflinePatched => {
                format!("get-pip-{}.py", version.minor_series())
            }
        }
    }
}

/// Install the package manager into the working tree's interpreter.
///
/// Fatal to this stage only: the caller treats any error here as degraded
/// and still packages the base artifact.
///
/// # Errors
/// Returns an error if the script or wheels cannot be fetched, the script
/// cannot be patched for offline install, or the interpreter exits
/// non-zero.
pub async fn ensure_package_manager(
    work_dir: &Path,
    version: PythonVersion,
    cache: &AssetCache,
    bootstrap_base: &str,
) -> Result<(), BootstrapError> {
    let strategy = BootstrapStrategy::for_version(version);
    debug!("bootstrap strategy for {version}: {strategy:?}");

    let script_path = cache
        .ensure_bootstrap_script(
            &strategy.script_url(bootstrap_base, version),
            &strategy.cache_file_name(version),
        )
        .await?;

    if strategy == BootstrapStrategy::OfflinePatched {
        let mut wheels = Vec::with_capacity(OFFLINE_WHEEL_PACKAGES.len());
        for package in OFFLINE_WHEEL_PACKAGES {
            let wheel = resolve_latest_wheel(cache.client(), package).await?;
            wheels.push(cache.ensure_wheel(&wheel).await?);
        }

        let script = tokio::fs::read_to_string(&script_path)
            .await
            .map_err(|e| BootstrapError::io("failed to read bootstrap script", e))?;
        let patched = patch_script_for_offline(&script, cache.root(), &wheels)
            .ok_or_else(|| BootstrapError::MarkerNotFound {
                script: script_path.display().to_string(),
            })?;

        // Temp file lives until the end of this scope; the script is gone
        // again once the interpreter has run it.
        let mut temp = tempfile::Builder::new()
            .prefix("get-pip-offline-")
            .suffix(".py")
            .tempfile_in(cache.root())
            .map_err(|e| BootstrapError::io("failed to create temp script", e))?;
        temp.write_all(patched.as_bytes())
            .map_err(|e| BootstrapError::io("failed to write temp script", e))?;
        temp.flush()
            .map_err(|e| BootstrapError::io("failed to flush temp script", e))?;

        info!("running offline-patched bootstrap script");
        run_script(work_dir, temp.path()).await
    } else {
        info!("running bootstrap script {}", script_path.display());
        run_script(work_dir, &script_path).await
    }
}

/// Rewrite the script's self-upgrade argument list into an offline install
/// of the pre-fetched wheels. Returns `None` when the marker is absent.
fn patch_script_for_offline(script: &str, wheel_dir: &Path, wheels: &[std::path::PathBuf]) -> Option<String> {
    if !script.contains(SELF_UPGRADE_MARKER) {
        return None;
    }

    let mut replacement = format!(
        r#""install", "--no-index", "--find-links", r"{}""#,
        wheel_dir.display()
    );
    for wheel in wheels {
        replacement.push_str(&format!(r#", r"{}""#, wheel.display()));
    }

    Some(script.replace(SELF_UPGRADE_MARKER, &replacement))
}

async fn run_script(work_dir: &Path, script: &Path) -> Result<(), BootstrapError> {
    let status = tokio::process::Command::new(interpreter_path(work_dir))
        .arg(script)
        .status()
        .await
        .map_err(|e| BootstrapError::io("failed to spawn interpreter", e))?;

    if status.success() {
        Ok(())
    } else {
        Err(BootstrapError::ScriptFailed {
            code: status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{BootstrapStrategy, SELF_UPGRADE_MARKER, patch_script_for_offline};

    fn version(minor: u32) -> embedpack_core::PythonVersion {
        embedpack_core::PythonVersion::new(3, minor, 0)
    }

    #[test]
    fn recent_releases_use_the_generic_script() {
        assert_eq!(
            BootstrapStrategy::for_version(version(12)),
            BootstrapStrategy::Latest
        );
        assert_eq!(
            BootstrapStrategy::for_version(version(8)),
            BootstrapStrategy::Latest
        );
    }

    #[test]
    fn mid_releases_use_the_pinned_script() {
        assert_eq!(
            BootstrapStrategy::for_version(version(7)),
            BootstrapStrategy::Pinned
        );
    }

    #[test]
    fn old_releases_get_the_offline_patch() {
        assert_eq!(
            BootstrapStrategy::for_version(version(6)),
            BootstrapStrategy::OfflinePatched
        );
        assert_eq!(
            BootstrapStrategy::for_version(version(4)),
            BootstrapStrategy::OfflinePatched
        );
    }

    #[test]
    fn script_urls_follow_the_strategy() {
        let base = embedpack_core::DEFAULT_BOOTSTRAP_BASE;
        assert_eq!(
            BootstrapStrategy::Latest.script_url(base, version(12)),
            "https://bootstrap.pypa.io/get-pip.py"
        );
        assert_eq!(
            BootstrapStrategy::Pinned.script_url(base, version(7)),
            "https://bootstrap.pypa.io/pip/3.7/get-pip.py"
        );
        assert_eq!(
            BootstrapStrategy::OfflinePatched.script_url(base, version(6)),
            "https://bootstrap.pypa.io/pip/3.6/get-pip.py"
        );
    }

    #[test]
    fn cache_file_names_pin_the_series() {
        assert_eq!(
            BootstrapStrategy::Latest.cache_file_name(version(12)),
            "get-pip.py"
        );
        assert_eq!(
            BootstrapStrategy::Pinned.cache_file_name(version(7)),
            "get-pip-3.7.py"
        );
    }

    #[test]
    fn patch_rewrites_the_self_upgrade_invocation() {
        let script = format!("args = [{SELF_UPGRADE_MARKER}, \"pip\"]\nmain(args)\n");
        let wheels = vec![
            PathBuf::from("tmp/pip-21.3.1-py3-none-any.whl"),
            PathBuf::from("tmp/setuptools-59.6.0-py3-none-any.whl"),
            PathBuf::from("tmp/wheel-0.37.1-py2.py3-none-any.whl"),
        ];

        let patched = patch_script_for_offline(&script, Path::new("tmp"), &wheels)
            .expect("marker should be found");

        assert!(!patched.contains(SELF_UPGRADE_MARKER));
        assert!(patched.contains(r#""--no-index""#));
        assert!(patched.contains("pip-21.3.1-py3-none-any.whl"));
        assert!(patched.contains("wheel-0.37.1-py2.py3-none-any.whl"));
    }

    #[test]
    fn patch_without_marker_is_rejected() {
        let result = patch_script_for_offline("print('hello')", Path::new("tmp"), &[]);
        assert!(result.is_none());
    }
}
