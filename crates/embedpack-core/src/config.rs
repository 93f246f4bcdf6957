use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::version::PythonVersion;

/// Architecture tag of the embeddable distribution, for example `amd64`
/// or `win32`. Combined with a [`PythonVersion`] it forms asset and
/// artifact file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self("amd64".to_string())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything one pipeline run needs to know, made explicit: the target
/// release, the platform, and the three filesystem roots. All derived
/// paths (cache entries, working tree, artifacts) come from here so no
/// component carries baked-in defaults.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub version: PythonVersion,
    pub platform: Platform,
    /// Download cache and working trees live under here (`tmp/` by default).
    pub cache_root: PathBuf,
    /// Durable artifacts are written here (`out/` by default).
    pub out_root: PathBuf,
    /// Static support files copied into every build (`assets/` by default).
    pub assets_root: PathBuf,
    /// Base URL the bootstrap scripts are fetched from.
    pub bootstrap_base: String,
}

/// Upstream host serving both the generic and the version-pinned
/// bootstrap scripts.
pub const DEFAULT_BOOTSTRAP_BASE: &str = "https://bootstrap.pypa.io";

impl BuildConfig {
    #[must_use]
    pub fn new(version: PythonVersion, platform: Platform) -> Self {
        Self {
            version,
            platform,
            cache_root: PathBuf::from("tmp"),
            out_root: PathBuf::from("out"),
            assets_root: PathBuf::from("assets"),
            bootstrap_base: DEFAULT_BOOTSTRAP_BASE.to_string(),
        }
    }

    #[must_use]
    pub fn with_bootstrap_base(mut self, base: impl Into<String>) -> Self {
        self.bootstrap_base = base.into();
        self
    }

    #[must_use]
    pub fn with_roots(
        mut self,
        cache_root: impl Into<PathBuf>,
        out_root: impl Into<PathBuf>,
        assets_root: impl Into<PathBuf>,
    ) -> Self {
        self.cache_root = cache_root.into();
        self.out_root = out_root.into();
        self.assets_root = assets_root.into();
        self
    }

    /// File name of the upstream embeddable archive for this release.
    #[must_use]
    pub fn archive_file_name(&self) -> String {
        format!("python-{}-embed-{}.zip", self.version, self.platform)
    }

    /// Transient extraction/patch directory, exclusively owned by one run.
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.cache_root.join(self.version.to_string())
    }

    /// The bare-fixed output archive. Its presence on disk marks the whole
    /// run for this version as already done.
    #[must_use]
    pub fn base_artifact(&self) -> PathBuf {
        self.out_root
            .join(format!("python-{}-embed-fix-{}.zip", self.version, self.platform))
    }

    /// The pip-enabled output archive.
    #[must_use]
    pub fn pip_artifact(&self) -> PathBuf {
        self.out_root
            .join(format!("python-{}-embed-pip-{}.zip", self.version, self.platform))
    }

    /// Create the cache and output roots.
    ///
    /// # Errors
    /// Returns an error if either directory cannot be created.
    pub fn ensure_roots(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.cache_root)?;
        std::fs::create_dir_all(&self.out_root)?;
        Ok(())
    }
}
