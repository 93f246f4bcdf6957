use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A CPython release identified by its dotted triple, for example `3.9.13`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PythonVersion {
    #[must_use]
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Compact `XY` tag used in the embeddable layout's file names
    /// (`python39.zip`, `python39._pth`).
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{}{}", self.major, self.minor)
    }

    /// `major.minor` form used by version-pinned bootstrap URLs.
    #[must_use]
    pub fn minor_series(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl Ord for PythonVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
    }
}

impl PartialOrd for PythonVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComponent {
    Major,
    Minor,
    Patch,
}

impl fmt::Display for VersionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::Patch => write!(f, "patch"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum VersionParseError {
    #[error("Expected X.Y.Z format, got: {input}")]
    InvalidFormat { input: String },
    #[error("Invalid {component} version: {value}")]
    InvalidComponent {
        component: VersionComponent,
        value: String,
    },
}

impl FromStr for PythonVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let mut parts = s.split('.');
        let major_str = parts
            .next()
            .ok_or_else(|| VersionParseError::InvalidFormat {
                input: s.to_string(),
            })?;
        let minor_str = parts
            .next()
            .ok_or_else(|| VersionParseError::InvalidFormat {
                input: s.to_string(),
            })?;
        let patch_str = parts
            .next()
            .ok_or_else(|| VersionParseError::InvalidFormat {
                input: s.to_string(),
            })?;
        if parts.next().is_some() {
            return Err(VersionParseError::InvalidFormat {
                input: s.to_string(),
            });
        }

        let major = major_str
            .parse()
            .map_err(|_| VersionParseError::InvalidComponent {
                component: VersionComponent::Major,
                value: major_str.to_string(),
            })?;
        let minor = minor_str
            .parse()
            .map_err(|_| VersionParseError::InvalidComponent {
                component: VersionComponent::Minor,
                value: minor_str.to_string(),
            })?;
        let patch = patch_str
            .parse()
            .map_err(|_| VersionParseError::InvalidComponent {
                component: VersionComponent::Patch,
                value: patch_str.to_string(),
            })?;

        Ok(PythonVersion::new(major, minor, patch))
    }
}
