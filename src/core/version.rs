//! Stack version resolution
//!
//! Maps a requested QIIME 2 release (e.g. `2024.2`) to the manifest it is
//! installed from and the Python it runs on. The mapping is an ordered table
//! of `(upper_bound_exclusive, mapping)` rows; the last row is unbounded, so
//! new releases are supported by appending a row.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::error::ProvisionError;

/// Release used when no version is requested.
pub const DEFAULT_VERSION: &str = "2024.2";

const CORE_TEMPLATE: &str =
    "https://data.qiime2.org/distro/core/qiime2-{version}-{tag}-linux-conda.yml";
const AMPLICON_TEMPLATE: &str =
    "https://data.qiime2.org/distro/amplicon/qiime2-amplicon-{version}-{tag}-linux-conda.yml";

/// A requested stack release, `<year>.<month>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSpec {
    label: String,
    parts: (u32, u32),
}

impl VersionSpec {
    /// Parse a release label. Exactly two non-empty unsigned integer components.
    pub fn parse(input: &str) -> Result<Self, ProvisionError> {
        let label = input.trim();
        if label.is_empty() {
            return Err(ProvisionError::configuration(input, "empty version"));
        }

        let components: Vec<&str> = label.split('.').collect();
        if components.len() != 2 {
            return Err(ProvisionError::configuration(
                input,
                format!(
                    "expected two dot-separated components (e.g. {}), got {}",
                    DEFAULT_VERSION,
                    components.len()
                ),
            ));
        }

        let mut numbers = [0u32; 2];
        for (slot, component) in numbers.iter_mut().zip(&components) {
            if component.is_empty() || !component.chars().all(|c| c.is_ascii_digit()) {
                return Err(ProvisionError::configuration(
                    input,
                    format!("'{}' is not a number", component),
                ));
            }
            *slot = component.parse().map_err(|_| {
                ProvisionError::configuration(input, format!("'{}' is out of range", component))
            })?;
        }

        Ok(Self {
            label: label.to_string(),
            parts: (numbers[0], numbers[1]),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn as_tuple(&self) -> (u32, u32) {
        self.parts
    }
}

impl FromStr for VersionSpec {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl PartialOrd for VersionSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

/// Which distribution channel a release is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Core,
    Amplicon,
}

impl Distribution {
    fn template(self) -> &'static str {
        match self {
            Distribution::Core => CORE_TEMPLATE,
            Distribution::Amplicon => AMPLICON_TEMPLATE,
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Core => f.write_str("core"),
            Distribution::Amplicon => f.write_str("amplicon"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Mapping {
    runtime_tag: &'static str,
    python: (u32, u32),
    distribution: Distribution,
}

/// Ascending cutoffs. `None` marks the open-ended newest row.
const RANGES: &[(Option<(u32, u32)>, Mapping)] = &[
    (
        Some((2021, 4)),
        Mapping {
            runtime_tag: "py36",
            python: (3, 6),
            distribution: Distribution::Core,
        },
    ),
    (
        Some((2023, 9)),
        Mapping {
            runtime_tag: "py38",
            python: (3, 8),
            distribution: Distribution::Core,
        },
    ),
    (
        Some((2024, 5)),
        Mapping {
            runtime_tag: "py38",
            python: (3, 8),
            distribution: Distribution::Amplicon,
        },
    ),
    (
        Some((2024, 10)),
        Mapping {
            runtime_tag: "py39",
            python: (3, 9),
            distribution: Distribution::Amplicon,
        },
    ),
    (
        None,
        Mapping {
            runtime_tag: "py310",
            python: (3, 10),
            distribution: Distribution::Amplicon,
        },
    ),
];

/// Everything needed to materialize one stack release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    pub version: VersionSpec,
    /// Manifest URL
    pub artifact_url: String,
    /// Manifest file name (last URL segment)
    pub artifact_filename: String,
    /// Python tag embedded in manifest names, e.g. `py38`
    pub runtime_tag: String,
    pub python_compat: (u32, u32),
    pub distribution: Distribution,
}

impl StackConfig {
    /// `python3.8`-style directory name under the environment's `lib/`.
    pub fn python_dir_name(&self) -> String {
        format!("python{}.{}", self.python_compat.0, self.python_compat.1)
    }
}

fn lookup(version: (u32, u32)) -> Mapping {
    let (_, newest) = RANGES[RANGES.len() - 1];
    RANGES
        .iter()
        .find(|(upper, _)| upper.is_some_and(|bound| version < bound))
        .map(|(_, mapping)| *mapping)
        .unwrap_or(newest)
}

/// Extract the file name from a URL.
pub fn url_filename(url: &str) -> String {
    url.rsplit('/')
        .next()
        .unwrap_or("download")
        .split('?')
        .next()
        .unwrap_or("download")
        .to_string()
}

/// Resolve a requested release to its stack configuration.
pub fn resolve(requested_version: &str) -> Result<StackConfig, ProvisionError> {
    let version = VersionSpec::parse(requested_version)?;
    let mapping = lookup(version.as_tuple());

    let artifact_url = mapping
        .distribution
        .template()
        .replace("{version}", version.label())
        .replace("{tag}", mapping.runtime_tag);
    let artifact_filename = url_filename(&artifact_url);

    Ok(StackConfig {
        version,
        artifact_url,
        artifact_filename,
        runtime_tag: mapping.runtime_tag.to_string(),
        python_compat: mapping.python,
        distribution: mapping.distribution,
    })
}
