//! Process environment snapshots and environment publication
//!
//! Child processes never see the live process environment. The pipeline
//! captures it once into a [`ProcessEnv`], and every mutation (such as
//! publishing a freshly created environment) returns an updated copy that
//! later stages hand to the command runner.

use std::collections::BTreeMap;
use std::env::JoinPathsError;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

pub const PATH_VAR: &str = "PATH";
pub const PYTHONPATH_VAR: &str = "PYTHONPATH";

/// Immutable-by-convention snapshot of environment variables.
///
/// Keys and values are kept as raw OS strings so that a child sees exactly
/// what the parent had, including non-UTF-8 values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnv {
    vars: BTreeMap<OsString, OsString>,
}

impl ProcessEnv {
    /// Snapshot the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars_os().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `key`, if it is set and valid UTF-8.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_os(key).and_then(OsStr::to_str)
    }

    pub fn get_os(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    pub fn with_var(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn vars(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    /// Entries of a `:`-separated search-path variable. Empty entries are dropped.
    pub fn path_list(&self, key: &str) -> Vec<PathBuf> {
        self.get_os(key)
            .map(|value| {
                std::env::split_paths(value)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Put `dir` first in a search-path variable, dropping any later duplicate.
    ///
    /// Fails if `dir` contains the path separator.
    pub fn prepend_path(self, key: &str, dir: &Path) -> Result<Self, JoinPathsError> {
        let mut entries = vec![dir.to_path_buf()];
        entries.extend(self.path_list(key).into_iter().filter(|p| p != dir));
        self.with_path_list(key, entries)
    }

    /// Append `dir` to a search-path variable unless it is already present.
    ///
    /// Fails if `dir` contains the path separator.
    pub fn append_path(self, key: &str, dir: &Path) -> Result<Self, JoinPathsError> {
        let mut entries = self.path_list(key);
        if entries.iter().any(|p| p == dir) {
            return Ok(self);
        }
        entries.push(dir.to_path_buf());
        self.with_path_list(key, entries)
    }

    fn with_path_list(self, key: &str, entries: Vec<PathBuf>) -> Result<Self, JoinPathsError> {
        let joined = std::env::join_paths(&entries)?;
        Ok(self.with_var(key, joined))
    }
}

/// Why a directory did not make it onto a search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unpublished {
    Missing,
    /// The directory name contains the search-path separator.
    Unjoinable,
}

/// Result of exposing an environment to later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub env: ProcessEnv,
    pub bin_dir: PathBuf,
    pub site_packages: PathBuf,
    /// `None` once `bin_dir` is first on `PATH`
    pub bin_problem: Option<Unpublished>,
    /// `None` once `site_packages` is on `PYTHONPATH`
    pub site_packages_problem: Option<Unpublished>,
}

impl Publication {
    pub fn bin_published(&self) -> bool {
        self.bin_problem.is_none()
    }

    pub fn site_packages_published(&self) -> bool {
        self.site_packages_problem.is_none()
    }

    pub fn fully_published(&self) -> bool {
        self.bin_published() && self.site_packages_published()
    }
}

/// Executable directory of an environment.
pub fn bin_dir(environment_prefix: &Path) -> PathBuf {
    environment_prefix.join("bin")
}

/// Library directory the environment's Python imports from.
pub fn site_packages_dir(environment_prefix: &Path, python: (u32, u32)) -> PathBuf {
    environment_prefix
        .join("lib")
        .join(format!("python{}.{}", python.0, python.1))
        .join("site-packages")
}

/// Expose an environment's executables and libraries.
///
/// Each mutation only happens when its directory exists and can be joined
/// into the search path; otherwise that variable is left as it was.
pub fn publish(env: &ProcessEnv, environment_prefix: &Path, python: (u32, u32)) -> Publication {
    let bin = bin_dir(environment_prefix);
    let site_packages = site_packages_dir(environment_prefix, python);
    let mut next = env.clone();

    let bin_problem = if !bin.is_dir() {
        Some(Unpublished::Missing)
    } else {
        match next.clone().prepend_path(PATH_VAR, &bin) {
            Ok(updated) => {
                next = updated;
                None
            }
            Err(_) => Some(Unpublished::Unjoinable),
        }
    };

    let site_packages_problem = if !site_packages.is_dir() {
        Some(Unpublished::Missing)
    } else {
        match next.clone().append_path(PYTHONPATH_VAR, &site_packages) {
            Ok(updated) => {
                next = updated;
                None
            }
            Err(_) => Some(Unpublished::Unjoinable),
        }
    };

    Publication {
        env: next,
        bin_dir: bin,
        site_packages,
        bin_problem,
        site_packages_problem,
    }
}

/// Human-readable reason a directory was not published.
pub fn describe_unpublished(what: &str, dir: &Path, problem: &Unpublished) -> String {
    match problem {
        Unpublished::Missing => format!("{} directory not found: {}", what, dir.display()),
        Unpublished::Unjoinable => format!(
            "{} directory {} contains ':' and cannot be put on a search path",
            what,
            dir.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base_env() -> ProcessEnv {
        ProcessEnv::from_pairs([(PATH_VAR, "/usr/local/bin:/usr/bin"), ("HOME", "/root")])
    }

    #[test]
    fn test_prepend_path_moves_existing_entry_to_front() {
        let env = base_env().prepend_path(PATH_VAR, Path::new("/usr/bin")).unwrap();
        assert_eq!(env.get(PATH_VAR), Some("/usr/bin:/usr/local/bin"));
    }

    #[test]
    fn test_prepend_path_on_missing_var() {
        let env = ProcessEnv::default()
            .prepend_path(PATH_VAR, Path::new("/opt/env/bin"))
            .unwrap();
        assert_eq!(env.get(PATH_VAR), Some("/opt/env/bin"));
    }

    #[test]
    fn test_append_path_is_idempotent() {
        let dir = Path::new("/opt/env/lib/python3.8/site-packages");
        let env = ProcessEnv::default()
            .append_path(PYTHONPATH_VAR, dir)
            .unwrap()
            .append_path(PYTHONPATH_VAR, dir)
            .unwrap();
        assert_eq!(env.path_list(PYTHONPATH_VAR), vec![dir.to_path_buf()]);
    }

    #[test]
    fn test_publish_existing_environment() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("qiime2_env");
        std::fs::create_dir_all(prefix.join("bin")).unwrap();
        std::fs::create_dir_all(prefix.join("lib/python3.8/site-packages")).unwrap();

        let before = base_env();
        let publication = publish(&before, &prefix, (3, 8));

        assert!(publication.fully_published());
        assert_eq!(publication.env.path_list(PATH_VAR)[0], prefix.join("bin"));
        assert_eq!(
            publication.env.path_list(PYTHONPATH_VAR),
            vec![prefix.join("lib/python3.8/site-packages")]
        );
        // the input snapshot is untouched
        assert_eq!(before.get(PATH_VAR), Some("/usr/local/bin:/usr/bin"));
        assert_eq!(publication.env.get("HOME"), Some("/root"));
    }

    #[test]
    fn test_publish_missing_environment_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("absent");

        let publication = publish(&base_env(), &prefix, (3, 8));

        assert_eq!(publication.bin_problem, Some(Unpublished::Missing));
        assert_eq!(publication.site_packages_problem, Some(Unpublished::Missing));
        assert_eq!(publication.env, base_env());
    }

    #[test]
    fn test_publish_reports_each_mutation() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("env");
        std::fs::create_dir_all(prefix.join("bin")).unwrap();

        let publication = publish(&base_env(), &prefix, (3, 10));

        assert!(publication.bin_published());
        assert!(!publication.site_packages_published());
        assert!(publication.env.get(PYTHONPATH_VAR).is_none());
        assert!(publication.site_packages.ends_with("lib/python3.10/site-packages"));
    }

    #[test]
    fn test_separator_in_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("qiime:env");
        std::fs::create_dir_all(prefix.join("bin")).unwrap();

        let publication = publish(&base_env(), &prefix, (3, 8));

        assert_eq!(publication.bin_problem, Some(Unpublished::Unjoinable));
        assert!(!publication.fully_published());
        assert_eq!(publication.env.get(PATH_VAR), Some("/usr/local/bin:/usr/bin"));
        assert!(
            describe_unpublished("bin", &publication.bin_dir, &Unpublished::Unjoinable)
                .contains("cannot be put on a search path")
        );
    }

    #[test]
    fn test_capture_keeps_every_variable() {
        assert_eq!(ProcessEnv::capture().len(), std::env::vars_os().count());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_values_are_kept() {
        use std::os::unix::ffi::OsStringExt;

        let raw = OsString::from_vec(b"caf\xe9".to_vec());
        let env = base_env().with_var("Q2_RAW", raw.clone());

        assert_eq!(env.get_os("Q2_RAW"), Some(raw.as_os_str()));
        assert_eq!(env.get("Q2_RAW"), None);
        assert!(env.vars().any(|(k, v)| k == "Q2_RAW" && v == raw.as_os_str()));
    }
}
