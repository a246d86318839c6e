//! Run configuration, assembled from command-line flags and validated
//! before any work begins.

use crate::error::ConfigError;
use crate::parser::ParseOptions;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything one generator run needs.
#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    /// Directory scanned recursively for headers.
    pub source_root: PathBuf,

    /// Directory receiving the generated unit and its header.
    pub output_dir: PathBuf,

    /// Build cache log. `None` disables the up-to-date check.
    pub log_path: Option<PathBuf>,

    /// Forwarded verbatim to the source parser.
    pub include_paths: Vec<PathBuf>,

    /// Header declaring the registry API, included first by the generated unit.
    pub registry_header: Option<String>,

    /// Upper bound on parallel parses. `None` lets rayon decide.
    pub jobs: Option<usize>,
}

impl GeneratorConfig {
    pub fn new(source_root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_log_path(mut self, log_path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(log_path.into());
        self
    }

    pub fn with_include_paths(mut self, include_paths: Vec<PathBuf>) -> Self {
        self.include_paths = include_paths;
        self
    }

    pub fn with_registry_header(mut self, header: impl Into<String>) -> Self {
        self.registry_header = Some(header.into());
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Checks both required directories and resolves them to absolute,
    /// symlink-free paths. The log path is not checked: a missing log only
    /// means "no prior cache".
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.source_root = resolve_dir("--source-root", &self.source_root)?;
        self.output_dir = resolve_dir("--output-dir", &self.output_dir)?;
        if self.jobs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "jobs",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(self)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            include_paths: self.include_paths.clone(),
        }
    }
}

fn resolve_dir(flag: &'static str, path: &Path) -> Result<PathBuf, ConfigError> {
    let metadata = fs::metadata(path).map_err(|_| ConfigError::MissingDirectory {
        flag,
        path: path.to_path_buf(),
    })?;
    if !metadata.is_dir() {
        return Err(ConfigError::NotADirectory {
            flag,
            path: path.to_path_buf(),
        });
    }
    fs::canonicalize(path).map_err(|source| ConfigError::Resolve {
        flag,
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn validate_resolves_existing_directories() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let config = GeneratorConfig::new(src.path(), out.path())
            .with_log_path(out.path().join("missing.log"))
            .validate()
            .unwrap();

        assert!(config.source_root.is_absolute());
        assert_eq!(config.source_root, fs::canonicalize(src.path()).unwrap());
        assert_eq!(config.output_dir, fs::canonicalize(out.path()).unwrap());
    }

    #[test]
    fn missing_source_root_is_rejected() {
        let out = TempDir::new().unwrap();
        let err = GeneratorConfig::new(out.path().join("nope"), out.path())
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingDirectory { flag: "--source-root", .. }
        ));
    }

    #[test]
    fn file_as_output_dir_is_rejected() {
        let src = TempDir::new().unwrap();
        let file = src.path().join("out.txt");
        fs::write(&file, "").unwrap();

        let err = GeneratorConfig::new(src.path(), &file).validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NotADirectory { flag: "--output-dir", .. }
        ));
        assert!(err.to_string().contains("--output-dir is not a directory"));
    }

    #[test]
    fn zero_jobs_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = GeneratorConfig::new(dir.path(), dir.path())
            .with_jobs(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "jobs", .. }));
    }
}
