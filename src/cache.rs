use crate::error::CacheError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Why a regeneration is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// No readable snapshot from a previous run.
    NoPriorCache,
    /// A candidate the snapshot has never seen.
    Added(String),
    /// A candidate modified after the snapshot was taken.
    Modified(String),
    /// A snapshot entry that is no longer a candidate.
    Removed(String),
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Staleness::NoPriorCache => write!(f, "no prior build cache"),
            Staleness::Added(p) => write!(f, "new candidate {p}"),
            Staleness::Modified(p) => write!(f, "{p} modified"),
            Staleness::Removed(p) => write!(f, "{p} no longer a candidate"),
        }
    }
}

/// Snapshot of `normalized path -> modification time` as of the last
/// successful generation.
///
/// On disk it is one `path,timestamp` record per line. Lines are split on
/// their last comma, so paths containing commas survive a round trip.
/// The snapshot is always rewritten whole, never patched.
#[derive(Debug, Clone, Default)]
pub struct BuildCache {
    records: HashMap<String, u64>,
    /// Whether a snapshot was actually loaded.
    prior: bool,
}

impl BuildCache {
    /// A cache that forces regeneration.
    pub fn none() -> Self {
        Self::default()
    }

    /// A loaded snapshot built from explicit records.
    pub fn from_records(records: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            records: records.into_iter().collect(),
            prior: true,
        }
    }

    /// Reads the snapshot at `path`. A missing, non-regular or unreadable
    /// file means "no prior cache"; malformed lines are skipped.
    pub fn load(path: &Path) -> Self {
        let is_file = fs::metadata(path).map(|m| m.is_file()).unwrap_or(false);
        if !is_file {
            tracing::info!(log = %path.display(), "no build cache found");
            return Self::none();
        }
        match fs::read_to_string(path) {
            Ok(content) => Self::from_records(parse_records(&content, path)),
            Err(err) => {
                tracing::warn!(
                    log = %path.display(),
                    error = %err,
                    "cannot read build cache, ignoring it"
                );
                Self::none()
            }
        }
    }

    pub fn has_prior(&self) -> bool {
        self.prior
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        self.records.get(path).copied()
    }

    /// Whether regeneration is required for this candidate set.
    pub fn is_modified(&self, candidates: &[PathBuf]) -> bool {
        self.staleness(candidates).is_some()
    }

    /// The first reason regeneration is required, if any.
    ///
    /// Candidates that vanished from disk are neither compared nor counted
    /// as visited, so a vanished file that is still in the snapshot reports
    /// as removed.
    pub fn staleness(&self, candidates: &[PathBuf]) -> Option<Staleness> {
        if !self.prior {
            return Some(Staleness::NoPriorCache);
        }

        let mut visited: HashSet<&str> = HashSet::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(current) = file_timestamp(candidate) else {
                continue;
            };
            let key = normalize_path(candidate);
            match self.records.get_key_value(key.as_str()) {
                None => return Some(Staleness::Added(key)),
                Some((_, &cached)) if current > cached => return Some(Staleness::Modified(key)),
                Some((stored, _)) => {
                    visited.insert(stored.as_str());
                }
            }
        }

        self.records
            .keys()
            .find(|k| !visited.contains(k.as_str()))
            .map(|k| Staleness::Removed(k.clone()))
    }

    /// Records for every candidate that still exists, in candidate order.
    pub fn snapshot(candidates: &[PathBuf]) -> Vec<(String, u64)> {
        candidates
            .iter()
            .filter_map(|p| file_timestamp(p).map(|ts| (normalize_path(p), ts)))
            .collect()
    }

    /// Overwrites the log at `path` with a fresh snapshot of `candidates`.
    /// Returns the number of records written.
    pub fn save(candidates: &[PathBuf], path: &Path) -> Result<usize, CacheError> {
        let records = Self::snapshot(candidates);
        let mut content = String::new();
        for (file, ts) in &records {
            content.push_str(file);
            content.push(',');
            content.push_str(&ts.to_string());
            content.push('\n');
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CacheError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(log = %path.display(), records = records.len(), "build cache saved");
        Ok(records.len())
    }
}

fn parse_records(content: &str, path: &Path) -> HashMap<String, u64> {
    let mut records = HashMap::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let parsed = line
            .rsplit_once(',')
            .filter(|(file, _)| !file.is_empty())
            .and_then(|(file, ts)| ts.trim().parse::<u64>().ok().map(|ts| (file, ts)));
        match parsed {
            Some((file, ts)) => {
                records.insert(file.to_string(), ts);
            }
            None => tracing::debug!(
                log = %path.display(),
                line = index + 1,
                "skipping malformed build cache record"
            ),
        }
    }
    records
}

/// Absolute, symlink-resolved form of `path` as a string. Falls back to the
/// absolute path when the file cannot be resolved.
pub fn normalize_path(path: &Path) -> String {
    let resolved = fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf());
    resolved.to_string_lossy().into_owned()
}

/// Modification time in nanoseconds since the UNIX epoch, or `None` if the
/// file is gone.
pub fn file_timestamp(path: &Path) -> Option<u64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    Some(u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX))
}
