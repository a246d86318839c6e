//! Cheap textual pre-filter run before the real parser.
//!
//! A header only reaches the parser if one of the marker macro names occurs
//! somewhere in its text. Matching is a plain substring test per line, so a
//! marker inside a comment or string literal still selects the file; that
//! only costs one extra parse.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Marker macros that select a class, struct, field or method.
pub const TYPE_MARKERS: [&str; 4] = [
    "REFLECT_CLASS",
    "REFLECT_STRUCT",
    "REFLECT_FIELD",
    "REFLECT_METHOD",
];

/// Marker macro that selects an enum.
pub const ENUM_MARKER: &str = "REFLECT_ENUM";

/// Extensions treated as headers.
pub const HEADER_EXTENSIONS: [&str; 2] = ["h", "hpp"];

/// Outcome of scanning one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerScan {
    pub has_type_marker: bool,
    pub has_enum_marker: bool,
}

impl MarkerScan {
    /// Whether the file should be handed to the parser.
    pub fn any(&self) -> bool {
        self.has_type_marker || self.has_enum_marker
    }

    fn complete(&self) -> bool {
        self.has_type_marker && self.has_enum_marker
    }

    fn observe(&mut self, line: &str) {
        if !self.has_type_marker && TYPE_MARKERS.iter().any(|m| line.contains(m)) {
            self.has_type_marker = true;
        }
        if !self.has_enum_marker && line.contains(ENUM_MARKER) {
            self.has_enum_marker = true;
        }
    }
}

/// Streams `path` line by line looking for marker substrings.
///
/// Stops reading as soon as both flags are set. A file that cannot be opened
/// or read scans as "no markers"; the failure is logged and never propagated.
pub fn scan_file(path: &Path) -> MarkerScan {
    let mut scan = MarkerScan::default();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(err) => {
            tracing::warn!(
                file = %path.display(),
                error = %err,
                "cannot open header, treating as unmarked"
            );
            return scan;
        }
    };

    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                scan.observe(&String::from_utf8_lossy(&buf));
                if scan.complete() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "read failed mid-scan");
                break;
            }
        }
    }
    scan
}

/// Recursively collects `.h`/`.hpp` files under `root`, sorted by file name
/// within each directory so the processing order is stable across runs.
pub fn find_all_header_files(root: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut out = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_vcs_dir(e.path()));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if is_header(entry.path()) {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

/// Applies [`scan_file`] to every path and keeps the marked ones, preserving order.
pub fn filter_candidates(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let total = files.len();
    let kept: Vec<PathBuf> = files.into_iter().filter(|p| scan_file(p).any()).collect();
    tracing::debug!(total, kept = kept.len(), "marker pre-filter done");
    kept
}

fn is_header(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| HEADER_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

fn is_vcs_dir(path: &Path) -> bool {
    path.file_name()
        .map(|n| n == ".git" || n == ".svn" || n == ".hg")
        .unwrap_or(false)
}
