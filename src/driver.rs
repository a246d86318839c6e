//! Top-level generation run.
//!
//! walk → marker pre-filter → staleness gate → parallel extraction →
//! ordered merge through the session → cache refresh.
//!
//! The destination is opened only after every candidate has been parsed.

use crate::analyzer::extract::EntityExtractor;
use crate::analyzer::metadata::FileEntities;
use crate::cache::BuildCache;
use crate::codegen::EmitOptions;
use crate::config::GeneratorConfig;
use crate::error::{DriverError, DriverResult, ParseError};
use crate::parser::SourceParser;
use crate::scanner::{filter_candidates, find_all_header_files};
use crate::session::GenerationSession;
use rayon::prelude::*;
use std::path::PathBuf;

/// Result of a successful run.
#[derive(Debug)]
pub enum GenerationOutcome {
    /// The build cache says the previous output is still valid.
    Skipped,
    Regenerated(GenerationReport),
}

#[derive(Debug, Default)]
pub struct GenerationReport {
    pub candidates: usize,
    pub parsed: usize,
    /// Headers that could not be parsed; they contributed nothing.
    pub failed: Vec<ParseError>,
    pub types: usize,
    pub enums: usize,
    pub duplicates: usize,
    pub written: Vec<PathBuf>,
    pub cache_saved: bool,
}

pub struct Driver<'p> {
    config: GeneratorConfig,
    parser: &'p dyn SourceParser,
}

impl<'p> Driver<'p> {
    /// Validates `config`; nothing is touched on disk before this succeeds.
    pub fn new(config: GeneratorConfig, parser: &'p dyn SourceParser) -> DriverResult<Self> {
        let config = config.validate()?;
        tracing::debug!(
            source_root = %config.source_root.display(),
            output_dir = %config.output_dir.display(),
            include_paths = ?config.include_paths,
            "configuration validated"
        );
        Ok(Self { config, parser })
    }

    pub fn run(&self) -> DriverResult<GenerationOutcome> {
        let headers = find_all_header_files(&self.config.source_root)?;
        let total = headers.len();
        let candidates = filter_candidates(headers);
        tracing::info!(headers = total, candidates = candidates.len(), "scanned source root");

        let cache = self
            .config
            .log_path
            .as_deref()
            .map(BuildCache::load)
            .unwrap_or_else(BuildCache::none);
        match cache.staleness(&candidates) {
            Some(reason) => tracing::info!(%reason, "regenerating"),
            None => {
                tracing::info!("reflection registry is up to date");
                return Ok(GenerationOutcome::Skipped);
            }
        }

        // parse everything before touching the destination, so a run that
        // fails here leaves the previous output in place
        let results = self.extract_all(&candidates)?;
        let mut report = GenerationReport {
            candidates: candidates.len(),
            ..GenerationReport::default()
        };
        let mut parsed = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(entities) => parsed.push(entities),
                Err(err) => {
                    tracing::error!(error = %err, "skipping header");
                    report.failed.push(err);
                }
            }
        }
        report.parsed = parsed.len();

        if !candidates.is_empty() && parsed.is_empty() {
            return Err(DriverError::AllFilesFailed(report.failed));
        }

        let mut session = GenerationSession::new(
            &self.config.output_dir,
            EmitOptions {
                registry_header: self.config.registry_header.clone(),
            },
        );
        session.begin()?;
        for entities in parsed {
            report.duplicates += session.record(entities).duplicates.len();
        }

        if let Some(unit) = session.end()? {
            report.types = unit.types;
            report.enums = unit.enums;
            report.written = vec![unit.source, unit.header];
        }

        match (&self.config.log_path, report.failed.is_empty()) {
            (Some(log), true) => {
                BuildCache::save(&candidates, log)?;
                report.cache_saved = true;
            }
            (Some(_), false) => tracing::warn!(
                failed = report.failed.len(),
                "not updating build cache; failed headers will be retried next run"
            ),
            (None, _) => {}
        }

        Ok(GenerationOutcome::Regenerated(report))
    }

    /// Parses every candidate, in parallel, returning results in candidate
    /// order so the merge stays deterministic.
    fn extract_all(
        &self,
        candidates: &[PathBuf],
    ) -> DriverResult<Vec<Result<FileEntities, ParseError>>> {
        let extractor = EntityExtractor::new(
            self.parser,
            self.config.parse_options(),
            &self.config.source_root,
        );
        let extract = || {
            candidates
                .par_iter()
                .map(|path| extractor.extract_file(path))
                .collect::<Vec<_>>()
        };

        match self.config.jobs {
            Some(jobs) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs)
                    .build()
                    .map_err(|e| DriverError::ThreadPool(e.to_string()))?;
                Ok(pool.install(extract))
            }
            None => Ok(extract()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::parser::{NodeKind, ParseOptions, SyntaxNode};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Yields one marked class named after the file stem, or fails for
    /// files whose stem starts with `bad`.
    struct StemParser;

    impl SourceParser for StemParser {
        fn parse(&self, path: &Path, _options: &ParseOptions) -> Result<SyntaxNode, ParseError> {
            let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
            if stem.starts_with("bad") {
                return Err(ParseError::NoTree { file: path.to_path_buf() });
            }
            Ok(SyntaxNode::new(NodeKind::TranslationUnit, "").with_children(vec![
                SyntaxNode::new(NodeKind::ClassDecl, stem)
                    .with_children(vec![SyntaxNode::annotation("reflect-class")]),
            ]))
        }
    }

    fn header(dir: &Path, name: &str) {
        fs::write(dir.join(name), "REFLECT_CLASS()\nclass X {};\n").unwrap();
    }

    #[test]
    fn missing_output_dir_fails_before_any_work() {
        let src = TempDir::new().unwrap();
        let config = GeneratorConfig::new(src.path(), src.path().join("out"));
        let err = Driver::new(config, &StemParser).err().unwrap();
        assert!(matches!(
            err,
            DriverError::Config(ConfigError::MissingDirectory { .. })
        ));
    }

    #[test]
    fn partial_failure_writes_output_but_keeps_cache_stale() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        header(src.path(), "Good.h");
        header(src.path(), "bad.h");
        let log = out.path().join("build.log");

        let config = GeneratorConfig::new(src.path(), out.path()).with_log_path(&log);
        let driver = Driver::new(config, &StemParser).unwrap();
        let GenerationOutcome::Regenerated(report) = driver.run().unwrap() else {
            panic!("expected regeneration");
        };

        assert_eq!(report.candidates, 2);
        assert_eq!(report.parsed, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.cache_saved);
        assert!(!log.exists());
        let source = fs::read_to_string(out.path().join("register_all.cpp")).unwrap();
        assert!(source.contains("Reflection::Register<Good>(\"Good\")"));
    }

    #[test]
    fn every_file_failing_fails_the_run_and_leaves_no_output() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        header(src.path(), "bad_one.h");
        header(src.path(), "bad_two.hpp");

        let config = GeneratorConfig::new(src.path(), out.path());
        let driver = Driver::new(config, &StemParser).unwrap();
        match driver.run() {
            Err(DriverError::AllFilesFailed(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!out.path().join("register_all.cpp").exists());
    }

    #[test]
    fn failed_run_leaves_previous_output_untouched() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        header(src.path(), "bad.h");
        let previous = out.path().join("register_all.cpp");
        fs::write(&previous, "// previous run\n").unwrap();

        let config = GeneratorConfig::new(src.path(), out.path());
        let driver = Driver::new(config, &StemParser).unwrap();
        assert!(driver.run().is_err());
        assert_eq!(fs::read_to_string(&previous).unwrap(), "// previous run\n");
    }

    #[test]
    fn bounded_pool_produces_the_same_order() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        for name in ["C.h", "A.h", "B.hpp"] {
            header(src.path(), name);
        }

        let config = GeneratorConfig::new(src.path(), out.path()).with_jobs(2);
        let driver = Driver::new(config, &StemParser).unwrap();
        driver.run().unwrap();

        let source = fs::read_to_string(out.path().join("register_all.cpp")).unwrap();
        let a = source.find("#include \"A.h\"").unwrap();
        let b = source.find("#include \"B.hpp\"").unwrap();
        let c = source.find("#include \"C.h\"").unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn empty_tree_still_produces_an_entry_point() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(src.path().join("plain.h"), "struct Plain {};\n").unwrap();

        let config = GeneratorConfig::new(src.path(), out.path());
        let driver = Driver::new(config, &StemParser).unwrap();
        let GenerationOutcome::Regenerated(report) = driver.run().unwrap() else {
            panic!("expected regeneration");
        };
        assert_eq!(report.candidates, 0);
        let source = fs::read_to_string(out.path().join("register_all.cpp")).unwrap();
        assert!(source.contains("void RegisterAll()\n{\n}\n"));
    }
}
