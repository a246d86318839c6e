use crate::analyzer::metadata::{FileEntities, Registration};
use crate::codegen::{CodeEmitter, EmitOptions, HEADER_FILE_NAME, SOURCE_FILE_NAME};
use crate::error::SessionError;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::mem;
use std::path::{Path, PathBuf};

enum SessionState {
    Idle,
    Begun { destination: File },
}

/// What one file added to the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileContribution {
    pub registered: usize,
    /// Names already registered by an earlier file (or earlier in this one).
    pub duplicates: Vec<String>,
}

/// Paths and totals of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenUnit {
    pub source: PathBuf,
    pub header: PathBuf,
    pub types: usize,
    pub enums: usize,
    pub includes: usize,
}

/// One generation pass: owns the destination handle, the set of names
/// registered so far and the emitter.
///
/// `begin` while begun and `end` while idle are logged no-ops.
pub struct GenerationSession {
    output_dir: PathBuf,
    state: SessionState,
    registered: HashSet<String>,
    emitter: CodeEmitter,
}

impl GenerationSession {
    pub fn new(output_dir: impl Into<PathBuf>, options: EmitOptions) -> Self {
        Self {
            output_dir: output_dir.into(),
            state: SessionState::Idle,
            registered: HashSet::new(),
            emitter: CodeEmitter::new(options),
        }
    }

    pub fn is_begun(&self) -> bool {
        matches!(self.state, SessionState::Begun { .. })
    }

    pub fn source_path(&self) -> PathBuf {
        self.output_dir.join(SOURCE_FILE_NAME)
    }

    pub fn header_path(&self) -> PathBuf {
        self.output_dir.join(HEADER_FILE_NAME)
    }

    /// Opens (truncating) the destination and forgets everything recorded
    /// by a previous session.
    pub fn begin(&mut self) -> Result<(), SessionError> {
        if self.is_begun() {
            tracing::warn!("generation session already begun, ignoring");
            return Ok(());
        }
        let path = self.source_path();
        let destination = File::create(&path)
            .map_err(|source| SessionError::OpenDestination { path: path.clone(), source })?;
        self.registered.clear();
        self.emitter.clear();
        self.state = SessionState::Begun { destination };
        tracing::debug!(destination = %path.display(), "generation session begun");
        Ok(())
    }

    /// Feeds one file's registrations through the session dedup set. The
    /// first registration of a name wins; later ones are dropped with a
    /// warning.
    pub fn record(&mut self, entities: FileEntities) -> FileContribution {
        if !self.is_begun() {
            tracing::warn!(
                file = %entities.path.display(),
                "no generation session begun, dropping file"
            );
            return FileContribution::default();
        }

        let mut contribution = FileContribution::default();
        let mut kept: Vec<Registration> = Vec::with_capacity(entities.registrations.len());
        for registration in entities.registrations {
            if self.registered.insert(registration.name().to_string()) {
                kept.push(registration);
            } else {
                tracing::warn!(
                    name = registration.name(),
                    qualified = registration.qualified_name(),
                    file = %entities.path.display(),
                    "already registered, skipping duplicate"
                );
                contribution.duplicates.push(registration.name().to_string());
            }
        }
        contribution.registered = kept.len();
        self.emitter.add_file(entities.include_path, kept);
        contribution
    }

    /// Writes the unit and its header, closes the destination and returns
    /// to idle. A write failure removes the partial destination.
    pub fn end(&mut self) -> Result<Option<WrittenUnit>, SessionError> {
        let destination = match mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Begun { destination } => destination,
            SessionState::Idle => {
                tracing::warn!("no generation session begun, nothing to end");
                return Ok(None);
            }
        };

        let source = self.source_path();
        if let Err(err) = write_and_close(destination, &self.emitter.render_source(), &source) {
            remove_partial(&source);
            return Err(err);
        }

        let header = self.header_path();
        write_if_changed(&header, &self.emitter.render_header())?;

        let (types, enums) = self
            .emitter
            .registrations()
            .iter()
            .fold((0, 0), |(t, e), r| match r {
                Registration::Type(_) => (t + 1, e),
                Registration::Enum(_) => (t, e + 1),
            });
        let unit = WrittenUnit {
            source,
            header,
            types,
            enums,
            includes: self.emitter.includes().len(),
        };
        tracing::info!(
            destination = %unit.source.display(),
            types,
            enums,
            includes = unit.includes,
            "generated unit written"
        );
        Ok(Some(unit))
    }

    /// Drops the destination without writing it and deletes whatever was
    /// created by `begin`.
    pub fn abort(&mut self) {
        let state = mem::replace(&mut self.state, SessionState::Idle);
        if let SessionState::Begun { destination } = state {
            drop(destination);
            remove_partial(&self.source_path());
            tracing::debug!("generation session aborted");
        }
    }
}

impl Drop for GenerationSession {
    fn drop(&mut self) {
        if self.is_begun() {
            tracing::warn!("generation session dropped before end, removing partial output");
            self.abort();
        }
    }
}

fn write_and_close(
    mut destination: File,
    content: &str,
    path: &Path,
) -> Result<(), SessionError> {
    destination
        .write_all(content.as_bytes())
        .and_then(|_| destination.flush())
        .map_err(|source| SessionError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// The header never varies between runs; leaving an identical one alone
/// keeps dependents from rebuilding.
fn write_if_changed(path: &Path, content: &str) -> Result<(), SessionError> {
    if fs::read_to_string(path).is_ok_and(|existing| existing == content) {
        return Ok(());
    }
    fs::write(path, content).map_err(|source| SessionError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        tracing::warn!(
            destination = %path.display(),
            error = %err,
            "failed to remove partial output"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::metadata::{EnumDescription, TypeDescription, TypeKind};
    use tempfile::TempDir;

    fn ty(name: &str) -> Registration {
        Registration::Type(TypeDescription {
            kind: TypeKind::Class,
            name: name.into(),
            qualified_name: name.into(),
            fields: vec![],
            methods: vec![],
            file: PathBuf::from(format!("{name}.h")),
            line: 1,
        })
    }

    fn file(include: &str, registrations: Vec<Registration>) -> FileEntities {
        FileEntities {
            path: PathBuf::from(include),
            include_path: include.into(),
            registrations,
        }
    }

    #[test]
    fn end_without_begin_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let mut session = GenerationSession::new(dir.path(), EmitOptions::default());
        assert_eq!(session.end().unwrap(), None);
        assert!(!session.source_path().exists());
    }

    #[test]
    fn begin_twice_keeps_recorded_state() {
        let dir = TempDir::new().unwrap();
        let mut session = GenerationSession::new(dir.path(), EmitOptions::default());
        session.begin().unwrap();
        session.record(file("a.h", vec![ty("A")]));
        session.begin().unwrap();

        let unit = session.end().unwrap().unwrap();
        assert_eq!(unit.types, 1);
        assert!(!session.is_begun());
    }

    #[test]
    fn first_registration_of_a_name_wins() {
        let dir = TempDir::new().unwrap();
        let mut session = GenerationSession::new(dir.path(), EmitOptions::default());
        session.begin().unwrap();

        let first = session.record(file("a/Foo.h", vec![ty("Foo")]));
        let second = session.record(file("b/Foo.h", vec![ty("Foo"), ty("Bar")]));
        assert_eq!(first.registered, 1);
        assert_eq!(second.registered, 1);
        assert_eq!(second.duplicates, vec!["Foo"]);

        let unit = session.end().unwrap().unwrap();
        let source = fs::read_to_string(&unit.source).unwrap();
        assert_eq!(source.matches("Reflection::Register<Foo>").count(), 1);
        assert!(source.contains("#include \"a/Foo.h\""));
        assert!(source.contains("#include \"b/Foo.h\""));
    }

    #[test]
    fn file_with_only_duplicates_is_not_included() {
        let dir = TempDir::new().unwrap();
        let mut session = GenerationSession::new(dir.path(), EmitOptions::default());
        session.begin().unwrap();
        session.record(file("a.h", vec![ty("Foo")]));
        session.record(file("b.h", vec![ty("Foo")]));

        let unit = session.end().unwrap().unwrap();
        let source = fs::read_to_string(&unit.source).unwrap();
        assert!(!source.contains("#include \"b.h\""));
        assert_eq!(unit.includes, 1);
    }

    #[test]
    fn enums_and_types_are_counted_separately() {
        let dir = TempDir::new().unwrap();
        let mut session = GenerationSession::new(dir.path(), EmitOptions::default());
        session.begin().unwrap();
        session.record(file(
            "c.h",
            vec![
                ty("Foo"),
                Registration::Enum(EnumDescription {
                    name: "Color".into(),
                    qualified_name: "Color".into(),
                    values: vec!["Red".into()],
                    file: PathBuf::from("c.h"),
                    line: 4,
                }),
            ],
        ));
        let unit = session.end().unwrap().unwrap();
        assert_eq!((unit.types, unit.enums), (1, 1));
        assert!(unit.header.exists());
    }

    #[test]
    fn new_session_resets_the_dedup_set() {
        let dir = TempDir::new().unwrap();
        let mut session = GenerationSession::new(dir.path(), EmitOptions::default());
        session.begin().unwrap();
        session.record(file("a.h", vec![ty("Foo")]));
        session.end().unwrap();

        session.begin().unwrap();
        let again = session.record(file("a.h", vec![ty("Foo")]));
        assert_eq!(again.registered, 1);
        assert!(again.duplicates.is_empty());
    }

    #[test]
    fn abort_leaves_no_destination() {
        let dir = TempDir::new().unwrap();
        let mut session = GenerationSession::new(dir.path(), EmitOptions::default());
        session.begin().unwrap();
        assert!(session.source_path().exists());

        session.abort();
        assert!(!session.source_path().exists());
        assert!(!session.is_begun());
    }

    #[test]
    fn dropping_a_begun_session_removes_the_destination() {
        let dir = TempDir::new().unwrap();
        let destination = {
            let mut session = GenerationSession::new(dir.path(), EmitOptions::default());
            session.begin().unwrap();
            session.record(file("a.h", vec![ty("A")]));
            session.source_path()
        };
        assert!(!destination.exists());
    }

    #[test]
    fn dropping_an_ended_session_keeps_the_output() {
        let dir = TempDir::new().unwrap();
        let destination = {
            let mut session = GenerationSession::new(dir.path(), EmitOptions::default());
            session.begin().unwrap();
            session.end().unwrap();
            session.source_path()
        };
        assert!(destination.exists());
    }

    #[test]
    fn unopenable_destination_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut session =
            GenerationSession::new(dir.path().join("missing"), EmitOptions::default());
        let err = session.begin().unwrap_err();
        assert!(matches!(err, SessionError::OpenDestination { .. }));
        assert!(!session.is_begun());
    }
}
