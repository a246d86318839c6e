//! End-to-end runs of the generator over scratch source trees, using the
//! real tree-sitter parser.

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use reflgen::scanner::{filter_candidates, find_all_header_files, scan_file, MarkerScan};
use reflgen::{Driver, GenerationOutcome, GeneratorConfig, TreeSitterParser};

const FOO_H: &str = "#pragma once\n\
class REFLECT_CLASS() Foo {\n\
public:\n\
    REFLECT_FIELD() int x;\n\
    REFLECT_METHOD() void Bar();\n\
};\n";

/// Create a temporary directory with the given files.
fn create_temp_project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
    }
    dir
}

fn set_mtime(path: &Path, secs: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

fn run(config: GeneratorConfig) -> GenerationOutcome {
    let parser = TreeSitterParser::new();
    Driver::new(config, &parser).unwrap().run().unwrap()
}

#[test]
fn test_end_to_end_registration_and_idempotence() {
    let src = create_temp_project(&[("core/Foo.h", FOO_H)]);
    let out = TempDir::new().unwrap();
    let log = out.path().join("build.log");
    let config = GeneratorConfig::new(src.path(), out.path()).with_log_path(&log);

    let GenerationOutcome::Regenerated(report) = run(config.clone()) else {
        panic!("first run must regenerate");
    };
    assert_eq!(report.types, 1);
    assert!(report.cache_saved);
    assert!(report.failed.is_empty());

    let unit = out.path().join("register_all.cpp");
    let source = fs::read_to_string(&unit).unwrap();
    assert!(source.contains("#include \"core/Foo.h\""));
    assert!(source.contains(
        "Reflection::Register<Foo>(\"Foo\")\n        \
         .AddField(\"x\",\"int\",&Foo::x)\n        \
         .AddMethod(\"Bar\",&Foo::Bar);"
    ));
    assert!(out.path().join("register_all.h").exists());

    let bytes = fs::read(&unit).unwrap();
    let modified = fs::metadata(&unit).unwrap().modified().unwrap();

    assert!(matches!(run(config), GenerationOutcome::Skipped));
    assert_eq!(fs::read(&unit).unwrap(), bytes);
    assert_eq!(fs::metadata(&unit).unwrap().modified().unwrap(), modified);
}

#[test]
fn test_touching_a_candidate_regenerates() {
    let src = create_temp_project(&[("Foo.h", FOO_H)]);
    let out = TempDir::new().unwrap();
    let log = out.path().join("build.log");
    let header = src.path().join("Foo.h");
    set_mtime(&header, 1_000);

    let config = GeneratorConfig::new(src.path(), out.path()).with_log_path(&log);
    assert!(matches!(run(config.clone()), GenerationOutcome::Regenerated(_)));
    assert!(matches!(run(config.clone()), GenerationOutcome::Skipped));

    set_mtime(&header, 2_000);
    assert!(matches!(run(config), GenerationOutcome::Regenerated(_)));
}

#[test]
fn test_removing_a_marker_regenerates() {
    let src = create_temp_project(&[
        ("Foo.h", FOO_H),
        ("Bar.h", "struct REFLECT_STRUCT() Bar { REFLECT_FIELD() float y; };\n"),
    ]);
    let out = TempDir::new().unwrap();
    let log = out.path().join("build.log");
    let config = GeneratorConfig::new(src.path(), out.path()).with_log_path(&log);
    run(config.clone());

    // Bar.h drops out of the candidate set; nothing else changed
    let bar = src.path().join("Bar.h");
    fs::write(&bar, "struct Bar { float y; };\n").unwrap();
    set_mtime(&bar, 1);

    let GenerationOutcome::Regenerated(report) = run(config) else {
        panic!("a removed candidate must force regeneration");
    };
    assert_eq!(report.candidates, 1);
    let source = fs::read_to_string(out.path().join("register_all.cpp")).unwrap();
    assert!(!source.contains("Register<Bar>"));
}

#[test]
fn test_duplicate_names_first_processed_file_wins() {
    let src = create_temp_project(&[
        ("a/Foo.h", "class REFLECT_CLASS() Foo {\n    REFLECT_FIELD() int x;\n};\n"),
        ("b/Foo.h", "class REFLECT_CLASS() Foo {\n    REFLECT_FIELD() int y;\n};\n"),
    ]);
    let out = TempDir::new().unwrap();

    let GenerationOutcome::Regenerated(report) = run(GeneratorConfig::new(src.path(), out.path()))
    else {
        panic!("expected regeneration");
    };
    assert_eq!(report.types, 1);
    assert_eq!(report.duplicates, 1);

    let source = fs::read_to_string(out.path().join("register_all.cpp")).unwrap();
    assert_eq!(source.matches("Reflection::Register<Foo>").count(), 1);
    assert!(source.contains("&Foo::x"));
    assert!(!source.contains("&Foo::y"));
    assert!(source.contains("#include \"a/Foo.h\""));
    assert!(!source.contains("#include \"b/Foo.h\""));
}

#[test]
fn test_unmarked_headers_never_reach_the_parser() {
    let src = create_temp_project(&[
        ("Foo.h", FOO_H),
        (
            "Raw.h",
            "class __attribute__((annotate(\"reflect-class\"))) Raw { int z; };\n",
        ),
        ("notes.txt", "REFLECT_CLASS() in a text file\n"),
    ]);

    let raw = src.path().join("Raw.h");
    assert_eq!(scan_file(&raw), MarkerScan::default());

    let candidates = filter_candidates(find_all_header_files(src.path()).unwrap());
    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].ends_with("Foo.h"));

    let out = TempDir::new().unwrap();
    run(GeneratorConfig::new(src.path(), out.path()));
    let source = fs::read_to_string(out.path().join("register_all.cpp")).unwrap();
    assert!(!source.contains("Raw"));
}

#[test]
fn test_enums_and_namespaces_use_qualified_expressions() {
    let src = create_temp_project(&[(
        "gfx/Color.h",
        "namespace gfx {\n\
         enum class REFLECT_ENUM() Color { Red, Green };\n\
         }\n",
    )]);
    let out = TempDir::new().unwrap();
    let config = GeneratorConfig::new(src.path(), out.path())
        .with_registry_header("reflection/Registry.h");

    let GenerationOutcome::Regenerated(report) = run(config) else {
        panic!("expected regeneration");
    };
    assert_eq!(report.enums, 1);

    let source = fs::read_to_string(out.path().join("register_all.cpp")).unwrap();
    assert!(source.contains("#include \"reflection/Registry.h\""));
    assert!(source.contains("Reflection::RegisterEnum<gfx::Color>(\"Color\")"));
    assert!(source.contains(".AddValue(\"Red\",gfx::Color::Red)"));
}
