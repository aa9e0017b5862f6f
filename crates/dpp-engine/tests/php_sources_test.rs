//! Integration tests with PHP sources on disk
//!
//! Exercises file processing, include lookup, the cached loader and batch
//! processing against a real temporary directory tree.

use std::fs;
use std::path::Path;

use dpp_core::{BatchConfig, ConditionalMode, EngineConfig, Error};
use dpp_engine::{BatchProcessor, CachedLoader, ConstantTable, Engine, LoadOptions, PreprocessCache};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// A page with a debug toggle and a shared header
const PAGE: &str = r##"<?php
#include "header.inc"
#ifdef DEBUG
ini_set('display_errors', '1');
#else
ini_set('display_errors', '0');
#endif
#if (PHP_MAJOR >= 8)
$value = $input?->value;
#else
$value = $input === null ? null : $input->value;
#endif
echo "# done";
"##;

const HEADER: &str = "// shared header\nnamespace App;\n";

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn constants(definitions: &[&str]) -> ConstantTable {
    ConstantTable::from_definitions(definitions.iter().copied()).unwrap()
}

#[test]
fn test_process_page_release() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.php", PAGE);
    write(dir.path(), "header.inc", HEADER);

    let mut engine = Engine::new().with_constants(constants(&["PHP_MAJOR=8"]));
    let out = engine.process_file(dir.path().join("page.php")).unwrap();

    assert_eq!(
        out,
        "<?php\n// shared header\nnamespace App;\n\n\nini_set('display_errors', '0');\n\n\n$value = $input?->value;\n\necho \"# done\";\n"
    );
}

#[test]
fn test_process_page_debug_legacy() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.php", PAGE);
    write(dir.path(), "header.inc", HEADER);

    let mut engine = Engine::new().with_constants(constants(&["DEBUG", "PHP_MAJOR=7"]));
    let out = engine.process_file(dir.path().join("page.php")).unwrap();

    assert!(out.contains("ini_set('display_errors', '1');"));
    assert!(!out.contains("ini_set('display_errors', '0');"));
    assert!(out.contains("$input === null"));
    assert!(!out.contains("?->"));
}

#[test]
fn test_include_dirs() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/page.php", "#include \"header.inc\"\nbody");
    write(dir.path(), "shared/header.inc", "header");

    let config = EngineConfig {
        include_dirs: vec![dir.path().join("shared")],
        ..EngineConfig::default()
    };
    let mut engine = Engine::with_config(&config);
    let out = engine.process_file(dir.path().join("src/page.php")).unwrap();
    assert_eq!(out, "header\nbody");
}

#[test]
fn test_recursive_includes_on_disk() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.php", "#include \"lib/config.inc\"\n#ifdef FEATURE\nfeature\n#endif");
    write(dir.path(), "lib/config.inc", "#define FEATURE \"on\"\n#include \"flags.inc\"");
    write(dir.path(), "lib/flags.inc", "flags");

    let config = EngineConfig {
        recursive_includes: true,
        ..EngineConfig::default()
    };
    let mut engine = Engine::with_config(&config);
    let out = engine.process_file(dir.path().join("main.php")).unwrap();
    assert_eq!(out, "\nflags\n\nfeature\n");
    assert_eq!(engine.macros().get("FEATURE"), Some("on"));
}

#[test]
fn test_recursive_include_cycle_on_disk() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.php", "#include \"./b.php\"");
    write(dir.path(), "b.php", "#include \"a.php\"");

    let config = EngineConfig {
        recursive_includes: true,
        ..EngineConfig::default()
    };
    let result = Engine::with_config(&config).process_file(dir.path().join("a.php"));
    assert!(matches!(result, Err(Error::IncludeCycle(_))));
}

#[test]
fn test_nested_mode_unterminated_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "open.php", "#ifdef A\nnever closed");

    let config = EngineConfig {
        conditional_mode: ConditionalMode::Nested,
        ..EngineConfig::default()
    };
    let result = Engine::with_config(&config).process_file(dir.path().join("open.php"));
    assert!(matches!(result, Err(Error::Unterminated { depth: 1 })));
}

#[test]
fn test_loader_serves_fresh_output() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.php", "#ifdef DEBUG\ndebug\n#endif\nv1");

    let options = LoadOptions {
        constants: constants(&["DEBUG"]),
        ..LoadOptions::default()
    };
    let cache = PreprocessCache::new(dir.path().join(".cache")).unwrap();
    let loader = CachedLoader::new(options, cache);
    let page = dir.path().join("page.php");

    assert_eq!(loader.load(&page).unwrap(), "\ndebug\n\nv1");

    // A changed source is never served stale
    write(dir.path(), "page.php", "#ifdef DEBUG\ndebug\n#endif\nv2");
    assert_eq!(loader.load(&page).unwrap(), "\ndebug\n\nv2");
}

#[test]
fn test_batch_mirrors_tree() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write(src.path(), "index.php", "#ifndef DEBUG\nprod\n#endif");
    write(src.path(), "admin/users.php", "#ifdef DEBUG\ndebug\n#endif\nusers");
    write(src.path(), "templates/page.tpl", "#ifdef DEBUG\ntpl\n#endif");
    write(src.path(), "vendor/lib.php", "#ifdef DEBUG");

    let batch = BatchConfig {
        extensions: vec!["php".to_string(), "tpl".to_string()],
        ..BatchConfig::default()
    };
    let processor = BatchProcessor::new(EngineConfig::default(), batch).with_constants(constants(&["DEBUG"]));
    let results = processor.process_directory(src.path(), out.path()).unwrap();

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|(_, result)| result.is_ok()));
    assert_eq!(fs::read_to_string(out.path().join("index.php")).unwrap(), "");
    assert_eq!(
        fs::read_to_string(out.path().join("admin/users.php")).unwrap(),
        "\ndebug\n\nusers"
    );
    assert_eq!(
        fs::read_to_string(out.path().join("templates/page.tpl")).unwrap(),
        "\ntpl\n"
    );
    assert!(!out.path().join("vendor/lib.php").exists());
}

#[test]
fn test_legacy_encoded_sources_keep_their_bytes() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("page.php"),
        b"#include \"strings.inc\"\n#ifdef DEBUG\n$greeting = 'Gr\xfc\xdf Gott';\n#endif\n",
    )
    .unwrap();
    fs::write(dir.path().join("strings.inc"), b"$euro = '\x80';\n").unwrap();
    let page = dir.path().join("page.php");

    let mut engine = Engine::new().with_constants(constants(&["DEBUG"]));
    let out = engine.process_file_bytes(&page).unwrap();
    assert_eq!(
        out,
        b"$euro = '\x80';\n\n\n$greeting = 'Gr\xfc\xdf Gott';\n\n".to_vec()
    );
    assert!(matches!(
        engine.process_file(&page),
        Err(Error::InvalidUtf8(_))
    ));

    let loader = CachedLoader::new(
        LoadOptions {
            constants: constants(&["DEBUG"]),
            ..LoadOptions::default()
        },
        PreprocessCache::new(dir.path().join(".cache")).unwrap(),
    );
    assert_eq!(loader.load_bytes(&page).unwrap(), out);
    assert_eq!(loader.load_bytes(&page).unwrap(), out);
}
