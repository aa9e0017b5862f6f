//! dpp CLI
//!
//! Command-line interface for the directive preprocessor.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dpp_core::{ConditionalMode, Config};
use dpp_engine::loader::CacheStats;
use dpp_engine::parallel::ProgressPhase;
use dpp_engine::{BatchProcessor, CachedLoader, ConstantTable, Engine, LoadOptions, PreprocessCache};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dpp")]
#[command(author, version, about = "Comment-directive preprocessor", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that builds output
#[derive(Args, Debug, Default)]
struct BuildArgs {
    /// Configuration file (yaml or json)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Define an ambient constant
    #[arg(short = 'D', long = "define", value_name = "NAME[=VALUE]")]
    defines: Vec<String>,

    /// Add an include directory
    #[arg(short = 'I', long = "include-dir", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Track nested conditional blocks
    #[arg(long)]
    nested: bool,

    /// Process included files instead of inlining them verbatim
    #[arg(long)]
    recursive_includes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Preprocess a single file
    Process {
        /// Source file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        build: BuildArgs,
    },

    /// Load a file through the output cache
    Load {
        /// Source file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Cache directory (default: from config)
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,

        #[command(flatten)]
        build: BuildArgs,
    },

    /// Preprocess every matching file under a directory
    Batch {
        /// Source directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Output directory
        #[arg(long, value_name = "DIR")]
        out: PathBuf,

        /// File extensions to process (default: from config)
        #[arg(long = "ext", value_name = "EXT")]
        extensions: Vec<String>,

        #[command(flatten)]
        build: BuildArgs,
    },

    /// Manage the output cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache statistics
    Stats {
        #[arg(long, value_name = "DIR")]
        cache_dir: PathBuf,
    },

    /// Remove all cached output
    Clear {
        #[arg(long, value_name = "DIR")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Process {
            file,
            output,
            build,
        } => cmd_process(&file, output.as_deref(), &build),
        Commands::Load {
            file,
            cache_dir,
            build,
        } => cmd_load(&file, cache_dir, &build),
        Commands::Batch {
            dir,
            out,
            extensions,
            build,
        } => cmd_batch(&dir, &out, extensions, &build),
        Commands::Cache { action } => match action {
            CacheAction::Stats { cache_dir } => cmd_cache_stats(cache_dir),
            CacheAction::Clear { cache_dir } => cmd_cache_clear(cache_dir),
        },
    }
}

/// Configuration file merged with command-line overrides
fn resolve_config(build: &BuildArgs) -> Result<(Config, LoadOptions)> {
    let mut config = match &build.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    if build.nested {
        config.engine.conditional_mode = ConditionalMode::Nested;
    }
    if build.recursive_includes {
        config.engine.recursive_includes = true;
    }
    config.engine.include_dirs.extend(build.include_dirs.iter().cloned());

    let mut constants = ConstantTable::from(config.constants.clone());
    constants.extend(ConstantTable::from_definitions(
        build.defines.iter().map(String::as_str),
    )?);

    let options = LoadOptions {
        engine: config.engine.clone(),
        constants,
    };
    Ok((config, options))
}

fn cmd_process(file: &Path, output: Option<&Path>, build: &BuildArgs) -> Result<()> {
    let (_, options) = resolve_config(build)?;
    let mut engine = Engine::with_config(&options.engine).with_constants(options.constants);
    let processed = engine
        .process_file_bytes(file)
        .with_context(|| format!("failed to process {}", file.display()))?;

    write_output(output, &processed)
}

fn cmd_load(file: &Path, cache_dir: Option<PathBuf>, build: &BuildArgs) -> Result<()> {
    let (config, options) = resolve_config(build)?;

    let loader = match cache_dir.or(config.cache.directory) {
        Some(dir) if config.cache.enabled => CachedLoader::new(options, PreprocessCache::new(dir)?),
        Some(_) => CachedLoader::uncached(options),
        None => {
            warn!("No cache directory configured; loading without cache");
            CachedLoader::uncached(options)
        }
    };
    let processed = loader
        .load_bytes(file)
        .with_context(|| format!("failed to load {}", file.display()))?;

    write_output(None, &processed)
}

fn cmd_batch(dir: &Path, out: &Path, extensions: Vec<String>, build: &BuildArgs) -> Result<()> {
    let (mut config, options) = resolve_config(build)?;
    if !extensions.is_empty() {
        config.batch.extensions = extensions;
    }

    println!("📂 Processing: {}", dir.display());
    let processor = BatchProcessor::new(options.engine, config.batch)
        .with_constants(options.constants)
        .with_progress(|event| {
            if event.phase == ProgressPhase::Processing {
                info!("{}", event.message);
            }
        });
    let results = processor.process_directory(dir, out)?;

    let mut failed = 0;
    for (path, result) in &results {
        if let Err(e) = result {
            failed += 1;
            eprintln!("   ❌ {}: {}", path.display(), e);
        }
    }

    println!(
        "   Wrote {} files to {}",
        results.len() - failed,
        out.display()
    );
    if failed > 0 {
        anyhow::bail!("{} of {} files failed", failed, results.len());
    }
    Ok(())
}

fn cmd_cache_stats(cache_dir: PathBuf) -> Result<()> {
    let cache = PreprocessCache::new(cache_dir)?;
    print_stats(&cache.stats());
    Ok(())
}

fn cmd_cache_clear(cache_dir: PathBuf) -> Result<()> {
    let mut cache = PreprocessCache::new(cache_dir)?;
    let before = cache.stats();
    cache.clear()?;
    println!("🧹 Removed {} entries ({})", before.total_entries, before.size_human());
    Ok(())
}

fn print_stats(stats: &CacheStats) {
    println!("\n📊 Cache:");
    println!("   Entries: {}", stats.total_entries);
    println!("   Size: {}", stats.size_human());
}

fn write_output(output: Option<&Path>, processed: &[u8]) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, processed)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Output written to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(processed)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_process_command() {
        let cli = Cli::try_parse_from([
            "dpp", "-v", "process", "page.php", "-o", "out.php", "-D", "DEBUG", "-D", "LEVEL=2",
            "-I", "lib", "--nested",
        ])
        .unwrap();
        assert!(cli.verbose);

        let Commands::Process { file, output, build } = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(file, PathBuf::from("page.php"));
        assert_eq!(output, Some(PathBuf::from("out.php")));
        assert_eq!(build.defines, vec!["DEBUG", "LEVEL=2"]);
        assert_eq!(build.include_dirs, vec![PathBuf::from("lib")]);
        assert!(build.nested);
        assert!(!build.recursive_includes);
    }

    #[test]
    fn test_parse_cache_commands() {
        let cli = Cli::try_parse_from(["dpp", "cache", "stats", "--cache-dir", "/tmp/c"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Stats { .. }
            }
        ));
        assert!(Cli::try_parse_from(["dpp", "cache", "clear"]).is_err());
    }

    #[test]
    fn test_resolve_config_overrides() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("dpp.yaml");
        fs::write(
            &config_path,
            "engine:\n  include_dirs: [shared]\nconstants:\n  DEBUG: \"0\"\n  PHP_MAJOR: \"8\"\n",
        )
        .unwrap();

        let build = BuildArgs {
            config: Some(config_path),
            defines: vec!["DEBUG=1".to_string()],
            include_dirs: vec![PathBuf::from("lib")],
            nested: true,
            recursive_includes: false,
        };
        let (_, options) = resolve_config(&build).unwrap();

        assert_eq!(options.engine.conditional_mode, ConditionalMode::Nested);
        assert_eq!(
            options.engine.include_dirs,
            vec![PathBuf::from("shared"), PathBuf::from("lib")]
        );
        let constants: Vec<_> = options.constants.iter().collect();
        assert_eq!(constants, vec![("DEBUG", "1"), ("PHP_MAJOR", "8")]);
    }

    #[test]
    fn test_resolve_config_bad_define() {
        let build = BuildArgs {
            defines: vec!["1BAD".to_string()],
            ..BuildArgs::default()
        };
        assert!(resolve_config(&build).is_err());
    }

    #[test]
    fn test_process_writes_bytes_unchanged() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("latin1.php");
        let output = dir.path().join("out.php");
        fs::write(&input, b"#ifdef DEBUG\ncaf\xe9\n#endif").unwrap();

        let build = BuildArgs {
            defines: vec!["DEBUG".to_string()],
            ..BuildArgs::default()
        };
        cmd_process(&input, Some(&output), &build).unwrap();
        assert_eq!(fs::read(&output).unwrap(), b"\ncaf\xe9\n".to_vec());
    }
}
