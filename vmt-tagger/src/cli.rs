//! Command-line interface
//!
//! `run` tags (or restores) the selected files; `inspect` reports which
//! required tags are missing. Both resolve configuration the same way:
//! defaults, then TOML files, then the flags given here.

use crate::artifacts::run_dir_name;
use crate::catalog::{CatalogApi, TmdbClient};
use crate::error::{Result, TaggerError};
use crate::inspect::{resolve_ffprobe_path, run_inspection, FfprobeInspector};
use crate::mapping::TransformRegistry;
use crate::orchestrator::{Collaborators, ConsoleProgress, Plans, RunArtifacts, RunOrchestrator, RunSettings};
use crate::provider::{CatalogProvider, NoopProvider, TmdbProvider};
use crate::resolver::ResolverThresholds;
use crate::scanner::{FileScanner, FileSource};
use crate::writers::{AtomicParsleyWriter, FfmpegWriter, TagWriter, WriterSettings};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vmt_common::config::{
    load_config, merge_layer, normalize_extensions, ConfigLayer, MetadataTool, TaggerConfig, TestMode,
};
use vmt_common::logging::init_tracing;

/// Command-line arguments for vmt-tagger
#[derive(Parser, Debug)]
#[command(name = "vmt-tagger")]
#[command(about = "Tag video files with movie and TV catalog metadata")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Match files against the catalog and write their tags
    Run(RunArgs),
    /// Report missing tags and artwork without changing anything
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Directory scanned recursively for media files
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Single media file
    #[arg(long, value_name = "FILE", conflicts_with = "root")]
    pub file: Option<PathBuf>,

    /// Reprocess the failed records of a manifest (or of a run directory)
    #[arg(long, value_name = "PATH")]
    pub rerun_failed: Option<PathBuf>,

    /// Restore metadata from a run directory's snapshots instead of tagging
    #[arg(long, value_name = "DIR")]
    pub restore_backup: Option<PathBuf>,

    /// Only process these extensions (comma separated or repeated)
    #[arg(long, value_delimiter = ',', value_name = "EXT")]
    pub only_ext: Vec<String>,

    /// basic or verbose; no file is modified
    #[arg(long, value_name = "MODE")]
    pub test_mode: Option<TestMode>,

    /// Log writer commands instead of running them
    #[arg(long)]
    pub dry_run: bool,

    /// Overwrite tags the files already carry
    #[arg(long)]
    pub override_existing: bool,

    /// Fetch and print metadata only
    #[arg(long)]
    pub no_write: bool,

    /// Configuration file (replaces the default locations)
    #[arg(long, value_name = "FILE", env = "VMT_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct InspectArgs {
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[arg(long, value_name = "FILE", conflicts_with = "root")]
    pub file: Option<PathBuf>,

    #[arg(long, value_delimiter = ',', value_name = "EXT")]
    pub only_ext: Vec<String>,

    /// Report file (default: `<backup_dir>/<timestamp>/inspect.log`)
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    #[arg(long, value_name = "FILE", env = "VMT_CONFIG")]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    /// Configuration layer holding the flags that override config files
    pub fn overrides(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();
        layer.write.test_mode = self.test_mode;
        if self.dry_run {
            layer.write.dry_run = Some(true);
        }
        if self.override_existing {
            layer.write.override_existing = Some(true);
        }
        if self.no_write {
            layer.write.enabled = Some(false);
        }
        layer.logging.level = self.log_level.clone();
        layer
    }

    /// Rerun manifest first, then a single file, then a root scan
    pub fn source(&self) -> Result<FileSource> {
        file_source(self.rerun_failed.as_ref(), self.file.as_ref(), self.root.as_ref())
    }
}

impl InspectArgs {
    pub fn source(&self) -> Result<FileSource> {
        file_source(None, self.file.as_ref(), self.root.as_ref())
    }
}

fn file_source(rerun: Option<&PathBuf>, file: Option<&PathBuf>, root: Option<&PathBuf>) -> Result<FileSource> {
    if let Some(target) = rerun {
        return Ok(FileSource::RerunFailed(target.clone()));
    }
    if let Some(file) = file {
        return Ok(FileSource::SingleFile(file.clone()));
    }
    root.map(|root| FileSource::Root(root.clone())).ok_or_else(|| {
        TaggerError::Config(vmt_common::Error::InvalidInput(
            "one of --root, --file or --rerun-failed is required".to_string(),
        ))
    })
}

/// Defaults, config files, then command-line overrides; validated
pub fn resolve_config(explicit: Option<&Path>, overrides: ConfigLayer) -> Result<TaggerConfig> {
    let config = merge_layer(load_config(explicit)?, overrides);
    config.validate()?;
    Ok(config)
}

/// Execute a parsed command line, returning the process exit code
pub async fn execute(cli: Cli) -> Result<u8> {
    match cli.command {
        Command::Run(args) => execute_run(args).await,
        Command::Inspect(args) => tokio::task::spawn_blocking(move || execute_inspect(args))
            .await
            .map_err(|e| TaggerError::Io(std::io::Error::other(e)))?,
    }
}

fn run_footer(config: &TaggerConfig) -> Option<String> {
    if let Some(mode) = config.write.test_mode {
        let label = if mode == TestMode::Verbose { "verbose" } else { "basic" };
        return Some(format!("(test_mode={} - no files were modified)", label));
    }
    config
        .write
        .dry_run
        .then(|| "(dry_run=true - no files were modified)".to_string())
}

async fn execute_run(args: RunArgs) -> Result<u8> {
    let config = resolve_config(args.config.as_deref(), args.overrides())?;
    init_tracing(&config.logging)?;

    let source = args.source()?;
    let scanner = FileScanner::new(config.normalized_extensions(), &config.scan);
    let files = scanner.select(&source, &normalize_extensions(&args.only_ext))?;

    let mut settings = RunSettings::from_config(&config);
    if let FileSource::Root(root) = &source {
        settings.root = Some(root.clone());
    }
    if let Some(dir) = &args.restore_backup {
        if !dir.is_dir() {
            return Err(TaggerError::RestoreSourceMissing(dir.display().to_string()));
        }
        settings.restore_from = Some(dir.clone());
    }

    if files.is_empty() {
        println!("No files to process.");
        return Ok(0);
    }

    let (catalog, provider): (Option<Arc<dyn CatalogApi>>, Arc<dyn CatalogProvider>) =
        if settings.restore_from.is_some() {
            (None, Arc::new(NoopProvider))
        } else {
            let client = TmdbClient::new(&config.tmdb)?;
            let http = client.http_client().clone();
            let catalog: Arc<dyn CatalogApi> = Arc::new(client);
            let provider: Arc<dyn CatalogProvider> = Arc::new(TmdbProvider::new(catalog.clone(), http));
            (Some(catalog), provider)
        };

    let registry = Arc::new(TransformRegistry::builtin());
    let plans = Plans::load(&config, &registry)?;

    let artifacts = RunArtifacts::prepare(&settings, &config.write.backup_dir, Local::now())?;
    if let Some(run_dir) = &artifacts.dirs.run_dir {
        println!("Run directory: {}", run_dir.display());
    }

    let write = &config.write;
    let writer_settings = WriterSettings::from_config(write, artifacts.run_log.clone());
    let ffmpeg = Arc::new(FfmpegWriter::new(write.ffmpeg_path.clone(), writer_settings.clone()));
    let atom_writer: Option<Arc<dyn TagWriter>> = match write.metadata_tool {
        MetadataTool::Atomicparsley => Some(Arc::new(AtomicParsleyWriter::new(
            write.atomicparsley_path.clone(),
            write.rdns_namespace.clone(),
            writer_settings,
        ))),
        MetadataTool::Ffmpeg => None,
    };

    let collaborators = Collaborators {
        catalog,
        provider,
        inspector: Arc::new(FfprobeInspector::new(resolve_ffprobe_path(&write.ffmpeg_path))),
        container_writer: ffmpeg.clone(),
        atom_writer,
        snapshotter: ffmpeg,
        progress: Arc::new(ConsoleProgress::new(run_footer(&config))),
    };

    let mut orchestrator = RunOrchestrator::new(
        settings,
        ResolverThresholds::from(&config.tmdb),
        plans,
        registry,
        collaborators,
        artifacts,
    );
    let summary = orchestrator.run(&files).await;

    if let Some(manifest) = orchestrator.artifacts().manifest.path() {
        println!("Manifest: {}", manifest.display());
    }
    Ok(summary.exit_code())
}

fn execute_inspect(args: InspectArgs) -> Result<u8> {
    let config = resolve_config(args.config.as_deref(), ConfigLayer::default())?;
    init_tracing(&config.logging)?;

    let source = args.source()?;
    let scanner = FileScanner::new(config.normalized_extensions(), &config.scan);
    let files = scanner.select(&source, &normalize_extensions(&args.only_ext))?;

    let log_path = args.log.clone().unwrap_or_else(|| {
        config
            .write
            .backup_dir
            .join(run_dir_name(Local::now()))
            .join("inspect.log")
    });
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let inspector = FfprobeInspector::new(resolve_ffprobe_path(&config.write.ffmpeg_path));
    let mut out = BufWriter::new(std::fs::File::create(&log_path)?);
    let report = run_inspection(
        &files,
        &inspector,
        &config.inspect.required_tags,
        config.inspect.check_artwork,
        &mut out,
    )?;
    out.flush()?;

    println!("Inspected {} file(s)", report.total_files);
    println!("  Files missing tags: {}", report.files_with_missing);
    println!("  Missing fields:     {}", report.total_missing_fields);
    println!("  Errors:             {}", report.errors);
    println!("Report: {}", log_path.display());
    Ok(0)
}
