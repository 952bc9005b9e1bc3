//! Tag writers
//!
//! External tools that put tags into media files. Every writer stages its
//! output in a temporary file next to the target and replaces the target only
//! after the tool succeeded, so the original is never edited in place.
//!
//! A write reports a tagged [`WriteOutcome`]: `Busy` is reserved for a final
//! replacement that kept failing because another process holds the file, which
//! the orchestrator defers instead of failing.

pub mod atomicparsley;
pub mod ffmpeg;
pub mod staging;

use crate::artifacts::RunLog;
use crate::mapping::TagSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;
use thiserror::Error;
use vmt_common::config::{TestMode, WriteConfig};

pub use atomicparsley::AtomicParsleyWriter;
pub use ffmpeg::{container_key, FfmpegWriter};
pub use staging::{simulated_staging_path, ReplaceError, ReplacePolicy, StagedOutput};

/// Stderr kept in console diagnostics; the run log gets all of it
const STDERR_PREVIEW_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Could not run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of one write attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Ok,
    /// Final replacement failed because the target stayed locked
    Busy(String),
    Error(String),
}

impl WriteOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, WriteOutcome::Ok)
    }
}

impl From<ReplaceError> for WriteOutcome {
    fn from(err: ReplaceError) -> Self {
        match err {
            ReplaceError::Busy { .. } => WriteOutcome::Busy(err.to_string()),
            ReplaceError::Io(_) => WriteOutcome::Error(err.to_string()),
        }
    }
}

/// What to write into one file
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub path: &'a Path,
    pub tags: &'a TagSet,
    pub artwork: Option<&'a Path>,
    /// Drop all existing metadata before writing
    pub clear_existing: bool,
    /// Keys being overridden; writers that can blank a key do so when no new value is given
    pub clear_keys: &'a [String],
    /// Replace any embedded cover instead of adding another one
    pub remove_existing_artwork: bool,
}

impl<'a> WriteRequest<'a> {
    pub fn new(path: &'a Path, tags: &'a TagSet) -> Self {
        Self {
            path,
            tags,
            artwork: None,
            clear_existing: false,
            clear_keys: &[],
            remove_existing_artwork: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.artwork.is_none() && self.clear_keys.is_empty()
    }
}

pub trait TagWriter: Send + Sync {
    fn name(&self) -> &'static str;

    fn write(&self, request: &WriteRequest<'_>) -> WriteOutcome;
}

/// Owned form of a [`WriteRequest`] that can move onto the blocking pool
#[derive(Debug, Clone, Default)]
pub struct WriteJob {
    pub path: PathBuf,
    pub tags: TagSet,
    pub artwork: Option<PathBuf>,
    pub clear_keys: Vec<String>,
    pub remove_existing_artwork: bool,
}

impl WriteJob {
    pub fn request(&self) -> WriteRequest<'_> {
        WriteRequest {
            artwork: self.artwork.as_deref(),
            clear_keys: &self.clear_keys,
            remove_existing_artwork: self.remove_existing_artwork,
            ..WriteRequest::new(&self.path, &self.tags)
        }
    }
}

/// Run a writer on the blocking pool
///
/// Writers wait on subprocesses and sleep between replacement retries.
pub async fn write_blocking(writer: Arc<dyn TagWriter>, job: WriteJob) -> WriteOutcome {
    tokio::task::spawn_blocking(move || writer.write(&job.request()))
        .await
        .unwrap_or_else(|e| WriteOutcome::Error(format!("Task join error: {}", e)))
}

pub async fn snapshot_blocking(
    snapshotter: Arc<dyn MetadataSnapshotter>,
    path: PathBuf,
    dest: PathBuf,
) -> Result<(), WriterError> {
    tokio::task::spawn_blocking(move || snapshotter.snapshot(&path, &dest))
        .await
        .map_err(|e| WriterError::Io(std::io::Error::other(e)))?
}

pub async fn restore_blocking(
    snapshotter: Arc<dyn MetadataSnapshotter>,
    path: PathBuf,
    snapshot: PathBuf,
) -> WriteOutcome {
    tokio::task::spawn_blocking(move || snapshotter.restore(&path, &snapshot))
        .await
        .unwrap_or_else(|e| WriteOutcome::Error(format!("Task join error: {}", e)))
}

/// Saves and restores a file's container metadata
pub trait MetadataSnapshotter: Send + Sync {
    fn snapshot(&self, path: &Path, dest: &Path) -> Result<(), WriterError>;

    fn restore(&self, path: &Path, snapshot: &Path) -> WriteOutcome;
}

/// Whether writers run their tools or only report them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    #[default]
    Execute,
    DryRun,
    Test,
}

impl ExecMode {
    pub fn from_config(write: &WriteConfig) -> Self {
        match (write.test_mode, write.dry_run) {
            (Some(TestMode::Basic | TestMode::Verbose), _) => ExecMode::Test,
            (None, true) => ExecMode::DryRun,
            (None, false) => ExecMode::Execute,
        }
    }

    pub fn is_simulated(&self) -> bool {
        !matches!(self, ExecMode::Execute)
    }

    fn label(&self) -> &'static str {
        match self {
            ExecMode::Execute => "",
            ExecMode::DryRun => "DRY RUN",
            ExecMode::Test => "TEST MODE",
        }
    }
}

/// Settings shared by every writer in a run
#[derive(Debug, Clone, Default)]
pub struct WriterSettings {
    pub mode: ExecMode,
    pub atomic_replace: bool,
    pub replace_policy: ReplacePolicy,
    pub run_log: RunLog,
}

impl WriterSettings {
    pub fn from_config(write: &WriteConfig, run_log: RunLog) -> Self {
        Self {
            mode: ExecMode::from_config(write),
            atomic_replace: write.atomic_replace,
            replace_policy: ReplacePolicy::default(),
            run_log,
        }
    }

    /// Log the command a simulated run would have executed
    fn report_simulated(&self, tool: &str, program: &str, args: &[OsString]) {
        tracing::info!(
            "{} {} cmd: {}",
            self.mode.label(),
            tool,
            render_command(program, args)
        );
    }
}

/// Command line as one printable string
pub fn render_command(program: &str, args: &[OsString]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().map(|arg| arg.to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a tool to completion; a non-zero exit becomes `ToolFailed` and is copied to the run log
fn run_tool(
    tool: &str,
    program: &str,
    args: &[OsString],
    target: &Path,
    run_log: &RunLog,
) -> Result<Output, WriterError> {
    tracing::debug!(tool, cmd = %render_command(program, args), "Running tool");
    let output = Command::new(program).args(args).output().map_err(|source| {
        run_log.append(&format!(
            "[{}] {}\nerror: could not run {}: {}",
            tool,
            target.display(),
            program,
            source
        ));
        WriterError::Spawn {
            tool: tool.to_string(),
            source,
        }
    })?;

    if output.status.success() {
        return Ok(output);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    run_log.append(&format!(
        "[{}] {}\ncmd: {}\nstderr:\n{}",
        tool,
        target.display(),
        render_command(program, args),
        stderr
    ));
    Err(WriterError::ToolFailed {
        tool: tool.to_string(),
        status: output.status.to_string(),
        stderr: stderr.trim().chars().take(STDERR_PREVIEW_CHARS).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_mode_from_config() {
        let mut write = WriteConfig::default();
        assert_eq!(ExecMode::from_config(&write), ExecMode::Execute);
        write.dry_run = true;
        assert_eq!(ExecMode::from_config(&write), ExecMode::DryRun);
        write.test_mode = Some(TestMode::Basic);
        assert_eq!(ExecMode::from_config(&write), ExecMode::Test);
        assert!(ExecMode::Test.is_simulated());
        assert!(!ExecMode::Execute.is_simulated());
    }

    #[test]
    fn test_render_command() {
        let args: Vec<OsString> = ["-y", "-i", "in.mp4"].iter().map(OsString::from).collect();
        assert_eq!(render_command("ffmpeg", &args), "ffmpeg -y -i in.mp4");
    }

    #[test]
    fn test_replace_error_maps_to_outcome() {
        let busy = ReplaceError::Busy {
            path: "/m/a.mp4".to_string(),
            attempts: 3,
        };
        assert!(matches!(WriteOutcome::from(busy), WriteOutcome::Busy(_)));
        let io = ReplaceError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(matches!(WriteOutcome::from(io), WriteOutcome::Error(_)));
    }

    #[test]
    fn test_empty_request() {
        let tags = TagSet::default();
        let request = WriteRequest::new(Path::new("/m/a.mp4"), &tags);
        assert!(request.is_empty());
        let artwork = Path::new("/tmp/cover.jpg");
        assert!(!WriteRequest {
            artwork: Some(artwork),
            ..request
        }
        .is_empty());
    }

    struct KeyCountWriter;

    impl TagWriter for KeyCountWriter {
        fn name(&self) -> &'static str {
            "count"
        }

        fn write(&self, request: &WriteRequest<'_>) -> WriteOutcome {
            match request.tags.len() {
                0 => panic!("nothing to write"),
                1 => WriteOutcome::Ok,
                n => WriteOutcome::Busy(format!("{} keys", n)),
            }
        }
    }

    #[tokio::test]
    async fn test_write_blocking_runs_request_off_runtime() {
        let writer: Arc<dyn TagWriter> = Arc::new(KeyCountWriter);
        let mut tags = TagSet::default();
        tags.set("title", crate::mapping::TagValue::Text("Heat".to_string()));
        let job = WriteJob {
            path: PathBuf::from("/m/Heat.mp4"),
            tags,
            ..WriteJob::default()
        };
        assert_eq!(write_blocking(writer.clone(), job.clone()).await, WriteOutcome::Ok);
        assert_eq!(job.request().path, Path::new("/m/Heat.mp4"));

        // A panicking writer fails the file instead of the run
        let outcome = write_blocking(writer, WriteJob::default()).await;
        assert!(matches!(outcome, WriteOutcome::Error(message) if message.starts_with("Task join error")));
    }
}
